//! Package implement an embedded, append-optimized datastore for
//! time-series data.
//!
//! A single observation is captured as a [Point], carrying a UTC
//! timestamp, a measurement name, a tag-set of string metadata and a
//! field-set of numeric values. Points are appended to a [Storage]
//! backend, either in memory or as a delimited text file, in
//! append-only fashion. An optional in-memory inverted [Index]
//! accelerates equality and range predicates, and the [Database]
//! coordinator keeps index and storage synchronized while serving
//! insert, query, update and remove operations.
//!
//! **Write path**: caller builds a `Point`, the coordinator validates
//! it, storage appends the serialized form, and the index is updated
//! incrementally while appends arrive in timestamp order. An
//! out-of-order append invalidates the index; a subsequent
//! [Database::reindex] sorts storage and rebuilds it.
//!
//! **Read path**: caller supplies a [Query], the coordinator consults
//! the index planner when the index is usable, and materializes
//! matching points by deserializing the matched storage items, falling
//! back to a full scan when the index adds no selectivity.
//!
//! The engine is single-threaded and synchronous. Concurrent access
//! must be serialized by the caller.

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use tsdb::Error;
/// err_at!(Fatal, msg: "fatal message")
/// ```
///
/// ```ignore
/// use tsdb::Error;
/// err_at!(IOError, std::fs::File::open("non-existent-file"))
/// ```
///
/// ```ignore
/// use tsdb::Error;
/// err_at!(IOError, std::fs::File::open("non-existent-file"), "detail")
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

mod db;
mod index;
mod measurement;
mod point;
mod query;
mod storage;
mod util;

pub use crate::db::{Database, SelectKey, Update};
pub use crate::index::{Index, IndexResult};
pub use crate::measurement::Measurement;
pub use crate::point::{Field, FieldSet, Point, TagSet, DEFAULT_MEASUREMENT};
pub use crate::query::{
    FieldPath, FieldQuery, MeasurementQuery, Query, TagPath, TagQuery, TimeQuery, Value,
};
pub use crate::storage::{AccessMode, Config, CsvStorage, MemoryStorage, Storage};

/// Error variants that are returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the error
/// location, and a message describing the error condition.
#[derive(Clone)]
pub enum Error {
    /// Internal assertion failure, typically a programming error.
    Fatal(String, String),
    /// Error from file-system or from the underlying operating system.
    IOError(String, String),
    /// Supplied file path is invalid.
    InvalidFile(String, String),
    /// Validation failure on a point, an update argument or a
    /// projection path.
    InvalidInput(String, String),
    /// Query is malformed, like an invalid regular expression.
    InvalidQuery(String, String),
    /// Operation is not permitted under the storage's access mode.
    InvalidMode(String, String),
    /// Operation attempted after the database handle was closed.
    Closed(String, String),
    /// De-serialization failed on a stored record.
    DecodeFail(String, String),
    /// Numeric conversion failed.
    FailConvert(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, m) => write!(f, "Fatal,{},{}", p, m),
            IOError(p, m) => write!(f, "IOError,{},{}", p, m),
            InvalidFile(p, m) => write!(f, "InvalidFile,{},{}", p, m),
            InvalidInput(p, m) => write!(f, "InvalidInput,{},{}", p, m),
            InvalidQuery(p, m) => write!(f, "InvalidQuery,{},{}", p, m),
            InvalidMode(p, m) => write!(f, "InvalidMode,{},{}", p, m),
            Closed(p, m) => write!(f, "Closed,{},{}", p, m),
            DecodeFail(p, m) => write!(f, "DecodeFail,{},{}", p, m),
            FailConvert(p, m) => write!(f, "FailConvert,{},{}", p, m),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;
