//! Module implement the storage backends.
//!
//! Storage is an ordered sequence of points with append-only
//! semantics. Two backends share one contract, an in-memory vector and
//! an append-oriented delimited text file. Insertion order is
//! preserved, nothing is implicitly sorted on append.
//!
//! Each backend tracks online whether the sequence is sorted by
//! timestamp, `index_intact`, together with the highest timestamp seen
//! while that holds, `latest_time`. The coordinator uses the pair to
//! decide between incremental index maintenance and invalidation
//! without scanning.

use chrono::{DateTime, Utc};

use std::{convert::TryFrom, ffi, vec};

use crate::{point::Point, Error, Result};

mod csv;
mod memory;

pub use self::csv::CsvStorage;
pub use self::memory::MemoryStorage;

/// Default delimiter for the file backend.
pub const DEFAULT_DELIMITER: u8 = b',';

/// Access mode for a storage backend, the permission regime for
/// storage operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// `"r"`, read-only.
    Read,
    /// `"r+"`, read-write.
    ReadWrite,
    /// `"w"`, write-only, truncates existing data on open.
    Write,
    /// `"w+"`, read-write, truncates existing data on open.
    WriteRead,
    /// `"a"`, append-only.
    Append,
    /// `"a+"`, append and read.
    AppendRead,
}

impl TryFrom<&str> for AccessMode {
    type Error = Error;

    fn try_from(mode: &str) -> Result<AccessMode> {
        match mode {
            "r" => Ok(AccessMode::Read),
            "r+" => Ok(AccessMode::ReadWrite),
            "w" => Ok(AccessMode::Write),
            "w+" => Ok(AccessMode::WriteRead),
            "a" => Ok(AccessMode::Append),
            "a+" => Ok(AccessMode::AppendRead),
            _ => err_at!(InvalidInput, msg: "invalid access mode {:?}", mode),
        }
    }
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::ReadWrite => "r+",
            AccessMode::Write => "w",
            AccessMode::WriteRead => "w+",
            AccessMode::Append => "a",
            AccessMode::AppendRead => "a+",
        }
    }

    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            AccessMode::Read | AccessMode::ReadWrite | AccessMode::WriteRead | AccessMode::AppendRead
        )
    }

    pub fn is_appendable(&self) -> bool {
        !matches!(self, AccessMode::Read)
    }

    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            AccessMode::ReadWrite | AccessMode::Write | AccessMode::WriteRead
        )
    }
}

/// Configuration for opening a database with the file backend. Use the
/// `set_*` methods to add more configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Location of the storage file.
    pub path: ffi::OsString,
    /// Create missing parent directories while opening for write.
    ///
    /// Default: false
    pub create_dirs: bool,
    /// Access mode for the storage file.
    ///
    /// Default: [AccessMode::ReadWrite]
    pub access_mode: AccessMode,
    /// Field delimiter for the record format.
    ///
    /// Default: [DEFAULT_DELIMITER]
    pub delimiter: u8,
    /// Force fsync after each append batch.
    ///
    /// Default: true
    pub flush_on_insert: bool,
    /// Enable on-line index maintenance and index-assisted reads.
    ///
    /// Default: true
    pub auto_index: bool,
}

impl Config {
    pub fn new(path: &ffi::OsStr) -> Config {
        Config {
            path: path.to_os_string(),
            create_dirs: false,
            access_mode: AccessMode::ReadWrite,
            delimiter: DEFAULT_DELIMITER,
            flush_on_insert: true,
            auto_index: true,
        }
    }

    pub fn set_create_dirs(&mut self, create_dirs: bool) -> &mut Self {
        self.create_dirs = create_dirs;
        self
    }

    pub fn set_access_mode(&mut self, mode: AccessMode) -> &mut Self {
        self.access_mode = mode;
        self
    }

    pub fn set_delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    pub fn set_flush_on_insert(&mut self, flush: bool) -> &mut Self {
        self.flush_on_insert = flush;
        self
    }

    pub fn set_auto_index(&mut self, auto_index: bool) -> &mut Self {
        self.auto_index = auto_index;
        self
    }
}

/// Contract shared by the storage backends.
///
/// `Item` is the backend's native record shape, a [Point] for the
/// memory backend and a row of string tokens for the file backend. The
/// `item_*` shortcuts let the coordinator inspect the measurement or
/// the timestamp without materializing the whole point.
pub trait Storage {
    type Item: Clone;

    /// Append points, preserving existing order. Updates the online
    /// sort tracker per incoming timestamp.
    fn append(&mut self, points: &[Point]) -> Result<()>;

    /// Items in storage order.
    fn iter(&mut self) -> Result<vec::IntoIter<Self::Item>>;

    /// Materialize the full sequence into points.
    fn read(&mut self) -> Result<Vec<Point>>;

    /// Overwrite the entire sequence. With `is_sorted` the sort
    /// tracker is primed from the last item, otherwise it is cleared
    /// to the unknown state.
    fn write(&mut self, items: Vec<Self::Item>, is_sorted: bool) -> Result<()>;

    /// Empty the storage and reset the sort tracker.
    fn reset(&mut self) -> Result<()>;

    fn len(&mut self) -> Result<usize>;

    /// One pass over storage re-deriving the sort tracker.
    fn is_sorted(&mut self) -> Result<bool>;

    /// Whether the sequence is known to be sorted by timestamp.
    fn index_intact(&self) -> bool;

    /// Highest timestamp seen while `index_intact` held.
    fn latest_time(&self) -> Option<DateTime<Utc>>;

    fn serialize_point(&self, point: &Point) -> Self::Item;

    fn item_to_point(&self, item: &Self::Item) -> Result<Point>;

    fn item_measurement(&self, item: &Self::Item) -> Result<String>;

    fn item_timestamp(&self, item: &Self::Item) -> Result<DateTime<Utc>>;

    fn can_read(&self) -> Result<()>;

    fn can_append(&self) -> Result<()>;

    fn can_write(&self) -> Result<()>;

    /// Release any handles. Further operations fail with a state
    /// error.
    fn close(&mut self) -> Result<()>;
}
