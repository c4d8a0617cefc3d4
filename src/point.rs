//! Module implement [Point], the record type managed by this package.
//!
//! A point carries a UTC timestamp, a measurement name, a tag-set of
//! string metadata and a field-set of numeric values. Points are
//! serialized to a flat row of string tokens for the file backend and
//! parsed back on read.

use chrono::{DateTime, NaiveDateTime, Utc};

use std::{cmp, collections::BTreeMap, fmt, result};

use crate::{Error, Result};

/// Measurement name assumed when a point does not carry one.
pub const DEFAULT_MEASUREMENT: &str = "_default";

// Token standing in for missing values in the serialized row.
pub(crate) const NONE_TOKEN: &str = "_none";

const TAG_PREFIX: &str = "_tag_";
const FIELD_PREFIX: &str = "_field_";

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
// readers accept any fraction width, writers always emit six digits.
const TS_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const TS_PARSE_FORMAT_NO_FRACTION: &str = "%Y-%m-%dT%H:%M:%S";

/// Tag-set of a point, keys to optional string values.
pub type TagSet = BTreeMap<String, Option<String>>;

/// Field-set of a point, keys to optional numeric values.
pub type FieldSet = BTreeMap<String, Option<Field>>;

/// Numeric value held by a point's field-set.
///
/// Comparison between the two variants is numeric, `Integer(1)` equals
/// `Float(1.0)`. Booleans are not representable, by construction.
#[derive(Clone, Copy)]
pub enum Field {
    Integer(i64),
    Float(f64),
}

impl Field {
    pub fn as_f64(&self) -> f64 {
        match self {
            Field::Integer(val) => *val as f64,
            Field::Float(val) => *val,
        }
    }
}

impl From<i64> for Field {
    fn from(val: i64) -> Field {
        Field::Integer(val)
    }
}

impl From<i32> for Field {
    fn from(val: i32) -> Field {
        Field::Integer(val as i64)
    }
}

impl From<f64> for Field {
    fn from(val: f64) -> Field {
        Field::Float(val)
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Field) -> bool {
        match (self, other) {
            (Field::Integer(a), Field::Integer(b)) => a == b,
            (Field::Float(a), Field::Float(b)) => a == b,
            (Field::Integer(a), Field::Float(b)) => (*a as f64) == *b,
            (Field::Float(a), Field::Integer(b)) => *a == (*b as f64),
        }
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Field) -> Option<cmp::Ordering> {
        match (self, other) {
            (Field::Integer(a), Field::Integer(b)) => a.partial_cmp(b),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Field::Integer(val) => write!(f, "{}", val),
            Field::Float(val) => write!(f, "{}", val),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

/// Record type managed by this package.
///
/// Equality is structural over all four facets. Ordering for storage
/// purposes is by `time` ascending. The engine never mutates a point
/// after insert, update operations replace the stored form.
#[derive(Clone, PartialEq)]
pub struct Point {
    pub time: DateTime<Utc>,
    pub measurement: String,
    pub tags: TagSet,
    pub fields: FieldSet,
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "Point<{} {} tags:{:?} fields:{:?}>",
            self.time, self.measurement, self.tags, self.fields
        )
    }
}

impl Point {
    /// Create a new point at `time`, with the default measurement name
    /// and empty tag/field sets. Use the `set_*` methods to add more.
    pub fn new(time: DateTime<Utc>) -> Point {
        Point {
            time,
            measurement: DEFAULT_MEASUREMENT.to_string(),
            tags: TagSet::new(),
            fields: FieldSet::new(),
        }
    }

    pub fn set_time(&mut self, time: DateTime<Utc>) -> &mut Self {
        self.time = time;
        self
    }

    pub fn set_measurement(&mut self, name: &str) -> &mut Self {
        self.measurement = name.to_string();
        self
    }

    pub fn set_tag(&mut self, key: &str, value: &str) -> &mut Self {
        self.tags.insert(key.to_string(), Some(value.to_string()));
        self
    }

    /// Add a tag key carrying the null marker.
    pub fn set_tag_none(&mut self, key: &str) -> &mut Self {
        self.tags.insert(key.to_string(), None);
        self
    }

    pub fn set_field<F>(&mut self, key: &str, value: F) -> &mut Self
    where
        F: Into<Field>,
    {
        self.fields.insert(key.to_string(), Some(value.into()));
        self
    }

    /// Add a field key carrying the null marker.
    pub fn set_field_none(&mut self, key: &str) -> &mut Self {
        self.fields.insert(key.to_string(), None);
        self
    }
}

impl Point {
    /// Validate this point. Tag and field keys must be non-empty, and
    /// so must the measurement name.
    pub fn validate(&self) -> Result<()> {
        if self.measurement.is_empty() {
            err_at!(InvalidInput, msg: "measurement name must not be empty")?
        }
        for key in self.tags.keys() {
            if key.is_empty() {
                err_at!(InvalidInput, msg: "tag-set must contain only non-empty keys")?
            }
        }
        for key in self.fields.keys() {
            if key.is_empty() {
                err_at!(InvalidInput, msg: "field-set must contain only non-empty keys")?
            }
        }
        Ok(())
    }

    /// Serialize this point to its canonical row of tokens,
    ///
    /// ```text
    /// [timestamp, measurement, ("_tag_"+k, v).., ("_field_"+k, v)..]
    /// ```
    ///
    /// The timestamp is ISO-8601 without offset, readers assume UTC.
    /// Null tag/field values are encoded as the `_none` token.
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(2 + (self.tags.len() + self.fields.len()) * 2);

        row.push(self.time.naive_utc().format(TS_FORMAT).to_string());
        row.push(self.measurement.clone());

        for (key, value) in self.tags.iter() {
            row.push(format!("{}{}", TAG_PREFIX, key));
            row.push(match value {
                Some(value) => value.clone(),
                None => NONE_TOKEN.to_string(),
            });
        }
        for (key, value) in self.fields.iter() {
            row.push(format!("{}{}", FIELD_PREFIX, key));
            row.push(match value {
                Some(value) => value.to_string(),
                None => NONE_TOKEN.to_string(),
            });
        }

        row
    }

    /// Deserialize a point from its canonical row of tokens.
    ///
    /// Field tokens are parsed as integer when they are all digits with
    /// an optional leading `-`, otherwise a float parse is attempted,
    /// and on failure the value is treated as null.
    pub fn from_row(row: &[String]) -> Result<Point> {
        if row.len() < 2 {
            err_at!(DecodeFail, msg: "row has {} tokens, expected at least 2", row.len())?
        }

        let time = parse_timestamp(&row[0])?;
        let measurement = match row[1].as_str() {
            NONE_TOKEN => DEFAULT_MEASUREMENT.to_string(),
            name => name.to_string(),
        };

        let mut tags = TagSet::new();
        let mut fields = FieldSet::new();

        let mut off = 2;
        while off + 1 < row.len() && row[off].starts_with(TAG_PREFIX) {
            let key = row[off][TAG_PREFIX.len()..].to_string();
            let value = match row[off + 1].as_str() {
                NONE_TOKEN => None,
                value => Some(value.to_string()),
            };
            tags.insert(key, value);
            off += 2;
        }
        while off + 1 < row.len() && row[off].starts_with(FIELD_PREFIX) {
            let key = row[off][FIELD_PREFIX.len()..].to_string();
            fields.insert(key, parse_field(&row[off + 1]));
            off += 2;
        }

        if off != row.len() {
            err_at!(DecodeFail, msg: "unexpected token {:?} at {}", row[off], off)?
        }

        let val = Point {
            time,
            measurement,
            tags,
            fields,
        };

        Ok(val)
    }

    /// Parse only the timestamp out of a serialized row.
    pub fn row_timestamp(row: &[String]) -> Result<DateTime<Utc>> {
        match row.first() {
            Some(token) => parse_timestamp(token),
            None => err_at!(DecodeFail, msg: "empty row"),
        }
    }

    /// Parse only the measurement name out of a serialized row.
    pub fn row_measurement(row: &[String]) -> Result<String> {
        match row.get(1) {
            Some(token) if token == NONE_TOKEN => Ok(DEFAULT_MEASUREMENT.to_string()),
            Some(token) => Ok(token.clone()),
            None => err_at!(DecodeFail, msg: "row has no measurement token"),
        }
    }
}

fn parse_timestamp(token: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(token, TS_PARSE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(token, TS_PARSE_FORMAT_NO_FRACTION));
    match naive {
        Ok(naive) => Ok(DateTime::from_utc(naive, Utc)),
        Err(err) => err_at!(DecodeFail, msg: "bad timestamp {:?} {}", token, err),
    }
}

fn parse_field(token: &str) -> Option<Field> {
    let digits = match token.strip_prefix('-') {
        Some(rest) => rest,
        None => token,
    };
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(val) = token.parse::<i64>() {
            return Some(Field::Integer(val));
        }
    }
    match token.parse::<f64>() {
        Ok(val) => Some(Field::Float(val)),
        Err(_) => None,
    }
}

#[cfg(test)]
#[path = "point_test.rs"]
mod point_test;
