//! Module implement the typed query builders.
//!
//! One builder per facet. The right-hand-side type of each comparison
//! is fixed by the builder's signature, a datetime for [TimeQuery], a
//! string for [MeasurementQuery] and [TagQuery], a numeric for
//! [FieldQuery]. Regex operators are only offered where they are
//! legal, on measurement and tags.

use chrono::{DateTime, Utc};
use regex::Regex;

use std::sync::Arc;

use crate::{
    point::Field,
    query::{Facet, Leaf, Op, Operand, Predicate, Query, Segment, Transform, Value},
    Error, Result,
};

fn leaf(facet: Facet, path: Vec<Segment>, op: Op) -> Query {
    Query::Leaf(Leaf::new(facet, path, op))
}

// `matches` is anchored at the start of the value, like re.match.
fn anchored(pattern: &str) -> Result<Regex> {
    err_at!(InvalidQuery, Regex::new(&format!("^(?:{})", pattern)))
}

fn anywhere(pattern: &str) -> Result<Regex> {
    err_at!(InvalidQuery, Regex::new(pattern))
}

/// Build leaf predicates over the point timestamp.
pub struct TimeQuery;

impl TimeQuery {
    pub fn eq(rhs: DateTime<Utc>) -> Query {
        leaf(Facet::Time, vec![], Op::Eq(Operand::Time(rhs)))
    }

    pub fn ne(rhs: DateTime<Utc>) -> Query {
        leaf(Facet::Time, vec![], Op::Ne(Operand::Time(rhs)))
    }

    pub fn lt(rhs: DateTime<Utc>) -> Query {
        leaf(Facet::Time, vec![], Op::Lt(Operand::Time(rhs)))
    }

    pub fn le(rhs: DateTime<Utc>) -> Query {
        leaf(Facet::Time, vec![], Op::Le(Operand::Time(rhs)))
    }

    pub fn gt(rhs: DateTime<Utc>) -> Query {
        leaf(Facet::Time, vec![], Op::Gt(Operand::Time(rhs)))
    }

    pub fn ge(rhs: DateTime<Utc>) -> Query {
        leaf(Facet::Time, vec![], Op::Ge(Operand::Time(rhs)))
    }

    /// User predicate over the timestamp. Disables hash-keyed
    /// memoization for the subtree.
    pub fn test<F>(test: F) -> Query
    where
        F: Fn(DateTime<Utc>) -> bool + Send + Sync + 'static,
    {
        let test: Predicate = Arc::new(move |value: &Value| match value {
            Value::Time(t) => test(*t),
            _ => false,
        });
        leaf(Facet::Time, vec![], Op::Test(test))
    }

    /// Always true. Useful as identity when composing queries.
    pub fn noop() -> Query {
        leaf(Facet::Time, vec![], Op::Noop)
    }
}

/// Build leaf predicates over the measurement name.
pub struct MeasurementQuery;

impl MeasurementQuery {
    pub fn eq(rhs: &str) -> Query {
        leaf(
            Facet::Measurement,
            vec![],
            Op::Eq(Operand::Str(rhs.to_string())),
        )
    }

    pub fn ne(rhs: &str) -> Query {
        leaf(
            Facet::Measurement,
            vec![],
            Op::Ne(Operand::Str(rhs.to_string())),
        )
    }

    pub fn lt(rhs: &str) -> Query {
        leaf(
            Facet::Measurement,
            vec![],
            Op::Lt(Operand::Str(rhs.to_string())),
        )
    }

    pub fn le(rhs: &str) -> Query {
        leaf(
            Facet::Measurement,
            vec![],
            Op::Le(Operand::Str(rhs.to_string())),
        )
    }

    pub fn gt(rhs: &str) -> Query {
        leaf(
            Facet::Measurement,
            vec![],
            Op::Gt(Operand::Str(rhs.to_string())),
        )
    }

    pub fn ge(rhs: &str) -> Query {
        leaf(
            Facet::Measurement,
            vec![],
            Op::Ge(Operand::Str(rhs.to_string())),
        )
    }

    /// Regex over the measurement name, the match is anchored at the
    /// start. Fails on an invalid pattern.
    pub fn matches(pattern: &str) -> Result<Query> {
        Ok(leaf(
            Facet::Measurement,
            vec![],
            Op::Matches(anchored(pattern)?),
        ))
    }

    /// Regex over the measurement name, matching anywhere. Fails on an
    /// invalid pattern.
    pub fn search(pattern: &str) -> Result<Query> {
        Ok(leaf(
            Facet::Measurement,
            vec![],
            Op::Search(anywhere(pattern)?),
        ))
    }

    pub fn test<F>(test: F) -> Query
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let test: Predicate = Arc::new(move |value: &Value| match value {
            Value::Str(s) => test(s),
            _ => false,
        });
        leaf(Facet::Measurement, vec![], Op::Test(test))
    }

    /// Always true. Useful as identity when composing queries.
    pub fn noop() -> Query {
        leaf(Facet::Measurement, vec![], Op::Noop)
    }
}

/// Entry point for leaf predicates over the tag-set. A tag key is
/// required before any operator applies.
pub struct TagQuery;

impl TagQuery {
    pub fn key(key: &str) -> TagPath {
        TagPath {
            path: vec![Segment::Key(key.to_string())],
        }
    }
}

/// Tag path under construction, terminate with one of the operator
/// methods.
pub struct TagPath {
    path: Vec<Segment>,
}

impl TagPath {
    /// Append a further static key to the path. Tag values are flat
    /// strings, a deeper path only resolves through a preceding
    /// [TagPath::map] transform.
    pub fn key(mut self, key: &str) -> TagPath {
        self.path.push(Segment::Key(key.to_string()));
        self
    }

    /// Append an opaque transform to the path. Disables hash-keyed
    /// memoization and index assistance for the subtree.
    pub fn map<F>(mut self, transform: F) -> TagPath
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        let transform: Transform = Arc::new(transform);
        self.path.push(Segment::Map(transform));
        self
    }

    pub fn eq(self, rhs: &str) -> Query {
        leaf(Facet::Tags, self.path, Op::Eq(Operand::Str(rhs.to_string())))
    }

    pub fn ne(self, rhs: &str) -> Query {
        leaf(Facet::Tags, self.path, Op::Ne(Operand::Str(rhs.to_string())))
    }

    /// True for an entry that is present and carries the null marker.
    pub fn eq_none(self) -> Query {
        leaf(Facet::Tags, self.path, Op::Eq(Operand::Null))
    }

    /// True for an entry that is present with a non-null value.
    pub fn ne_none(self) -> Query {
        leaf(Facet::Tags, self.path, Op::Ne(Operand::Null))
    }

    pub fn lt(self, rhs: &str) -> Query {
        leaf(Facet::Tags, self.path, Op::Lt(Operand::Str(rhs.to_string())))
    }

    pub fn le(self, rhs: &str) -> Query {
        leaf(Facet::Tags, self.path, Op::Le(Operand::Str(rhs.to_string())))
    }

    pub fn gt(self, rhs: &str) -> Query {
        leaf(Facet::Tags, self.path, Op::Gt(Operand::Str(rhs.to_string())))
    }

    pub fn ge(self, rhs: &str) -> Query {
        leaf(Facet::Tags, self.path, Op::Ge(Operand::Str(rhs.to_string())))
    }

    /// True when the path resolves, null values included.
    pub fn exists(self) -> Query {
        leaf(Facet::Tags, self.path, Op::Exists)
    }

    /// Regex over the tag value, the match is anchored at the start.
    /// Fails on an invalid pattern.
    pub fn matches(self, pattern: &str) -> Result<Query> {
        Ok(leaf(Facet::Tags, self.path, Op::Matches(anchored(pattern)?)))
    }

    /// Regex over the tag value, matching anywhere. Fails on an
    /// invalid pattern.
    pub fn search(self, pattern: &str) -> Result<Query> {
        Ok(leaf(Facet::Tags, self.path, Op::Search(anywhere(pattern)?)))
    }

    /// User predicate over the tag value. Null or missing values do
    /// not reach the predicate. Disables hash-keyed memoization.
    pub fn test<F>(self, test: F) -> Query
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let test: Predicate = Arc::new(move |value: &Value| match value {
            Value::Str(s) => test(s),
            _ => false,
        });
        leaf(Facet::Tags, self.path, Op::Test(test))
    }
}

/// Entry point for leaf predicates over the field-set. A field key is
/// required before any operator applies.
pub struct FieldQuery;

impl FieldQuery {
    pub fn key(key: &str) -> FieldPath {
        FieldPath {
            path: vec![Segment::Key(key.to_string())],
        }
    }
}

/// Field path under construction, terminate with one of the operator
/// methods. Regex operators are not available on fields.
pub struct FieldPath {
    path: Vec<Segment>,
}

impl FieldPath {
    /// Append a further static key to the path. Field values are flat
    /// numerics, a deeper path only resolves through a preceding
    /// [FieldPath::map] transform.
    pub fn key(mut self, key: &str) -> FieldPath {
        self.path.push(Segment::Key(key.to_string()));
        self
    }

    /// Append an opaque transform to the path. Disables hash-keyed
    /// memoization and forces per-point evaluation.
    pub fn map<F>(mut self, transform: F) -> FieldPath
    where
        F: Fn(Value) -> Option<Value> + Send + Sync + 'static,
    {
        let transform: Transform = Arc::new(transform);
        self.path.push(Segment::Map(transform));
        self
    }

    pub fn eq<F: Into<Field>>(self, rhs: F) -> Query {
        leaf(Facet::Fields, self.path, Op::Eq(Operand::Num(rhs.into())))
    }

    pub fn ne<F: Into<Field>>(self, rhs: F) -> Query {
        leaf(Facet::Fields, self.path, Op::Ne(Operand::Num(rhs.into())))
    }

    /// True for an entry that is present and carries the null marker.
    pub fn eq_none(self) -> Query {
        leaf(Facet::Fields, self.path, Op::Eq(Operand::Null))
    }

    /// True for an entry that is present with a non-null value.
    pub fn ne_none(self) -> Query {
        leaf(Facet::Fields, self.path, Op::Ne(Operand::Null))
    }

    pub fn lt<F: Into<Field>>(self, rhs: F) -> Query {
        leaf(Facet::Fields, self.path, Op::Lt(Operand::Num(rhs.into())))
    }

    pub fn le<F: Into<Field>>(self, rhs: F) -> Query {
        leaf(Facet::Fields, self.path, Op::Le(Operand::Num(rhs.into())))
    }

    pub fn gt<F: Into<Field>>(self, rhs: F) -> Query {
        leaf(Facet::Fields, self.path, Op::Gt(Operand::Num(rhs.into())))
    }

    pub fn ge<F: Into<Field>>(self, rhs: F) -> Query {
        leaf(Facet::Fields, self.path, Op::Ge(Operand::Num(rhs.into())))
    }

    /// True when the path resolves, null values included.
    pub fn exists(self) -> Query {
        leaf(Facet::Fields, self.path, Op::Exists)
    }

    /// User predicate over the field value. Null or missing values do
    /// not reach the predicate. Disables hash-keyed memoization.
    pub fn test<F>(self, test: F) -> Query
    where
        F: Fn(Field) -> bool + Send + Sync + 'static,
    {
        let test: Predicate = Arc::new(move |value: &Value| match value {
            Value::Num(num) => test(*num),
            _ => false,
        });
        leaf(Facet::Fields, self.path, Op::Test(test))
    }
}
