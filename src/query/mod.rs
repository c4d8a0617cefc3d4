//! Module implement the query algebra.
//!
//! A [Query] is a tree of leaf predicates over the four point facets,
//! time, measurement, tags and fields, combined with logical AND, OR
//! and NOT via the `&`, `|` and `!` operators. Leaves are built with
//! the typed builders in this module, [TimeQuery], [MeasurementQuery],
//! [TagQuery] and [FieldQuery], which fix the right-hand-side type per
//! facet at compile time.
//!
//! Every query evaluates against a [Point] to a boolean. Path
//! resolution failures, a missing tag/field key or a transform
//! returning nothing, evaluate the leaf to false and never error.
//!
//! Queries that are free of opaque callables carry a structural hash,
//! used by the index to memoize lookups. AND and OR hash
//! commutatively, `hash(a & b) == hash(b & a)`.

use chrono::{DateTime, Utc};
use regex::Regex;

use std::{
    cmp,
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    ops,
    result,
    sync::Arc,
};

use crate::point::{Field, Point};

mod build;

pub use self::build::{FieldPath, FieldQuery, MeasurementQuery, TagPath, TagQuery, TimeQuery};

/// Dynamic value a query path resolves to, also the cell type returned
/// by select projections.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Time(DateTime<Utc>),
    Str(String),
    Num(Field),
    None,
}

// Opaque 1-arg transform appended to a tag/field path.
pub(crate) type Transform = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

// Opaque user predicate, evaluated against the resolved value.
pub(crate) type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Point facets a leaf predicate can select.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Facet {
    Time,
    Measurement,
    Tags,
    Fields,
}

/// One step of a tag/field path. Static keys keep the leaf indexable,
/// opaque transforms force a scan.
#[derive(Clone)]
pub(crate) enum Segment {
    Key(String),
    Map(Transform),
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Segment::Key(key) => write!(f, "Key({:?})", key),
            Segment::Map(_) => write!(f, "Map(..)"),
        }
    }
}

/// Right-hand-side of a comparison leaf.
#[derive(Clone, Debug)]
pub(crate) enum Operand {
    Time(DateTime<Utc>),
    Str(String),
    Num(Field),
    Null,
}

/// Leaf operator.
#[derive(Clone)]
pub(crate) enum Op {
    Eq(Operand),
    Ne(Operand),
    Lt(Operand),
    Le(Operand),
    Gt(Operand),
    Ge(Operand),
    Exists,
    Matches(Regex),
    Search(Regex),
    Test(Predicate),
    Noop,
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Op::Eq(rhs) => write!(f, "Eq({:?})", rhs),
            Op::Ne(rhs) => write!(f, "Ne({:?})", rhs),
            Op::Lt(rhs) => write!(f, "Lt({:?})", rhs),
            Op::Le(rhs) => write!(f, "Le({:?})", rhs),
            Op::Gt(rhs) => write!(f, "Gt({:?})", rhs),
            Op::Ge(rhs) => write!(f, "Ge({:?})", rhs),
            Op::Exists => write!(f, "Exists"),
            Op::Matches(re) => write!(f, "Matches({:?})", re.as_str()),
            Op::Search(re) => write!(f, "Search({:?})", re.as_str()),
            Op::Test(_) => write!(f, "Test(..)"),
            Op::Noop => write!(f, "Noop"),
        }
    }
}

/// A single predicate over one facet of a point.
#[derive(Clone, Debug)]
pub struct Leaf {
    facet: Facet,
    path: Vec<Segment>,
    op: Op,
    hash: Option<u64>,
}

impl Leaf {
    pub(crate) fn new(facet: Facet, path: Vec<Segment>, op: Op) -> Leaf {
        let hash = leaf_hash(facet, &path, &op);
        Leaf {
            facet,
            path,
            op,
            hash,
        }
    }

    pub(crate) fn facet(&self) -> Facet {
        self.facet
    }

    pub(crate) fn op(&self) -> &Op {
        &self.op
    }

    // key of the leading path segment, when static.
    pub(crate) fn first_key(&self) -> Option<&str> {
        match self.path.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    // single-step static path, the indexable shape for tags/fields.
    pub(crate) fn single_key(&self) -> Option<&str> {
        match self.path.as_slice() {
            [Segment::Key(key)] => Some(key),
            _ => None,
        }
    }

    // Apply this leaf's operator directly to a candidate value. Used
    // by the index planner, which holds the values without the points.
    pub(crate) fn matches_value(&self, value: &Value) -> bool {
        match &self.op {
            Op::Eq(rhs) => value_eq(value, rhs),
            Op::Ne(rhs) => !value_eq(value, rhs),
            Op::Lt(rhs) => matches!(value_cmp(value, rhs), Some(cmp::Ordering::Less)),
            Op::Le(rhs) => matches!(
                value_cmp(value, rhs),
                Some(cmp::Ordering::Less) | Some(cmp::Ordering::Equal)
            ),
            Op::Gt(rhs) => matches!(value_cmp(value, rhs), Some(cmp::Ordering::Greater)),
            Op::Ge(rhs) => matches!(
                value_cmp(value, rhs),
                Some(cmp::Ordering::Greater) | Some(cmp::Ordering::Equal)
            ),
            Op::Exists => true,
            Op::Matches(re) | Op::Search(re) => match value {
                Value::Str(s) => re.is_match(s),
                _ => false,
            },
            Op::Test(test) => test(value),
            Op::Noop => true,
        }
    }

    fn eval(&self, point: &Point) -> bool {
        if let Op::Noop = self.op {
            return true;
        }
        match self.resolve(point) {
            Some(value) => self.matches_value(&value),
            None => false,
        }
    }

    // Resolve the facet and path against a point. `None` means the
    // path did not resolve, which the caller reads as "no match".
    fn resolve(&self, point: &Point) -> Option<Value> {
        let mut segments = self.path.iter();

        let mut value = match self.facet {
            Facet::Time => Value::Time(point.time),
            Facet::Measurement => Value::Str(point.measurement.clone()),
            Facet::Tags => {
                let key = match segments.next()? {
                    Segment::Key(key) => key,
                    Segment::Map(_) => return None,
                };
                match point.tags.get(key)? {
                    Some(s) => Value::Str(s.clone()),
                    None => Value::None,
                }
            }
            Facet::Fields => {
                let key = match segments.next()? {
                    Segment::Key(key) => key,
                    Segment::Map(_) => return None,
                };
                match point.fields.get(key)? {
                    Some(f) => Value::Num(*f),
                    None => Value::None,
                }
            }
        };

        for segment in segments {
            value = match segment {
                // resolved values are scalars, deeper static lookups
                // cannot resolve.
                Segment::Key(_) => return None,
                Segment::Map(transform) => transform(value)?,
            };
        }

        Some(value)
    }
}

/// Query over points, a tree of leaf predicates combined with logical
/// AND, OR and NOT.
#[derive(Clone, Debug)]
pub enum Query {
    Leaf(Leaf),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Not(Box<Query>),
}

impl Query {
    /// Evaluate this query against a point. AND and OR short-circuit
    /// in evaluation order, NOT inverts its child.
    pub fn eval(&self, point: &Point) -> bool {
        match self {
            Query::Leaf(leaf) => leaf.eval(point),
            Query::And(a, b) => a.eval(point) && b.eval(point),
            Query::Or(a, b) => a.eval(point) || b.eval(point),
            Query::Not(q) => !q.eval(point),
        }
    }

    /// Structural hash of this query, `None` when any subtree holds an
    /// opaque callable, a `test` predicate or a `map` transform.
    pub fn hash_value(&self) -> Option<u64> {
        match self {
            Query::Leaf(leaf) => leaf.hash,
            Query::And(a, b) => Some(mix2("and", a.hash_value()?, b.hash_value()?)),
            Query::Or(a, b) => Some(mix2("or", a.hash_value()?, b.hash_value()?)),
            Query::Not(q) => Some(mix1("not", q.hash_value()?)),
        }
    }

    /// Whether this query can participate in hash-keyed memoization.
    pub fn is_hashable(&self) -> bool {
        self.hash_value().is_some()
    }
}

// Queries compare equal when both carry a structural hash and the
// hashes agree.
impl PartialEq for Query {
    fn eq(&self, other: &Query) -> bool {
        match (self.hash_value(), other.hash_value()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl ops::BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        Query::And(Box::new(self), Box::new(rhs))
    }
}

impl ops::BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        Query::Or(Box::new(self), Box::new(rhs))
    }
}

impl ops::Not for Query {
    type Output = Query;

    fn not(self) -> Query {
        Query::Not(Box::new(self))
    }
}

fn value_eq(value: &Value, rhs: &Operand) -> bool {
    match (value, rhs) {
        (Value::Time(a), Operand::Time(b)) => a == b,
        (Value::Str(a), Operand::Str(b)) => a == b,
        (Value::Num(a), Operand::Num(b)) => a == b,
        (Value::None, Operand::Null) => true,
        _ => false,
    }
}

fn value_cmp(value: &Value, rhs: &Operand) -> Option<cmp::Ordering> {
    match (value, rhs) {
        (Value::Time(a), Operand::Time(b)) => a.partial_cmp(b),
        (Value::Str(a), Operand::Str(b)) => a.partial_cmp(b),
        (Value::Num(a), Operand::Num(b)) => a.partial_cmp(b),
        _ => None,
    }
}

// structural hash for a leaf, None under Test ops or Map segments.
fn leaf_hash(facet: Facet, path: &[Segment], op: &Op) -> Option<u64> {
    let mut hasher = DefaultHasher::new();

    match facet {
        Facet::Time => "time",
        Facet::Measurement => "measurement",
        Facet::Tags => "tags",
        Facet::Fields => "fields",
    }
    .hash(&mut hasher);

    for segment in path {
        match segment {
            Segment::Key(key) => key.hash(&mut hasher),
            Segment::Map(_) => return None,
        }
    }

    match op {
        Op::Eq(rhs) => hash_operand("==", rhs, &mut hasher),
        Op::Ne(rhs) => hash_operand("!=", rhs, &mut hasher),
        Op::Lt(rhs) => hash_operand("<", rhs, &mut hasher),
        Op::Le(rhs) => hash_operand("<=", rhs, &mut hasher),
        Op::Gt(rhs) => hash_operand(">", rhs, &mut hasher),
        Op::Ge(rhs) => hash_operand(">=", rhs, &mut hasher),
        Op::Exists => "exists".hash(&mut hasher),
        Op::Matches(re) => {
            "matches".hash(&mut hasher);
            re.as_str().hash(&mut hasher);
        }
        Op::Search(re) => {
            "search".hash(&mut hasher);
            re.as_str().hash(&mut hasher);
        }
        Op::Test(_) => return None,
        Op::Noop => "noop".hash(&mut hasher),
    }

    Some(hasher.finish())
}

fn hash_operand(op: &str, rhs: &Operand, hasher: &mut DefaultHasher) {
    op.hash(hasher);
    match rhs {
        Operand::Time(t) => {
            "t".hash(hasher);
            t.timestamp().hash(hasher);
            t.timestamp_subsec_nanos().hash(hasher);
        }
        Operand::Str(s) => {
            "s".hash(hasher);
            s.hash(hasher);
        }
        Operand::Num(Field::Integer(i)) => {
            "i".hash(hasher);
            i.hash(hasher);
        }
        Operand::Num(Field::Float(f)) => {
            "f".hash(hasher);
            f.to_bits().hash(hasher);
        }
        Operand::Null => "null".hash(hasher),
    }
}

// AND/OR are commutative in hash, children are ordered before mixing.
fn mix2(tag: &str, a: u64, b: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    tag.hash(&mut hasher);
    a.min(b).hash(&mut hasher);
    a.max(b).hash(&mut hasher);
    hasher.finish()
}

fn mix1(tag: &str, a: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    tag.hash(&mut hasher);
    a.hash(&mut hasher);
    hasher.finish()
}
