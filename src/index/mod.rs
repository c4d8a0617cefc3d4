//! Module implement the in-memory secondary index.
//!
//! The index mirrors the storage sequence by integer position. It
//! keeps the timestamps in storage order, an inverted map from
//! measurement name to positions, a two-level inverted map from tag
//! key and value to positions, and per field key the `(position,
//! value)` pairs in storage order.
//!
//! The index carries a validity flag. While invalid no operation may
//! consult it, the coordinator falls back to storage scans and
//! rebuilds the index on [Database::reindex].
//!
//! [Database::reindex]: crate::Database::reindex

use chrono::{DateTime, Utc};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    point::{Field, Point},
    query::{Facet, Leaf, Op, Operand, Query, Value},
    util,
};

/// Secondary index over the storage sequence, synchronized by integer
/// position.
pub struct Index {
    valid: bool,
    timestamps: Vec<DateTime<Utc>>,
    measurements: BTreeMap<String, Vec<usize>>,
    tags: BTreeMap<String, BTreeMap<Option<String>, Vec<usize>>>,
    fields: BTreeMap<String, Vec<(usize, Option<Field>)>>,
    cache: HashMap<u64, IndexResult>,
}

/// Outcome of planning a query against the index.
///
/// `items` is the sorted set of candidate positions. When `complete`,
/// the index alone decided the query and candidates need no further
/// evaluation, otherwise each candidate still requires the query to be
/// applied to the materialized point.
#[derive(Clone, Debug)]
pub struct IndexResult {
    items: Vec<usize>,
    complete: bool,
}

impl IndexResult {
    pub fn items(&self) -> &[usize] {
        &self.items
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// Planner intermediate. `All` means the subtree could not be decided
// from the index, candidates are the whole universe and per-point
// evaluation is required.
enum Cand {
    Pos(Vec<usize>),
    All,
}

struct Plan {
    cand: Cand,
    complete: bool,
}

impl Plan {
    fn pos(items: Vec<usize>, complete: bool) -> Plan {
        Plan {
            cand: Cand::Pos(items),
            complete,
        }
    }

    fn all() -> Plan {
        Plan {
            cand: Cand::All,
            complete: false,
        }
    }
}

impl Index {
    /// Create an empty index. Initial validity comes from the
    /// storage's sort state.
    pub fn new(valid: bool) -> Index {
        Index {
            valid,
            timestamps: Vec::new(),
            measurements: BTreeMap::new(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Number of positions indexed.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Whether the index may be consulted.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the index unusable. It stays so until rebuilt.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.cache.clear();
    }

    /// Drop all entries, leaving an empty, valid index.
    pub fn reset(&mut self) {
        self.timestamps.clear();
        self.measurements.clear();
        self.tags.clear();
        self.fields.clear();
        self.cache.clear();
        self.valid = true;
    }

    /// Build the index from the full list of points, in storage order.
    pub fn build(&mut self, points: &[Point]) {
        self.reset();
        for point in points {
            let pos = self.timestamps.len();
            self.timestamps.push(point.time);
            self.link(pos, point);
        }
    }

    /// Append points to the index incrementally. Only called while the
    /// index is valid and the storage tracker confirmed the appends
    /// are in timestamp order.
    pub fn insert(&mut self, points: &[Point]) {
        for point in points {
            let pos = self.timestamps.len();
            self.timestamps.push(point.time);
            self.link(pos, point);
        }
        self.cache.clear();
    }

    fn link(&mut self, pos: usize, point: &Point) {
        self.measurements
            .entry(point.measurement.clone())
            .or_insert_with(Vec::new)
            .push(pos);
        for (key, value) in point.tags.iter() {
            self.tags
                .entry(key.clone())
                .or_insert_with(BTreeMap::new)
                .entry(value.clone())
                .or_insert_with(Vec::new)
                .push(pos);
        }
        for (key, value) in point.fields.iter() {
            self.fields
                .entry(key.clone())
                .or_insert_with(Vec::new)
                .push((pos, *value));
        }
    }

    /// Delete `positions` from all inverted maps. Remaining positions
    /// keep their old numbering, follow up with [Index::renumber].
    pub fn remove(&mut self, positions: &BTreeSet<usize>) {
        let timestamps = std::mem::take(&mut self.timestamps);
        self.timestamps = timestamps
            .into_iter()
            .enumerate()
            .filter(|(pos, _)| !positions.contains(pos))
            .map(|(_, t)| t)
            .collect();

        self.unlink(positions);
        self.cache.clear();
    }

    // drop `positions` from the inverted maps, empty entries included.
    fn unlink(&mut self, positions: &BTreeSet<usize>) {
        let mut dead = vec![];
        for (name, posns) in self.measurements.iter_mut() {
            posns.retain(|pos| !positions.contains(pos));
            if posns.is_empty() {
                dead.push(name.clone());
            }
        }
        for name in dead {
            self.measurements.remove(&name);
        }

        let mut dead_keys = vec![];
        for (key, values) in self.tags.iter_mut() {
            let mut dead_values = vec![];
            for (value, posns) in values.iter_mut() {
                posns.retain(|pos| !positions.contains(pos));
                if posns.is_empty() {
                    dead_values.push(value.clone());
                }
            }
            for value in dead_values {
                values.remove(&value);
            }
            if values.is_empty() {
                dead_keys.push(key.clone());
            }
        }
        for key in dead_keys {
            self.tags.remove(&key);
        }

        let mut dead = vec![];
        for (key, pairs) in self.fields.iter_mut() {
            pairs.retain(|(pos, _)| !positions.contains(pos));
            if pairs.is_empty() {
                dead.push(key.clone());
            }
        }
        for key in dead {
            self.fields.remove(&key);
        }
    }

    /// Apply an old-position to new-position mapping to all inverted
    /// maps. The mapping must be monotonic, so position lists stay
    /// sorted.
    pub fn renumber(&mut self, updated: &HashMap<usize, usize>) {
        for posns in self.measurements.values_mut() {
            for pos in posns.iter_mut() {
                if let Some(new_pos) = updated.get(pos) {
                    *pos = *new_pos;
                }
            }
        }
        for values in self.tags.values_mut() {
            for posns in values.values_mut() {
                for pos in posns.iter_mut() {
                    if let Some(new_pos) = updated.get(pos) {
                        *pos = *new_pos;
                    }
                }
            }
        }
        for pairs in self.fields.values_mut() {
            for (pos, _) in pairs.iter_mut() {
                if let Some(new_pos) = updated.get(pos) {
                    *pos = *new_pos;
                }
            }
        }
        self.cache.clear();
    }

    /// Re-link position `pos` against a replacement point whose
    /// timestamp is unchanged. Used by in-place updates.
    pub fn replace(&mut self, pos: usize, point: &Point) {
        let mut gone = BTreeSet::new();
        gone.insert(pos);
        self.unlink(&gone);

        self.timestamps[pos] = point.time;
        util::insert_pos(
            self.measurements
                .entry(point.measurement.clone())
                .or_insert_with(Vec::new),
            pos,
        );
        for (key, value) in point.tags.iter() {
            let posns = self
                .tags
                .entry(key.clone())
                .or_insert_with(BTreeMap::new)
                .entry(value.clone())
                .or_insert_with(Vec::new);
            util::insert_pos(posns, pos);
        }
        for (key, value) in point.fields.iter() {
            let pairs = self.fields.entry(key.clone()).or_insert_with(Vec::new);
            let off = match pairs.binary_search_by(|(p, _)| p.cmp(&pos)) {
                Ok(off) => off,
                Err(off) => off,
            };
            pairs.insert(off, (pos, *value));
        }

        self.cache.clear();
    }

    /// Names of all measurements currently indexed.
    pub fn measurement_names(&self) -> BTreeSet<String> {
        self.measurements.keys().cloned().collect()
    }

    /// Number of positions under measurement `name`.
    pub fn measurement_len(&self, name: &str) -> usize {
        self.measurements.get(name).map_or(0, |posns| posns.len())
    }

    /// All tag keys currently indexed, sorted.
    pub fn tag_keys(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    /// Tag values per key, sorted, null values first. An empty filter
    /// lists every key.
    pub fn tag_values(&self, keys: &[&str]) -> BTreeMap<String, Vec<Option<String>>> {
        let mut acc = BTreeMap::new();
        for (key, values) in self.tags.iter() {
            if keys.is_empty() || keys.contains(&key.as_str()) {
                acc.insert(key.clone(), values.keys().cloned().collect());
            }
        }
        acc
    }

    /// All field keys currently indexed, sorted.
    pub fn field_keys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }
}

impl Index {
    /// Plan `query` against the index, returning the candidate
    /// positions. Must not be called while the index is invalid.
    pub fn search(&mut self, query: &Query) -> IndexResult {
        debug_assert!(self.valid, "search on invalid index");

        let hash = query.hash_value();
        if let Some(hash) = hash {
            if let Some(result) = self.cache.get(&hash) {
                return result.clone();
            }
        }

        let plan = self.plan(query);
        let result = match plan.cand {
            Cand::Pos(items) => IndexResult {
                items,
                complete: plan.complete,
            },
            Cand::All => IndexResult {
                items: (0..self.len()).collect(),
                complete: false,
            },
        };

        if let Some(hash) = hash {
            self.cache.insert(hash, result.clone());
        }

        result
    }

    fn plan(&self, query: &Query) -> Plan {
        match query {
            Query::Leaf(leaf) => self.plan_leaf(leaf),
            Query::And(a, b) => {
                let (pa, pb) = (self.plan(a), self.plan(b));
                let complete = pa.complete && pb.complete;
                match (pa.cand, pb.cand) {
                    (Cand::Pos(xs), Cand::Pos(ys)) => {
                        Plan::pos(util::intersect(&xs, &ys), complete)
                    }
                    // an undecided side means candidates still need
                    // the full query applied.
                    (Cand::Pos(xs), Cand::All) | (Cand::All, Cand::Pos(xs)) => {
                        Plan::pos(xs, false)
                    }
                    (Cand::All, Cand::All) => Plan::all(),
                }
            }
            Query::Or(a, b) => {
                let (pa, pb) = (self.plan(a), self.plan(b));
                let complete = pa.complete && pb.complete;
                match (pa.cand, pb.cand) {
                    (Cand::Pos(xs), Cand::Pos(ys)) => Plan::pos(util::union(&xs, &ys), complete),
                    _ => Plan::all(),
                }
            }
            Query::Not(child) => {
                let plan = self.plan(child);
                match plan.cand {
                    // complementing a superset would drop rows, only a
                    // decided child can be inverted.
                    Cand::Pos(xs) if plan.complete => {
                        Plan::pos(util::complement(&xs, self.len()), true)
                    }
                    _ => Plan::all(),
                }
            }
        }
    }

    fn plan_leaf(&self, leaf: &Leaf) -> Plan {
        if let Op::Noop = leaf.op() {
            return Plan::pos((0..self.len()).collect(), true);
        }
        match leaf.facet() {
            Facet::Time => self.plan_time(leaf),
            Facet::Measurement => self.plan_measurement(leaf),
            Facet::Tags => self.plan_tags(leaf),
            Facet::Fields => self.plan_fields(leaf),
        }
    }

    // Timestamps are sorted while the index is valid, and position
    // equals offset, so range operators reduce to binary search.
    fn plan_time(&self, leaf: &Leaf) -> Plan {
        let n = self.timestamps.len();
        match leaf.op() {
            Op::Eq(Operand::Time(t)) => {
                let lo = util::lower_bound(&self.timestamps, t);
                let hi = util::upper_bound(&self.timestamps, t);
                Plan::pos((lo..hi).collect(), true)
            }
            Op::Ne(Operand::Time(t)) => {
                let lo = util::lower_bound(&self.timestamps, t);
                let hi = util::upper_bound(&self.timestamps, t);
                Plan::pos((0..lo).chain(hi..n).collect(), true)
            }
            Op::Lt(Operand::Time(t)) => {
                Plan::pos((0..util::lower_bound(&self.timestamps, t)).collect(), true)
            }
            Op::Le(Operand::Time(t)) => {
                Plan::pos((0..util::upper_bound(&self.timestamps, t)).collect(), true)
            }
            Op::Gt(Operand::Time(t)) => {
                Plan::pos((util::upper_bound(&self.timestamps, t)..n).collect(), true)
            }
            Op::Ge(Operand::Time(t)) => {
                Plan::pos((util::lower_bound(&self.timestamps, t)..n).collect(), true)
            }
            Op::Test(_) => {
                let items = self
                    .timestamps
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| leaf.matches_value(&Value::Time(**t)))
                    .map(|(pos, _)| pos)
                    .collect();
                Plan::pos(items, true)
            }
            _ => Plan::all(),
        }
    }

    fn plan_measurement(&self, leaf: &Leaf) -> Plan {
        match leaf.op() {
            Op::Eq(Operand::Str(name)) => {
                let items = self.measurements.get(name).cloned().unwrap_or_default();
                Plan::pos(items, true)
            }
            Op::Ne(Operand::Str(name)) => {
                let items = self.measurements.get(name).cloned().unwrap_or_default();
                Plan::pos(util::complement(&items, self.len()), true)
            }
            // remaining operators evaluate against the stored names.
            _ => {
                let mut items = vec![];
                for (name, posns) in self.measurements.iter() {
                    if leaf.matches_value(&Value::Str(name.clone())) {
                        items = util::union(&items, posns);
                    }
                }
                Plan::pos(items, true)
            }
        }
    }

    fn plan_tags(&self, leaf: &Leaf) -> Plan {
        let key = match leaf.single_key() {
            Some(key) => key,
            // a transform or a deeper path cannot be decided here,
            // candidates are the positions carrying the leading key.
            None => {
                return match leaf.first_key() {
                    Some(key) => Plan::pos(self.tag_positions(key), false),
                    None => Plan::all(),
                };
            }
        };

        let values = match self.tags.get(key) {
            Some(values) => values,
            None => return Plan::pos(vec![], true),
        };

        match leaf.op() {
            Op::Eq(Operand::Str(rhs)) => {
                let items = values.get(&Some(rhs.clone())).cloned().unwrap_or_default();
                Plan::pos(items, true)
            }
            Op::Eq(Operand::Null) => {
                let items = values.get(&None).cloned().unwrap_or_default();
                Plan::pos(items, true)
            }
            // remaining operators, inequality included, evaluate
            // against the stored values. Points without the key are
            // never candidates, matching the evaluation rule that a
            // missing path never matches.
            _ => {
                let mut items = vec![];
                for (value, posns) in values.iter() {
                    let value = match value {
                        Some(s) => Value::Str(s.clone()),
                        None => Value::None,
                    };
                    if leaf.matches_value(&value) {
                        items = util::union(&items, posns);
                    }
                }
                Plan::pos(items, true)
            }
        }
    }

    fn plan_fields(&self, leaf: &Leaf) -> Plan {
        let key = match leaf.single_key() {
            Some(key) => key,
            None => {
                return match leaf.first_key() {
                    Some(key) => Plan::pos(self.field_positions(key), false),
                    None => Plan::all(),
                };
            }
        };

        let pairs = match self.fields.get(key) {
            Some(pairs) => pairs,
            None => return Plan::pos(vec![], true),
        };

        match leaf.op() {
            // user predicates still see the materialized point.
            Op::Test(_) => Plan::pos(pairs.iter().map(|(pos, _)| *pos).collect(), false),
            Op::Exists => Plan::pos(pairs.iter().map(|(pos, _)| *pos).collect(), true),
            _ => {
                let items = pairs
                    .iter()
                    .filter(|(_, value)| {
                        let value = match value {
                            Some(num) => Value::Num(*num),
                            None => Value::None,
                        };
                        leaf.matches_value(&value)
                    })
                    .map(|(pos, _)| *pos)
                    .collect();
                Plan::pos(items, true)
            }
        }
    }

    // union of all positions carrying tag `key`.
    fn tag_positions(&self, key: &str) -> Vec<usize> {
        let mut items = vec![];
        if let Some(values) = self.tags.get(key) {
            for posns in values.values() {
                items = util::union(&items, posns);
            }
        }
        items
    }

    fn field_positions(&self, key: &str) -> Vec<usize> {
        match self.fields.get(key) {
            Some(pairs) => pairs.iter().map(|(pos, _)| *pos).collect(),
            None => vec![],
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
