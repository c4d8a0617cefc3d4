//! Module implement the database coordinator.
//!
//! [Database] owns a storage backend and the in-memory index, and
//! keeps the two synchronized across insert, query, update and remove
//! operations. With `auto_index` enabled, the default, the index is
//! maintained incrementally while appends arrive in timestamp order,
//! invalidated on out-of-order appends, and rebuilt on
//! [Database::reindex] or as a side effect of remove/update
//! write-backs.
//!
//! Read operations plan against the index when it is usable. An empty
//! candidate set short-circuits, candidates spanning the whole store
//! add no selectivity and fall back to a linear scan, anything in
//! between zips a single storage iteration with the sorted candidate
//! list.

use chrono::{DateTime, Utc};
use log::debug;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use crate::{
    index::{Index, IndexResult},
    measurement::Measurement,
    point::{FieldSet, Point, TagSet},
    query::{MeasurementQuery, Query, Value},
    storage::{Config, CsvStorage, MemoryStorage, Storage},
    Error, Result,
};

/// Projection path for [Database::select], parsed from the dotted
/// forms `time`, `measurement`, `tags.<key>` and `fields.<key>`.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectKey {
    Time,
    Measurement,
    Tag(String),
    Field(String),
}

impl SelectKey {
    pub fn parse(key: &str) -> Result<SelectKey> {
        match key {
            "time" => Ok(SelectKey::Time),
            "measurement" => Ok(SelectKey::Measurement),
            _ => {
                if let Some(tag) = key.strip_prefix("tags.") {
                    if !tag.is_empty() {
                        return Ok(SelectKey::Tag(tag.to_string()));
                    }
                }
                if let Some(field) = key.strip_prefix("fields.") {
                    if !field.is_empty() {
                        return Ok(SelectKey::Field(field.to_string()));
                    }
                }
                err_at!(InvalidInput, msg: "invalid select path {:?}", key)
            }
        }
    }

    fn project(&self, point: &Point) -> Value {
        match self {
            SelectKey::Time => Value::Time(point.time),
            SelectKey::Measurement => Value::Str(point.measurement.clone()),
            SelectKey::Tag(key) => match point.tags.get(key) {
                Some(Some(value)) => Value::Str(value.clone()),
                _ => Value::None,
            },
            SelectKey::Field(key) => match point.fields.get(key) {
                Some(Some(value)) => Value::Num(*value),
                _ => Value::None,
            },
        }
    }
}

// per-facet update argument, a direct value or a callable.
#[derive(Clone)]
enum TimeUpdate {
    Set(DateTime<Utc>),
    Map(Arc<dyn Fn(DateTime<Utc>) -> DateTime<Utc> + Send + Sync>),
}

#[derive(Clone)]
enum MeasurementUpdate {
    Set(String),
    Map(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

#[derive(Clone)]
enum TagsUpdate {
    Merge(TagSet),
    Map(Arc<dyn Fn(&TagSet) -> TagSet + Send + Sync>),
}

#[derive(Clone)]
enum FieldsUpdate {
    Merge(FieldSet),
    Map(Arc<dyn Fn(&FieldSet) -> FieldSet + Send + Sync>),
}

/// Per-facet updates applied by [Database::update]. At least one facet
/// must be set. Tag and field updates merge into the existing maps,
/// callable outputs are validated before they are accepted.
#[derive(Clone, Default)]
pub struct Update {
    time: Option<TimeUpdate>,
    measurement: Option<MeasurementUpdate>,
    tags: Option<TagsUpdate>,
    fields: Option<FieldsUpdate>,
}

impl Update {
    pub fn new() -> Update {
        Update::default()
    }

    pub fn set_time(mut self, time: DateTime<Utc>) -> Update {
        self.time = Some(TimeUpdate::Set(time));
        self
    }

    pub fn map_time<F>(mut self, update: F) -> Update
    where
        F: Fn(DateTime<Utc>) -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.time = Some(TimeUpdate::Map(Arc::new(update)));
        self
    }

    pub fn set_measurement(mut self, name: &str) -> Update {
        self.measurement = Some(MeasurementUpdate::Set(name.to_string()));
        self
    }

    pub fn map_measurement<F>(mut self, update: F) -> Update
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.measurement = Some(MeasurementUpdate::Map(Arc::new(update)));
        self
    }

    pub fn set_tags(mut self, tags: TagSet) -> Update {
        self.tags = Some(TagsUpdate::Merge(tags));
        self
    }

    pub fn map_tags<F>(mut self, update: F) -> Update
    where
        F: Fn(&TagSet) -> TagSet + Send + Sync + 'static,
    {
        self.tags = Some(TagsUpdate::Map(Arc::new(update)));
        self
    }

    pub fn set_fields(mut self, fields: FieldSet) -> Update {
        self.fields = Some(FieldsUpdate::Merge(fields));
        self
    }

    pub fn map_fields<F>(mut self, update: F) -> Update
    where
        F: Fn(&FieldSet) -> FieldSet + Send + Sync + 'static,
    {
        self.fields = Some(FieldsUpdate::Map(Arc::new(update)));
        self
    }

    fn is_unset(&self) -> bool {
        self.time.is_none()
            && self.measurement.is_none()
            && self.tags.is_none()
            && self.fields.is_none()
    }

    // apply this update to a point, return (changed, time_changed).
    fn apply(&self, point: &mut Point) -> Result<(bool, bool)> {
        let old = point.clone();

        if let Some(update) = &self.time {
            point.time = match update {
                TimeUpdate::Set(time) => *time,
                TimeUpdate::Map(f) => f(point.time),
            };
        }
        if let Some(update) = &self.measurement {
            point.measurement = match update {
                MeasurementUpdate::Set(name) => name.clone(),
                MeasurementUpdate::Map(f) => f(&point.measurement),
            };
        }
        if let Some(update) = &self.tags {
            let tags = match update {
                TagsUpdate::Merge(tags) => tags.clone(),
                TagsUpdate::Map(f) => f(&point.tags),
            };
            for (key, value) in tags {
                point.tags.insert(key, value);
            }
        }
        if let Some(update) = &self.fields {
            let fields = match update {
                FieldsUpdate::Merge(fields) => fields.clone(),
                FieldsUpdate::Map(f) => f(&point.fields),
            };
            for (key, value) in fields {
                point.fields.insert(key, value);
            }
        }

        point.validate()?;

        Ok((*point != old, point.time != old.time))
    }
}

/// The database coordinator, owning one storage backend and one index
/// for a single logical dataset.
///
/// The storage handle is exclusively owned for the lifetime of this
/// value and closed exactly once, on [Database::close] or when the
/// value goes out of scope. Operations after close fail with a
/// [Closed][Error::Closed] error.
pub struct Database<S>
where
    S: Storage,
{
    storage: S,
    index: Index,
    auto_index: bool,
    open: bool,
}

impl Database<CsvStorage> {
    /// Open a database backed by a delimited text file.
    pub fn open(config: Config) -> Result<Database<CsvStorage>> {
        let auto_index = config.auto_index;
        let storage = CsvStorage::open(&config)?;
        Ok(Database::from_storage(storage, auto_index))
    }
}

impl Database<MemoryStorage> {
    /// Open a database backed by memory, with index maintenance
    /// enabled.
    pub fn memory() -> Database<MemoryStorage> {
        Database::from_storage(MemoryStorage::new(), true)
    }
}

impl<S> Database<S>
where
    S: Storage,
{
    /// Wrap a caller-supplied storage backend. The index starts with
    /// the validity the storage's sort state reports.
    pub fn from_storage(storage: S, auto_index: bool) -> Database<S> {
        let index = Index::new(storage.index_intact());
        Database {
            storage,
            index,
            auto_index,
            open: true,
        }
    }

    /// Whether on-line index maintenance is enabled.
    pub fn is_auto_index(&self) -> bool {
        self.auto_index
    }

    /// Whether the index is currently valid.
    pub fn is_index_valid(&self) -> bool {
        self.index.is_valid()
    }

    /// Close the database, releasing the storage handle. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.storage.close()?;
        }
        Ok(())
    }

    fn ok_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            err_at!(Closed, msg: "database is closed")
        }
    }
}

impl<S> Drop for Database<S>
where
    S: Storage,
{
    fn drop(&mut self) {
        self.close().ok();
    }
}

impl<S> fmt::Debug for Database<S>
where
    S: Storage,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> std::result::Result<(), fmt::Error> {
        write!(
            f,
            "Database<auto_index:{} index_valid:{} open:{}>",
            self.auto_index,
            self.index.is_valid(),
            self.open
        )
    }
}

// write path
impl<S> Database<S>
where
    S: Storage,
{
    /// Insert a point. Returns 1 on success.
    pub fn insert(&mut self, point: Point) -> Result<usize> {
        self.ok_open()?;
        self.storage.can_append()?;
        point.validate()?;
        self.append_batch(vec![point])?;
        Ok(1)
    }

    /// Insert points in a single append batch. A validation failure
    /// mid-iteration appends the already-collected prefix, invalidates
    /// the index and surfaces the error.
    pub fn insert_multiple<I>(&mut self, points: I) -> Result<usize>
    where
        I: IntoIterator<Item = Point>,
    {
        self.ok_open()?;
        self.storage.can_append()?;

        let mut batch = vec![];
        let mut failure = None;
        for point in points {
            match point.validate() {
                Ok(_) => batch.push(point),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let count = batch.len();
        if count > 0 {
            self.append_batch(batch)?;
        }

        match failure {
            Some(err) => {
                self.index.invalidate();
                Err(err)
            }
            None => Ok(count),
        }
    }

    pub(crate) fn insert_into(&mut self, name: &str, mut point: Point) -> Result<usize> {
        if point.measurement != name {
            point.measurement = name.to_string();
        }
        self.insert(point)
    }

    pub(crate) fn insert_multiple_into<I>(&mut self, name: &str, points: I) -> Result<usize>
    where
        I: IntoIterator<Item = Point>,
    {
        let points: Vec<Point> = points
            .into_iter()
            .map(|mut point| {
                if point.measurement != name {
                    point.measurement = name.to_string();
                }
                point
            })
            .collect();
        self.insert_multiple(points)
    }

    fn append_batch(&mut self, points: Vec<Point>) -> Result<()> {
        if let Err(err) = self.storage.append(&points) {
            // storage may hold a partial batch, never trust the index.
            self.index.invalidate();
            return Err(err);
        }

        if self.auto_index && self.index.is_valid() {
            if self.storage.index_intact() {
                self.index.insert(&points);
            } else {
                debug!(target: "tsdb", "out-of-order append, index invalidated");
                self.index.invalidate();
            }
        } else if !self.auto_index && self.index.is_valid() {
            self.index.invalidate();
        }

        Ok(())
    }
}

// read path
impl<S> Database<S>
where
    S: Storage,
{
    /// Number of points in the store.
    pub fn len(&mut self) -> Result<usize> {
        self.ok_open()?;
        if self.auto_index && self.index.is_valid() {
            Ok(self.index.len())
        } else {
            self.storage.len()
        }
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All points, in storage order.
    pub fn all(&mut self) -> Result<Vec<Point>> {
        self.ok_open()?;
        self.storage.read()
    }

    pub(crate) fn all_in(&mut self, name: &str) -> Result<Vec<Point>> {
        self.ok_open()?;
        let mut points = vec![];
        for item in self.storage.iter()? {
            if self.storage.item_measurement(&item)? == name {
                points.push(self.storage.item_to_point(&item)?);
            }
        }
        Ok(points)
    }

    pub(crate) fn len_in(&mut self, name: &str) -> Result<usize> {
        self.ok_open()?;
        if self.auto_index && self.index.is_valid() {
            return Ok(self.index.measurement_len(name));
        }
        let mut count = 0;
        for item in self.storage.iter()? {
            if self.storage.item_measurement(&item)? == name {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Whether any point matches `query`.
    pub fn contains(&mut self, query: &Query) -> Result<bool> {
        self.contains_in(query, None)
    }

    pub(crate) fn contains_in(&mut self, query: &Query, scope: Option<&str>) -> Result<bool> {
        self.ok_open()?;
        self.storage.can_read()?;

        if let Some(rst) = self.plan_query(query, scope) {
            if rst.is_empty() {
                return Ok(false);
            }
            if rst.is_complete() {
                return Ok(true);
            }
            if rst.len() < self.index.len() {
                let mut cand = rst.items().iter().copied();
                let mut next = cand.next();
                for (pos, item) in self.storage.iter()?.enumerate() {
                    match next {
                        Some(p) if p == pos => (),
                        Some(_) => continue,
                        None => break,
                    }
                    next = cand.next();
                    if query.eval(&self.storage.item_to_point(&item)?) {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            // candidates are the whole store, scan without the index.
        }

        for item in self.storage.iter()? {
            if let Some(name) = scope {
                if self.storage.item_measurement(&item)? != name {
                    continue;
                }
            }
            if query.eval(&self.storage.item_to_point(&item)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Count the points matching `query`.
    pub fn count(&mut self, query: &Query) -> Result<usize> {
        self.count_in(query, None)
    }

    pub(crate) fn count_in(&mut self, query: &Query, scope: Option<&str>) -> Result<usize> {
        self.ok_open()?;
        self.storage.can_read()?;

        if let Some(rst) = self.plan_query(query, scope) {
            if rst.is_empty() {
                return Ok(0);
            }
            if rst.is_complete() {
                return Ok(rst.len());
            }
            if rst.len() < self.index.len() {
                return Ok(self.take_candidates(&rst, query)?.len());
            }
        }

        let mut count = 0;
        for item in self.storage.iter()? {
            if let Some(name) = scope {
                if self.storage.item_measurement(&item)? != name {
                    continue;
                }
            }
            if query.eval(&self.storage.item_to_point(&item)?) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// First point matching `query`, in storage order.
    pub fn get(&mut self, query: &Query) -> Result<Option<Point>> {
        self.get_in(query, None)
    }

    pub(crate) fn get_in(&mut self, query: &Query, scope: Option<&str>) -> Result<Option<Point>> {
        self.ok_open()?;
        self.storage.can_read()?;

        if let Some(rst) = self.plan_query(query, scope) {
            if rst.is_empty() {
                return Ok(None);
            }
            if rst.len() < self.index.len() {
                let mut cand = rst.items().iter().copied();
                let mut next = cand.next();
                for (pos, item) in self.storage.iter()?.enumerate() {
                    match next {
                        Some(p) if p == pos => (),
                        Some(_) => continue,
                        None => break,
                    }
                    next = cand.next();
                    let point = self.storage.item_to_point(&item)?;
                    if rst.is_complete() || query.eval(&point) {
                        return Ok(Some(point));
                    }
                }
                return Ok(None);
            }
        }

        for item in self.storage.iter()? {
            if let Some(name) = scope {
                if self.storage.item_measurement(&item)? != name {
                    continue;
                }
            }
            let point = self.storage.item_to_point(&item)?;
            if query.eval(&point) {
                return Ok(Some(point));
            }
        }
        Ok(None)
    }

    /// All points matching `query`, in storage order.
    pub fn search(&mut self, query: &Query) -> Result<Vec<Point>> {
        self.search_in(query, None)
    }

    pub(crate) fn search_in(&mut self, query: &Query, scope: Option<&str>) -> Result<Vec<Point>> {
        self.ok_open()?;
        self.storage.can_read()?;

        if let Some(rst) = self.plan_query(query, scope) {
            if rst.is_empty() {
                return Ok(vec![]);
            }
            if rst.len() < self.index.len() {
                return self.take_candidates(&rst, query);
            }
        }

        let mut points = vec![];
        for item in self.storage.iter()? {
            if let Some(name) = scope {
                if self.storage.item_measurement(&item)? != name {
                    continue;
                }
            }
            let point = self.storage.item_to_point(&item)?;
            if query.eval(&point) {
                points.push(point);
            }
        }
        Ok(points)
    }

    /// Project `keys` out of every point matching `query`. Missing
    /// entries come back as [Value::None].
    pub fn select(&mut self, keys: &[&str], query: &Query) -> Result<Vec<Vec<Value>>> {
        self.select_in(keys, query, None)
    }

    pub(crate) fn select_in(
        &mut self,
        keys: &[&str],
        query: &Query,
        scope: Option<&str>,
    ) -> Result<Vec<Vec<Value>>> {
        let keys = keys
            .iter()
            .map(|key| SelectKey::parse(key))
            .collect::<Result<Vec<SelectKey>>>()?;

        let points = self.search_in(query, scope)?;
        let rows = points
            .iter()
            .map(|point| keys.iter().map(|key| key.project(point)).collect())
            .collect();

        Ok(rows)
    }

    /// Names of all measurements in the store.
    pub fn measurements(&mut self) -> Result<BTreeSet<String>> {
        self.ok_open()?;
        if self.auto_index && self.index.is_valid() {
            return Ok(self.index.measurement_names());
        }
        let mut names = BTreeSet::new();
        for item in self.storage.iter()? {
            names.insert(self.storage.item_measurement(&item)?);
        }
        Ok(names)
    }

    /// Sorted tag keys in the store.
    pub fn show_tag_keys(&mut self) -> Result<Vec<String>> {
        self.show_tag_keys_in(None)
    }

    pub(crate) fn show_tag_keys_in(&mut self, scope: Option<&str>) -> Result<Vec<String>> {
        self.ok_open()?;
        if scope.is_none() && self.auto_index && self.index.is_valid() {
            return Ok(self.index.tag_keys());
        }
        let mut keys = BTreeSet::new();
        for point in self.scan_points(scope)? {
            keys.extend(point.tags.keys().cloned());
        }
        Ok(keys.into_iter().collect())
    }

    /// Sorted tag values per key, null values first. An empty filter
    /// lists every key.
    pub fn show_tag_values(
        &mut self,
        keys: &[&str],
    ) -> Result<BTreeMap<String, Vec<Option<String>>>> {
        self.show_tag_values_in(keys, None)
    }

    pub(crate) fn show_tag_values_in(
        &mut self,
        keys: &[&str],
        scope: Option<&str>,
    ) -> Result<BTreeMap<String, Vec<Option<String>>>> {
        self.ok_open()?;
        if scope.is_none() && self.auto_index && self.index.is_valid() {
            return Ok(self.index.tag_values(keys));
        }
        let mut acc: BTreeMap<String, BTreeSet<Option<String>>> = BTreeMap::new();
        for point in self.scan_points(scope)? {
            for (key, value) in point.tags.iter() {
                if keys.is_empty() || keys.contains(&key.as_str()) {
                    acc.entry(key.clone()).or_insert_with(BTreeSet::new).insert(value.clone());
                }
            }
        }
        Ok(acc
            .into_iter()
            .map(|(key, values)| (key, values.into_iter().collect()))
            .collect())
    }

    /// Sorted field keys in the store.
    pub fn show_field_keys(&mut self) -> Result<Vec<String>> {
        self.show_field_keys_in(None)
    }

    pub(crate) fn show_field_keys_in(&mut self, scope: Option<&str>) -> Result<Vec<String>> {
        self.ok_open()?;
        if scope.is_none() && self.auto_index && self.index.is_valid() {
            return Ok(self.index.field_keys());
        }
        let mut keys = BTreeSet::new();
        for point in self.scan_points(scope)? {
            keys.extend(point.fields.keys().cloned());
        }
        Ok(keys.into_iter().collect())
    }

    // plan a query against the index, None when the index must not be
    // consulted. Measurement scopes are folded in as an equality leaf.
    fn plan_query(&mut self, query: &Query, scope: Option<&str>) -> Option<IndexResult> {
        if !self.auto_index || !self.index.is_valid() {
            return None;
        }
        let rst = match scope {
            Some(name) => {
                let scoped = MeasurementQuery::eq(name) & query.clone();
                self.index.search(&scoped)
            }
            None => self.index.search(query),
        };
        Some(rst)
    }

    // zip a linear storage iteration with the sorted candidate list.
    fn take_candidates(&mut self, rst: &IndexResult, query: &Query) -> Result<Vec<Point>> {
        let mut points = vec![];
        let mut cand = rst.items().iter().copied();
        let mut next = cand.next();
        for (pos, item) in self.storage.iter()?.enumerate() {
            match next {
                Some(p) if p == pos => (),
                Some(_) => continue,
                None => break,
            }
            next = cand.next();
            let point = self.storage.item_to_point(&item)?;
            if rst.is_complete() || query.eval(&point) {
                points.push(point);
            }
        }
        Ok(points)
    }

    fn scan_points(&mut self, scope: Option<&str>) -> Result<Vec<Point>> {
        let mut points = vec![];
        for item in self.storage.iter()? {
            if let Some(name) = scope {
                if self.storage.item_measurement(&item)? != name {
                    continue;
                }
            }
            points.push(self.storage.item_to_point(&item)?);
        }
        Ok(points)
    }
}

// mutation path
impl<S> Database<S>
where
    S: Storage,
{
    /// Remove the points matching `query`, returning how many were
    /// removed. Finding no matches is a no-op, not an error.
    pub fn remove(&mut self, query: &Query) -> Result<usize> {
        self.remove_in(query, None)
    }

    pub(crate) fn remove_in(&mut self, query: &Query, scope: Option<&str>) -> Result<usize> {
        self.ok_open()?;
        self.storage.can_write()?;

        let rst = self.plan_query(query, scope);
        if let Some(rst) = &rst {
            if rst.is_empty() {
                return Ok(0);
            }
        }
        let use_index = rst.as_ref().map_or(false, |rst| rst.len() < self.index.len());

        let mut removed: BTreeSet<usize> = BTreeSet::new();
        let mut retained: Vec<S::Item> = vec![];
        let mut renumber: HashMap<usize, usize> = HashMap::new();

        if use_index {
            let rst = rst.unwrap();
            let mut cand = rst.items().iter().copied();
            let mut next = cand.next();
            for (pos, item) in self.storage.iter()?.enumerate() {
                let hit = match next {
                    Some(p) if p == pos => {
                        next = cand.next();
                        rst.is_complete() || query.eval(&self.storage.item_to_point(&item)?)
                    }
                    _ => false,
                };
                if hit {
                    removed.insert(pos);
                } else {
                    renumber.insert(pos, retained.len());
                    retained.push(item);
                }
            }
        } else {
            for (pos, item) in self.storage.iter()?.enumerate() {
                let scoped_out = match scope {
                    Some(name) => self.storage.item_measurement(&item)? != name,
                    None => false,
                };
                if !scoped_out && query.eval(&self.storage.item_to_point(&item)?) {
                    removed.insert(pos);
                } else {
                    renumber.insert(pos, retained.len());
                    retained.push(item);
                }
            }
        }

        if removed.is_empty() {
            return Ok(0);
        }
        if retained.is_empty() {
            self.reset_all()?;
            return Ok(removed.len());
        }

        if self.auto_index && !self.index.is_valid() {
            let retained = self.sort_items(retained)?;
            self.storage.write(retained, true)?;
            self.rebuild_index()?;
        } else {
            let sorted = self.auto_index && self.index.is_valid();
            self.storage.write(retained, sorted)?;
            if sorted {
                self.index.remove(&removed);
                self.index.renumber(&renumber);
            }
        }

        debug!(target: "tsdb", "removed {} points", removed.len());
        Ok(removed.len())
    }

    /// Remove every point. Idempotent.
    pub fn remove_all(&mut self) -> Result<()> {
        self.ok_open()?;
        self.storage.can_write()?;
        self.reset_all()
    }

    /// Remove every point belonging to measurement `name`, returning
    /// how many were removed.
    pub fn drop_measurement(&mut self, name: &str) -> Result<usize> {
        self.remove_in(&MeasurementQuery::eq(name), Some(name))
    }

    /// Remove every measurement, emptying the store.
    pub fn drop_measurements(&mut self) -> Result<()> {
        self.remove_all()
    }

    /// Update the points matching `query` with per-facet updates,
    /// returning how many changed. Updates that change nothing leave
    /// storage untouched.
    pub fn update(&mut self, query: &Query, update: Update) -> Result<usize> {
        self.update_in(Some(query), update, None)
    }

    /// Update every point in the store.
    pub fn update_all(&mut self, update: Update) -> Result<usize> {
        self.update_in(None, update, None)
    }

    pub(crate) fn update_in(
        &mut self,
        query: Option<&Query>,
        update: Update,
        scope: Option<&str>,
    ) -> Result<usize> {
        self.ok_open()?;
        self.storage.can_write()?;
        if update.is_unset() {
            err_at!(InvalidInput, msg: "update must set time, measurement, tags or fields")?
        }

        let rst = match query {
            Some(query) => self.plan_query(query, scope),
            None => None,
        };
        if let Some(rst) = &rst {
            if rst.is_empty() {
                return Ok(0);
            }
        }
        let use_index = rst.as_ref().map_or(false, |rst| rst.len() < self.index.len());

        let mut retained: Vec<S::Item> = vec![];
        let mut replaced: Vec<(usize, Point)> = vec![];
        let mut count = 0;
        let mut time_changed = false;

        if use_index {
            let rst = rst.unwrap();
            let mut cand = rst.items().iter().copied();
            let mut next = cand.next();
            for (pos, item) in self.storage.iter()?.enumerate() {
                let hit = match next {
                    Some(p) if p == pos => {
                        next = cand.next();
                        true
                    }
                    _ => false,
                };
                if !hit {
                    retained.push(item);
                    continue;
                }
                let mut point = self.storage.item_to_point(&item)?;
                let matched = rst.is_complete() || query.map_or(true, |q| q.eval(&point));
                if !matched {
                    retained.push(item);
                    continue;
                }
                let (changed, moved) = update.apply(&mut point)?;
                if changed {
                    count += 1;
                    time_changed = time_changed || moved;
                    replaced.push((pos, point.clone()));
                    retained.push(self.storage.serialize_point(&point));
                } else {
                    retained.push(item);
                }
            }
        } else {
            for (pos, item) in self.storage.iter()?.enumerate() {
                let scoped_out = match scope {
                    Some(name) => self.storage.item_measurement(&item)? != name,
                    None => false,
                };
                if scoped_out {
                    retained.push(item);
                    continue;
                }
                let mut point = self.storage.item_to_point(&item)?;
                let matched = query.map_or(true, |q| q.eval(&point));
                if !matched {
                    retained.push(item);
                    continue;
                }
                let (changed, moved) = update.apply(&mut point)?;
                if changed {
                    count += 1;
                    time_changed = time_changed || moved;
                    replaced.push((pos, point.clone()));
                    retained.push(self.storage.serialize_point(&point));
                } else {
                    retained.push(item);
                }
            }
        }

        if count == 0 {
            return Ok(0);
        }

        if self.auto_index && (time_changed || !self.index.is_valid()) {
            // timestamps moved or the index was stale, sort and rebuild.
            let retained = self.sort_items(retained)?;
            self.storage.write(retained, true)?;
            self.rebuild_index()?;
        } else {
            let sorted = self.auto_index && self.index.is_valid();
            self.storage.write(retained, sorted)?;
            if sorted {
                for (pos, point) in replaced.iter() {
                    self.index.replace(*pos, point);
                }
            }
        }

        debug!(target: "tsdb", "updated {} points", count);
        Ok(count)
    }

    /// Rebuild the index. A valid index is left untouched. Otherwise
    /// storage is sorted by timestamp when needed, and the index is
    /// rebuilt in one pass.
    pub fn reindex(&mut self) -> Result<()> {
        self.ok_open()?;
        if self.index.is_valid() {
            debug!(target: "tsdb", "index already valid");
            return Ok(());
        }
        self.storage.can_read()?;

        if !self.storage.is_sorted()? {
            self.storage.can_write()?;
            let items = self.storage.iter()?.collect::<Vec<S::Item>>();
            let items = self.sort_items(items)?;
            self.storage.write(items, true)?;
        }
        self.rebuild_index()
    }

    /// Borrow a measurement façade, a named-subset view over this
    /// database.
    pub fn measurement<'a>(&'a mut self, name: &str) -> Measurement<'a, S> {
        Measurement::new(name, self)
    }

    fn reset_all(&mut self) -> Result<()> {
        self.storage.reset()?;
        self.index.reset();
        Ok(())
    }

    fn rebuild_index(&mut self) -> Result<()> {
        let points = self.storage.read()?;
        self.index.build(&points);
        debug!(target: "tsdb", "index rebuilt over {} points", points.len());
        Ok(())
    }

    fn sort_items(&mut self, items: Vec<S::Item>) -> Result<Vec<S::Item>> {
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            keyed.push((self.storage.item_timestamp(&item)?, item));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }
}

#[cfg(test)]
#[path = "db_test.rs"]
mod db_test;
