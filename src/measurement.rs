//! Module implement the measurement façade.
//!
//! A measurement is a named subset of points, analogous to a table. The
//! façade borrows the database and delegates every operation to the
//! coordinator with a measurement scope, it holds no storage or index
//! state of its own.

use std::collections::BTreeMap;

use crate::{
    db::{Database, Update},
    point::Point,
    query::{Query, Value},
    storage::Storage,
    Result,
};

/// Named-subset view over a [Database]. Built on demand via
/// [Database::measurement].
pub struct Measurement<'a, S>
where
    S: Storage,
{
    name: String,
    db: &'a mut Database<S>,
}

impl<'a, S> Measurement<'a, S>
where
    S: Storage,
{
    pub(crate) fn new(name: &str, db: &'a mut Database<S>) -> Measurement<'a, S> {
        Measurement {
            name: name.to_string(),
            db,
        }
    }

    /// Name of this measurement.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of points in this measurement.
    pub fn len(&mut self) -> Result<usize> {
        self.db.len_in(&self.name)
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All points in this measurement, in storage order.
    pub fn all(&mut self) -> Result<Vec<Point>> {
        self.db.all_in(&self.name)
    }

    /// Whether any point in this measurement matches `query`.
    pub fn contains(&mut self, query: &Query) -> Result<bool> {
        self.db.contains_in(query, Some(&self.name))
    }

    /// Count the points in this measurement matching `query`.
    pub fn count(&mut self, query: &Query) -> Result<usize> {
        self.db.count_in(query, Some(&self.name))
    }

    /// First point in this measurement matching `query`.
    pub fn get(&mut self, query: &Query) -> Result<Option<Point>> {
        self.db.get_in(query, Some(&self.name))
    }

    /// All points in this measurement matching `query`.
    pub fn search(&mut self, query: &Query) -> Result<Vec<Point>> {
        self.db.search_in(query, Some(&self.name))
    }

    /// Project `keys` out of the matching points of this measurement.
    pub fn select(&mut self, keys: &[&str], query: &Query) -> Result<Vec<Vec<Value>>> {
        self.db.select_in(keys, query, Some(&self.name))
    }

    /// Insert a point into this measurement. A point carrying a
    /// different measurement name is rewritten to this one.
    pub fn insert(&mut self, point: Point) -> Result<usize> {
        self.db.insert_into(&self.name, point)
    }

    /// Insert points into this measurement, rewriting their
    /// measurement names to this one.
    pub fn insert_multiple<I>(&mut self, points: I) -> Result<usize>
    where
        I: IntoIterator<Item = Point>,
    {
        self.db.insert_multiple_into(&self.name, points)
    }

    /// Update the points of this measurement matching `query`.
    pub fn update(&mut self, query: &Query, update: Update) -> Result<usize> {
        self.db.update_in(Some(query), update, Some(&self.name))
    }

    /// Update every point of this measurement.
    pub fn update_all(&mut self, update: Update) -> Result<usize> {
        self.db.update_in(None, update, Some(&self.name))
    }

    /// Remove the points of this measurement matching `query`.
    pub fn remove(&mut self, query: &Query) -> Result<usize> {
        self.db.remove_in(query, Some(&self.name))
    }

    /// Remove every point of this measurement.
    pub fn remove_all(&mut self) -> Result<usize> {
        self.db.drop_measurement(&self.name)
    }

    /// Sorted tag keys used by this measurement.
    pub fn show_tag_keys(&mut self) -> Result<Vec<String>> {
        self.db.show_tag_keys_in(Some(&self.name))
    }

    /// Sorted tag values per key used by this measurement.
    pub fn show_tag_values(
        &mut self,
        keys: &[&str],
    ) -> Result<BTreeMap<String, Vec<Option<String>>>> {
        self.db.show_tag_values_in(keys, Some(&self.name))
    }

    /// Sorted field keys used by this measurement.
    pub fn show_field_keys(&mut self) -> Result<Vec<String>> {
        self.db.show_field_keys_in(Some(&self.name))
    }
}

#[cfg(test)]
#[path = "measurement_test.rs"]
mod measurement_test;
