//! Module implement the in-memory storage backend.

use chrono::{DateTime, Utc};

use std::vec;

use crate::{point::Point, storage::Storage, Result};

/// In-memory storage, a vector of points. Data lives and dies with
/// the process. Never blocks, allows every access mode.
pub struct MemoryStorage {
    memory: Vec<Point>,
    index_intact: bool,
    latest_time: Option<DateTime<Utc>>,
}

impl Default for MemoryStorage {
    fn default() -> MemoryStorage {
        MemoryStorage::new()
    }
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage {
            memory: Vec::new(),
            index_intact: true,
            latest_time: None,
        }
    }

    fn track(&mut self, time: DateTime<Utc>) {
        if self.index_intact {
            match self.latest_time {
                Some(latest) if time < latest => {
                    self.index_intact = false;
                    self.latest_time = None;
                }
                _ => self.latest_time = Some(time),
            }
        }
    }
}

impl Storage for MemoryStorage {
    type Item = Point;

    fn append(&mut self, points: &[Point]) -> Result<()> {
        for point in points {
            self.track(point.time);
            self.memory.push(point.clone());
        }
        Ok(())
    }

    fn iter(&mut self) -> Result<vec::IntoIter<Point>> {
        Ok(self.memory.clone().into_iter())
    }

    fn read(&mut self) -> Result<Vec<Point>> {
        Ok(self.memory.clone())
    }

    fn write(&mut self, items: Vec<Point>, is_sorted: bool) -> Result<()> {
        self.memory = items;
        if is_sorted {
            self.index_intact = true;
            self.latest_time = self.memory.last().map(|point| point.time);
        } else {
            self.index_intact = false;
            self.latest_time = None;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.memory.clear();
        self.index_intact = true;
        self.latest_time = None;
        Ok(())
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.memory.len())
    }

    fn is_sorted(&mut self) -> Result<bool> {
        let mut latest: Option<DateTime<Utc>> = None;
        for point in self.memory.iter() {
            match latest {
                Some(l) if point.time < l => {
                    self.index_intact = false;
                    self.latest_time = None;
                    return Ok(false);
                }
                _ => latest = Some(point.time),
            }
        }
        self.index_intact = true;
        self.latest_time = latest;
        Ok(true)
    }

    fn index_intact(&self) -> bool {
        self.index_intact
    }

    fn latest_time(&self) -> Option<DateTime<Utc>> {
        self.latest_time
    }

    fn serialize_point(&self, point: &Point) -> Point {
        point.clone()
    }

    fn item_to_point(&self, item: &Point) -> Result<Point> {
        Ok(item.clone())
    }

    fn item_measurement(&self, item: &Point) -> Result<String> {
        Ok(item.measurement.clone())
    }

    fn item_timestamp(&self, item: &Point) -> Result<DateTime<Utc>> {
        Ok(item.time)
    }

    fn can_read(&self) -> Result<()> {
        Ok(())
    }

    fn can_append(&self) -> Result<()> {
        Ok(())
    }

    fn can_write(&self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
