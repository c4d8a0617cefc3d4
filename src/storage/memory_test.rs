use chrono::{DateTime, TimeZone, Utc};

use super::*;
use crate::{point::Point, storage::Storage};

fn seconds(n: i64) -> DateTime<Utc> {
    Utc.timestamp(1_600_000_000 + n, 0)
}

#[test]
fn test_empty() {
    let mut storage = MemoryStorage::new();

    assert!(storage.index_intact());
    assert_eq!(storage.latest_time(), None);
    assert_eq!(storage.len().unwrap(), 0);
    assert_eq!(storage.read().unwrap(), vec![]);
    assert!(storage.is_sorted().unwrap());
}

#[test]
fn test_append_in_order() {
    let mut storage = MemoryStorage::new();

    let p1 = Point::new(seconds(0));
    let p2 = Point::new(seconds(1));
    storage.append(&[p1.clone()]).unwrap();
    storage.append(&[p2.clone()]).unwrap();

    assert!(storage.index_intact());
    assert_eq!(storage.latest_time(), Some(seconds(1)));
    assert_eq!(storage.len().unwrap(), 2);
    assert_eq!(storage.read().unwrap(), vec![p1, p2]);
}

#[test]
fn test_append_out_of_order() {
    let mut storage = MemoryStorage::new();

    let p1 = Point::new(seconds(1));
    let p2 = Point::new(seconds(0));
    storage.append(&[p1.clone(), p2.clone()]).unwrap();

    assert!(!storage.index_intact());
    assert_eq!(storage.latest_time(), None);
    // insertion order is preserved, nothing is implicitly sorted.
    assert_eq!(storage.read().unwrap(), vec![p1.clone(), p2.clone()]);

    // the flag never self-heals on later in-order appends.
    storage.append(&[Point::new(seconds(9))]).unwrap();
    assert!(!storage.index_intact());

    // a full recheck re-derives both trackers.
    assert!(!storage.is_sorted().unwrap());
    storage.write(vec![p2, p1, Point::new(seconds(9))], true).unwrap();
    assert!(storage.is_sorted().unwrap());
    assert_eq!(storage.latest_time(), Some(seconds(9)));
}

#[test]
fn test_write_sorted_flag() {
    let mut storage = MemoryStorage::new();

    let p1 = Point::new(seconds(0));
    let p2 = Point::new(seconds(1));

    storage.write(vec![p1.clone(), p2.clone()], true).unwrap();
    assert!(storage.index_intact());
    assert_eq!(storage.latest_time(), Some(seconds(1)));

    storage.write(vec![p2, p1], false).unwrap();
    assert!(!storage.index_intact());
    assert_eq!(storage.latest_time(), None);
}

#[test]
fn test_reset() {
    let mut storage = MemoryStorage::new();
    storage.append(&[Point::new(seconds(1)), Point::new(seconds(0))]).unwrap();
    assert!(!storage.index_intact());

    storage.reset().unwrap();
    assert!(storage.index_intact());
    assert_eq!(storage.latest_time(), None);
    assert_eq!(storage.len().unwrap(), 0);
}

#[test]
fn test_item_shortcuts() {
    let mut storage = MemoryStorage::new();
    let mut point = Point::new(seconds(5));
    point.set_measurement("cities");

    let item = storage.serialize_point(&point);
    assert_eq!(storage.item_measurement(&item).unwrap(), "cities");
    assert_eq!(storage.item_timestamp(&item).unwrap(), seconds(5));
    assert_eq!(storage.item_to_point(&item).unwrap(), point);
}

#[test]
fn test_modes_always_allowed() {
    let storage = MemoryStorage::new();
    assert!(storage.can_read().is_ok());
    assert!(storage.can_append().is_ok());
    assert!(storage.can_write().is_ok());
}
