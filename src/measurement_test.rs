use chrono::{DateTime, TimeZone, Utc};

use super::*;
use crate::{
    db::{Database, Update},
    point::Point,
    query::{FieldQuery, MeasurementQuery, TagQuery, TimeQuery},
};

fn seconds(n: i64) -> DateTime<Utc> {
    Utc.timestamp(1_600_000_000 + n, 0)
}

fn city_point(n: i64, city: &str, temp: f64) -> Point {
    let mut point = Point::new(seconds(n));
    point.set_measurement("cities").set_tag("city", city).set_field("temp", temp);
    point
}

#[test]
fn test_name_and_len() {
    let mut db = Database::memory();
    db.insert(city_point(0, "LA", 70.0)).unwrap();
    db.insert(city_point(1, "SF", 60.0)).unwrap();

    let mut m = db.measurement("cities");
    assert_eq!(m.name(), "cities");
    assert_eq!(m.len().unwrap(), 2);
    assert!(!m.is_empty().unwrap());

    let mut m = db.measurement("ghosts");
    assert_eq!(m.len().unwrap(), 0);
    assert!(m.is_empty().unwrap());
}

#[test]
fn test_insert_rewrites_measurement() {
    let mut db = Database::memory();

    let mut point = Point::new(seconds(0));
    point.set_measurement("elsewhere").set_tag("city", "LA");
    db.measurement("cities").insert(point).unwrap();

    let found = db.measurement("cities").all().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].measurement, "cities");

    db.measurement("cities")
        .insert_multiple(vec![city_point(1, "SF", 60.0), {
            let mut p = Point::new(seconds(2));
            p.set_measurement("other");
            p
        }])
        .unwrap();
    assert_eq!(db.measurement("cities").len().unwrap(), 3);
    assert_eq!(db.measurement("other").len().unwrap(), 0);
}

#[test]
fn test_scoped_queries() {
    let mut db = Database::memory();
    db.insert(city_point(0, "LA", 70.0)).unwrap();
    db.insert({
        let mut p = Point::new(seconds(1));
        p.set_measurement("states").set_tag("state", "CA").set_field("pop", 30_000_000);
        p
    })
    .unwrap();
    db.insert(city_point(2, "LA", 82.8)).unwrap();

    let q = TimeQuery::ge(seconds(0));
    let mut cities = db.measurement("cities");
    assert_eq!(cities.count(&q).unwrap(), 2);
    assert!(cities.contains(&q).unwrap());
    assert_eq!(cities.get(&q).unwrap().unwrap().time, seconds(0));
    assert_eq!(cities.search(&q).unwrap().len(), 2);

    // a measurement-scoped search equals the explicit conjunction.
    let scoped = db.measurement("cities").search(&TagQuery::key("city").eq("LA")).unwrap();
    let explicit = db
        .search(&(MeasurementQuery::eq("cities") & TagQuery::key("city").eq("LA")))
        .unwrap();
    assert_eq!(scoped, explicit);

    let rows = db
        .measurement("states")
        .select(&["tags.state", "fields.pop"], &TimeQuery::noop())
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_scoped_mutations() {
    let mut db = Database::memory();
    db.insert(city_point(0, "LA", 70.0)).unwrap();
    db.insert(city_point(1, "SF", 60.0)).unwrap();
    db.insert({
        let mut p = Point::new(seconds(2));
        p.set_measurement("states").set_field("pop", 1);
        p
    })
    .unwrap();

    // scoped update touches only this measurement.
    let count = db
        .measurement("cities")
        .update_all(Update::new().map_fields(|fields| {
            let mut out = fields.clone();
            if let Some(Some(temp)) = fields.get("temp") {
                out.insert("temp".to_string(), Some((temp.as_f64() + 1.0).into()));
            }
            out
        }))
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(db.count(&FieldQuery::key("temp").eq(71.0)).unwrap(), 1);
    assert_eq!(db.measurement("states").count(&FieldQuery::key("pop").eq(1)).unwrap(), 1);

    // scoped remove.
    let count = db.measurement("cities").remove(&TagQuery::key("city").eq("SF")).unwrap();
    assert_eq!(count, 1);
    assert_eq!(db.len().unwrap(), 2);

    // remove_all drops the whole measurement, others survive.
    let count = db.measurement("cities").remove_all().unwrap();
    assert_eq!(count, 1);
    assert_eq!(db.len().unwrap(), 1);
    let names: Vec<String> = db.measurements().unwrap().into_iter().collect();
    assert_eq!(names, vec!["states"]);
}

#[test]
fn test_show_keys() {
    let mut db = Database::memory();
    db.insert(city_point(0, "LA", 70.0)).unwrap();
    db.insert({
        let mut p = Point::new(seconds(1));
        p.set_measurement("states").set_tag("state", "CA").set_field("pop", 1);
        p
    })
    .unwrap();

    assert_eq!(db.show_tag_keys().unwrap(), vec!["city", "state"]);
    assert_eq!(db.show_field_keys().unwrap(), vec!["pop", "temp"]);

    let mut cities = db.measurement("cities");
    assert_eq!(cities.show_tag_keys().unwrap(), vec!["city"]);
    assert_eq!(cities.show_field_keys().unwrap(), vec!["temp"]);

    let values = cities.show_tag_values(&[]).unwrap();
    assert_eq!(values.get("city").unwrap(), &vec![Some("LA".to_string())]);

    let values = db.show_tag_values(&["state"]).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values.get("state").unwrap(), &vec![Some("CA".to_string())]);
}
