use chrono::{DateTime, TimeZone, Utc};

use std::collections::{BTreeSet, HashMap};

use super::*;
use crate::{
    point::Point,
    query::{FieldQuery, MeasurementQuery, TagQuery, TimeQuery},
};

fn seconds(n: i64) -> DateTime<Utc> {
    Utc.timestamp(1_600_000_000 + n, 0)
}

// three points mirroring a small city/state data-set.
fn sample_points() -> Vec<Point> {
    let mut p1 = Point::new(seconds(0));
    p1.set_tag("city", "la");

    let mut p2 = Point::new(seconds(1));
    p2.set_measurement("cities").set_tag("city", "sf").set_field("temp", 70);

    let mut p3 = Point::new(seconds(2));
    p3.set_measurement("states").set_tag("state", "ca").set_field("pop", 30_000_000);

    vec![p1, p2, p3]
}

#[test]
fn test_new_index() {
    let index = Index::new(true);
    assert!(index.is_valid());
    assert!(index.is_empty());
    assert_eq!(index.len(), 0);

    let index = Index::new(false);
    assert!(!index.is_valid());
}

#[test]
fn test_build() {
    let mut index = Index::new(true);

    index.build(&[]);
    assert!(index.is_empty());
    assert!(index.is_valid());

    index.build(&sample_points());
    assert_eq!(index.len(), 3);

    assert_eq!(index.measurement_len("_default"), 1);
    assert_eq!(index.measurement_len("cities"), 1);
    assert_eq!(index.measurement_len("states"), 1);
    assert_eq!(index.measurement_len("missing"), 0);

    let names: Vec<String> = index.measurement_names().into_iter().collect();
    assert_eq!(names, vec!["_default", "cities", "states"]);

    assert_eq!(index.tag_keys(), vec!["city", "state"]);
    assert_eq!(index.field_keys(), vec!["pop", "temp"]);

    // rebuilding replaces previous state.
    index.build(&sample_points()[..1]);
    assert_eq!(index.len(), 1);
}

#[test]
fn test_incremental_insert() {
    let mut index = Index::new(true);
    let points = sample_points();

    index.insert(&points[..2]);
    assert_eq!(index.len(), 2);
    index.insert(&points[2..]);
    assert_eq!(index.len(), 3);

    let mut full = Index::new(true);
    full.build(&points);

    let q = TagQuery::key("city").eq("sf");
    assert_eq!(index.search(&q).items(), full.search(&q).items());
}

#[test]
fn test_invalidate_and_reset() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    index.invalidate();
    assert!(!index.is_valid());
    assert_eq!(index.len(), 3);

    index.reset();
    assert!(index.is_valid());
    assert!(index.is_empty());
    assert_eq!(index.measurement_names().len(), 0);
    assert_eq!(index.tag_keys().len(), 0);
    assert_eq!(index.field_keys().len(), 0);
}

#[test]
fn test_search_measurement() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    let rst = index.search(&MeasurementQuery::eq("cities"));
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    let rst = index.search(&MeasurementQuery::eq("missing"));
    assert!(rst.is_empty());
    assert!(rst.is_complete());

    let rst = index.search(&MeasurementQuery::ne("cities"));
    assert_eq!(rst.items(), &[0, 2]);
    assert!(rst.is_complete());

    // other operators evaluate against the stored names.
    let rst = index.search(&MeasurementQuery::search("ties").unwrap());
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    let rst = index.search(&MeasurementQuery::test(|name| name.starts_with('s')));
    assert_eq!(rst.items(), &[2]);
    assert!(rst.is_complete());
}

#[test]
fn test_search_time() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    let rst = index.search(&TimeQuery::eq(seconds(1)));
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    let rst = index.search(&TimeQuery::ne(seconds(1)));
    assert_eq!(rst.items(), &[0, 2]);

    let rst = index.search(&TimeQuery::lt(seconds(1)));
    assert_eq!(rst.items(), &[0]);

    let rst = index.search(&TimeQuery::le(seconds(1)));
    assert_eq!(rst.items(), &[0, 1]);

    let rst = index.search(&TimeQuery::gt(seconds(1)));
    assert_eq!(rst.items(), &[2]);

    let rst = index.search(&TimeQuery::ge(seconds(0)));
    assert_eq!(rst.items(), &[0, 1, 2]);

    let rst = index.search(&TimeQuery::test(|time| time >= seconds(2)));
    assert_eq!(rst.items(), &[2]);
    assert!(rst.is_complete());
}

#[test]
fn test_search_tags() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    let rst = index.search(&TagQuery::key("city").eq("la"));
    assert_eq!(rst.items(), &[0]);
    assert!(rst.is_complete());

    let rst = index.search(&TagQuery::key("city").exists());
    assert_eq!(rst.items(), &[0, 1]);
    assert!(rst.is_complete());

    // inequality stays within the positions carrying the key, points
    // without the key are not candidates.
    let rst = index.search(&TagQuery::key("city").ne("la"));
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    let rst = index.search(&TagQuery::key("city").search("f").unwrap());
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    let rst = index.search(&TagQuery::key("missing").eq("x"));
    assert!(rst.is_empty());
    assert!(rst.is_complete());
}

#[test]
fn test_search_tag_null() {
    let mut p1 = Point::new(seconds(0));
    p1.set_tag_none("state");
    let mut p2 = Point::new(seconds(1));
    p2.set_tag("state", "ca");

    let mut index = Index::new(true);
    index.build(&[p1, p2]);

    let rst = index.search(&TagQuery::key("state").eq_none());
    assert_eq!(rst.items(), &[0]);
    assert!(rst.is_complete());

    let rst = index.search(&TagQuery::key("state").ne_none());
    assert_eq!(rst.items(), &[1]);

    // a null value satisfies inequality against a string.
    let rst = index.search(&TagQuery::key("state").ne("ca"));
    assert_eq!(rst.items(), &[0]);
}

#[test]
fn test_search_fields() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    let rst = index.search(&FieldQuery::key("temp").eq(70));
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    let rst = index.search(&FieldQuery::key("temp").ge(60));
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    let rst = index.search(&FieldQuery::key("temp").lt(60));
    assert!(rst.is_empty());

    let rst = index.search(&FieldQuery::key("temp").exists());
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    // user predicates leave per-point evaluation to the caller.
    let rst = index.search(&FieldQuery::key("temp").test(|_| true));
    assert_eq!(rst.items(), &[1]);
    assert!(!rst.is_complete());

    // an opaque transform narrows to the key's positions only.
    let rst = index.search(&FieldQuery::key("temp").map(Some).eq(71));
    assert_eq!(rst.items(), &[1]);
    assert!(!rst.is_complete());

    let rst = index.search(&FieldQuery::key("missing").eq(1));
    assert!(rst.is_empty());
    assert!(rst.is_complete());
}

#[test]
fn test_search_compound() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    let q = MeasurementQuery::eq("cities") & TagQuery::key("city").eq("sf");
    let rst = index.search(&q);
    assert_eq!(rst.items(), &[1]);
    assert!(rst.is_complete());

    let q = TagQuery::key("city").eq("la") | TagQuery::key("state").eq("ca");
    let rst = index.search(&q);
    assert_eq!(rst.items(), &[0, 2]);
    assert!(rst.is_complete());

    let q = !TagQuery::key("city").eq("la");
    let rst = index.search(&q);
    assert_eq!(rst.items(), &[1, 2]);
    assert!(rst.is_complete());

    // AND against an undecided side keeps the decided candidates but
    // demands post-filtering.
    let q = FieldQuery::key("temp").test(|_| true) & MeasurementQuery::eq("cities");
    let rst = index.search(&q);
    assert_eq!(rst.items(), &[1]);
    assert!(!rst.is_complete());

    // NOT of an incomplete subtree degrades to the whole universe.
    let q = !(FieldQuery::key("temp").test(|_| true));
    let rst = index.search(&q);
    assert_eq!(rst.items(), &[0, 1, 2]);
    assert!(!rst.is_complete());

    // OR with an undecided side scans everything.
    let q = FieldQuery::key("temp").test(|_| true) | MeasurementQuery::eq("cities");
    let rst = index.search(&q);
    assert_eq!(rst.items(), &[0, 1, 2]);
    assert!(!rst.is_complete());
}

#[test]
fn test_search_memoized() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    let q = TagQuery::key("city").eq("la");
    let first = index.search(&q);
    let second = index.search(&q);
    assert_eq!(first.items(), second.items());
    assert_eq!(first.is_complete(), second.is_complete());

    // mutation drops memoized results.
    let mut p4 = Point::new(seconds(3));
    p4.set_tag("city", "la");
    index.insert(&[p4]);
    let third = index.search(&q);
    assert_eq!(third.items(), &[0, 3]);
}

#[test]
fn test_remove_and_renumber() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    // remove the middle position, then renumber the survivors.
    let mut gone = BTreeSet::new();
    gone.insert(1);
    index.remove(&gone);

    let mut updated = HashMap::new();
    updated.insert(0, 0);
    updated.insert(2, 1);
    index.renumber(&updated);

    assert_eq!(index.len(), 2);
    assert_eq!(index.measurement_len("cities"), 0);
    assert_eq!(index.measurement_len("states"), 1);
    assert_eq!(index.tag_keys(), vec!["city", "state"]);

    let rst = index.search(&TagQuery::key("state").eq("ca"));
    assert_eq!(rst.items(), &[1]);

    let rst = index.search(&FieldQuery::key("pop").ge(1));
    assert_eq!(rst.items(), &[1]);

    // the only city entry left is la at position 0.
    let rst = index.search(&TagQuery::key("city").exists());
    assert_eq!(rst.items(), &[0]);

    assert_eq!(index.field_keys(), vec!["pop"]);
}

#[test]
fn test_replace() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    // re-link position 1 with changed tags and fields.
    let mut point = Point::new(seconds(1));
    point.set_measurement("cities").set_tag("city", "oakland").set_field("temp", 65);
    index.replace(1, &point);

    assert_eq!(index.len(), 3);
    assert!(index.search(&TagQuery::key("city").eq("sf")).is_empty());
    assert_eq!(index.search(&TagQuery::key("city").eq("oakland")).items(), &[1]);
    assert_eq!(index.search(&FieldQuery::key("temp").eq(65)).items(), &[1]);
    assert!(index.search(&FieldQuery::key("temp").eq(70)).is_empty());
    assert_eq!(index.measurement_len("cities"), 1);
}

#[test]
fn test_tag_values() {
    let mut index = Index::new(true);
    index.build(&sample_points());

    let values = index.tag_values(&[]);
    assert_eq!(values.len(), 2);
    assert_eq!(
        values.get("city").unwrap(),
        &vec![Some("la".to_string()), Some("sf".to_string())]
    );

    let values = index.tag_values(&["state"]);
    assert_eq!(values.len(), 1);
    assert_eq!(values.get("state").unwrap(), &vec![Some("ca".to_string())]);
}
