use chrono::{TimeZone, Utc};

use super::*;

#[test]
fn test_field_compare() {
    assert_eq!(Field::Integer(1), Field::Float(1.0));
    assert_eq!(Field::Float(2.5), Field::Float(2.5));
    assert!(Field::Integer(1) != Field::Float(1.5));

    assert!(Field::Integer(1) < Field::Integer(2));
    assert!(Field::Integer(1) < Field::Float(1.5));
    assert!(Field::Float(2.5) > Field::Integer(2));
    assert!(Field::Float(1.0) <= Field::Integer(1));
}

#[test]
fn test_field_display() {
    assert_eq!(Field::Integer(-42).to_string(), "-42");
    assert_eq!(Field::Float(82.8).to_string(), "82.8");
    assert_eq!(Field::Integer(30_000_000).to_string(), "30000000");
}

#[test]
fn test_point_equality() {
    let time = Utc.timestamp(1_600_000_000, 0);

    let mut p1 = Point::new(time);
    p1.set_measurement("cities").set_tag("city", "LA").set_field("temp", 70);

    let mut p2 = Point::new(time);
    p2.set_measurement("cities").set_tag("city", "LA").set_field("temp", 70.0);

    // field values compare numerically across variants.
    assert_eq!(p1, p2);

    let mut p3 = p2.clone();
    p3.set_tag("city", "SF");
    assert!(p1 != p3);
}

#[test]
fn test_validate() {
    let time = Utc.timestamp(1_600_000_000, 0);

    let mut point = Point::new(time);
    point.set_tag("city", "LA").set_field("temp", 70);
    assert!(point.validate().is_ok());

    let mut point = Point::new(time);
    point.set_measurement("");
    assert!(point.validate().is_err());

    let mut point = Point::new(time);
    point.set_tag("", "LA");
    assert!(point.validate().is_err());

    let mut point = Point::new(time);
    point.set_field("", 1);
    assert!(point.validate().is_err());
}

#[test]
fn test_row_shape() {
    let time = Utc.timestamp(1_600_000_000, 0);

    let mut point = Point::new(time);
    point
        .set_measurement("cities")
        .set_tag("city", "LA")
        .set_tag_none("state")
        .set_field("temp", 70)
        .set_field_none("humidity");

    let row = point.to_row();
    assert_eq!(row[0], "2020-09-13T12:26:40.000000");
    assert_eq!(row[1], "cities");
    assert_eq!(&row[2..4], &["_tag_city".to_string(), "LA".to_string()]);
    assert_eq!(&row[4..6], &["_tag_state".to_string(), "_none".to_string()]);
    assert_eq!(
        &row[6..8],
        &["_field_humidity".to_string(), "_none".to_string()]
    );
    assert_eq!(&row[8..10], &["_field_temp".to_string(), "70".to_string()]);
}

#[test]
fn test_row_round_trip() {
    let time = Utc.timestamp(1_600_000_000, 500_000);

    let mut point = Point::new(time);
    point
        .set_measurement("cities")
        .set_tag("city", "LA")
        .set_tag_none("state")
        .set_field("temp", 82.8)
        .set_field("pop", -5)
        .set_field_none("humidity");

    let back = Point::from_row(&point.to_row()).unwrap();
    assert_eq!(back, point);
}

#[test]
fn test_row_round_trip_default_measurement() {
    let time = Utc.timestamp(1_600_000_000, 0);
    let point = Point::new(time);

    let back = Point::from_row(&point.to_row()).unwrap();
    assert_eq!(back.measurement, DEFAULT_MEASUREMENT);
    assert_eq!(back, point);
}

#[test]
fn test_from_row_legacy_none_measurement() {
    let row: Vec<String> = vec!["2020-09-13T12:26:40".to_string(), "_none".to_string()];
    let point = Point::from_row(&row).unwrap();
    assert_eq!(point.measurement, DEFAULT_MEASUREMENT);
    assert_eq!(point.time, Utc.timestamp(1_600_000_000, 0));
}

#[test]
fn test_from_row_field_parse_ladder() {
    let row: Vec<String> = vec![
        "2020-09-13T12:26:40".to_string(),
        "m".to_string(),
        "_field_a".to_string(),
        "42".to_string(),
        "_field_b".to_string(),
        "-42".to_string(),
        "_field_c".to_string(),
        "82.8".to_string(),
        "_field_d".to_string(),
        "_none".to_string(),
        "_field_e".to_string(),
        "not-a-number".to_string(),
    ];
    let point = Point::from_row(&row).unwrap();

    assert_eq!(point.fields.get("a").unwrap(), &Some(Field::Integer(42)));
    assert_eq!(point.fields.get("b").unwrap(), &Some(Field::Integer(-42)));
    assert_eq!(point.fields.get("c").unwrap(), &Some(Field::Float(82.8)));
    assert_eq!(point.fields.get("d").unwrap(), &None);
    assert_eq!(point.fields.get("e").unwrap(), &None);
}

#[test]
fn test_from_row_errors() {
    let row: Vec<String> = vec!["2020-09-13T12:26:40".to_string()];
    assert!(Point::from_row(&row).is_err());

    let row: Vec<String> = vec!["not-a-time".to_string(), "m".to_string()];
    assert!(Point::from_row(&row).is_err());

    let row: Vec<String> = vec![
        "2020-09-13T12:26:40".to_string(),
        "m".to_string(),
        "bogus-token".to_string(),
        "x".to_string(),
    ];
    assert!(Point::from_row(&row).is_err());
}

#[test]
fn test_row_shortcuts() {
    let time = Utc.timestamp(1_600_000_000, 0);
    let mut point = Point::new(time);
    point.set_measurement("cities").set_field("temp", 70);

    let row = point.to_row();
    assert_eq!(Point::row_timestamp(&row).unwrap(), time);
    assert_eq!(Point::row_measurement(&row).unwrap(), "cities");

    assert!(Point::row_timestamp(&[]).is_err());
    assert!(Point::row_measurement(&["t".to_string()]).is_err());
}
