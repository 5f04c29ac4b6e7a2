use super::*;
use serde_json::json;

fn frame(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

#[test]
fn test_valid_update_parses() {
    let bytes = frame(json!({
        "id": "cab-1",
        "location": {"type": "Point", "coordinates": [77.6, 12.9]},
        "status": "Available"
    }));

    let update = CabUpdate::parse(&bytes).unwrap();
    assert_eq!(update.id, "cab-1");
    assert_eq!(update.location.longitude(), 77.6);
    assert_eq!(update.location.latitude(), 12.9);
    assert_eq!(update.status, CabStatus::Available);
}

#[test]
fn test_location_type_defaults_to_point() {
    let bytes = frame(json!({
        "id": "cab-2",
        "location": {"coordinates": [77.6, 12.9]},
        "status": "Busy"
    }));

    let update = CabUpdate::parse(&bytes).unwrap();
    assert_eq!(update.status, CabStatus::Busy);
}

#[test]
fn test_client_timestamp_is_ignored() {
    let bytes = frame(json!({
        "id": "cab-3",
        "location": {"type": "Point", "coordinates": [1.0, 2.0]},
        "status": "Busy",
        "last_updated": "1999-01-01T00:00:00Z"
    }));

    assert!(CabUpdate::parse(&bytes).is_ok());
}

#[test]
fn test_missing_identity_fails() {
    let bytes = frame(json!({
        "location": {"type": "Point", "coordinates": [77.6, 12.9]},
        "status": "Available"
    }));

    assert_eq!(
        CabUpdate::parse(&bytes).unwrap_err(),
        ValidationError::MissingIdentity
    );
}

#[test]
fn test_blank_identity_fails() {
    let bytes = frame(json!({
        "id": "   ",
        "location": {"type": "Point", "coordinates": [77.6, 12.9]},
        "status": "Available"
    }));

    assert_eq!(
        CabUpdate::parse(&bytes).unwrap_err(),
        ValidationError::MissingIdentity
    );
}

#[test]
fn test_unknown_status_fails() {
    let bytes = frame(json!({
        "id": "cab-1",
        "location": {"type": "Point", "coordinates": [77.6, 12.9]},
        "status": "available"
    }));

    assert_eq!(
        CabUpdate::parse(&bytes).unwrap_err(),
        ValidationError::UnknownStatus("available".to_string())
    );
}

#[test]
fn test_missing_status_fails() {
    let bytes = frame(json!({
        "id": "cab-1",
        "location": {"type": "Point", "coordinates": [77.6, 12.9]}
    }));

    assert_eq!(
        CabUpdate::parse(&bytes).unwrap_err(),
        ValidationError::MissingStatus
    );
}

#[test]
fn test_malformed_points_fail() {
    let wrong_type = frame(json!({
        "id": "cab-1",
        "location": {"type": "Polygon", "coordinates": [77.6, 12.9]},
        "status": "Busy"
    }));
    assert_eq!(
        CabUpdate::parse(&wrong_type).unwrap_err(),
        ValidationError::InvalidPointType("Polygon".to_string())
    );

    let three_coords = frame(json!({
        "id": "cab-1",
        "location": {"type": "Point", "coordinates": [77.6, 12.9, 3.0]},
        "status": "Busy"
    }));
    assert_eq!(
        CabUpdate::parse(&three_coords).unwrap_err(),
        ValidationError::InvalidCoordinateCount(3)
    );

    let out_of_range = frame(json!({
        "id": "cab-1",
        "location": {"type": "Point", "coordinates": [12.9, 95.0]},
        "status": "Busy"
    }));
    assert!(matches!(
        CabUpdate::parse(&out_of_range).unwrap_err(),
        ValidationError::InvalidLatitude(_)
    ));

    let missing = frame(json!({"id": "cab-1", "status": "Busy"}));
    assert_eq!(
        CabUpdate::parse(&missing).unwrap_err(),
        ValidationError::MissingLocation
    );
}

#[test]
fn test_not_json_fails() {
    assert!(matches!(
        CabUpdate::parse(b"not json").unwrap_err(),
        ValidationError::MalformedMessage(_)
    ));
    assert!(matches!(
        CabUpdate::parse(b"[1, 2]").unwrap_err(),
        ValidationError::MalformedMessage(_)
    ));
}

#[test]
fn test_record_serializes_as_geojson() {
    let record = CabRecord {
        id: "cab-9".to_string(),
        location: GeoPoint::new(77.6, 12.9).unwrap(),
        status: CabStatus::Busy,
        last_updated: Utc::now(),
    };
    let nearby = NearbyCab {
        record,
        distance: 12.5,
    };

    let value = serde_json::to_value(&nearby).unwrap();
    assert_eq!(value["id"], json!("cab-9"));
    assert_eq!(value["status"], json!("Busy"));
    assert_eq!(value["location"]["type"], json!("Point"));
    assert_eq!(value["location"]["coordinates"], json!([77.6, 12.9]));
    assert_eq!(value["distance"], json!(12.5));
}

#[test]
fn test_invalid_point_rejected_on_deserialize() {
    let value = json!({
        "id": "cab-9",
        "location": {"type": "Point", "coordinates": [200.0, 12.9]},
        "status": "Busy",
        "last_updated": "2026-01-01T00:00:00Z"
    });
    assert!(serde_json::from_value::<CabRecord>(value).is_err());
}
