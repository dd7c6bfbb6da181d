use prepatravel_core::{
    CoordinateField, MapNode, MapNodePatch, MapNodeValidationError, NewMapNode,
};

fn eiffel() -> MapNode {
    MapNode {
        id: 1,
        name: "Eiffel Tower".to_string(),
        lat: 48.8584,
        lng: 2.2945,
        description: "Landmark".to_string(),
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_000,
    }
}

#[test]
fn serialization_uses_expected_wire_fields() {
    let node = eiffel();

    let json = serde_json::to_value(&node).unwrap();
    assert_eq!(json["id"], 1);
    assert_eq!(json["name"], "Eiffel Tower");
    assert_eq!(json["lat"], 48.8584);
    assert_eq!(json["lng"], 2.2945);
    assert_eq!(json["description"], "Landmark");
    assert_eq!(json["created_at"], 1_700_000_000_000_i64);
    assert_eq!(json["updated_at"], 1_700_000_000_000_i64);

    let decoded: MapNode = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, node);
}

#[test]
fn deserialize_rejects_reversed_timestamps() {
    let value = serde_json::json!({
        "id": 3,
        "name": "x",
        "lat": 0.0,
        "lng": 0.0,
        "description": "",
        "created_at": 200,
        "updated_at": 100
    });

    let err = serde_json::from_value::<MapNode>(value).unwrap_err();
    assert!(
        err.to_string()
            .contains("updated_at (100) must be >= created_at (200)"),
        "unexpected error: {err}"
    );
}

#[test]
fn validate_rejects_out_of_range_coordinates() {
    assert_eq!(
        NewMapNode::new("x", -90.5, 0.0, "").validate().unwrap_err(),
        MapNodeValidationError::LatitudeOutOfRange(-90.5)
    );
    assert_eq!(
        NewMapNode::new("x", 0.0, 180.25, "").validate().unwrap_err(),
        MapNodeValidationError::LongitudeOutOfRange(180.25)
    );
    assert_eq!(
        NewMapNode::new("x", 0.0, f64::NEG_INFINITY, "")
            .validate()
            .unwrap_err(),
        MapNodeValidationError::NonFiniteCoordinate {
            field: CoordinateField::Lng
        }
    );
}

#[test]
fn names_need_not_be_unique_or_non_empty() {
    NewMapNode::new("", 0.0, 0.0, "").validate().unwrap();
    let mut node = eiffel();
    node.name.clear();
    node.validate().unwrap();
}

#[test]
fn patch_deserializes_with_missing_fields() {
    let patch: MapNodePatch =
        serde_json::from_value(serde_json::json!({ "description": "Famous landmark" })).unwrap();

    assert_eq!(patch, MapNodePatch::default().description("Famous landmark"));
    let mut node = eiffel();
    node.apply_patch(&patch);
    assert_eq!(node.description, "Famous landmark");
    assert_eq!(node.name, "Eiffel Tower");
}
