//! Document round-trip tests for headers and changes.

use chrono::Utc;
use uuid::Uuid;

use super::{Change, Downloaded, Header, Operation};

#[test]
fn operation_tags_match_session_format() {
    assert_eq!(Operation::Insert as u8, 18);
    assert_eq!(Operation::Update as u8, 23);
    assert_eq!(Operation::Delete as u8, 9);
    assert_eq!(Operation::from_tag(18), Some(Operation::Insert));
    assert_eq!(Operation::from_tag(7), None);
}

#[test]
fn change_document_round_trips_binary_fields() {
    let change = Change {
        id_dataset: 3,
        id_header: 12,
        id_change: 1,
        operation: Operation::Update,
        entity_uuid: Uuid::new_v4(),
        new_pk: vec![1, 2, 3],
        old_pk: vec![4, 5],
        new_data: vec![0xff, 0x00, 0x80],
    };
    let json = serde_json::to_string(&change).unwrap();
    let back: Change = serde_json::from_str(&json).unwrap();
    assert_eq!(back.new_pk, change.new_pk);
    assert_eq!(back.old_pk, change.old_pk);
    assert_eq!(back.new_data, change.new_data);
    assert_eq!(back.operation, Operation::Update);
}

#[test]
fn header_document_skips_changes() {
    let header = Header {
        id_dataset: 1,
        id_header: 6,
        transaction_name: "addOrder".to_string(),
        transaction_uuid: Uuid::new_v4(),
        node: 77,
        id_node: 4,
        status: 0,
        date: Utc::now(),
        changes: vec![Change {
            id_dataset: 1,
            id_header: 6,
            id_change: 1,
            operation: Operation::Insert,
            entity_uuid: Uuid::new_v4(),
            new_pk: vec![1],
            old_pk: vec![],
            new_data: vec![],
        }],
    };
    let json = serde_json::to_value(&header).unwrap();
    assert!(json.get("changes").is_none());
    let back: Header = serde_json::from_value(json).unwrap();
    assert!(back.changes.is_empty());
    assert_eq!(back.id_header, 6);
}

#[test]
fn watermark_defaults_to_origin() {
    let mark = Downloaded::default();
    assert_eq!(mark.id_header, 0);
    assert_eq!(mark.id_cell, 0);
}
