//! Binary record encode/decode tests.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::{BinaryRecord, Value};

#[test]
fn integer_field_layout() {
    // {id=1 -> Integer 42} must produce 01 01 00 00 00 00 00 00 00 2A.
    let mut record = BinaryRecord::new();
    record.insert(1, Value::Integer(42));
    let bytes = record.encode().unwrap();
    assert_eq!(
        bytes,
        vec![0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A]
    );

    let decoded = BinaryRecord::decode(&bytes).unwrap();
    assert_eq!(decoded.get(1), Some(&Value::Integer(42)));
}

#[test]
fn round_trip_every_type() {
    let uuid = Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap();
    let mut record = BinaryRecord::new();
    record.insert(1, Value::Integer(-7));
    record.insert(2, Value::Real(2.5));
    record.insert(3, Value::Text("caf\u{e9}".to_string()));
    record.insert(4, Value::Blob(vec![0, 1, 2, 255]));
    record.insert(5, Value::Null);
    record.insert(6, Value::Uuid(uuid));

    let decoded = BinaryRecord::decode(&record.encode().unwrap()).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn fields_emit_sorted_by_id() {
    let mut record = BinaryRecord::new();
    record.insert(200, Value::Null);
    record.insert(3, Value::Null);
    let bytes = record.encode().unwrap();
    // id 3 (one byte) first, then id 200 (two bytes).
    assert_eq!(bytes, vec![0x03, 0x05, 0x81, 0x48, 0x05]);
}

#[test]
fn decode_rejects_truncated_payload() {
    let mut record = BinaryRecord::new();
    record.insert(1, Value::Text("hello".to_string()));
    let mut bytes = record.encode().unwrap();
    bytes.truncate(bytes.len() - 2);
    assert!(BinaryRecord::decode(&bytes).is_err());
}

#[test]
fn decode_rejects_unknown_tag() {
    assert!(BinaryRecord::decode(&[0x01, 0x09]).is_err());
}

#[test]
fn projection_strips_invisible_attributes() {
    let mut record = BinaryRecord::new();
    record.insert(1, Value::Integer(1));
    record.insert(2, Value::Integer(2));
    record.insert(3, Value::Integer(3));

    let visible: HashSet<u16> = [1].into_iter().collect();
    let projected = record.project(&visible);
    assert_eq!(projected.len(), 1);
    assert_eq!(projected.get(1), Some(&Value::Integer(1)));
    assert_eq!(projected.get(2), None);
}

#[test]
fn uuid_becomes_lowercase_text_when_transcoded() {
    let uuid = Uuid::parse_str("ABCDEF01-2345-6789-ABCD-EF0123456789").unwrap();
    let mut record = BinaryRecord::new();
    record.insert(4, Value::Uuid(uuid));

    let names: HashMap<u16, String> = [(4u16, "owner".to_string())].into_iter().collect();
    let text = record.to_text(&names);
    assert_eq!(
        text.get("owner"),
        Some(&Value::Text("abcdef01-2345-6789-abcd-ef0123456789".to_string()))
    );
}
