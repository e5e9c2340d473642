//! Text record and transcoding tests.

use std::collections::HashMap;

use super::{BinaryRecord, NameMap, TextRecord, Value};

fn mapping() -> NameMap {
    [("qty", 1u16), ("price", 2), ("note", 3)]
        .into_iter()
        .collect()
}

#[test]
fn wire_layout_is_name_nul_tag_payload() {
    let mut record = TextRecord::new();
    record.insert("qty".to_string(), Value::Integer(1));
    let bytes = record.encode().unwrap();
    assert_eq!(
        bytes,
        vec![
            b'q', b't', b'y', 0x00, 0x01, // name, NUL, Integer tag
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
        ]
    );
}

#[test]
fn fields_order_case_insensitively() {
    let mut record = TextRecord::new();
    record.insert("Beta".to_string(), Value::Null);
    record.insert("alpha".to_string(), Value::Null);
    let names: Vec<&str> = record.iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["alpha", "Beta"]);
}

#[test]
fn binary_text_round_trip_with_complete_mapping() {
    let mut record = BinaryRecord::new();
    record.insert(1, Value::Integer(12));
    record.insert(2, Value::Real(9.75));
    record.insert(3, Value::Text("ok".to_string()));

    let id_to_name: HashMap<u16, String> = [(1u16, "qty"), (2, "price"), (3, "note")]
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect();

    let text = record.to_text(&id_to_name);
    let bytes = text.encode().unwrap();
    let back = TextRecord::decode_to_binary(&bytes, "orders", &mapping()).unwrap();
    assert_eq!(back, record);
}

#[test]
fn name_lookup_ignores_case() {
    let mut text = TextRecord::new();
    text.insert("QTY".to_string(), Value::Integer(3));
    let binary = text.to_binary("orders", &mapping());
    assert_eq!(binary.get(1), Some(&Value::Integer(3)));
}

#[test]
fn unknown_fields_are_skipped() {
    let mut text = TextRecord::new();
    text.insert("qty".to_string(), Value::Integer(3));
    text.insert("added_later".to_string(), Value::Integer(9));
    let binary = text.to_binary("orders", &mapping());
    assert_eq!(binary.len(), 1);
    assert_eq!(binary.get(1), Some(&Value::Integer(3)));
}

#[test]
fn decode_rejects_unterminated_name() {
    assert!(TextRecord::decode(b"qty").is_err());
}
