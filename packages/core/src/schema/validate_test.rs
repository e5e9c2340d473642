//! Schema validation tests.

use serde_json::json;

use super::Context;

fn parse(value: serde_json::Value) -> Context {
    serde_json::from_value(value).unwrap()
}

fn entity(uuid: &str, name: &str) -> serde_json::Value {
    json!({
        "uuid": uuid,
        "name": name,
        "keys": [{"id": 1, "name": "id", "type": "Integer"}],
        "attributes": [
            {"id": 2, "name": "amount", "type": "Integer", "notnull": true},
            {"id": 3, "name": "note", "type": "Text"}
        ]
    })
}

#[test]
fn minimal_context_is_valid() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [],
        "transactions": [],
        "roles": [],
        "modules": []
    }));
    assert!(context.check().is_ok());
    assert_eq!(context.version, 1);
    assert!(context.defaultrole.is_nil());
}

#[test]
fn duplicated_entity_uuid_is_rejected() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [
            entity("22222222-2222-2222-2222-222222222222", "orders"),
            entity("22222222-2222-2222-2222-222222222222", "lines")
        ]
    }));
    let err = context.check().unwrap_err();
    assert!(err.to_string().contains("is duplicated"), "{}", err);
}

#[test]
fn duplicated_attribute_id_is_rejected() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [{
            "uuid": "22222222-2222-2222-2222-222222222222",
            "name": "orders",
            "keys": [{"id": 1, "name": "id", "type": "Integer"}],
            "attributes": [
                {"id": 1, "name": "amount", "type": "Integer"}
            ]
        }]
    }));
    let err = context.check().unwrap_err();
    assert!(err.to_string().contains("duplicated attribute id"), "{}", err);
}

#[test]
fn key_and_attribute_names_clash_case_insensitively() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [{
            "uuid": "22222222-2222-2222-2222-222222222222",
            "name": "orders",
            "keys": [{"id": 1, "name": "Amount", "type": "Integer"}],
            "attributes": [
                {"id": 2, "name": "amount", "type": "Integer"}
            ]
        }]
    }));
    let err = context.check().unwrap_err();
    assert!(
        err.to_string().contains("duplicated key or attribute name"),
        "{}",
        err
    );
}

#[test]
fn transaction_referencing_unknown_entity_is_rejected() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [entity("22222222-2222-2222-2222-222222222222", "orders")],
        "transactions": [{
            "uuid": "33333333-3333-3333-3333-333333333333",
            "name": "addOrder",
            "entities": [{
                "entity": "99999999-9999-9999-9999-999999999999",
                "add": true,
                "remove": false,
                "update": []
            }],
            "pre": "return 0",
            "post": ""
        }]
    }));
    let err = context.check().unwrap_err();
    assert!(err.to_string().contains("Unknown entity"), "{}", err);
}

#[test]
fn transaction_unknown_update_column_is_rejected() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [entity("22222222-2222-2222-2222-222222222222", "orders")],
        "transactions": [{
            "uuid": "33333333-3333-3333-3333-333333333333",
            "name": "addOrder",
            "entities": [{
                "entity": "22222222-2222-2222-2222-222222222222",
                "add": true,
                "remove": false,
                "update": [42]
            }],
            "pre": "return 0",
            "post": ""
        }]
    }));
    let err = context.check().unwrap_err();
    assert!(err.to_string().contains("Unknown column number 42"), "{}", err);
}

#[test]
fn role_and_module_grants_are_checked() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [entity("22222222-2222-2222-2222-222222222222", "orders")],
        "roles": [{
            "uuid": "44444444-4444-4444-4444-444444444444",
            "name": "editor",
            "entities": [{
                "entity": "22222222-2222-2222-2222-222222222222",
                "attributes": [2, 77]
            }],
            "transactions": []
        }]
    }));
    let err = context.check().unwrap_err();
    assert!(err.to_string().contains("Unknown column number 77"), "{}", err);
}

#[test]
fn real_typed_key_is_rejected() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [{
            "uuid": "22222222-2222-2222-2222-222222222222",
            "name": "orders",
            "keys": [{"id": 1, "name": "id", "type": "Real"}],
            "attributes": []
        }]
    }));
    assert!(context.check().is_err());
}

#[test]
fn entity_transaction_footprints_are_recomputed() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [entity("22222222-2222-2222-2222-222222222222", "orders")],
        "transactions": [{
            "uuid": "33333333-3333-3333-3333-333333333333",
            "name": "addOrder",
            "entities": [{
                "entity": "22222222-2222-2222-2222-222222222222",
                "add": true,
                "remove": false,
                "update": [2]
            }],
            "pre": "return 0",
            "post": ""
        }]
    }));
    let footprint =
        context.transactions_for_entity(&"22222222-2222-2222-2222-222222222222".parse().unwrap());
    assert_eq!(footprint.len(), 1);
    assert_eq!(footprint[0].name, "addOrder");
    assert!(footprint[0].add);
    assert!(!footprint[0].remove);
    assert!(footprint[0].update.contains(&2));
}

#[test]
fn entity_lookup_is_case_insensitive() {
    let context = parse(json!({
        "uuid": "11111111-1111-1111-1111-111111111111",
        "name": "X",
        "entities": [entity("22222222-2222-2222-2222-222222222222", "Orders")]
    }));
    assert!(context.entity_by_name("orders").is_some());
    assert!(context.entity_by_name("ORDERS").is_some());
}
