//! Integration tests for header ingestion and fan-out.
//!
//! Each test stands up a real store in a temp directory, a schema with one
//! `orders` entity, and signed-in session nodes, then drives the engine the
//! way the TCP adapter does.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use beehive_core::codec::{BinaryRecord, Value};
use beehive_core::db::repo;
use beehive_core::models::{Change, Dataset, Header, Member, Node, Operation, UserType};
use beehive_core::services::{beehive_hash, ApplyCode, ServiceError, SessionRequest};
use beehive_core::{
    DatasetService, FederatedKeys, SchemaService, Store, SyncService, UserService,
};

const CTX: &str = "11111111-1111-1111-1111-111111111111";
const ORDERS: &str = "22222222-2222-2222-2222-222222222222";
const TXN_ADD: &str = "33333333-3333-3333-3333-333333333333";
const TXN_GUARDED: &str = "44444444-4444-4444-4444-444444444444";
const TXN_AUDITED: &str = "55555555-5555-5555-5555-555555555555";
const AUDIT: &str = "66666666-6666-6666-6666-666666666666";
const ROLE_OWNER: &str = "77777777-7777-7777-7777-777777777777";
const ROLE_LIMITED: &str = "88888888-8888-8888-8888-888888888888";
const MODULE_FULL: &str = "99999999-9999-9999-9999-999999999999";

struct Harness {
    _temp: TempDir,
    store: Arc<Store>,
    schemas: Arc<SchemaService>,
    users: Arc<UserService>,
    datasets: Arc<DatasetService>,
    sync: Arc<SyncService>,
}

fn schema_document() -> serde_json::Value {
    json!({
        "uuid": CTX,
        "name": "shop",
        "defaultrole": ROLE_OWNER,
        "version": 1,
        "entities": [
            {
                "uuid": ORDERS,
                "name": "orders",
                "keys": [{"id": 1, "name": "id", "type": "Integer"}],
                "attributes": [
                    {"id": 2, "name": "amount", "type": "Integer", "notnull": true, "check": "value >= 0"},
                    {"id": 3, "name": "note", "type": "Text"}
                ]
            },
            {
                "uuid": AUDIT,
                "name": "audit",
                "keys": [{"id": 1, "name": "id", "type": "Integer"}],
                "attributes": [{"id": 2, "name": "note", "type": "Text"}]
            }
        ],
        "transactions": [
            {
                "uuid": TXN_ADD,
                "name": "addOrder",
                "entities": [{"entity": ORDERS, "add": true, "remove": true, "update": [2, 3]}],
                "pre": "return 0",
                "post": ""
            },
            {
                "uuid": TXN_GUARDED,
                "name": "guardedOrder",
                "entities": [{"entity": ORDERS, "add": true, "remove": false, "update": []}],
                "pre": "return 1",
                "post": ""
            },
            {
                "uuid": TXN_AUDITED,
                "name": "auditedOrder",
                "entities": [
                    {"entity": ORDERS, "add": true, "remove": false, "update": []},
                    {"entity": AUDIT, "add": true, "remove": false, "update": []}
                ],
                "pre": "return 0",
                "post": "save(\"audit\", {id = 1, note = \"recorded\"})"
            }
        ],
        "roles": [
            {
                "uuid": ROLE_OWNER,
                "name": "owner",
                "readmembers": true, "managemembers": true, "reademail": true,
                "sharedataset": true, "manageshare": true,
                "entities": [
                    {"entity": ORDERS, "attributes": [2, 3]},
                    {"entity": AUDIT, "attributes": [2]}
                ],
                "transactions": ["addOrder", "guardedOrder", "auditedOrder"]
            },
            {
                "uuid": ROLE_LIMITED,
                "name": "limited",
                "entities": [{"entity": ORDERS, "attributes": [2]}],
                "transactions": []
            }
        ],
        "modules": [
            {
                "uuid": MODULE_FULL,
                "name": "full",
                "entities": [
                    {"entity": ORDERS, "attributes": [2, 3]},
                    {"entity": AUDIT, "attributes": [2]}
                ]
            }
        ]
    })
}

fn harness() -> Harness {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(Store::open(temp.path().join("db")).unwrap());
    UserService::check_admin(&store).unwrap();
    let federated = Arc::new(FederatedKeys::new(None, None));
    let schemas = Arc::new(SchemaService::new(store.clone()));
    let users = Arc::new(UserService::new(store.clone(), federated));
    let datasets = Arc::new(DatasetService::new(store.clone()));
    let sync = Arc::new(SyncService::new(
        store.clone(),
        schemas.clone(),
        datasets.clone(),
        beehive_hash("beehive"),
    ));

    schemas
        .post_context(&schema_document().to_string())
        .unwrap();

    Harness {
        _temp: temp,
        store,
        schemas,
        users,
        datasets,
        sync,
    }
}

impl Harness {
    fn sign_in_user(&self, email: &str) -> Node {
        self.users
            .save_user(email, email, "hunter2", UserType::Internal, CTX)
            .unwrap();
        self.users
            .sign_in(
                email,
                "hunter2",
                &SessionRequest {
                    node_key: String::new(),
                    node_uuid: Uuid::new_v4(),
                    module: MODULE_FULL.parse().unwrap(),
                    version: 0,
                },
                CTX,
            )
            .unwrap()
    }

    fn dataset_for(&self, node: &Node) -> Dataset {
        let schema = self.schemas.load(CTX, 0).unwrap();
        self.datasets
            .add_dataset(&schema, &node.user, Uuid::new_v4(), CTX)
            .unwrap()
    }

    fn enroll(&self, node: &Node, dataset_id: u32, role: &str) {
        let member = Member {
            id_dataset: dataset_id,
            id_user: node.user.uuid,
            role: role.parse().unwrap(),
            name: node.user.name.clone(),
            email: node.user.identifier.clone(),
            status: 1,
        };
        repo::save_member(self.store.as_ref(), &member, CTX).unwrap();
    }
}

fn pk(id: i64) -> Vec<u8> {
    let mut record = BinaryRecord::new();
    record.insert(1, Value::Integer(id));
    record.encode().unwrap()
}

fn order_data(amount: i64, note: &str) -> Vec<u8> {
    let mut record = BinaryRecord::new();
    record.insert(2, Value::Integer(amount));
    record.insert(3, Value::Text(note.to_string()));
    record.encode().unwrap()
}

fn insert_order(dataset_id: u32, id: i64, amount: i64, note: &str) -> Change {
    Change {
        id_dataset: dataset_id,
        id_header: 0,
        id_change: 0,
        operation: Operation::Insert,
        entity_uuid: ORDERS.parse().unwrap(),
        new_pk: pk(id),
        old_pk: Vec::new(),
        new_data: order_data(amount, note),
    }
}

fn header(dataset_id: u32, transaction: &str, changes: Vec<Change>) -> Header {
    Header {
        id_dataset: dataset_id,
        id_header: 0,
        transaction_name: transaction.to_string(),
        transaction_uuid: Uuid::nil(),
        node: 0,
        id_node: 0,
        status: 0,
        date: Utc::now(),
        changes,
    }
}

#[test]
fn apply_header_advances_the_dataset() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    // Pre-position the header stream at 5.
    let mut seeded = dataset.clone();
    seeded.id_header = 5;
    repo::save_dataset(h.store.as_ref(), &seeded, CTX).unwrap();

    let mut incoming = header(dataset.id, "addOrder", vec![insert_order(dataset.id, 1, 10, "first")]);
    let code = h.sync.apply_header(&owner, &mut incoming).unwrap();
    assert_eq!(code, ApplyCode::Success);
    assert_eq!(incoming.id_header, 6);

    let stored = repo::read_dataset(h.store.as_ref(), &dataset.uuid, CTX)
        .unwrap()
        .unwrap();
    assert_eq!(stored.id_header, 6);

    // A peer pulling after 5 sees exactly the new header.
    let peer = h.sign_in_user("peer@example.com");
    h.enroll(&peer, dataset.id, ROLE_OWNER);
    let headers = h.sync.read_headers(&peer, dataset.id, 5).unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].id_header, 6);
    assert_eq!(headers[0].transaction_uuid, TXN_ADD.parse().unwrap());
}

#[test]
fn header_ids_are_dense_and_monotone() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    for i in 1..=4i64 {
        let mut incoming = header(
            dataset.id,
            "addOrder",
            vec![insert_order(dataset.id, i, 10 * i, "x")],
        );
        assert_eq!(
            h.sync.apply_header(&owner, &mut incoming).unwrap(),
            ApplyCode::Success
        );
        assert_eq!(incoming.id_header, i as u32);
    }

    let headers = h.sync.read_headers(&owner, dataset.id, 0).unwrap();
    let ids: Vec<u32> = headers.iter().map(|hd| hd.id_header).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn duplicate_insert_is_rejected_and_rolls_back() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    let mut first = header(dataset.id, "addOrder", vec![insert_order(dataset.id, 1, 10, "a")]);
    assert_eq!(
        h.sync.apply_header(&owner, &mut first).unwrap(),
        ApplyCode::Success
    );

    // Second header: one valid insert then a duplicated key. Nothing of it
    // may survive.
    let mut second = header(
        dataset.id,
        "addOrder",
        vec![
            insert_order(dataset.id, 2, 20, "b"),
            insert_order(dataset.id, 1, 30, "dup"),
        ],
    );
    assert_eq!(
        h.sync.apply_header(&owner, &mut second).unwrap(),
        ApplyCode::DuplicatedEntity
    );

    let stored = repo::read_dataset(h.store.as_ref(), &dataset.uuid, CTX)
        .unwrap()
        .unwrap();
    assert_eq!(stored.id_header, 1);
    let rows = repo::scan_rows(
        h.store.as_ref(),
        dataset.id,
        &ORDERS.parse().unwrap(),
        CTX,
    )
    .unwrap();
    assert_eq!(rows.len(), 1, "only the first header's row may exist");
}

#[test]
fn update_and_delete_require_existing_rows() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    let mut missing_update = header(
        dataset.id,
        "addOrder",
        vec![Change {
            id_dataset: dataset.id,
            id_header: 0,
            id_change: 0,
            operation: Operation::Update,
            entity_uuid: ORDERS.parse().unwrap(),
            new_pk: pk(9),
            old_pk: pk(9),
            new_data: order_data(5, "nope"),
        }],
    );
    assert_eq!(
        h.sync.apply_header(&owner, &mut missing_update).unwrap(),
        ApplyCode::EntityNotFound
    );

    let mut missing_delete = header(
        dataset.id,
        "addOrder",
        vec![Change {
            id_dataset: dataset.id,
            id_header: 0,
            id_change: 0,
            operation: Operation::Delete,
            entity_uuid: ORDERS.parse().unwrap(),
            new_pk: Vec::new(),
            old_pk: pk(9),
            new_data: Vec::new(),
        }],
    );
    assert_eq!(
        h.sync.apply_header(&owner, &mut missing_delete).unwrap(),
        ApplyCode::EntityNotFound
    );
}

#[test]
fn check_expressions_guard_incoming_rows() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    let mut negative = header(
        dataset.id,
        "addOrder",
        vec![insert_order(dataset.id, 1, -5, "bad")],
    );
    assert_eq!(
        h.sync.apply_header(&owner, &mut negative).unwrap(),
        ApplyCode::NotValidIncomeData
    );
}

#[test]
fn unwhitelisted_transaction_is_refused() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    // The role whitelist is consulted before the definition lookup, so a
    // name the role does not grant is a rights failure.
    let mut unknown = header(dataset.id, "vanished", vec![]);
    assert!(matches!(
        h.sync.apply_header(&owner, &mut unknown),
        Err(ServiceError::NotEnoughRights(_))
    ));
}

#[test]
fn pre_script_rejection_keeps_the_store_untouched() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    let mut incoming = header(
        dataset.id,
        "guardedOrder",
        vec![insert_order(dataset.id, 1, 10, "x")],
    );
    assert_eq!(
        h.sync.apply_header(&owner, &mut incoming).unwrap(),
        ApplyCode::UserValidation
    );

    let stored = repo::read_dataset(h.store.as_ref(), &dataset.uuid, CTX)
        .unwrap()
        .unwrap();
    assert_eq!(stored.id_header, 0);
    let rows = repo::scan_rows(h.store.as_ref(), dataset.id, &ORDERS.parse().unwrap(), CTX)
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn post_script_writes_join_the_header() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    let mut incoming = header(
        dataset.id,
        "auditedOrder",
        vec![insert_order(dataset.id, 1, 10, "x")],
    );
    // A post-script transformation joined the header, so the apply reports
    // approved rather than plain success.
    assert_eq!(
        h.sync.apply_header(&owner, &mut incoming).unwrap(),
        ApplyCode::Approved
    );
    assert_eq!(incoming.changes.len(), 2);
    assert_eq!(incoming.changes[0].id_change, 1);
    assert_eq!(incoming.changes[1].id_change, 2);
    assert_eq!(incoming.changes[1].entity_uuid, AUDIT.parse().unwrap());

    let audit_rows = repo::scan_rows(h.store.as_ref(), dataset.id, &AUDIT.parse().unwrap(), CTX)
        .unwrap();
    assert_eq!(audit_rows.len(), 1);

    let changes = repo::read_changes(h.store.as_ref(), dataset.id, 1, CTX).unwrap();
    assert_eq!(changes.len(), 2);
}

#[test]
fn fanout_projects_attributes_through_the_role() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    let mut incoming = header(
        dataset.id,
        "addOrder",
        vec![insert_order(dataset.id, 1, 10, "secret note")],
    );
    assert_eq!(
        h.sync.apply_header(&owner, &mut incoming).unwrap(),
        ApplyCode::Success
    );

    let limited = h.sign_in_user("limited@example.com");
    h.enroll(&limited, dataset.id, ROLE_LIMITED);

    let changes = h.sync.read_changes(&limited, dataset.id, 1).unwrap();
    assert_eq!(changes.len(), 1);
    let data = BinaryRecord::decode(&changes[0].new_data).unwrap();
    assert_eq!(data.get(2), Some(&Value::Integer(10)));
    assert_eq!(data.get(3), None, "note must be stripped");

    // The full-visibility owner still sees both attributes.
    let changes = h.sync.read_changes(&owner, dataset.id, 1).unwrap();
    let data = BinaryRecord::decode(&changes[0].new_data).unwrap();
    assert_eq!(data.get(3), Some(&Value::Text("secret note".to_string())));
}

#[test]
fn watermark_shrinks_the_pending_set() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    for i in 1..=3i64 {
        let mut incoming = header(
            dataset.id,
            "addOrder",
            vec![insert_order(dataset.id, i, 1, "x")],
        );
        h.sync.apply_header(&owner, &mut incoming).unwrap();
    }

    let peer = h.sign_in_user("peer@example.com");
    h.enroll(&peer, dataset.id, ROLE_OWNER);

    assert_eq!(h.sync.read_headers(&peer, dataset.id, 0).unwrap().len(), 3);

    h.sync.update_watermark(&peer, dataset.id, 2, 1).unwrap();
    let pending = h.sync.read_headers(&peer, dataset.id, 0).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id_header, 3);

    h.sync.update_watermark(&peer, dataset.id, 3, 1).unwrap();
    assert!(h.sync.read_headers(&peer, dataset.id, 0).unwrap().is_empty());

    let mark = h.sync.read_watermark(&peer, dataset.id).unwrap();
    assert_eq!(mark.id_header, 3);
}

#[test]
fn non_members_cannot_read_headers() {
    let h = harness();
    let owner = h.sign_in_user("owner@example.com");
    let dataset = h.dataset_for(&owner);

    let stranger = h.sign_in_user("stranger@example.com");
    assert!(matches!(
        h.sync.read_headers(&stranger, dataset.id, 0),
        Err(ServiceError::NotEnoughRights(_))
    ));
}
