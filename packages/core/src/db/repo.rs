//! Document repositories over the key scheme.
//!
//! Each entity kind stores one JSON document per key. Functions take any
//! [`Kv`] so the same read and write paths work both against the bare store
//! and inside an open transaction (where reads lock their keys).

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Change, Dataset, Developer, Downloaded, Header, Member, Node, Push, User};

use super::{keys, Store, StoreError, StoreTxn, DEFAULT_CONTEXT};

/// Common surface of [`Store`] and [`StoreTxn`].
pub trait Kv {
    fn put(&self, key: &[u8], value: &[u8], context: &str) -> Result<(), StoreError>;
    fn get(&self, key: &[u8], context: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn delete(&self, key: &[u8], context: &str) -> Result<(), StoreError>;
}

impl Kv for Store {
    fn put(&self, key: &[u8], value: &[u8], context: &str) -> Result<(), StoreError> {
        Store::put(self, key, value, context)
    }

    fn get(&self, key: &[u8], context: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Store::get(self, key, context)
    }

    fn delete(&self, key: &[u8], context: &str) -> Result<(), StoreError> {
        Store::delete(self, key, context)
    }
}

impl Kv for StoreTxn<'_> {
    fn put(&self, key: &[u8], value: &[u8], context: &str) -> Result<(), StoreError> {
        StoreTxn::put(self, key, value, context)
    }

    fn get(&self, key: &[u8], context: &str) -> Result<Option<Vec<u8>>, StoreError> {
        StoreTxn::get(self, key, context)
    }

    fn delete(&self, key: &[u8], context: &str) -> Result<(), StoreError> {
        StoreTxn::delete(self, key, context)
    }
}

fn save<T: Serialize>(
    kv: &impl Kv,
    key: &[u8],
    value: &T,
    context: &str,
) -> Result<(), StoreError> {
    kv.put(key, serde_json::to_vec(value)?.as_slice(), context)
}

fn load<T: DeserializeOwned>(
    kv: &impl Kv,
    key: &[u8],
    context: &str,
) -> Result<Option<T>, StoreError> {
    match kv.get(key, context)? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

/// Allocate the next value of a monotone counter key. Callers must run this
/// inside a transaction so the read lock serializes concurrent allocations.
pub fn next_id(txn: &StoreTxn<'_>, seq_key: &[u8], context: &str) -> Result<u32, StoreError> {
    let current = match txn.get(seq_key, context)? {
        Some(raw) if raw.len() == 8 => u64::from_be_bytes(raw.as_slice().try_into().unwrap()),
        _ => 0,
    };
    let next = current + 1;
    txn.put(seq_key, &next.to_be_bytes(), context)?;
    Ok(next as u32)
}

// Session nodes (default context)

pub fn save_node(kv: &impl Kv, node: &Node) -> Result<(), StoreError> {
    save(
        kv,
        &keys::node(&node.user.uuid, &node.uuid),
        node,
        DEFAULT_CONTEXT,
    )?;
    kv.put(
        &keys::node_ix(node.id),
        keys::node(&node.user.uuid, &node.uuid).as_slice(),
        DEFAULT_CONTEXT,
    )
}

pub fn read_node(
    kv: &impl Kv,
    user_uuid: &Uuid,
    node_uuid: &Uuid,
) -> Result<Option<Node>, StoreError> {
    load(kv, &keys::node(user_uuid, node_uuid), DEFAULT_CONTEXT)
}

/// Resolve a numeric node id (the session cookie id) to its node.
pub fn read_node_by_id(kv: &impl Kv, id: u32) -> Result<Option<Node>, StoreError> {
    match kv.get(&keys::node_ix(id), DEFAULT_CONTEXT)? {
        Some(primary) => match kv.get(&primary, DEFAULT_CONTEXT)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        },
        None => Ok(None),
    }
}

pub fn remove_node(kv: &impl Kv, node: &Node) -> Result<(), StoreError> {
    kv.delete(&keys::node(&node.user.uuid, &node.uuid), DEFAULT_CONTEXT)?;
    kv.delete(&keys::node_ix(node.id), DEFAULT_CONTEXT)
}

/// All session nodes of one user, via a prefix scan on the primary keys.
pub fn read_nodes_of_user(store: &Store, user_uuid: &Uuid) -> Result<Vec<Node>, StoreError> {
    let prefix = format!("N.{}", user_uuid.hyphenated());
    let mut nodes = Vec::new();
    for (_, raw) in store.scan_prefix(prefix.as_bytes(), DEFAULT_CONTEXT)? {
        nodes.push(serde_json::from_slice(&raw)?);
    }
    Ok(nodes)
}

// Users (per context), with a uuid secondary index

pub fn save_user(kv: &impl Kv, user: &User, context: &str) -> Result<(), StoreError> {
    save(kv, &keys::user(&user.identifier), user, context)?;
    kv.put(
        &keys::user_ix(&user.uuid),
        user.identifier.as_bytes(),
        context,
    )
}

pub fn read_user(kv: &impl Kv, identifier: &str, context: &str) -> Result<Option<User>, StoreError> {
    load(kv, &keys::user(identifier), context)
}

pub fn read_user_by_uuid(
    kv: &impl Kv,
    uuid: &Uuid,
    context: &str,
) -> Result<Option<User>, StoreError> {
    match kv.get(&keys::user_ix(uuid), context)? {
        Some(identifier) => read_user(kv, &String::from_utf8_lossy(&identifier), context),
        None => Ok(None),
    }
}

pub fn list_users(store: &Store, context: &str) -> Result<Vec<User>, StoreError> {
    let mut users = Vec::new();
    for (key, raw) in store.scan_prefix(keys::USER_PREFIX, context)? {
        if key.starts_with(keys::USER_IX_PREFIX) {
            continue;
        }
        users.push(serde_json::from_slice(&raw)?);
    }
    Ok(users)
}

pub fn remove_user(kv: &impl Kv, uuid: &Uuid, context: &str) -> Result<(), StoreError> {
    if let Some(identifier) = kv.get(&keys::user_ix(uuid), context)? {
        kv.delete(&keys::user(&String::from_utf8_lossy(&identifier)), context)?;
        kv.delete(&keys::user_ix(uuid), context)?;
    }
    Ok(())
}

// Developers (default context, bare identifier keys)

pub fn save_developer(kv: &impl Kv, developer: &Developer) -> Result<(), StoreError> {
    save(
        kv,
        &keys::developer(&developer.identifier),
        developer,
        DEFAULT_CONTEXT,
    )
}

pub fn read_developer(kv: &impl Kv, identifier: &str) -> Result<Option<Developer>, StoreError> {
    load(kv, &keys::developer(identifier), DEFAULT_CONTEXT)
}

// Datasets, with a numeric-id secondary index

pub fn save_dataset(kv: &impl Kv, dataset: &Dataset, context: &str) -> Result<(), StoreError> {
    save(kv, &keys::dataset(&dataset.uuid), dataset, context)?;
    kv.put(
        &keys::dataset_ix(dataset.id),
        dataset.uuid.hyphenated().to_string().as_bytes(),
        context,
    )
}

pub fn read_dataset(kv: &impl Kv, uuid: &Uuid, context: &str) -> Result<Option<Dataset>, StoreError> {
    load(kv, &keys::dataset(uuid), context)
}

pub fn read_dataset_by_id(
    kv: &impl Kv,
    id: u32,
    context: &str,
) -> Result<Option<Dataset>, StoreError> {
    match kv.get(&keys::dataset_ix(id), context)? {
        Some(raw) => {
            let uuid = Uuid::parse_str(&String::from_utf8_lossy(&raw))
                .map_err(|e| StoreError::TransactionFailed(format!("corrupt dataset index: {}", e)))?;
            read_dataset(kv, &uuid, context)
        }
        None => Ok(None),
    }
}

pub fn remove_dataset(kv: &impl Kv, dataset: &Dataset, context: &str) -> Result<(), StoreError> {
    kv.delete(&keys::dataset(&dataset.uuid), context)?;
    kv.delete(&keys::dataset_ix(dataset.id), context)
}

// Members

pub fn save_member(kv: &impl Kv, member: &Member, context: &str) -> Result<(), StoreError> {
    save(
        kv,
        &keys::member(member.id_dataset, &member.id_user),
        member,
        context,
    )
}

pub fn read_member(
    kv: &impl Kv,
    dataset_id: u32,
    user_uuid: &Uuid,
    context: &str,
) -> Result<Option<Member>, StoreError> {
    load(kv, &keys::member(dataset_id, user_uuid), context)
}

pub fn list_members(store: &Store, dataset_id: u32, context: &str) -> Result<Vec<Member>, StoreError> {
    let mut members = Vec::new();
    for (_, raw) in store.scan_prefix(&keys::member_prefix(dataset_id), context)? {
        members.push(serde_json::from_slice(&raw)?);
    }
    Ok(members)
}

pub fn remove_member(
    kv: &impl Kv,
    dataset_id: u32,
    user_uuid: &Uuid,
    context: &str,
) -> Result<(), StoreError> {
    kv.delete(&keys::member(dataset_id, user_uuid), context)
}

/// Datasets a user belongs to, resolved through the member rows.
pub fn read_datasets_of_user(
    store: &Store,
    user_uuid: &Uuid,
    context: &str,
) -> Result<Vec<Dataset>, StoreError> {
    let mut datasets = Vec::new();
    for (_, raw) in store.scan_prefix(b"M.", context)? {
        let member: Member = serde_json::from_slice(&raw)?;
        if &member.id_user == user_uuid && member.status == 1 {
            if let Some(dataset) = read_dataset_by_id(store, member.id_dataset, context)? {
                datasets.push(dataset);
            }
        }
    }
    Ok(datasets)
}

// Pushes

pub fn save_push(kv: &impl Kv, push: &Push, context: &str) -> Result<(), StoreError> {
    save(kv, &keys::push(push.id_dataset, &push.uuid), push, context)
}

pub fn read_push(
    kv: &impl Kv,
    dataset_id: u32,
    uuid: &Uuid,
    context: &str,
) -> Result<Option<Push>, StoreError> {
    load(kv, &keys::push(dataset_id, uuid), context)
}

pub fn list_pushes(store: &Store, dataset_id: u32, context: &str) -> Result<Vec<Push>, StoreError> {
    let mut pushes = Vec::new();
    for (_, raw) in store.scan_prefix(&keys::push_prefix(dataset_id), context)? {
        pushes.push(serde_json::from_slice(&raw)?);
    }
    Ok(pushes)
}

pub fn remove_push(
    kv: &impl Kv,
    dataset_id: u32,
    uuid: &Uuid,
    context: &str,
) -> Result<(), StoreError> {
    kv.delete(&keys::push(dataset_id, uuid), context)
}

// Headers and changes

pub fn save_header(kv: &impl Kv, header: &Header, context: &str) -> Result<(), StoreError> {
    save(
        kv,
        &keys::header(header.id_dataset, header.id_header),
        header,
        context,
    )
}

/// Headers of a dataset with id greater than `since`, in id order.
pub fn read_headers_from(
    store: &Store,
    dataset_id: u32,
    since: u32,
    context: &str,
) -> Result<Vec<Header>, StoreError> {
    let start = keys::header(dataset_id, since + 1);
    let prefix = keys::header_prefix(dataset_id);
    let mut headers = Vec::new();
    for (_, raw) in store.scan_from(&start, &prefix, context)? {
        headers.push(serde_json::from_slice(&raw)?);
    }
    Ok(headers)
}

pub fn save_change(kv: &impl Kv, change: &Change, context: &str) -> Result<(), StoreError> {
    save(
        kv,
        &keys::change(change.id_dataset, change.id_header, change.id_change),
        change,
        context,
    )
}

/// All changes of one header, in change-id order.
pub fn read_changes(
    store: &Store,
    dataset_id: u32,
    header_id: u32,
    context: &str,
) -> Result<Vec<Change>, StoreError> {
    let mut changes = Vec::new();
    for (_, raw) in store.scan_prefix(&keys::change_prefix(dataset_id, header_id), context)? {
        changes.push(serde_json::from_slice(&raw)?);
    }
    Ok(changes)
}

// Downloaded watermarks

pub fn save_watermark(
    kv: &impl Kv,
    node_uuid: &Uuid,
    dataset_id: u32,
    mark: Downloaded,
    context: &str,
) -> Result<(), StoreError> {
    save(kv, &keys::downloaded(node_uuid, dataset_id), &mark, context)
}

pub fn read_watermark(
    kv: &impl Kv,
    node_uuid: &Uuid,
    dataset_id: u32,
    context: &str,
) -> Result<Downloaded, StoreError> {
    Ok(load(kv, &keys::downloaded(node_uuid, dataset_id), context)?.unwrap_or_default())
}

// Entity row images, keyed by binary-encoded primary key

pub fn put_row(
    kv: &impl Kv,
    dataset_id: u32,
    entity_uuid: &Uuid,
    pk: &[u8],
    data: &[u8],
    context: &str,
) -> Result<(), StoreError> {
    kv.put(&keys::row(dataset_id, entity_uuid, pk), data, context)
}

pub fn get_row(
    kv: &impl Kv,
    dataset_id: u32,
    entity_uuid: &Uuid,
    pk: &[u8],
    context: &str,
) -> Result<Option<Vec<u8>>, StoreError> {
    kv.get(&keys::row(dataset_id, entity_uuid, pk), context)
}

pub fn delete_row(
    kv: &impl Kv,
    dataset_id: u32,
    entity_uuid: &Uuid,
    pk: &[u8],
    context: &str,
) -> Result<(), StoreError> {
    kv.delete(&keys::row(dataset_id, entity_uuid, pk), context)
}

/// All `(pk, row)` images of one entity in one dataset.
pub fn scan_rows(
    store: &Store,
    dataset_id: u32,
    entity_uuid: &Uuid,
    context: &str,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
    let prefix = keys::row_prefix(dataset_id, entity_uuid);
    let mut rows = Vec::new();
    for (key, value) in store.scan_prefix(&prefix, context)? {
        rows.push((key[prefix.len()..].to_vec(), value));
    }
    Ok(rows)
}
