//! Key scheme for the ordered key space.
//!
//! Every entity kind gets an ASCII prefix so keys stay grep-friendly:
//!
//! ```text
//! N.<userUuid><nodeUuid>      session node
//! N.SEQ                       node id counter (default context)
//! N.IX.<id8>                  numeric node id -> primary node key
//! U.<identifier>              user by identifier
//! U.IX.<uuid>                 user uuid -> identifier
//! D.<datasetUuid>             dataset
//! D.SEQ                       dataset id counter (per context)
//! D.IX.<id8>                  numeric dataset id -> dataset uuid
//! M.<id8><userUuid>           dataset member
//! H.<id8><id8>                header (dataset id, header id)
//! C.<id8><id8><id8>           change (dataset id, header id, change id)
//! P.<id8><pushUuid>           push invitation
//! d.<nodeUuid><id8>           downloaded watermark
//! E.<id8><entityUuid><pk>     entity row image
//! Schema / Schema.<v>         schema draft and frozen versions
//! ```
//!
//! `<id8>` is the numeric id as eight big-endian bytes, so lexicographic
//! scan order equals numeric order. UUIDs appear in their 36-char lowercase
//! hyphenated form.

use uuid::Uuid;

pub const NODE_SEQ: &[u8] = b"N.SEQ";
pub const DATASET_SEQ: &[u8] = b"D.SEQ";
pub const SCHEMA: &[u8] = b"Schema";
pub const SCHEMA_VERSION_PREFIX: &str = "Schema.";

fn id8(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn uuid_str(uuid: &Uuid) -> String {
    uuid.hyphenated().to_string()
}

pub fn node(user_uuid: &Uuid, node_uuid: &Uuid) -> Vec<u8> {
    format!("N.{}{}", uuid_str(user_uuid), uuid_str(node_uuid)).into_bytes()
}

pub fn node_ix(id: u32) -> Vec<u8> {
    let mut key = b"N.IX.".to_vec();
    key.extend_from_slice(&id8(id as u64));
    key
}

pub fn user(identifier: &str) -> Vec<u8> {
    format!("U.{}", identifier).into_bytes()
}

pub const USER_PREFIX: &[u8] = b"U.";
pub const USER_IX_PREFIX: &[u8] = b"U.IX.";

pub fn user_ix(uuid: &Uuid) -> Vec<u8> {
    format!("U.IX.{}", uuid_str(uuid)).into_bytes()
}

pub fn dataset(uuid: &Uuid) -> Vec<u8> {
    format!("D.{}", uuid_str(uuid)).into_bytes()
}

pub fn dataset_ix(id: u32) -> Vec<u8> {
    let mut key = b"D.IX.".to_vec();
    key.extend_from_slice(&id8(id as u64));
    key
}

pub fn member(dataset_id: u32, user_uuid: &Uuid) -> Vec<u8> {
    let mut key = b"M.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key.extend_from_slice(uuid_str(user_uuid).as_bytes());
    key
}

pub fn member_prefix(dataset_id: u32) -> Vec<u8> {
    let mut key = b"M.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key
}

pub fn header(dataset_id: u32, header_id: u32) -> Vec<u8> {
    let mut key = b"H.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key.extend_from_slice(&id8(header_id as u64));
    key
}

pub fn header_prefix(dataset_id: u32) -> Vec<u8> {
    let mut key = b"H.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key
}

pub fn change(dataset_id: u32, header_id: u32, change_id: u16) -> Vec<u8> {
    let mut key = b"C.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key.extend_from_slice(&id8(header_id as u64));
    key.extend_from_slice(&id8(change_id as u64));
    key
}

pub fn change_prefix(dataset_id: u32, header_id: u32) -> Vec<u8> {
    let mut key = b"C.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key.extend_from_slice(&id8(header_id as u64));
    key
}

pub fn change_dataset_prefix(dataset_id: u32) -> Vec<u8> {
    let mut key = b"C.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key
}

pub fn push(dataset_id: u32, uuid: &Uuid) -> Vec<u8> {
    let mut key = b"P.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key.extend_from_slice(uuid_str(uuid).as_bytes());
    key
}

pub fn push_prefix(dataset_id: u32) -> Vec<u8> {
    let mut key = b"P.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key
}

pub fn downloaded(node_uuid: &Uuid, dataset_id: u32) -> Vec<u8> {
    let mut key = format!("d.{}", uuid_str(node_uuid)).into_bytes();
    key.extend_from_slice(&id8(dataset_id as u64));
    key
}

pub fn row(dataset_id: u32, entity_uuid: &Uuid, pk: &[u8]) -> Vec<u8> {
    let mut key = row_prefix(dataset_id, entity_uuid);
    key.extend_from_slice(pk);
    key
}

pub fn row_prefix(dataset_id: u32, entity_uuid: &Uuid) -> Vec<u8> {
    let mut key = b"E.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key.extend_from_slice(uuid_str(entity_uuid).as_bytes());
    key
}

pub fn row_dataset_prefix(dataset_id: u32) -> Vec<u8> {
    let mut key = b"E.".to_vec();
    key.extend_from_slice(&id8(dataset_id as u64));
    key
}

pub fn schema_version(version: u32) -> Vec<u8> {
    format!("{}{}", SCHEMA_VERSION_PREFIX, version).into_bytes()
}

/// Developer documents are stored under their bare identifier in the default
/// context, matching the administrative bootstrap layout.
pub fn developer(identifier: &str) -> Vec<u8> {
    identifier.as_bytes().to_vec()
}
