//! Session nodes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::User;

/// One authenticated client session. A user may hold many nodes, one per
/// device and module; the node pins the schema version that client build
/// understands.
///
/// Created at sign-in, destroyed at sign-out or session revocation. Keyed in
/// the default context under `N.<userUuid><nodeUuid>`, with the numeric `id`
/// (the value in the session cookie) indexed under `N.IX.<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: u32,
    pub user: User,
    /// Session key, 16 random bytes.
    #[serde(with = "super::b64")]
    pub key: Vec<u8>,
    /// Per-node key material presented by the client device.
    #[serde(rename = "nodekey")]
    pub node_key: String,
    /// Context uuid this session belongs to.
    pub context: Uuid,
    /// Module the client build was compiled against.
    pub module: Uuid,
    pub uuid: Uuid,
    /// Schema version the client is pinned to. Zero means the current draft.
    pub version: u32,
}
