//! Datasets, members and push invitations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A shared replicated table set with a monotone header stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: u32,
    pub uuid: Uuid,
    /// Id of the last committed header; the next header gets `idheader + 1`.
    #[serde(rename = "idheader")]
    pub id_header: u32,
    /// Owning user uuid.
    pub owner: Uuid,
    pub status: u8,
}

/// Membership of one user in one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "iddataset")]
    pub id_dataset: u32,
    #[serde(rename = "iduser")]
    pub id_user: Uuid,
    pub role: Uuid,
    pub name: String,
    /// Redacted to an empty string for readers without the `reademail`
    /// capability.
    #[serde(default)]
    pub email: String,
    pub status: u8,
}

/// A shareable invitation token redeemable for dataset membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Push {
    #[serde(rename = "iddataset")]
    pub id_dataset: u32,
    pub uuid: Uuid,
    /// Role granted to members who redeem this token.
    pub role: Uuid,
    /// Expiry as seconds since the epoch.
    pub until: i64,
    /// Remaining redemptions.
    pub number: u32,
}

impl Push {
    pub fn is_expired(&self, now: i64) -> bool {
        self.until != 0 && self.until < now
    }
}
