//! Headers, changes and delivery watermarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Row operation tags, matching the SQLite session opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    Delete = 9,
    Insert = 18,
    Update = 23,
}

impl Operation {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            9 => Some(Self::Delete),
            18 => Some(Self::Insert),
            23 => Some(Self::Update),
            _ => None,
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = u8::deserialize(deserializer)?;
        Self::from_tag(tag)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown operation {}", tag)))
    }
}

/// One committed transaction: a header row plus its ordered changes.
///
/// Changes are persisted under their own keys and carried here in memory;
/// the stored header document does not embed them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "iddataset")]
    pub id_dataset: u32,
    #[serde(rename = "idheader")]
    pub id_header: u32,
    /// Transaction name as sent by the client; resolved against the schema
    /// at ingestion time.
    #[serde(rename = "transactionname", default)]
    pub transaction_name: String,
    #[serde(rename = "transaction")]
    pub transaction_uuid: Uuid,
    /// Originating server identity.
    pub node: u32,
    /// Originating session node id.
    #[serde(rename = "idnode")]
    pub id_node: u32,
    pub status: u8,
    pub date: DateTime<Utc>,
    #[serde(skip)]
    pub changes: Vec<Change>,
}

/// One row operation against one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "iddataset")]
    pub id_dataset: u32,
    #[serde(rename = "idheader")]
    pub id_header: u32,
    #[serde(rename = "idchange")]
    pub id_change: u16,
    pub operation: Operation,
    #[serde(rename = "entity")]
    pub entity_uuid: Uuid,
    /// Binary-encoded primary key after the operation (empty for deletes).
    #[serde(rename = "key", with = "super::b64")]
    pub new_pk: Vec<u8>,
    /// Binary-encoded primary key before an update or delete.
    #[serde(rename = "old", with = "super::b64")]
    pub old_pk: Vec<u8>,
    /// Binary-encoded row image after the operation.
    #[serde(rename = "data", with = "super::b64")]
    pub new_data: Vec<u8>,
}

/// Per-node per-dataset delivery progress: the last header fully delivered
/// and the last change within it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Downloaded {
    #[serde(rename = "idheader")]
    pub id_header: u32,
    #[serde(rename = "idcell")]
    pub id_cell: u32,
}
