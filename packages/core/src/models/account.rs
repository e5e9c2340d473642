//! User and developer accounts.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// How a user authenticates. Serialized as its underlying integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    Internal,
    Google,
    Unknown,
}

impl UserType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "internal" => Self::Internal,
            "google" => Self::Google,
            _ => Self::Unknown,
        }
    }

    fn as_i64(self) -> i64 {
        match self {
            Self::Internal => 0,
            Self::Google => 1,
            Self::Unknown => 10000,
        }
    }

    fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::Internal,
            1 => Self::Google,
            _ => Self::Unknown,
        }
    }
}

impl Serialize for UserType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for UserType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_i64(i64::deserialize(deserializer)?))
    }
}

/// A per-context account. The identifier is an e-mail address for internal
/// users or the federated subject claim for external ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub uuid: Uuid,
    pub identifier: String,
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    #[serde(with = "super::b64")]
    pub password: Vec<u8>,
    #[serde(with = "super::b64")]
    pub salt: Vec<u8>,
}

/// Administrative rights. Serialized as its underlying integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rights {
    All,
    Admin,
}

impl Serialize for Rights {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(match self {
            Self::All => 0,
            Self::Admin => 1,
        })
    }
}

impl<'de> Deserialize<'de> for Rights {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i64::deserialize(deserializer)? {
            0 => Ok(Self::All),
            1 => Ok(Self::Admin),
            other => Err(serde::de::Error::custom(format!(
                "unknown rights value {}",
                other
            ))),
        }
    }
}

/// A global administrator account, admitted over HTTP Basic for schema and
/// user administration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Developer {
    pub identifier: String,
    pub name: String,
    #[serde(with = "super::b64")]
    pub password: Vec<u8>,
    #[serde(with = "super::b64")]
    pub salt: Vec<u8>,
    pub rights: Rights,
}
