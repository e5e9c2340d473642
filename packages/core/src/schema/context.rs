//! Context document types.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{AttributeType, NameMap};

/// A primary-key column. Key types exclude `Real` and `Null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub id: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub key_type: AttributeType,
}

/// A non-key column, optionally guarded by a check expression over the
/// single variable `value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub id: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    #[serde(default)]
    pub notnull: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
}

/// A table definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub uuid: Uuid,
    pub name: String,
    pub keys: Vec<Key>,
    pub attributes: Vec<Attribute>,
}

impl Entity {
    pub fn attribute(&self, id: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    pub fn has_attribute(&self, id: u16) -> bool {
        self.attribute(id).is_some()
    }

    pub fn keys_id_to_name(&self) -> HashMap<u16, String> {
        self.keys.iter().map(|k| (k.id, k.name.clone())).collect()
    }

    pub fn attributes_id_to_name(&self) -> HashMap<u16, String> {
        self.attributes
            .iter()
            .map(|a| (a.id, a.name.clone()))
            .collect()
    }

    pub fn keys_name_map(&self) -> NameMap {
        self.keys.iter().map(|k| (k.name.as_str(), k.id)).collect()
    }

    pub fn attributes_name_map(&self) -> NameMap {
        self.attributes
            .iter()
            .map(|a| (a.name.as_str(), a.id))
            .collect()
    }
}

/// A `(entity, attribute ids)` grant, used by both roles and modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopedAttributes {
    pub entity: Uuid,
    pub attributes: Vec<u16>,
}

/// One entity's participation in a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEntity {
    pub entity: Uuid,
    pub add: bool,
    pub remove: bool,
    pub update: Vec<u16>,
}

/// A named, scripted group of changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub uuid: Uuid,
    pub name: String,
    pub entities: Vec<TransactionEntity>,
    /// Validation hook, run read-only before changes are applied.
    pub pre: String,
    /// Commit hook, run after changes are applied; its writes join the
    /// header.
    pub post: String,
}

/// A capability set granted to dataset members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub readmembers: bool,
    #[serde(default)]
    pub managemembers: bool,
    #[serde(default)]
    pub reademail: bool,
    #[serde(default)]
    pub sharedataset: bool,
    #[serde(default)]
    pub manageshare: bool,
    pub entities: Vec<ScopedAttributes>,
    pub transactions: Vec<String>,
}

impl Role {
    /// Entity uuid to granted attribute ids.
    pub fn entity_grants(&self) -> HashMap<Uuid, HashSet<u16>> {
        self.entities
            .iter()
            .map(|e| (e.entity, e.attributes.iter().copied().collect()))
            .collect()
    }

    pub fn may_invoke(&self, transaction_name: &str) -> bool {
        self.transactions
            .iter()
            .any(|t| t.eq_ignore_ascii_case(transaction_name))
    }
}

/// The schema subset a client build was compiled against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub uuid: Uuid,
    pub name: String,
    pub entities: Vec<ScopedAttributes>,
}

impl Module {
    pub fn entity_grants(&self) -> HashMap<Uuid, HashSet<u16>> {
        self.entities
            .iter()
            .map(|e| (e.entity, e.attributes.iter().copied().collect()))
            .collect()
    }
}

fn default_role() -> Uuid {
    Uuid::nil()
}

fn default_version() -> u32 {
    1
}

/// A tenant schema document: the draft or one frozen version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default = "default_role")]
    pub defaultrole: Uuid,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

/// One transaction's footprint on an entity, recomputed from the
/// authoritative transaction list.
#[derive(Debug, Clone)]
pub struct EntityTransaction {
    pub name: String,
    pub uuid: Uuid,
    pub add: bool,
    pub remove: bool,
    pub update: HashSet<u16>,
}

impl Context {
    pub fn entity_by_uuid(&self, uuid: &Uuid) -> Option<&Entity> {
        self.entities.iter().find(|e| &e.uuid == uuid)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn transaction_by_name(&self, name: &str) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn role_by_uuid(&self, uuid: &Uuid) -> Option<&Role> {
        self.roles.iter().find(|r| &r.uuid == uuid)
    }

    pub fn module_by_uuid(&self, uuid: &Uuid) -> Option<&Module> {
        self.modules.iter().find(|m| &m.uuid == uuid)
    }

    /// Which transactions touch `entity`, and how.
    pub fn transactions_for_entity(&self, entity: &Uuid) -> Vec<EntityTransaction> {
        let mut result = Vec::new();
        for transaction in &self.transactions {
            for te in &transaction.entities {
                if &te.entity == entity {
                    result.push(EntityTransaction {
                        name: transaction.name.clone(),
                        uuid: transaction.uuid,
                        add: te.add,
                        remove: te.remove,
                        update: te.update.iter().copied().collect(),
                    });
                }
            }
        }
        result
    }
}
