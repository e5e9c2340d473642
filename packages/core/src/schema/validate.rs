//! Schema invariant checking, run before any context create or update.

use std::collections::HashSet;

use thiserror::Error;
use uuid::Uuid;

use crate::codec::AttributeType;

use super::{Context, Entity};

/// A schema document violates the invariants.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct InvalidSchema(pub String);

impl InvalidSchema {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl Context {
    /// Validate the whole document. Checks uuid uniqueness across every kind,
    /// name rules, key/attribute id and name uniqueness within entities, and
    /// that every entity and attribute referenced by transactions, roles and
    /// modules exists.
    pub fn check(&self) -> Result<(), InvalidSchema> {
        if self.version == 0 {
            return Err(InvalidSchema::new("Version must be greater than 0."));
        }
        let mut uuids: HashSet<Uuid> = HashSet::new();
        uuids.insert(self.uuid);

        let mut names: HashSet<String> = HashSet::new();
        for entity in &self.entities {
            claim_uuid(&mut uuids, &entity.uuid)?;
            claim_name(&mut names, &entity.name, "Entity")?;
            check_entity(entity)?;
        }

        names.clear();
        for transaction in &self.transactions {
            claim_uuid(&mut uuids, &transaction.uuid)?;
            claim_name(&mut names, &transaction.name, "Transaction")?;
            for te in &transaction.entities {
                let entity = self.resolve_entity(&te.entity)?;
                for column in &te.update {
                    if !entity.has_attribute(*column) {
                        return Err(InvalidSchema::new(format!(
                            "Unknown column number {} for entity {}.",
                            column, entity.name
                        )));
                    }
                }
            }
        }

        names.clear();
        for role in &self.roles {
            claim_uuid(&mut uuids, &role.uuid)?;
            claim_name(&mut names, &role.name, "Role")?;
            for grant in &role.entities {
                let entity = self.resolve_entity(&grant.entity)?;
                for column in &grant.attributes {
                    if !entity.has_attribute(*column) {
                        return Err(InvalidSchema::new(format!(
                            "Unknown column number {} for entity {}.",
                            column, entity.name
                        )));
                    }
                }
            }
        }

        names.clear();
        for module in &self.modules {
            claim_uuid(&mut uuids, &module.uuid)?;
            claim_name(&mut names, &module.name, "Module")?;
            for grant in &module.entities {
                let entity = self.resolve_entity(&grant.entity)?;
                for column in &grant.attributes {
                    if !entity.has_attribute(*column) {
                        return Err(InvalidSchema::new(format!(
                            "Unknown column number {} for entity {}.",
                            column, entity.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn resolve_entity(&self, uuid: &Uuid) -> Result<&Entity, InvalidSchema> {
        self.entity_by_uuid(uuid)
            .ok_or_else(|| InvalidSchema::new(format!("Unknown entity {}.", uuid)))
    }
}

fn claim_uuid(uuids: &mut HashSet<Uuid>, uuid: &Uuid) -> Result<(), InvalidSchema> {
    if !uuids.insert(*uuid) {
        return Err(InvalidSchema::new(format!("{} is duplicated.", uuid)));
    }
    Ok(())
}

fn claim_name(names: &mut HashSet<String>, name: &str, kind: &str) -> Result<(), InvalidSchema> {
    if name.is_empty() {
        return Err(InvalidSchema::new(format!("{} name is empty.", kind)));
    }
    if !names.insert(name.to_ascii_lowercase()) {
        return Err(InvalidSchema::new(format!(
            "{} name {} is already in use.",
            kind, name
        )));
    }
    Ok(())
}

fn check_entity(entity: &Entity) -> Result<(), InvalidSchema> {
    let mut ids: HashSet<u16> = HashSet::new();
    let mut names: HashSet<String> = HashSet::new();

    for key in &entity.keys {
        if matches!(key.key_type, AttributeType::Real | AttributeType::Null) {
            return Err(InvalidSchema::new(format!(
                "Entity {} key {} has non-key type {}.",
                entity.name,
                key.name,
                key.key_type.descriptor()
            )));
        }
        if !ids.insert(key.id) {
            return Err(InvalidSchema::new(format!(
                "Entity {} contains duplicated key id {}.",
                entity.name, key.id
            )));
        }
        if key.name.is_empty() {
            return Err(InvalidSchema::new(format!(
                "Entity {} contains empty key name.",
                entity.name
            )));
        }
        if !names.insert(key.name.to_ascii_lowercase()) {
            return Err(InvalidSchema::new(format!(
                "Entity {} contains duplicated key or attribute name {}.",
                entity.name, key.name
            )));
        }
    }

    for attribute in &entity.attributes {
        if !ids.insert(attribute.id) {
            return Err(InvalidSchema::new(format!(
                "Entity {} contains duplicated attribute id {}.",
                entity.name, attribute.id
            )));
        }
        if attribute.name.is_empty() {
            return Err(InvalidSchema::new(format!(
                "Entity {} contains empty attribute name.",
                entity.name
            )));
        }
        if !names.insert(attribute.name.to_ascii_lowercase()) {
            return Err(InvalidSchema::new(format!(
                "Entity {} contains duplicated key or attribute name {}.",
                entity.name, attribute.name
            )));
        }
    }

    Ok(())
}
