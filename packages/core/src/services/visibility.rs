//! Effective visibility: the intersection of a member's Role and the
//! Node's Module.
//!
//! Every read and fan-out path consults this set. Entities outside it are
//! invisible; attributes outside it are stripped before transmission.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::models::Node;
use crate::schema::{Context, Role};

use super::ServiceError;

/// `entity uuid -> visible attribute ids` for one node on one dataset.
#[derive(Debug, Clone, Default)]
pub struct Visibility {
    pub entities: HashMap<Uuid, HashSet<u16>>,
}

impl Visibility {
    pub fn entity(&self, uuid: &Uuid) -> Option<&HashSet<u16>> {
        self.entities.get(uuid)
    }
}

/// Compute Role∩Module. A node whose module is the nil uuid (or unknown to
/// the schema) is limited by its role alone.
pub fn effective(schema: &Context, node: &Node, role: &Role) -> Visibility {
    let role_grants = role.entity_grants();
    let module = if node.module.is_nil() {
        None
    } else {
        schema.module_by_uuid(&node.module)
    };

    let entities = match module {
        Some(module) => {
            let module_grants = module.entity_grants();
            role_grants
                .into_iter()
                .filter_map(|(entity, role_attrs)| {
                    module_grants.get(&entity).map(|module_attrs| {
                        let attrs: HashSet<u16> =
                            role_attrs.intersection(module_attrs).copied().collect();
                        (entity, attrs)
                    })
                })
                .filter(|(_, attrs)| !attrs.is_empty())
                .collect()
        }
        None => role_grants,
    };

    Visibility { entities }
}

/// Guard an administrative fan-in operation behind a capability flag.
pub fn require(granted: bool, what: &str) -> Result<(), ServiceError> {
    if granted {
        Ok(())
    } else {
        Err(ServiceError::not_enough_rights(format!(
            "Role does not grant {}.",
            what
        )))
    }
}
