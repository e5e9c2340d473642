//! Dataset and Membership Service
//!
//! Dataset lifecycle plus the invitation flow: `push` mints a shareable
//! token, `pop` redeems one, `pull` revokes one, `put` adds a member
//! directly by e-mail and `leave` removes the caller. Capability flags on
//! the member's role guard each administrative operation.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::db::{keys, repo, Store};
use crate::models::{Dataset, Member, Node, Push, User};
use crate::schema::{Context, Role};

use super::visibility::require;
use super::ServiceError;

pub struct DatasetService {
    store: Arc<Store>,
}

impl DatasetService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn dataset(&self, uuid: &Uuid, context: &str) -> Result<Dataset, ServiceError> {
        repo::read_dataset(self.store.as_ref(), uuid, context)?
            .ok_or_else(|| ServiceError::not_exists(format!("Dataset {} was not found.", uuid)))
    }

    /// The caller's membership row and resolved role on a dataset.
    pub fn member_role<'a>(
        &self,
        schema: &'a Context,
        node: &Node,
        dataset_id: u32,
        context: &str,
    ) -> Result<(Member, &'a Role), ServiceError> {
        let member = repo::read_member(self.store.as_ref(), dataset_id, &node.user.uuid, context)?
            .ok_or_else(|| {
                ServiceError::not_enough_rights(format!(
                    "User {} is not a member of dataset {}.",
                    node.user.identifier, dataset_id
                ))
            })?;
        let role = schema.role_by_uuid(&member.role).ok_or_else(|| {
            ServiceError::not_enough_rights(format!("Unknown role {}.", member.role))
        })?;
        Ok((member, role))
    }

    pub fn is_member(&self, node: &Node, dataset_id: u32, context: &str) -> Result<bool, ServiceError> {
        Ok(
            repo::read_member(self.store.as_ref(), dataset_id, &node.user.uuid, context)?
                .map(|m| m.status == 1)
                .unwrap_or(false),
        )
    }

    /// Create a dataset owned by `user`, enrolling the owner as its first
    /// member under the context's default role.
    pub fn add_dataset(
        &self,
        schema: &Context,
        user: &User,
        uuid: Uuid,
        context: &str,
    ) -> Result<Dataset, ServiceError> {
        if repo::read_dataset(self.store.as_ref(), &uuid, context)?.is_some() {
            return Err(ServiceError::AlreadyExists(format!(
                "Dataset {} already exists.",
                uuid
            )));
        }
        let txn = self.store.begin();
        let id = repo::next_id(&txn, keys::DATASET_SEQ, context)?;
        let dataset = Dataset {
            id,
            uuid,
            id_header: 0,
            owner: user.uuid,
            status: 1,
        };
        repo::save_dataset(&txn, &dataset, context)?;
        let owner = Member {
            id_dataset: id,
            id_user: user.uuid,
            role: schema.defaultrole,
            name: user.name.clone(),
            email: user.identifier.clone(),
            status: 1,
        };
        repo::save_member(&txn, &owner, context)?;
        txn.commit()?;
        debug!("Created dataset {} ({}) for {}", uuid, id, user.identifier);
        Ok(dataset)
    }

    /// Datasets the user is an active member of.
    pub fn read_datasets(&self, user: &User, context: &str) -> Result<Vec<Dataset>, ServiceError> {
        Ok(repo::read_datasets_of_user(
            self.store.as_ref(),
            &user.uuid,
            context,
        )?)
    }

    /// Delete a dataset and cascade through members, headers, changes,
    /// pushes, row images and watermarks in one transaction. Owner only.
    pub fn remove_dataset(
        &self,
        node: &Node,
        uuid: &Uuid,
        context: &str,
    ) -> Result<(), ServiceError> {
        let dataset = self.dataset(uuid, context)?;
        if dataset.owner != node.user.uuid {
            return Err(ServiceError::not_enough_rights(
                "Only the owner may delete a dataset.",
            ));
        }

        let mut doomed: Vec<Vec<u8>> = Vec::new();
        for prefix in [
            keys::member_prefix(dataset.id),
            keys::header_prefix(dataset.id),
            keys::change_dataset_prefix(dataset.id),
            keys::push_prefix(dataset.id),
            keys::row_dataset_prefix(dataset.id),
        ] {
            for (key, _) in self.store.scan_prefix(&prefix, context)? {
                doomed.push(key);
            }
        }
        // Watermarks are keyed node-first; match on the dataset id suffix.
        let suffix = (dataset.id as u64).to_be_bytes();
        for (key, _) in self.store.scan_prefix(b"d.", context)? {
            if key.ends_with(&suffix) {
                doomed.push(key);
            }
        }

        let txn = self.store.begin();
        for key in &doomed {
            txn.delete(key, context)?;
        }
        repo::remove_dataset(&txn, &dataset, context)?;
        txn.commit()?;
        Ok(())
    }

    /// Mint an invitation token. Requires the `sharedataset` capability.
    pub fn push_dataset(
        &self,
        schema: &Context,
        node: &Node,
        dataset_uuid: &Uuid,
        role: Uuid,
        until: i64,
        number: u32,
        context: &str,
    ) -> Result<Push, ServiceError> {
        let dataset = self.dataset(dataset_uuid, context)?;
        let (_, caller_role) = self.member_role(schema, node, dataset.id, context)?;
        require(caller_role.sharedataset, "sharedataset")?;
        if schema.role_by_uuid(&role).is_none() {
            return Err(ServiceError::invalid_request(format!(
                "Unknown role {}.",
                role
            )));
        }
        let push = Push {
            id_dataset: dataset.id,
            uuid: Uuid::new_v4(),
            role,
            until,
            number,
        };
        let txn = self.store.begin();
        repo::save_push(&txn, &push, context)?;
        txn.commit()?;
        Ok(push)
    }

    /// Redeem an invitation token, becoming a member with the token's role.
    pub fn pop_dataset(
        &self,
        node: &Node,
        dataset_uuid: &Uuid,
        push_uuid: &Uuid,
        member_name: &str,
        context: &str,
    ) -> Result<Dataset, ServiceError> {
        let dataset = self.dataset(dataset_uuid, context)?;
        let txn = self.store.begin();
        let push = repo::read_push(&txn, dataset.id, push_uuid, context)?
            .ok_or_else(|| ServiceError::not_exists(format!("Push {} was not found.", push_uuid)))?;
        if push.is_expired(Utc::now().timestamp()) || push.number == 0 {
            return Err(ServiceError::invalid_request("Invitation is spent."));
        }
        if repo::read_member(&txn, dataset.id, &node.user.uuid, context)?.is_some() {
            return Err(ServiceError::AlreadyExists(format!(
                "User {} is already a member.",
                node.user.identifier
            )));
        }
        let member = Member {
            id_dataset: dataset.id,
            id_user: node.user.uuid,
            role: push.role,
            name: member_name.to_string(),
            email: node.user.identifier.clone(),
            status: 1,
        };
        repo::save_member(&txn, &member, context)?;
        let remaining = push.number - 1;
        if remaining == 0 {
            repo::remove_push(&txn, dataset.id, push_uuid, context)?;
        } else {
            let mut push = push;
            push.number = remaining;
            repo::save_push(&txn, &push, context)?;
        }
        txn.commit()?;
        Ok(dataset)
    }

    /// Revoke an invitation token. Requires the `manageshare` capability.
    pub fn pull_dataset(
        &self,
        schema: &Context,
        node: &Node,
        dataset_uuid: &Uuid,
        push_uuid: &Uuid,
        context: &str,
    ) -> Result<(), ServiceError> {
        let dataset = self.dataset(dataset_uuid, context)?;
        let (_, role) = self.member_role(schema, node, dataset.id, context)?;
        require(role.manageshare, "manageshare")?;
        let txn = self.store.begin();
        repo::remove_push(&txn, dataset.id, push_uuid, context)?;
        txn.commit()?;
        Ok(())
    }

    /// Add a member directly by e-mail. Requires `managemembers`.
    pub fn put_dataset(
        &self,
        schema: &Context,
        node: &Node,
        dataset_uuid: &Uuid,
        email: &str,
        member_name: &str,
        role: Uuid,
        context: &str,
    ) -> Result<Uuid, ServiceError> {
        let dataset = self.dataset(dataset_uuid, context)?;
        let (_, caller_role) = self.member_role(schema, node, dataset.id, context)?;
        require(caller_role.managemembers, "managemembers")?;
        let user = repo::read_user(self.store.as_ref(), email, context)?
            .ok_or_else(|| ServiceError::not_exists(format!("User {} was not found.", email)))?;
        if repo::read_member(self.store.as_ref(), dataset.id, &user.uuid, context)?.is_some() {
            return Err(ServiceError::AlreadyExists(format!(
                "User {} is already a member.",
                email
            )));
        }
        let member = Member {
            id_dataset: dataset.id,
            id_user: user.uuid,
            role,
            name: member_name.to_string(),
            email: user.identifier.clone(),
            status: 1,
        };
        let txn = self.store.begin();
        repo::save_member(&txn, &member, context)?;
        txn.commit()?;
        Ok(user.uuid)
    }

    /// Remove the caller's own membership. The owner must delete the dataset
    /// instead.
    pub fn leave_dataset(
        &self,
        node: &Node,
        dataset_uuid: &Uuid,
        context: &str,
    ) -> Result<(), ServiceError> {
        let dataset = self.dataset(dataset_uuid, context)?;
        if dataset.owner == node.user.uuid {
            return Err(ServiceError::invalid_request(
                "The owner cannot leave its own dataset.",
            ));
        }
        let txn = self.store.begin();
        repo::remove_member(&txn, dataset.id, &node.user.uuid, context)?;
        txn.delete(&keys::downloaded(&node.uuid, dataset.id), context)?;
        txn.commit()?;
        Ok(())
    }

    /// Update a member's role or display name. Requires `managemembers`.
    pub fn update_member(
        &self,
        schema: &Context,
        node: &Node,
        dataset_uuid: &Uuid,
        user_uuid: &Uuid,
        role: Uuid,
        member_name: &str,
        context: &str,
    ) -> Result<(), ServiceError> {
        let dataset = self.dataset(dataset_uuid, context)?;
        let (_, caller_role) = self.member_role(schema, node, dataset.id, context)?;
        require(caller_role.managemembers, "managemembers")?;
        let txn = self.store.begin();
        let mut member = repo::read_member(&txn, dataset.id, user_uuid, context)?
            .ok_or_else(|| ServiceError::not_exists(format!("Member {} was not found.", user_uuid)))?;
        member.role = role;
        member.name = member_name.to_string();
        repo::save_member(&txn, &member, context)?;
        txn.commit()?;
        Ok(())
    }

    /// Remove a member. Requires `managemembers`; the owner is immovable.
    pub fn remove_member(
        &self,
        schema: &Context,
        node: &Node,
        dataset_uuid: &Uuid,
        user_uuid: &Uuid,
        context: &str,
    ) -> Result<(), ServiceError> {
        let dataset = self.dataset(dataset_uuid, context)?;
        let (_, caller_role) = self.member_role(schema, node, dataset.id, context)?;
        require(caller_role.managemembers, "managemembers")?;
        if &dataset.owner == user_uuid {
            return Err(ServiceError::invalid_request(
                "The owner cannot be removed from its own dataset.",
            ));
        }
        let txn = self.store.begin();
        repo::remove_member(&txn, dataset.id, user_uuid, context)?;
        txn.commit()?;
        Ok(())
    }

    /// List members. Requires `readmembers`; e-mail addresses are redacted
    /// unless the caller's role also grants `reademail`.
    pub fn read_members(
        &self,
        schema: &Context,
        node: &Node,
        dataset_id: u32,
        context: &str,
    ) -> Result<Vec<Member>, ServiceError> {
        let (_, role) = self.member_role(schema, node, dataset_id, context)?;
        require(role.readmembers, "readmembers")?;
        let mut members = repo::list_members(self.store.as_ref(), dataset_id, context)?;
        if !role.reademail {
            for member in &mut members {
                member.email.clear();
            }
        }
        Ok(members)
    }

    /// List open invitations. Requires `manageshare`.
    pub fn read_pushes(
        &self,
        schema: &Context,
        node: &Node,
        dataset_id: u32,
        context: &str,
    ) -> Result<Vec<Push>, ServiceError> {
        let (_, role) = self.member_role(schema, node, dataset_id, context)?;
        require(role.manageshare, "manageshare")?;
        Ok(repo::list_pushes(self.store.as_ref(), dataset_id, context)?)
    }
}
