//! Schema Registry
//!
//! Stores one draft `Context` document per context column family (key
//! `Schema`) plus immutable frozen versions (`Schema.<v>`). Creating a
//! context creates its column family; linking freezes the current draft
//! under a version number taken from the publish link header.

use std::sync::Arc;

use regex::Regex;
use uuid::Uuid;

use crate::db::{keys, Store, DEFAULT_CONTEXT};
use crate::models::Node;
use crate::schema::Context;

use super::{script, ServiceError};

/// Service for creating, editing, versioning and serving context schemas.
pub struct SchemaService {
    store: Arc<Store>,
    link_pattern: Regex,
}

impl SchemaService {
    pub fn new(store: Arc<Store>) -> Self {
        let link_pattern = Regex::new(
            r#"^</context/([a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12})/versions/([0-9]+)>;\s+rel="publish"$"#,
        )
        .expect("link pattern");
        Self {
            store,
            link_pattern,
        }
    }

    fn parse(&self, body: &str) -> Result<Context, ServiceError> {
        let context: Context = serde_json::from_str(body)
            .map_err(|e| ServiceError::InvalidSchema(e.to_string()))?;
        context.check()?;
        for entity in &context.entities {
            for attribute in &entity.attributes {
                if let Some(check) = &attribute.check {
                    script::validate_check_expression(check).map_err(|_| {
                        ServiceError::InvalidSchema(format!(
                            "Invalid expression check on attribute {}",
                            attribute.name
                        ))
                    })?;
                }
            }
        }
        Ok(context)
    }

    /// Create a context from its JSON document and store the draft.
    pub fn post_context(&self, body: &str) -> Result<String, ServiceError> {
        let context = self.parse(body)?;
        let uuid = context.uuid.hyphenated().to_string();
        self.store.create_context(&uuid)?;
        let stored = serde_json::to_string(&context)
            .map_err(|e| ServiceError::internal(e.to_string()))?;
        self.store.put(keys::SCHEMA, stored.as_bytes(), &uuid)?;
        Ok(stored)
    }

    /// Fetch the current draft document.
    pub fn get_context(&self, uuid: &str) -> Result<String, ServiceError> {
        match self.store.get(keys::SCHEMA, uuid)? {
            Some(raw) => Ok(String::from_utf8_lossy(&raw).into_owned()),
            None => Err(ServiceError::not_exists(format!(
                "Schema of context {} was not found.",
                uuid
            ))),
        }
    }

    /// All context uuids known to the store.
    pub fn get_contexts(&self) -> Vec<String> {
        self.store.contexts()
    }

    /// Replace the current draft.
    pub fn put_context(&self, body: &str) -> Result<String, ServiceError> {
        let context = self.parse(body)?;
        let uuid = context.uuid.hyphenated().to_string();
        if !self.store.has_context(&uuid) {
            return Err(ServiceError::not_exists(format!(
                "Context {} doesn't exist.",
                uuid
            )));
        }
        let stored = serde_json::to_string(&context)
            .map_err(|e| ServiceError::internal(e.to_string()))?;
        self.store.put(keys::SCHEMA, stored.as_bytes(), &uuid)?;
        Ok(stored)
    }

    /// Drop a context and its column family. Fails while any live session
    /// node still references the context.
    pub fn delete_context(&self, uuid: &str) -> Result<(), ServiceError> {
        let parsed = Uuid::parse_str(uuid)
            .map_err(|_| ServiceError::invalid_request(format!("{} is not a valid uuid.", uuid)))?;
        for (key, raw) in self.store.scan_prefix(b"N.", DEFAULT_CONTEXT)? {
            if key.starts_with(b"N.IX.") || key == keys::NODE_SEQ {
                continue;
            }
            let node: Node = serde_json::from_slice(&raw)
                .map_err(|e| ServiceError::internal(e.to_string()))?;
            if node.context == parsed {
                return Err(ServiceError::invalid_request(format!(
                    "Context {} is still referenced by live nodes.",
                    uuid
                )));
            }
        }
        self.store.delete_context(uuid)?;
        Ok(())
    }

    fn parse_link(&self, context: &str, link: &str) -> Result<u32, ServiceError> {
        let captures = self
            .link_pattern
            .captures(link)
            .ok_or_else(|| ServiceError::invalid_request("Link header is not valid."))?;
        if &captures[1] != context {
            return Err(ServiceError::invalid_request("Link header is not valid."));
        }
        captures[2]
            .parse::<u32>()
            .map_err(|_| ServiceError::invalid_request("Link header is not valid."))
    }

    /// Freeze the current draft as the version named in the link header.
    pub fn link_context(&self, context: &str, link: &str) -> Result<(), ServiceError> {
        let version = self.parse_link(context, link)?;
        if version == 0 {
            return Err(ServiceError::invalid_request(
                "Version must be greater than 0.",
            ));
        }
        let body = self.get_context(context)?;
        self.store
            .put(&keys::schema_version(version), body.as_bytes(), context)?;
        Ok(())
    }

    /// Remove a frozen version.
    pub fn unlink_context(&self, context: &str, link: &str) -> Result<(), ServiceError> {
        let version = self.parse_link(context, link)?;
        self.store.delete(&keys::schema_version(version), context)?;
        Ok(())
    }

    /// List frozen version numbers.
    pub fn get_linked_versions(&self, context: &str) -> Result<Vec<String>, ServiceError> {
        let mut versions = Vec::new();
        for (key, _) in self
            .store
            .scan_prefix(keys::SCHEMA_VERSION_PREFIX.as_bytes(), context)?
        {
            versions.push(String::from_utf8_lossy(&key[keys::SCHEMA_VERSION_PREFIX.len()..]).into_owned());
        }
        Ok(versions)
    }

    /// Fetch a frozen version document.
    pub fn get_linked_version(&self, context: &str, version: u32) -> Result<String, ServiceError> {
        match self.store.get(&keys::schema_version(version), context)? {
            Some(raw) => Ok(String::from_utf8_lossy(&raw).into_owned()),
            None => Err(ServiceError::not_exists(format!(
                "Schema version {} of context {} was not found.",
                version, context
            ))),
        }
    }

    /// Load a parsed schema; version 0 means the current draft.
    pub fn load(&self, context: &str, version: u32) -> Result<Context, ServiceError> {
        let body = if version == 0 {
            self.get_context(context)?
        } else {
            self.get_linked_version(context, version)?
        };
        serde_json::from_str(&body).map_err(|e| ServiceError::internal(e.to_string()))
    }
}
