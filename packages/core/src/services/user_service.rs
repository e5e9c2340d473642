//! Identity Service
//!
//! Users, developers and per-session Nodes. Sign-in (internal credentials or
//! a federated identity token) creates a Node with a fresh session key; the
//! pair `(numeric id, key)` authenticates every later request. Developers
//! are global administrators admitted over HTTP Basic.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{keys, repo, Store, DEFAULT_CONTEXT};
use crate::models::{Developer, Node, Rights, User, UserType};

use super::federated::FederatedKeys;
use super::{crypto, ServiceError};

const DEFAULT_ADMIN_IDENTIFIER: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Parameters shared by the sign-in flavors.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Per-node key material presented by the client device.
    pub node_key: String,
    /// Node uuid chosen by the client (one per device install).
    pub node_uuid: Uuid,
    /// Module the client build was compiled against.
    pub module: Uuid,
    /// Schema version the client is pinned to; zero means current draft.
    pub version: u32,
}

pub struct UserService {
    store: Arc<Store>,
    federated: Arc<FederatedKeys>,
}

impl UserService {
    pub fn new(store: Arc<Store>, federated: Arc<FederatedKeys>) -> Self {
        Self { store, federated }
    }

    /// Ensure at least one developer exists; create the default
    /// administrator on first start.
    pub fn check_admin(store: &Store) -> Result<Developer, ServiceError> {
        if let Some(developer) = repo::read_developer(store, DEFAULT_ADMIN_IDENTIFIER)? {
            return Ok(developer);
        }
        let salt = crypto::random_salt();
        let developer = Developer {
            identifier: DEFAULT_ADMIN_IDENTIFIER.to_string(),
            name: "Administrator".to_string(),
            password: crypto::password_hash(DEFAULT_ADMIN_PASSWORD, &salt)?,
            salt,
            rights: Rights::All,
        };
        repo::save_developer(store, &developer)?;
        warn!("Created default developer account; change its password.");
        Ok(developer)
    }

    /// Admit a developer from an HTTP `Authorization: Basic` header.
    pub fn authenticate_developer(&self, authorization: &str) -> Result<Developer, ServiceError> {
        let encoded = authorization
            .strip_prefix("Basic ")
            .ok_or_else(|| ServiceError::authentication("missing Basic authorization"))?;
        let decoded = STANDARD
            .decode(encoded.trim().as_bytes())
            .map_err(|_| ServiceError::authentication("malformed authorization"))?;
        let decoded = String::from_utf8_lossy(&decoded);
        let (identifier, password) = decoded
            .split_once(':')
            .ok_or_else(|| ServiceError::authentication("malformed authorization"))?;
        let developer = repo::read_developer(self.store.as_ref(), identifier)?
            .ok_or_else(|| ServiceError::authentication("unknown developer"))?;
        if !crypto::verify_password(password, &developer.salt, &developer.password)? {
            return Err(ServiceError::authentication("bad developer credentials"));
        }
        Ok(developer)
    }

    // Administrative user management

    pub fn save_user(
        &self,
        identifier: &str,
        name: &str,
        password: &str,
        user_type: UserType,
        context: &str,
    ) -> Result<User, ServiceError> {
        if repo::read_user(self.store.as_ref(), identifier, context)?.is_some() {
            return Err(ServiceError::AlreadyExists(format!(
                "User {} already exists.",
                identifier
            )));
        }
        let salt = crypto::random_salt();
        let user = User {
            uuid: Uuid::new_v4(),
            identifier: identifier.to_string(),
            name: name.to_string(),
            user_type,
            password: crypto::password_hash(password, &salt)?,
            salt,
        };
        let txn = self.store.begin();
        repo::save_user(&txn, &user, context)?;
        txn.commit()?;
        Ok(user)
    }

    pub fn get_user(&self, uuid: &Uuid, context: &str) -> Result<User, ServiceError> {
        repo::read_user_by_uuid(self.store.as_ref(), uuid, context)?
            .ok_or_else(|| ServiceError::not_exists(format!("User {} was not found.", uuid)))
    }

    pub fn get_users(&self, context: &str) -> Result<Vec<User>, ServiceError> {
        Ok(repo::list_users(self.store.as_ref(), context)?)
    }

    pub fn update_user(
        &self,
        uuid: &Uuid,
        name: &str,
        password: Option<&str>,
        context: &str,
    ) -> Result<User, ServiceError> {
        let mut user = self.get_user(uuid, context)?;
        user.name = name.to_string();
        if let Some(password) = password {
            user.salt = crypto::random_salt();
            user.password = crypto::password_hash(password, &user.salt)?;
        }
        let txn = self.store.begin();
        repo::save_user(&txn, &user, context)?;
        txn.commit()?;
        Ok(user)
    }

    pub fn remove_user(&self, uuid: &Uuid, context: &str) -> Result<(), ServiceError> {
        let user = self.get_user(uuid, context)?;
        let txn = self.store.begin();
        for node in repo::read_nodes_of_user(self.store.as_ref(), &user.uuid)? {
            repo::remove_node(&txn, &node)?;
        }
        repo::remove_user(&txn, uuid, context)?;
        txn.commit()?;
        Ok(())
    }

    // Session lifecycle

    fn issue_node(&self, user: User, request: &SessionRequest, context: &str) -> Result<Node, ServiceError> {
        let context_uuid = Uuid::parse_str(context)
            .map_err(|_| ServiceError::invalid_request(format!("{} is not a valid uuid.", context)))?;
        let txn = self.store.begin();
        let id = repo::next_id(&txn, keys::NODE_SEQ, DEFAULT_CONTEXT)?;
        let node = Node {
            id,
            user,
            key: crypto::session_key(),
            node_key: request.node_key.clone(),
            context: context_uuid,
            module: request.module,
            uuid: request.node_uuid,
            version: request.version,
        };
        repo::save_node(&txn, &node)?;
        txn.commit()?;
        info!("Signed in node {} for user {}", node.uuid, node.user.identifier);
        Ok(node)
    }

    /// Self-registration for internal users, issuing a session immediately.
    pub fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
        request: &SessionRequest,
        context: &str,
    ) -> Result<Node, ServiceError> {
        let user = self.save_user(email, name, password, UserType::Internal, context)?;
        self.issue_node(user, request, context)
    }

    /// Credential sign-in for internal users.
    pub fn sign_in(
        &self,
        email: &str,
        password: &str,
        request: &SessionRequest,
        context: &str,
    ) -> Result<Node, ServiceError> {
        let user = repo::read_user(self.store.as_ref(), email, context)?
            .ok_or_else(|| ServiceError::authentication("unknown user"))?;
        if user.user_type != UserType::Internal {
            return Err(ServiceError::authentication("not an internal account"));
        }
        if !crypto::verify_password(password, &user.salt, &user.password)? {
            return Err(ServiceError::authentication("bad credentials"));
        }
        self.issue_node(user, request, context)
    }

    /// Federated sign-in with a signed identity token. The subject claim is
    /// the user identifier; the account is created on first sign-in.
    pub fn sign_in_federated(
        &self,
        token: &str,
        request: &SessionRequest,
        context: &str,
    ) -> Result<Node, ServiceError> {
        let claims = self.federated.verify(token)?;
        let user = match repo::read_user(self.store.as_ref(), &claims.sub, context)? {
            Some(user) => user,
            None => {
                let display = claims
                    .name
                    .or(claims.email)
                    .unwrap_or_else(|| claims.sub.clone());
                let user = User {
                    uuid: Uuid::new_v4(),
                    identifier: claims.sub.clone(),
                    name: display,
                    user_type: UserType::Google,
                    password: Vec::new(),
                    salt: Vec::new(),
                };
                let txn = self.store.begin();
                repo::save_user(&txn, &user, context)?;
                txn.commit()?;
                user
            }
        };
        self.issue_node(user, request, context)
    }

    /// End a session by deleting its node.
    pub fn sign_out(&self, node: &Node) -> Result<(), ServiceError> {
        let txn = self.store.begin();
        repo::remove_node(&txn, node)?;
        txn.commit()?;
        Ok(())
    }

    /// Delete an internal account after re-verifying its credentials, along
    /// with every session node it holds.
    pub fn sign_off(
        &self,
        email: &str,
        password: &str,
        context: &str,
    ) -> Result<(), ServiceError> {
        let user = repo::read_user(self.store.as_ref(), email, context)?
            .ok_or_else(|| ServiceError::authentication("unknown user"))?;
        if !crypto::verify_password(password, &user.salt, &user.password)? {
            return Err(ServiceError::authentication("bad credentials"));
        }
        let txn = self.store.begin();
        for node in repo::read_nodes_of_user(self.store.as_ref(), &user.uuid)? {
            repo::remove_node(&txn, &node)?;
        }
        repo::remove_user(&txn, &user.uuid, context)?;
        txn.commit()?;
        Ok(())
    }

    /// Authenticate a `<id>_<base64key>` session credential from a cookie or
    /// bearer token.
    pub fn authenticate(&self, session: &str) -> Result<Node, ServiceError> {
        let (id, key) = session
            .split_once('_')
            .ok_or_else(|| ServiceError::authentication("malformed session"))?;
        let id: u32 = id
            .parse()
            .map_err(|_| ServiceError::authentication("malformed session"))?;
        let key = crypto::decode_key(key)?;
        let node = repo::read_node_by_id(self.store.as_ref(), id)?
            .ok_or_else(|| ServiceError::authentication("unknown session"))?;
        if !crypto::keys_match(&node.key, &key) {
            return Err(ServiceError::authentication("session key mismatch"));
        }
        Ok(node)
    }

    /// Authenticate a raw `(id, key)` pair from the binary protocol.
    pub fn authenticate_node(&self, id: u32, key: &[u8]) -> Result<Node, ServiceError> {
        let node = repo::read_node_by_id(self.store.as_ref(), id)?
            .ok_or_else(|| ServiceError::authentication("unknown session"))?;
        if !crypto::keys_match(&node.key, key) {
            return Err(ServiceError::authentication("session key mismatch"));
        }
        Ok(node)
    }
}
