//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `SchemaService` - context schema registry with frozen versions
//! - `UserService` - users, developers, sessions and authentication
//! - `DatasetService` - dataset lifecycle, membership and invitations
//! - `SyncService` - header ingestion, validation hooks and change fan-out
//! - `script` - the embedded Lua sandbox backing hooks and check expressions
//! - `visibility` - Role∩Module effective-visibility computation
//!
//! Services coordinate only through the store; adapters translate the
//! [`ServiceError`] taxonomy into transport codes at the boundary.

pub mod crypto;
pub mod dataset_service;
pub mod error;
pub mod federated;
pub mod schema_service;
pub mod script;
pub mod sync_service;
pub mod user_service;
pub mod visibility;

#[cfg(test)]
mod script_test;

pub use dataset_service::DatasetService;
pub use error::ServiceError;
pub use federated::{FederatedKeys, IdentityClaims};
pub use schema_service::SchemaService;
pub use sync_service::{beehive_hash, ApplyCode, SyncService};
pub use user_service::{SessionRequest, UserService};
