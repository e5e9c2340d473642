//! Beehive Core
//!
//! This crate implements the server side of a relational-dataset
//! synchronization system: clients exchange typed row-level changes through
//! a compact CRC-framed binary TCP protocol, while an HTTP surface
//! administers schemas and accounts.
//!
//! # Architecture
//!
//! - **Row-change codec**: two isomorphic encodings of tuple data (binary by
//!   attribute id, text by attribute name) with strict varints and type tags
//! - **Store**: one RocksDB `TransactionDB` with a column family per
//!   context; pessimistic transactions; an ordered, prefix-scannable key
//!   space
//! - **Schema registry**: versioned `Context` documents (entities,
//!   transactions, roles, modules) with draft editing and frozen versions
//! - **Sync engine**: per-dataset monotone header ids, Lua-scripted
//!   validation hooks, Role∩Module fan-out projection and per-node
//!   watermarks
//!
//! # Modules
//!
//! - [`codec`] - row-change encodings
//! - [`db`] - store wrapper, key scheme and document repositories
//! - [`models`] - durable entities
//! - [`schema`] - context schema documents and validation
//! - [`services`] - business services (schema, identity, datasets, sync)
//! - [`http`] - axum admin surface
//! - [`tcp`] - binary synchronization protocol
//! - [`workers`] - background tasks (federated key refresher)

pub mod codec;
pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod schema;
pub mod services;
pub mod tcp;
pub mod workers;

// Re-exports
pub use config::Config;
pub use db::{Store, StoreError, DEFAULT_CONTEXT};
pub use services::{
    ApplyCode, DatasetService, FederatedKeys, SchemaService, ServiceError, SyncService,
    UserService,
};
