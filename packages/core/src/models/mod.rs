//! Data Models
//!
//! Durable entities of the synchronization server. Every struct here has a
//! JSON document form (serde) matching what the store persists:
//!
//! - `User` / `Developer` - accounts (per-context and global)
//! - `Node` - one authenticated client session
//! - `Dataset` / `Member` / `Push` - a shared table set, its membership and
//!   invitation tokens
//! - `Header` / `Change` - one committed transaction and its row operations
//! - `Downloaded` - per-node per-dataset delivery watermark
//!
//! Binary payloads (row images, primary keys) travel base64-encoded inside
//! the JSON documents.

mod account;
mod b64;
mod dataset;
mod header;
mod node;

#[cfg(test)]
#[path = "header_test.rs"]
mod header_test;

pub use account::{Developer, Rights, User, UserType};
pub use dataset::{Dataset, Member, Push};
pub use header::{Change, Downloaded, Header, Operation};
pub use node::Node;
