//! Database Layer
//!
//! All durable state lives in a single RocksDB `TransactionDB`, partitioned
//! into one column family per context plus the `default` family for
//! server-global state (developers, session nodes).
//!
//! - [`Store`] wraps the database: column-family management, single
//!   operations and pessimistic transactions
//! - [`keys`] encodes the ordered key space (`N.` nodes, `U.` users, `D.`
//!   datasets, `M.` members, `H.` headers, `C.` changes, `P.` pushes, `d.`
//!   watermarks, `E.` row images, `Schema` documents)
//! - [`repo`] reads and writes the JSON documents stored under those keys
//!
//! There is no process-local authoritative cache; adapters coordinate only
//! through the store.

mod error;
pub mod keys;
pub mod repo;
mod store;

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

pub use error::StoreError;
pub use repo::Kv;
pub use store::{Store, StoreTxn, DEFAULT_CONTEXT};
