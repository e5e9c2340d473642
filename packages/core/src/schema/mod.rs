//! Schema Documents
//!
//! A `Context` is a self-contained tenant schema: entities (tables with
//! typed keys and attributes), transactions (scripted change groups), roles
//! (capability and column grants) and modules (client-build subsets). A
//! context is edited as a draft and frozen into immutable numbered versions
//! by the schema registry.
//!
//! The JSON document layout matches the administrative API: maps are
//! serialized as arrays, attribute types as string descriptors, and optional
//! fields carry their documented defaults.

mod context;
mod validate;

#[cfg(test)]
#[path = "validate_test.rs"]
mod validate_test;

pub use context::{
    Attribute, Context, Entity, EntityTransaction, Key, Module, Role, ScopedAttributes,
    Transaction, TransactionEntity,
};
pub use validate::InvalidSchema;
