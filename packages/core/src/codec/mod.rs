//! Row-Change Codec
//!
//! Two isomorphic encodings of tuple data, modeled on the SQLite row-change
//! session format:
//!
//! - **Binary**: fields keyed by numeric attribute id (varint), emitted in
//!   ascending id order. This is the form clients ship over TCP and the form
//!   rows are persisted in.
//! - **Text**: fields keyed by NUL-terminated attribute name, emitted in
//!   case-insensitive name order. This is the fallback form for clients
//!   pinned to an older schema version, where numeric ids may not resolve.
//!
//! Both forms encode each field as `(identifier, type tag, payload)`.
//! Transcoding between the two is lossless given a complete id/name mapping;
//! a binary UUID value becomes its 36-char lowercase text rendering.

mod binary;
mod error;
mod text;
mod value;
mod varint;

#[cfg(test)]
#[path = "binary_test.rs"]
mod binary_test;

#[cfg(test)]
#[path = "text_test.rs"]
mod text_test;

#[cfg(test)]
#[path = "varint_test.rs"]
mod varint_test;

pub use binary::BinaryRecord;
pub use error::CodecError;
pub use text::{NameMap, TextRecord};
pub use value::{AttributeType, Value};
pub use varint::{put_varint, read_varint, varint_len};
