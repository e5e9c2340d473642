//! Attribute types and typed field values.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CodecError;

/// Wire type tags for row-change fields.
///
/// `UuidV4` is a schema-level key type only; on the wire a UUID always
/// travels with the `UuidV1` tag (16 raw bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeType {
    Integer = 1,
    Real = 2,
    Text = 3,
    Blob = 4,
    Null = 5,
    UuidV1 = 6,
    UuidV4 = 7,
}

impl AttributeType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Integer),
            2 => Some(Self::Real),
            3 => Some(Self::Text),
            4 => Some(Self::Blob),
            5 => Some(Self::Null),
            6 => Some(Self::UuidV1),
            7 => Some(Self::UuidV4),
            _ => None,
        }
    }

    /// Schema document descriptor, e.g. `"Integer"`, `"Uuid"`.
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::Text => "Text",
            Self::Blob => "Blob",
            Self::Null => "Null",
            Self::UuidV1 => "UuidV1",
            Self::UuidV4 => "Uuid",
        }
    }

    pub fn from_descriptor(description: &str) -> Option<Self> {
        match description {
            "Integer" => Some(Self::Integer),
            "Real" => Some(Self::Real),
            "Text" => Some(Self::Text),
            "Blob" => Some(Self::Blob),
            "Null" => Some(Self::Null),
            "UuidV1" => Some(Self::UuidV1),
            "Uuid" => Some(Self::UuidV4),
            _ => None,
        }
    }
}

impl Serialize for AttributeType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.descriptor())
    }
}

impl<'de> Deserialize<'de> for AttributeType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let description = String::deserialize(deserializer)?;
        Self::from_descriptor(&description)
            .ok_or_else(|| serde::de::Error::custom(format!("Unknown data type {}", description)))
    }
}

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Null,
    Uuid(Uuid),
}

impl Value {
    pub fn tag(&self) -> AttributeType {
        match self {
            Value::Integer(_) => AttributeType::Integer,
            Value::Real(_) => AttributeType::Real,
            Value::Text(_) => AttributeType::Text,
            Value::Blob(_) => AttributeType::Blob,
            Value::Null => AttributeType::Null,
            Value::Uuid(_) => AttributeType::UuidV1,
        }
    }

    pub fn as_integer(&self) -> Result<i64, CodecError> {
        match self {
            Value::Integer(v) => Ok(*v),
            other => Err(CodecError::TypeMismatch {
                expected: "Integer",
                found: other.tag() as u8,
            }),
        }
    }

    pub fn as_text(&self) -> Result<&str, CodecError> {
        match self {
            Value::Text(v) => Ok(v),
            other => Err(CodecError::TypeMismatch {
                expected: "Text",
                found: other.tag() as u8,
            }),
        }
    }

    /// The text-encoding rendition of this value. UUIDs travel as their
    /// lowercase hyphenated form, everything else is unchanged.
    pub fn into_text_form(self) -> Value {
        match self {
            Value::Uuid(uuid) => Value::Text(uuid.hyphenated().to_string()),
            other => other,
        }
    }
}
