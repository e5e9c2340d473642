//! Binary row encoding, keyed by numeric attribute id.

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use super::varint::{put_varint, read_varint};
use super::{AttributeType, CodecError, TextRecord, Value};

/// One row image in the compact binary form.
///
/// Fields are held sorted by attribute id, which is also the emission order,
/// so `decode(encode(r)) == r` and re-encoding is canonical.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryRecord {
    fields: BTreeMap<u16, Value>,
}

impl BinaryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u16, value: Value) {
        self.fields.insert(id, value);
    }

    pub fn get(&self, id: u16) -> Option<&Value> {
        self.fields.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u16, &Value)> {
        self.fields.iter()
    }

    /// Encode all fields in ascending id order.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        for (&id, value) in &self.fields {
            put_varint(&mut buf, u32::from(id))?;
            buf.push(value.tag() as u8);
            match value {
                Value::Integer(v) => buf.extend_from_slice(&v.to_be_bytes()),
                Value::Real(v) => buf.extend_from_slice(&v.to_bits().to_be_bytes()),
                Value::Text(v) => {
                    put_varint(&mut buf, v.len() as u32)?;
                    buf.extend_from_slice(v.as_bytes());
                }
                Value::Blob(v) => {
                    put_varint(&mut buf, v.len() as u32)?;
                    buf.extend_from_slice(v);
                }
                Value::Null => {}
                Value::Uuid(v) => buf.extend_from_slice(v.as_bytes()),
            }
        }
        Ok(buf)
    }

    /// Decode a full buffer of `(id, tag, payload)` tuples.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut fields = BTreeMap::new();
        let mut pos = 0;
        while pos < data.len() {
            let (id, id_len) = read_varint(&data[pos..])?;
            pos += id_len;
            let tag = *data
                .get(pos)
                .ok_or_else(|| CodecError::navigation("missing type tag"))?;
            pos += 1;
            let value = match AttributeType::from_tag(tag) {
                Some(AttributeType::Integer) => {
                    let raw = take(data, pos, 8)?;
                    pos += 8;
                    Value::Integer(i64::from_be_bytes(raw.try_into().unwrap()))
                }
                Some(AttributeType::Real) => {
                    let raw = take(data, pos, 8)?;
                    pos += 8;
                    Value::Real(f64::from_bits(u64::from_be_bytes(raw.try_into().unwrap())))
                }
                Some(AttributeType::Text) => {
                    let (len, len_len) = read_varint(&data[pos..])?;
                    pos += len_len;
                    let raw = take(data, pos, len as usize)?;
                    pos += len as usize;
                    Value::Text(String::from_utf8_lossy(raw).into_owned())
                }
                Some(AttributeType::Blob) => {
                    let (len, len_len) = read_varint(&data[pos..])?;
                    pos += len_len;
                    let raw = take(data, pos, len as usize)?;
                    pos += len as usize;
                    Value::Blob(raw.to_vec())
                }
                Some(AttributeType::Null) => Value::Null,
                Some(AttributeType::UuidV1) => {
                    let raw = take(data, pos, 16)?;
                    pos += 16;
                    Value::Uuid(Uuid::from_slice(raw).expect("sixteen bytes"))
                }
                Some(AttributeType::UuidV4) | None => {
                    return Err(CodecError::navigation(format!("invalid data type {}", tag)))
                }
            };
            fields.insert(id as u16, value);
        }
        Ok(Self { fields })
    }

    /// Keep only the attribute ids in `visible`. Used when fanning changes
    /// out to a node whose role or module does not grant every column.
    pub fn project(&self, visible: &HashSet<u16>) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|(id, _)| visible.contains(id))
                .map(|(id, value)| (*id, value.clone()))
                .collect(),
        }
    }

    /// Transcode to the text form through an `{id -> name}` mapping.
    ///
    /// Ids absent from the mapping are dropped with a warning; they belong to
    /// a newer schema version than the mapping was built from.
    pub fn to_text(&self, id_to_name: &HashMap<u16, String>) -> TextRecord {
        let mut record = TextRecord::new();
        for (id, value) in &self.fields {
            match id_to_name.get(id) {
                Some(name) => record.insert(name.clone(), value.clone().into_text_form()),
                None => tracing::warn!("Skipping field id {} with no name mapping", id),
            }
        }
        record
    }
}

impl FromIterator<(u16, Value)> for BinaryRecord {
    fn from_iter<T: IntoIterator<Item = (u16, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn take(data: &[u8], pos: usize, len: usize) -> Result<&[u8], CodecError> {
    data.get(pos..pos + len)
        .ok_or_else(|| CodecError::navigation("invalid length of change"))
}
