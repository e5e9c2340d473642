//! Text row encoding, keyed by attribute name.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::varint::{put_varint, read_varint};
use super::{AttributeType, BinaryRecord, CodecError, Value};

/// Ordered-map key with case-insensitive ordering, so fields are emitted in
/// the same order regardless of the casing a client used.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IKey(String);

impl Ord for IKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.0.bytes().map(|b| b.to_ascii_lowercase());
        let b = other.0.bytes().map(|b| b.to_ascii_lowercase());
        a.cmp(b).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for IKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Case-insensitive `{name -> attribute id}` mapping used by the text
/// decoder to resolve field names back to numeric ids.
#[derive(Debug, Clone, Default)]
pub struct NameMap {
    ids: HashMap<String, u16>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, id: u16) {
        self.ids.insert(name.to_ascii_lowercase(), id);
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.ids.get(&name.to_ascii_lowercase()).copied()
    }
}

impl<'a> FromIterator<(&'a str, u16)> for NameMap {
    fn from_iter<T: IntoIterator<Item = (&'a str, u16)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (name, id) in iter {
            map.insert(name, id);
        }
        map
    }
}

/// One row image in the textual form. The wire identifier is the
/// NUL-terminated attribute name; payloads follow the binary rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextRecord {
    fields: BTreeMap<IKey, Value>,
}

impl TextRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, value: Value) {
        self.fields.insert(IKey(name), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(&IKey(name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.0.as_str(), v))
    }

    /// Encode all fields in case-insensitive name order.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        for (name, value) in &self.fields {
            buf.extend_from_slice(name.0.as_bytes());
            buf.push(0);
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
                Value::Uuid(v) => {
                    // Never produced by transcoding, but keep the form total.
                    let text = v.hyphenated().to_string();
                    put_varint(&mut buf, text.len() as u32)?;
                    buf.extend_from_slice(text.as_bytes());
                }
            }
        }
        Ok(buf)
    }

    /// Decode a name-keyed buffer without resolving ids.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut record = Self::new();
        walk(data, |name, value| {
            record.insert(name.to_string(), value);
            true
        })?;
        Ok(record)
    }

    /// Decode a name-keyed buffer, resolving each field through `mapping`.
    ///
    /// Fields whose name the mapping does not know are skipped with a
    /// warning; they were added in a newer schema version than the receiver
    /// understands.
    pub fn decode_to_binary(
        data: &[u8],
        entity: &str,
        mapping: &NameMap,
    ) -> Result<BinaryRecord, CodecError> {
        let mut record = BinaryRecord::new();
        walk(data, |name, value| {
            match mapping.get(name) {
                Some(id) => record.insert(id, value),
                None => tracing::warn!("Skipping field '{}.{}'.", entity, name),
            }
            true
        })?;
        Ok(record)
    }

    /// Transcode to the binary form through a `{name -> id}` mapping,
    /// skipping unmapped names with a warning.
    pub fn to_binary(&self, entity: &str, mapping: &NameMap) -> BinaryRecord {
        let mut record = BinaryRecord::new();
        for (name, value) in self.iter() {
            match mapping.get(name) {
                Some(id) => record.insert(id, value.clone()),
                None => tracing::warn!("Skipping field '{}.{}'.", entity, name),
            }
        }
        record
    }
}

/// Sequentially visit `(name, value)` pairs in an encoded text buffer.
fn walk(data: &[u8], mut visit: impl FnMut(&str, Value) -> bool) -> Result<(), CodecError> {
    let mut pos = 0;
    while pos < data.len() {
        let nul = data[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| CodecError::navigation("unterminated field name"))?;
        let name = std::str::from_utf8(&data[pos..pos + nul])
            .map_err(|_| CodecError::navigation("field name is not valid utf-8"))?
            .to_string();
        pos += nul + 1;
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
            _ => return Err(CodecError::navigation(format!("invalid data type {}", tag))),
        };
        if !visit(&name, value) {
            break;
        }
    }
    Ok(())
}

fn take(data: &[u8], pos: usize, len: usize) -> Result<&[u8], CodecError> {
    data.get(pos..pos + len)
        .ok_or_else(|| CodecError::navigation("invalid length of change"))
}
