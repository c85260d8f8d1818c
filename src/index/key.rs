use std::cmp::Ordering;

use crate::table::{FieldMeta, FieldType, Value};

/// A typed, totally ordered index key extracted from the indexed field's
/// bytes. `Chars` keys keep the fixed-width NUL-padded form so stored and
/// probe keys compare consistently.
#[derive(Debug, Clone)]
pub enum IndexKey {
    Int(i32),
    Float(f64),
    Chars(Vec<u8>),
}

impl IndexKey {
    /// Key of `record_data` for the indexed field.
    pub fn from_record(record_data: &[u8], field: &FieldMeta) -> IndexKey {
        let bytes = &record_data[field.offset()..field.offset() + field.len()];
        Self::from_bytes(bytes, field.field_type())
    }

    /// Key from raw field bytes.
    pub fn from_bytes(bytes: &[u8], field_type: FieldType) -> IndexKey {
        match field_type {
            FieldType::Int => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes[..4]);
                IndexKey::Int(i32::from_le_bytes(buf))
            }
            FieldType::Float => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes[..8]);
                IndexKey::Float(f64::from_le_bytes(buf))
            }
            FieldType::Chars(_) => IndexKey::Chars(bytes.to_vec()),
        }
    }

    /// Probe key from a typed value; `None` if the value cannot key this
    /// field.
    pub fn from_value(value: &Value, field: &FieldMeta) -> Option<IndexKey> {
        if !value.matches_type(field.field_type()) {
            return None;
        }
        let mut bytes = vec![0u8; field.len()];
        value.encode_into(&mut bytes);
        Some(Self::from_bytes(&bytes, field.field_type()))
    }

    /// Fixed-width encoding matching the indexed field's layout.
    pub fn encode(&self, len: usize) -> Vec<u8> {
        match self {
            IndexKey::Int(i) => i.to_le_bytes().to_vec(),
            IndexKey::Float(f) => f.to_le_bytes().to_vec(),
            IndexKey::Chars(bytes) => {
                let mut out = bytes.clone();
                out.resize(len, 0);
                out
            }
        }
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Int(a), IndexKey::Int(b)) => a.cmp(b),
            (IndexKey::Float(a), IndexKey::Float(b)) => a.total_cmp(b),
            (IndexKey::Chars(a), IndexKey::Chars(b)) => a.cmp(b),
            // one index holds one key type; an order across variants keeps
            // Ord total anyway
            (IndexKey::Int(_), _) => Ordering::Less,
            (_, IndexKey::Int(_)) => Ordering::Greater,
            (IndexKey::Float(_), _) => Ordering::Less,
            (_, IndexKey::Float(_)) => Ordering::Greater,
        }
    }
}
