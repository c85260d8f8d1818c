use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Field type with its fixed on-disk width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    Float,
    Chars(usize),
}

impl FieldType {
    pub fn size(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Float => 8,
            FieldType::Chars(n) => *n,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Chars(_) => "chars",
        }
    }
}

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f64),
    Chars(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Chars(_) => "chars",
        }
    }

    /// Whether this value can be stored in a field of the given type.
    pub fn matches_type(&self, field_type: FieldType) -> bool {
        match (self, field_type) {
            (Value::Int(_), FieldType::Int) => true,
            (Value::Float(_), FieldType::Float) => true,
            (Value::Chars(s), FieldType::Chars(n)) => s.len() <= n,
            _ => false,
        }
    }

    /// Write the fixed-width little-endian encoding into `out`. The value
    /// must have passed `matches_type` for a field of `out.len()` bytes.
    pub fn encode_into(&self, out: &mut [u8]) {
        match self {
            Value::Int(i) => out[..4].copy_from_slice(&i.to_le_bytes()),
            Value::Float(f) => out[..8].copy_from_slice(&f.to_le_bytes()),
            Value::Chars(s) => {
                let bytes = s.as_bytes();
                let n = bytes.len().min(out.len());
                out[..n].copy_from_slice(&bytes[..n]);
                out[n..].fill(0);
            }
        }
    }

    /// Decode a value from fixed-width field bytes. Returns `None` for
    /// byte patterns the type cannot represent.
    pub fn decode(bytes: &[u8], field_type: FieldType) -> Option<Value> {
        match field_type {
            FieldType::Int => {
                let buf: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
                Some(Value::Int(i32::from_le_bytes(buf)))
            }
            FieldType::Float => {
                let buf: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
                Some(Value::Float(f64::from_le_bytes(buf)))
            }
            FieldType::Chars(n) => {
                let bytes = bytes.get(..n)?;
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                let s = std::str::from_utf8(&bytes[..end]).ok()?;
                Some(Value::Chars(s.to_string()))
            }
        }
    }

    /// Order two values of the same type; `None` across types.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Chars(a), Value::Chars(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}
