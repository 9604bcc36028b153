//! Byte encodings for stored index entries.
//!
//! Keys use an order-preserving encoding so that a sled tree iterates
//! entries grouped by hash key and then in clustering order. Rows are
//! serialized with rkyv.

use keyplan_proto::Value;
use rkyv::{Archive, Deserialize, Serialize};

use super::Row;
use crate::catalog::FieldId;
use crate::error::{Error, Result};

/// One field of a stored row.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredField {
    pub field: u32,
    pub value: Value,
}

/// A row as persisted in an index tree.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredRow {
    pub fields: Vec<StoredField>,
}

impl StoredRow {
    pub fn from_row(row: &Row) -> Self {
        Self {
            fields: row
                .iter()
                .map(|(field, value)| StoredField {
                    field: field.as_u32(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    pub fn into_row(self) -> Row {
        self.fields
            .into_iter()
            .map(|stored| (FieldId::from_u32(stored.field), stored.value))
            .collect()
    }

    /// Serialize to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // sled buffers carry no alignment guarantee
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

// Type tags follow `Value::sort_cmp` type ranks.
const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_NUMBER: u8 = 0x02;
const TAG_TIMESTAMP: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_BYTES: u8 = 0x06;
const TAG_UUID: u8 = 0x07;

/// Encode a sequence of values so that byte order matches value order.
pub fn encode_key<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<u8> {
    let mut key = Vec::new();
    for value in values {
        encode_value(value, &mut key);
    }
    key
}

fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(u8::from(*b));
        }
        Value::Int(n) => {
            let approx = *n as f64;
            // i64 -> f64 rounding is monotone; the remainder orders ints that round alike
            let remainder = (*n as i128 - approx as i128) as i64;
            encode_number(approx, remainder, buf);
        }
        Value::Float(f) => encode_number(*f, 0, buf),
        Value::Timestamp(ts) => {
            buf.push(TAG_TIMESTAMP);
            buf.extend_from_slice(&((*ts as u64) ^ (1 << 63)).to_be_bytes());
        }
        Value::String(s) => {
            buf.push(TAG_STRING);
            encode_terminated(s.as_bytes(), buf);
        }
        Value::Bytes(b) => {
            buf.push(TAG_BYTES);
            encode_terminated(b, buf);
        }
        Value::Uuid(id) => {
            buf.push(TAG_UUID);
            buf.extend_from_slice(id);
        }
    }
}

/// Integers and floats share one encoding, so numerically equal values get
/// equal keys and the two types interleave in numeric order.
fn encode_number(approx: f64, remainder: i64, buf: &mut Vec<u8>) {
    buf.push(TAG_NUMBER);
    // Normalize -0.0 so it encodes like 0
    let approx = if approx == 0.0 { 0.0 } else { approx };
    let bits = approx.to_bits();
    // Flip all bits of negatives, only the sign bit of positives
    let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
    buf.extend_from_slice(&ordered.to_be_bytes());
    buf.extend_from_slice(&((remainder as u64) ^ (1 << 63)).to_be_bytes());
}

/// Escape 0x00 as 0x00 0xFF and terminate with 0x00 0x00, keeping prefixes ordered first.
fn encode_terminated(bytes: &[u8], buf: &mut Vec<u8>) {
    for byte in bytes {
        buf.push(*byte);
        if *byte == 0x00 {
            buf.push(0xFF);
        }
    }
    buf.extend_from_slice(&[0x00, 0x00]);
}
