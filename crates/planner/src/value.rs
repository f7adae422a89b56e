//! Scalar values of rows processed by the reference evaluator.

use std::fmt::{self, Display};

use winplan_types::schema::DataType;
use winplan_types::time::Timestamp;
use xxhash_rust::xxh3::xxh3_64;

/// A SQL scalar.  Values of different variants order by variant first, so
/// `NULL` sorts before everything else.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Timestamp(Timestamp),
}

pub type Row = Vec<Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Returns `true` if a column of type `data_type` can hold this value.
    pub fn conforms_to(&self, data_type: DataType) -> bool {
        match (self, data_type) {
            (Self::Null, _) => true,
            (Self::Bool(_), DataType::Boolean) => true,
            (Self::Int(_), DataType::Int | DataType::BigInt) => true,
            (Self::Str(_), DataType::Varchar) => true,
            (Self::Timestamp(_), DataType::Timestamp(_) | DataType::Proctime) => true,
            _ => false,
        }
    }

    /// Appends a self-delimiting binary encoding of the value to `buf`.
    ///
    /// The encoding does not depend on the platform or on `Hash`
    /// implementations, so bucket assignments are reproducible.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Null => buf.push(0),
            Self::Bool(b) => {
                buf.push(1);
                buf.push(*b as u8);
            }
            Self::Int(i) => {
                buf.push(2);
                buf.extend_from_slice(&i.to_le_bytes());
            }
            Self::Str(s) => {
                buf.push(3);
                buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            Self::Timestamp(ts) => {
                buf.push(4);
                buf.extend_from_slice(&ts.millis().to_le_bytes());
            }
        }
    }
}

/// Hash bucket in `0..bucket_count` of a tuple of distinct-argument values.
/// A zero `bucket_count` is treated as one.
pub fn bucket_of(values: &[Value], bucket_count: u32) -> u32 {
    let mut buf = Vec::with_capacity(16 * values.len());
    for value in values {
        value.encode(&mut buf);
    }
    (xxh3_64(&buf) % u64::from(bucket_count.max(1))) as u32
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "'{s}'"),
            Self::Timestamp(ts) => write!(f, "{ts}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Self::Timestamp(ts)
    }
}
