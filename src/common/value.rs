// Cell Value Implementation
//
// This module defines the dynamically typed value carried by cursors, sharding
// conditions and aggregation units.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::common::error::{ShardingError, ShardingResult};

/// Possible data types for values in a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Date(String),
    Timestamp(String),
    Blob(Vec<u8>),
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            DataValue::Null => 0.hash(state),
            DataValue::Integer(i) => { 1.hash(state); i.hash(state); }
            DataValue::Float(f) => { 2.hash(state); f.to_bits().hash(state); }
            DataValue::Text(s) => { 3.hash(state); s.hash(state); }
            DataValue::Boolean(b) => { 4.hash(state); b.hash(state); }
            DataValue::Date(s) => { 5.hash(state); s.hash(state); }
            DataValue::Timestamp(s) => { 6.hash(state); s.hash(state); }
            DataValue::Blob(b) => { 7.hash(state); b.hash(state); }
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "{}", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::Date(s) => write!(f, "{}", s),
            DataValue::Timestamp(s) => write!(f, "{}", s),
            DataValue::Blob(b) => write!(f, "X'{}'", hex::encode(b)),
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Some(Ordering::Equal),
            (DataValue::Null, _) => Some(Ordering::Less),
            (_, DataValue::Null) => Some(Ordering::Greater),

            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (DataValue::Text(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),
            (DataValue::Date(a), DataValue::Date(b)) => Some(a.cmp(b)),
            (DataValue::Timestamp(a), DataValue::Timestamp(b)) => Some(a.cmp(b)),
            (DataValue::Blob(a), DataValue::Blob(b)) => Some(a.cmp(b)),

            // Dates and timestamps travel as text through most drivers
            (DataValue::Text(a), DataValue::Date(b)) | (DataValue::Text(a), DataValue::Timestamp(b)) => Some(a.cmp(b)),
            (DataValue::Date(a), DataValue::Text(b)) | (DataValue::Timestamp(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Date(a), DataValue::Timestamp(b)) => Some(a.as_str().cmp(b.split(' ').next().unwrap_or(""))),
            (DataValue::Timestamp(a), DataValue::Date(b)) => Some(a.split(' ').next().unwrap_or("").cmp(b.as_str())),

            _ => None,
        }
    }
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Null => "NULL",
            DataValue::Integer(_) => "INTEGER",
            DataValue::Float(_) => "FLOAT",
            DataValue::Text(_) => "TEXT",
            DataValue::Boolean(_) => "BOOLEAN",
            DataValue::Date(_) => "DATE",
            DataValue::Timestamp(_) => "TIMESTAMP",
            DataValue::Blob(_) => "BLOB",
        }
    }

    /// Compare two non-NULL-aware values for sorting and routing.
    /// NULL sorts below every other value here; callers that honour
    /// NULLS FIRST/LAST handle NULL before delegating.
    pub fn compare(&self, other: &Self) -> ShardingResult<Ordering> {
        self.partial_cmp(other).ok_or_else(|| {
            ShardingError::TypeMismatch(format!(
                "Cannot compare incompatible types: {} and {}",
                self.type_name(),
                other.type_name()
            ))
        })
    }

    /// Integer view used by sharding algorithms and pagination.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Integer(i) => Some(*i),
            DataValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            DataValue::Text(s) => s.trim().parse::<i64>().ok(),
            DataValue::Boolean(b) => Some(if *b { 1 } else { 0 }),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Integer(i) => Some(*i as f64),
            DataValue::Float(f) => Some(*f),
            DataValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Numeric addition used when folding SUM and COUNT partials.
    /// NULL is the identity element.
    pub fn add(&self, other: &DataValue) -> ShardingResult<DataValue> {
        match (self, other) {
            (DataValue::Null, v) | (v, DataValue::Null) => Ok(v.clone()),
            (DataValue::Integer(a), DataValue::Integer(b)) => a
                .checked_add(*b)
                .map(DataValue::Integer)
                .ok_or(ShardingError::NumericOverflow),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(DataValue::Float(x + y)),
                _ => Err(ShardingError::TypeMismatch(format!(
                    "Cannot add {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Integer(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Integer(value as i64)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Text(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Boolean(value)
    }
}
