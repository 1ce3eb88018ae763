//! Status variable snapshots.
//!
//! A `StatusVariable` is the current value of one named variable owned by a
//! monitorable, together with how it is collected and when it was measured.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a status variable's value is gathered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    /// Monotonically increasing counter.
    CumulativeCounter,
    /// Value changes on discrete events.
    DiscreteEvent,
    /// Instantaneous measurement.
    Gauge,
    /// Informational value, typically a string.
    StatusInformation,
}

/// Typed value of a status variable.
///
/// # Examples
///
/// ```
/// use statmon::VariableValue;
///
/// assert_eq!(VariableValue::Integer(15).to_string(), "15");
/// assert_eq!(VariableValue::from("test").to_string(), "test");
/// assert!(VariableValue::Boolean(true).is_boolean());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum VariableValue {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
}

impl VariableValue {
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Integer(_))
    }

    pub const fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn as_integer(&self) -> Option<i32> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            Self::Integer(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Float(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub const fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<i32> for VariableValue {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

impl From<i64> for VariableValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f32> for VariableValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for VariableValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for VariableValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for VariableValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for VariableValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Snapshot of a status variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusVariable {
    pub id: String,
    pub collection_method: CollectionMethod,
    pub timestamp: DateTime<Utc>,
    pub value: VariableValue,
}

impl StatusVariable {
    /// Create a snapshot measured now.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        collection_method: CollectionMethod,
        value: impl Into<VariableValue>,
    ) -> Self {
        Self {
            id: id.into(),
            collection_method,
            timestamp: Utc::now(),
            value: value.into(),
        }
    }

    /// Copy of this snapshot carrying `value`, re-stamped to now.
    #[must_use]
    pub fn with_value(&self, value: impl Into<VariableValue>) -> Self {
        Self {
            id: self.id.clone(),
            collection_method: self.collection_method,
            timestamp: Utc::now(),
            value: value.into(),
        }
    }
}
