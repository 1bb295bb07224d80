// src/value.rs - Values, quality codes and data values carried by nodes
use crate::node_id::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Core value type enumeration
///
/// This enum represents every value a variable node can hold. A node whose
/// data type is null is modelled as a [`DataValue`] without a value, not as a
/// variant here.
///
/// # Examples
///
/// ```rust
/// use offnormal::Value;
///
/// // Exact equality: no coercion between types
/// assert!(Value::Int(42).exact_eq(&Value::Int(42)));
/// assert!(!Value::Int(42).exact_eq(&Value::Float(42.0)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// Integer value (64-bit)
    Int(i64),
    /// Floating-point value (64-bit)
    Float(f64),
    /// String value
    String(String),
    /// Reference to another node
    NodeId(NodeId),
}

/// Quality codes for OPC-UA compatibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quality {
    pub code: QualityCode,
    #[serde(default)]
    pub substatus: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityCode {
    #[default]
    Good,
    Uncertain,
    Bad,
}

impl Quality {
    pub fn good() -> Self {
        Self {
            code: QualityCode::Good,
            substatus: None,
        }
    }

    pub fn bad() -> Self {
        Self {
            code: QualityCode::Bad,
            substatus: None,
        }
    }

    pub fn uncertain() -> Self {
        Self {
            code: QualityCode::Uncertain,
            substatus: None,
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self.code, QualityCode::Good)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::good()
    }
}

impl From<QualityCode> for Quality {
    fn from(code: QualityCode) -> Self {
        Self { code, substatus: None }
    }
}

impl Value {
    /// Exact value equality: same type and same representation.
    ///
    /// Floats compare by bit pattern, so `NaN` equals an identical `NaN` and
    /// `0.0` differs from `-0.0`.
    pub fn exact_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }

    /// Convert to string representation
    pub fn as_string(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::NodeId(id) => id.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Value::NodeId(v)
    }
}

/// A value as delivered by the address space: the raw value (absent when the
/// data type is null) paired with its quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Option<Value>,
    pub quality: Quality,
    #[serde(default)]
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    pub fn new(value: Option<Value>, quality: Quality) -> Self {
        Self {
            value,
            quality,
            source_timestamp: Some(Utc::now()),
        }
    }

    /// Good-quality value
    pub fn good(value: impl Into<Value>) -> Self {
        Self::new(Some(value.into()), Quality::good())
    }

    /// Value with bad quality
    pub fn bad(value: impl Into<Value>) -> Self {
        Self::new(Some(value.into()), Quality::bad())
    }

    /// Good-quality delivery whose data type is null
    pub fn null() -> Self {
        Self::new(None, Quality::good())
    }

    pub fn is_good(&self) -> bool {
        self.quality.is_good()
    }

    pub fn data_type_is_null(&self) -> bool {
        self.value.is_none()
    }

    /// The value if this delivery is trustworthy, i.e. good quality and not null
    pub fn usable_value(&self) -> Option<&Value> {
        if self.is_good() {
            self.value.as_ref()
        } else {
            None
        }
    }

    /// Whether replacing `self` with `other` counts as a value change.
    /// Timestamps are ignored.
    pub fn differs_from(&self, other: &DataValue) -> bool {
        if self.quality != other.quality {
            return true;
        }
        match (&self.value, &other.value) {
            (Some(a), Some(b)) => !a.exact_eq(b),
            (None, None) => false,
            _ => true,
        }
    }
}

impl Default for DataValue {
    fn default() -> Self {
        Self::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_equality() {
        assert!(Value::Bool(true).exact_eq(&Value::Bool(true)));
        assert!(!Value::Int(1).exact_eq(&Value::Bool(true)));
        assert!(!Value::Int(7).exact_eq(&Value::Float(7.0)));
        assert!(!Value::String("7".into()).exact_eq(&Value::Int(7)));
        assert!(Value::Float(f64::NAN).exact_eq(&Value::Float(f64::NAN)));
        assert!(!Value::Float(0.0).exact_eq(&Value::Float(-0.0)));
        assert!(!Value::Float(0.1 + 0.2).exact_eq(&Value::Float(0.3)));
    }

    #[test]
    fn test_usable_value() {
        assert_eq!(DataValue::good(5i64).usable_value(), Some(&Value::Int(5)));
        assert_eq!(DataValue::bad(5i64).usable_value(), None);
        assert_eq!(DataValue::null().usable_value(), None);
        assert!(DataValue::null().data_type_is_null());
        assert_eq!(DataValue::new(Some(Value::Int(1)), Quality::uncertain()).usable_value(), None);
    }

    #[test]
    fn test_differs_from_ignores_timestamp() {
        let a = DataValue::good(1i64);
        let mut b = DataValue::good(1i64);
        b.source_timestamp = None;
        assert!(!a.differs_from(&b));
        assert!(a.differs_from(&DataValue::bad(1i64)));
        assert!(a.differs_from(&DataValue::good(2i64)));
        assert!(a.differs_from(&DataValue::null()));
    }

    #[test]
    fn test_yaml_shape() {
        let v: Value = serde_yaml::from_str("{ type: Int, value: 42 }").unwrap();
        assert_eq!(v, Value::Int(42));
        let q: QualityCode = serde_yaml::from_str("bad").unwrap();
        assert_eq!(Quality::from(q), Quality::bad());
    }
}
