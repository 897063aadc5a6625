//! Primitive value types and their text representations.

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use mplane_error::{ModelError, ModelResult};

use crate::when::TimeValue;
use crate::VALUE_NONE;

/// The primitive type of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    Natural,
    Real,
    Boolean,
    Time,
    Address,
    Url,
}

/// A parsed value of some primitive type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Natural(u64),
    Real(f64),
    Boolean(bool),
    Time(TimeValue),
    Address(IpAddr),
    Url(String),
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Natural => "natural",
            Primitive::Real => "real",
            Primitive::Boolean => "boolean",
            Primitive::Time => "time",
            Primitive::Address => "address",
            Primitive::Url => "url",
        }
    }

    /// Parse a string into a value. `"*"` means no value.
    pub fn parse(&self, text: &str) -> ModelResult<Option<Value>> {
        if text == VALUE_NONE {
            return Ok(None);
        }
        let invalid = || ModelError::invalid_value(self.name(), text);
        let value = match self {
            Primitive::String => Value::String(text.to_string()),
            Primitive::Url => Value::Url(text.to_string()),
            Primitive::Natural => Value::Natural(parse_natural(text).ok_or_else(invalid)?),
            Primitive::Real => Value::Real(text.trim().parse().map_err(|_| invalid())?),
            Primitive::Boolean => match text {
                "True" | "1" => Value::Boolean(true),
                "False" | "0" => Value::Boolean(false),
                _ => return Err(invalid()),
            },
            Primitive::Time => Value::Time(TimeValue::parse(text)?),
            Primitive::Address => Value::Address(text.trim().parse().map_err(|_| invalid())?),
        };
        Ok(Some(value))
    }

    /// Render a value as a string. No value renders as `"*"`.
    pub fn unparse(&self, value: Option<&Value>) -> String {
        match value {
            None => VALUE_NONE.to_string(),
            Some(v) => v.to_string(),
        }
    }

    /// True if the value is of this primitive type.
    pub fn accepts(&self, value: &Value) -> bool {
        value.primitive() == *self
    }
}

// naturals also accept float notation ("100.0", "10E2") and truncate
fn parse_natural(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<u64>() {
        return Some(n);
    }
    let f: f64 = text.parse().ok()?;
    if f.is_finite() && f >= 0.0 && f < u64::MAX as f64 {
        Some(f.trunc() as u64)
    } else {
        None
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Primitive {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s {
            "string" => Ok(Primitive::String),
            "natural" => Ok(Primitive::Natural),
            "real" => Ok(Primitive::Real),
            "boolean" => Ok(Primitive::Boolean),
            "time" => Ok(Primitive::Time),
            "address" => Ok(Primitive::Address),
            "url" => Ok(Primitive::Url),
            other => Err(ModelError::RegistryFormat(format!("unknown primitive {other}"))),
        }
    }
}

impl Value {
    pub fn primitive(&self) -> Primitive {
        match self {
            Value::String(_) => Primitive::String,
            Value::Natural(_) => Primitive::Natural,
            Value::Real(_) => Primitive::Real,
            Value::Boolean(_) => Primitive::Boolean,
            Value::Time(_) => Primitive::Time,
            Value::Address(_) => Primitive::Address,
            Value::Url(_) => Primitive::Url,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Url(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_natural(&self) -> Option<u64> {
        match self {
            Value::Natural(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Natural(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<IpAddr> {
        match self {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<TimeValue> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) | Value::Url(s) => f.write_str(s),
            Value::Natural(n) => write!(f, "{n}"),
            // Debug keeps the fractional part on whole numbers: 4200000.0
            Value::Real(r) => write!(f, "{r:?}"),
            Value::Boolean(true) => f.write_str("True"),
            Value::Boolean(false) => f.write_str("False"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Address(a) => write!(f, "{a}"),
        }
    }
}

// Values only order within a primitive; mixed comparisons are undefined.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) | (Value::Url(a), Value::Url(b)) => a.partial_cmp(b),
            (Value::Natural(a), Value::Natural(b)) => a.partial_cmp(b),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Time(a), Value::Time(b)) => a.partial_cmp(b),
            (Value::Address(a), Value::Address(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Natural(n)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<IpAddr> for Value {
    fn from(a: IpAddr) -> Self {
        Value::Address(a)
    }
}

impl From<TimeValue> for Value {
    fn from(t: TimeValue) -> Self {
        Value::Time(t)
    }
}
