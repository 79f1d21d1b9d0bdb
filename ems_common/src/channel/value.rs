//! Tagged channel values.
//!
//! One `Value` enum replaces per-type channel classes. Every value that enters
//! a channel (sensor reading, write request, configured limit) is first
//! converted to the channel's declared [`ValueType`] via [`Value::convert_to`],
//! so comparisons inside the resolver always see a single variant.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::ChannelError;

/// Semantic type tag of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Integer,
    Long,
    Float,
    String,
    Enum,
}

impl ValueType {
    /// True for types that support ordering and range requests.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Float | Self::Enum)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Float => "float",
            Self::String => "string",
            Self::Enum => "enum",
        };
        f.write_str(s)
    }
}

/// A channel value.
///
/// Deserializes untagged from TOML/JSON scalars; integers land in `Int` (or
/// `Long` when out of `i32` range) and are converted to the declared channel
/// type afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f64),
    String(String),
    Enum(i32),
}

impl Value {
    /// Type tag of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Boolean,
            Self::Int(_) => ValueType::Integer,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::String(_) => ValueType::String,
            Self::Enum(_) => ValueType::Enum,
        }
    }

    /// Integral view of the value. Floats are rounded; non-finite floats and
    /// unparsable strings yield `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(v) | Self::Enum(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            Self::Float(v) => float_to_i64(*v),
            Self::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_i64))
            }
        }
    }

    /// Floating point view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(v) | Self::Enum(v) => Some(f64::from(*v)),
            Self::Long(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::String(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// False only for NaN and infinite floats.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(v) => v.is_finite(),
            _ => true,
        }
    }

    /// Convert to `target`, failing with `InvalidValue` when the conversion
    /// would lose information (overflow, unparsable text, non-0/1 booleans)
    /// or would produce a NaN/infinite float.
    pub fn convert_to(&self, target: ValueType) -> Result<Value, ChannelError> {
        let fail = || {
            ChannelError::InvalidValue(format!(
                "cannot convert {} value '{self}' to {target}",
                self.value_type()
            ))
        };

        match target {
            ValueType::Boolean => match self {
                Self::Bool(b) => Ok(Self::Bool(*b)),
                Self::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "on" | "1" => Ok(Self::Bool(true)),
                    "false" | "off" | "0" => Ok(Self::Bool(false)),
                    _ => Err(fail()),
                },
                Self::Float(v) if *v == 0.0 => Ok(Self::Bool(false)),
                Self::Float(v) if *v == 1.0 => Ok(Self::Bool(true)),
                Self::Float(_) => Err(fail()),
                other => match other.as_i64() {
                    Some(0) => Ok(Self::Bool(false)),
                    Some(1) => Ok(Self::Bool(true)),
                    _ => Err(fail()),
                },
            },
            ValueType::Integer | ValueType::Enum => {
                let v = self.as_i64().ok_or_else(fail)?;
                let v = i32::try_from(v).map_err(|_| fail())?;
                Ok(if target == ValueType::Enum {
                    Self::Enum(v)
                } else {
                    Self::Int(v)
                })
            }
            ValueType::Long => self.as_i64().map(Self::Long).ok_or_else(fail),
            ValueType::Float => self
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Self::Float)
                .ok_or_else(fail),
            ValueType::String => Ok(Self::String(self.to_string())),
        }
    }

    /// Numeric ordering between two values.
    ///
    /// Integral values compare exactly; as soon as one side is a float both
    /// are compared as `f64`. Returns `None` for booleans, strings and NaN.
    pub fn cmp_numeric(&self, other: &Value) -> Option<Ordering> {
        if !self.value_type().is_numeric() || !other.value_type().is_numeric() {
            return None;
        }
        match (self, other) {
            (Self::Float(_), _) | (_, Self::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            _ => Some(self.as_i64()?.cmp(&other.as_i64()?)),
        }
    }
}

fn float_to_i64(v: f64) -> Option<i64> {
    if !v.is_finite() {
        return None;
    }
    let r = v.round();
    if r < i64::MIN as f64 || r > i64::MAX as f64 {
        None
    } else {
        Some(r as i64)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) | Self::Enum(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Typed extraction from a [`Value`], used by the generic channel accessors.
pub trait FromValue: Sized {
    /// Type the value is converted to before extraction.
    const TYPE: ValueType;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for bool {
    const TYPE: ValueType = ValueType::Boolean;

    fn from_value(value: &Value) -> Option<Self> {
        match value.convert_to(Self::TYPE).ok()? {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    const TYPE: ValueType = ValueType::Integer;

    fn from_value(value: &Value) -> Option<Self> {
        match value.convert_to(Self::TYPE).ok()? {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const TYPE: ValueType = ValueType::Long;

    fn from_value(value: &Value) -> Option<Self> {
        match value.convert_to(Self::TYPE).ok()? {
            Value::Long(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const TYPE: ValueType = ValueType::Float;

    fn from_value(value: &Value) -> Option<Self> {
        match value.convert_to(Self::TYPE).ok()? {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl FromValue for String {
    const TYPE: ValueType = ValueType::String;

    fn from_value(value: &Value) -> Option<Self> {
        match value.convert_to(Self::TYPE).ok()? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}
