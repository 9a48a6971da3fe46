//! Attribute values and their type names.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::{BBox3d, Error, Result};

/// Value type of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Double,
    String,
    Token,
    Double3,
    Matrix3d,
    Extent,
    StringArray,
}

impl ValueType {
    /// Scene-description type name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::Token => "token",
            Self::Double3 => "double3",
            Self::Matrix3d => "matrix3d",
            Self::Extent => "float3[]",
            Self::StringArray => "string[]",
        }
    }

    /// Look up a type by its scene-description name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "double" | "float" => Self::Double,
            "string" => Self::String,
            "token" => Self::Token,
            "double3" | "float3" | "color3f" | "vector3f" => Self::Double3,
            "matrix3d" => Self::Matrix3d,
            "float3[]" => Self::Extent,
            "string[]" => Self::StringArray,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Token(String),
    Double3([f64; 3]),
    Matrix3d([f64; 9]),
    /// `[min, max]` corners.
    Extent([[f64; 3]; 2]),
    StringArray(Vec<String>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::Token(_) => ValueType::Token,
            Self::Double3(_) => ValueType::Double3,
            Self::Matrix3d(_) => ValueType::Matrix3d,
            Self::Extent(_) => ValueType::Extent,
            Self::StringArray(_) => ValueType::StringArray,
        }
    }

    /// Parse the textual form used by property-definition registries.
    ///
    /// Tuples are comma separated. Empty text yields `None` (no value).
    pub fn from_string(value_type: ValueType, text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let parse_err = || Error::ValueParse {
            text: text.to_string(),
            value_type: value_type.name().to_string(),
        };
        let value = match value_type {
            ValueType::Bool => match text {
                "true" | "1" => Self::Bool(true),
                "false" | "0" => Self::Bool(false),
                _ => return Err(parse_err()),
            },
            ValueType::Int => Self::Int(text.parse().map_err(|_| parse_err())?),
            ValueType::Double => Self::Double(text.parse().map_err(|_| parse_err())?),
            ValueType::String => Self::String(text.to_string()),
            ValueType::Token => Self::Token(text.to_string()),
            ValueType::Double3 => Self::Double3(parse_tuple(text).ok_or_else(parse_err)?),
            ValueType::Matrix3d => Self::Matrix3d(parse_tuple(text).ok_or_else(parse_err)?),
            ValueType::Extent => {
                let flat: [f64; 6] = parse_tuple(text).ok_or_else(parse_err)?;
                Self::Extent([[flat[0], flat[1], flat[2]], [flat[3], flat[4], flat[5]]])
            }
            ValueType::StringArray => {
                Self::StringArray(text.split(',').map(|s| s.trim().to_string()).collect())
            }
        };
        Ok(Some(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_double3(&self) -> Option<[f64; 3]> {
        match self {
            Self::Double3(v) => Some(*v),
            _ => None,
        }
    }

    /// Text for `String` and `Token` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Token(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_extent(&self) -> Option<BBox3d> {
        match self {
            Self::Extent([min, max]) => Some(BBox3d::from_corners(*min, *max)),
            _ => None,
        }
    }
}

fn parse_tuple<const N: usize>(text: &str) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    let mut parts = text.split(',');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string() {
        assert_eq!(Value::from_string(ValueType::Bool, "false").unwrap(), Some(Value::Bool(false)));
        assert_eq!(Value::from_string(ValueType::Int, " 42 ").unwrap(), Some(Value::Int(42)));
        assert_eq!(
            Value::from_string(ValueType::Double3, "1, 2,3").unwrap(),
            Some(Value::Double3([1.0, 2.0, 3.0]))
        );
        assert_eq!(Value::from_string(ValueType::Double, "").unwrap(), None);
        assert!(Value::from_string(ValueType::Double3, "1,2").is_err());
        assert!(Value::from_string(ValueType::Int, "x").is_err());
    }

    #[test]
    fn test_matrix_zero_default() {
        let v = Value::from_string(ValueType::Matrix3d, "0,0,0,0,0,0,0,0,0").unwrap().unwrap();
        assert_eq!(v, Value::Matrix3d([0.0; 9]));
    }

    #[test]
    fn test_type_names_round_trip() {
        for t in [ValueType::Bool, ValueType::Matrix3d, ValueType::Extent, ValueType::StringArray] {
            assert_eq!(ValueType::from_name(t.name()), Some(t));
        }
    }
}
