//! Purpose: Runtime value model and its lossless mapping to and from wire JSON.
//! Exports: `Value`, `EncodeError`.
//! Role: The only value type that crosses between the protocol boundary and callables.
//! Invariants: `to_wire` succeeds only when the value round-trips without loss.
//! Invariants: Non-finite floats and any embedded object make a value non-encodable.
//! Invariants: `repr` is deterministic; dict keys render in sorted order.
//! Invariants: `UInt` only holds integers above `i64::MAX`; everything smaller is `Int`.
use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number};

use super::object::ObjectRef;

pub const BUILTIN_NAMESPACE: &str = "builtins";

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    Object(ObjectRef),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EncodeError {
    NonFinite,
    Opaque(String),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::NonFinite => write!(f, "non-finite float"),
            EncodeError::Opaque(type_name) => write!(f, "object of type {type_name} is opaque"),
        }
    }
}

impl std::error::Error for EncodeError {}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn object(object: impl super::object::Object + 'static) -> Self {
        Value::Object(std::rc::Rc::new(object))
    }

    /// Narrows an exact integer back into `Int` or `UInt`; `None` when neither holds it.
    pub fn integer(value: i128) -> Option<Self> {
        if let Ok(small) = i64::try_from(value) {
            return Some(Value::Int(small));
        }
        u64::try_from(value).ok().map(Value::UInt)
    }

    /// Exact integer view; bools are not included.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(value) => Some(i128::from(*value)),
            Value::UInt(value) => Some(i128::from(*value)),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Defining namespace of the value's runtime type.
    pub fn namespace(&self) -> &str {
        match self {
            Value::Object(object) => object.namespace(),
            _ => BUILTIN_NAMESPACE,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Object(object) => object.type_name(),
        }
    }

    /// Type name qualified by namespace, unqualified for the builtin namespace.
    pub fn qualified_type_name(&self) -> String {
        qualify(self.namespace(), self.type_name())
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::UInt(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Str(value) => !value.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(map) => !map.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().is_some_and(|object| object.is_callable())
    }

    /// Numeric view used by arithmetic builtins; bools are not numbers here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::UInt(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(value) => value.to_string(),
            Value::UInt(value) => value.to_string(),
            Value::Float(value) => float_repr(*value),
            Value::Str(value) => quote(value),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Dict(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(key, value)| format!("{}: {}", quote(key), value.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Object(object) => object.repr(),
        }
    }

    /// Human rendering: strings unquoted, everything else as `repr`.
    pub fn display(&self) -> String {
        match self {
            Value::Str(value) => value.clone(),
            other => other.repr(),
        }
    }

    pub fn to_wire(&self) -> Result<serde_json::Value, EncodeError> {
        match self {
            Value::None => Ok(serde_json::Value::Null),
            Value::Bool(value) => Ok(serde_json::Value::Bool(*value)),
            Value::Int(value) => Ok(serde_json::Value::Number(Number::from(*value))),
            Value::UInt(value) => Ok(serde_json::Value::Number(Number::from(*value))),
            Value::Float(value) => Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .ok_or(EncodeError::NonFinite),
            Value::Str(value) => Ok(serde_json::Value::String(value.clone())),
            Value::List(items) => items
                .iter()
                .map(Value::to_wire)
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            Value::Dict(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.to_wire()?);
                }
                Ok(serde_json::Value::Object(out))
            }
            Value::Object(object) => Err(EncodeError::Opaque(qualify(
                object.namespace(),
                object.type_name(),
            ))),
        }
    }

    /// Integers stay exact integers up to `u64::MAX`; every other number is a float.
    pub fn from_wire(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Value::Int(value)
                } else if let Some(value) = number.as_u64() {
                    Value::UInt(value)
                } else {
                    Value::Float(number.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(value) => Value::Str(value),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_wire).collect())
            }
            serde_json::Value::Object(map) => Value::Dict(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from_wire(value)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::UInt(a), Value::Float(b)) | (Value::Float(b), Value::UInt(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => std::rc::Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        i64::try_from(value).map_or_else(|_| Value::UInt(value as u64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::None, Into::into)
    }
}

fn float_repr(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{sign}inf")
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn qualify(namespace: &str, type_name: &str) -> String {
    if namespace == BUILTIN_NAMESPACE {
        type_name.to_string()
    } else {
        format!("{namespace}.{type_name}")
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::{EncodeError, Value};
    use serde_json::json;

    #[test]
    fn non_finite_floats_are_not_encodable() {
        assert_eq!(Value::Float(f64::NAN).to_wire(), Err(EncodeError::NonFinite));
        let nested = Value::List(vec![Value::Int(1), Value::Float(f64::INFINITY)]);
        assert_eq!(nested.to_wire(), Err(EncodeError::NonFinite));
    }

    #[test]
    fn wire_numbers_keep_integer_and_float_identity() {
        assert_eq!(Value::from_wire(json!(16)), Value::Int(16));
        assert!(matches!(Value::from_wire(json!(16.0)), Value::Float(_)));
        assert_eq!(Value::Float(4.0).to_wire(), Ok(json!(4.0)));
    }

    #[test]
    fn integers_above_i64_round_trip_exactly() {
        let wire = json!([18446744073709551615u64, 9223372036854775808u64]);
        let value = Value::from_wire(wire.clone());
        assert_eq!(
            value,
            Value::List(vec![Value::UInt(u64::MAX), Value::UInt(1 << 63)])
        );
        assert_eq!(value.to_wire(), Ok(wire));
        assert_eq!(value.repr(), "[18446744073709551615, 9223372036854775808]");
        assert_eq!(Value::UInt(u64::MAX).type_name(), "int");
    }

    #[test]
    fn integer_narrowing_prefers_signed() {
        assert_eq!(Value::integer(-1), Some(Value::Int(-1)));
        assert_eq!(Value::integer(1 << 63), Some(Value::UInt(1 << 63)));
        assert_eq!(Value::integer(1 << 64), None);
    }

    #[test]
    fn repr_matches_python_conventions() {
        let value = Value::from_wire(json!({"b": [1, 2.5, null, true], "a": "it's"}));
        assert_eq!(value.repr(), r#"{'a': 'it\'s', 'b': [1, 2.5, None, True]}"#);
        assert_eq!(Value::Float(4.0).repr(), "4.0");
        assert_eq!(Value::Float(f64::NEG_INFINITY).repr(), "-inf");
    }

    #[test]
    fn builtin_types_are_unqualified() {
        assert_eq!(Value::List(Vec::new()).qualified_type_name(), "list");
        assert_eq!(Value::None.qualified_type_name(), "NoneType");
    }
}
