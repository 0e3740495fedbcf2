//! Argument types and concrete argument values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a template argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    String,
    Int,
    Float,
    Bool,
}

impl ArgType {
    /// Map the type name used in an `add_argument(type=...)` call.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "str" => Some(ArgType::String),
            "int" => Some(ArgType::Int),
            "float" => Some(ArgType::Float),
            "bool" => Some(ArgType::Bool),
            _ => None,
        }
    }

    /// Get the name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Bool => "bool",
        }
    }

    /// Parse command-line or table text as a value of this type.
    pub fn parse_value(&self, text: &str) -> Result<Value, String> {
        match self {
            ArgType::String => Ok(Value::String(text.to_string())),
            ArgType::Int => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("`{}` is not a valid int", text)),
            ArgType::Float => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("`{}` is not a valid float", text)),
            ArgType::Bool => match text.trim() {
                "true" | "True" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "False" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(format!("`{}` is not a valid bool", text)),
            },
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete argument value.
///
/// Deserializes from plain JSON scalars, so value tables can be written as
/// `{"message": "Hi", "count": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// The type this value carries.
    pub fn arg_type(&self) -> ArgType {
        match self {
            Value::String(_) => ArgType::String,
            Value::Int(_) => ArgType::Int,
            Value::Float(_) => ArgType::Float,
            Value::Bool(_) => ArgType::Bool,
        }
    }

    /// Convert this value to `ty` if the two are compatible.
    ///
    /// Only widening is allowed: an int is accepted where a float is declared.
    #[must_use]
    pub fn coerce(&self, ty: ArgType) -> Option<Value> {
        match (self, ty) {
            (Value::Int(i), ArgType::Float) => Some(Value::Float(*i as f64)),
            (v, t) if v.arg_type() == t => Some(v.clone()),
            _ => None,
        }
    }
}

/// Literal text of the value: strings verbatim, floats always with a
/// fractional part, bools as `true`/`false`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}
