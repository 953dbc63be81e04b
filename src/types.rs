//! Value types observed during profiling and their generalization order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The type of a profiled value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Unknown,
    Null,
    String,
    Binary,
    #[serde(rename = "integer")]
    Int,
    Float,
    #[serde(rename = "boolean")]
    Bool,
    Date,
    DateTime,
    Object,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Unknown => "unknown",
            ValueType::Null => "null",
            ValueType::String => "string",
            ValueType::Binary => "binary",
            ValueType::Int => "integer",
            ValueType::Float => "float",
            ValueType::Bool => "boolean",
            ValueType::Date => "date",
            ValueType::DateTime => "datetime",
            ValueType::Object => "object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the more general of the two types. `Null` generalizes to
/// anything; every incomparable pair generalizes to `String`.
pub fn generalize(t1: ValueType, t2: ValueType) -> ValueType {
    use ValueType::*;

    if t1 == t2 {
        return t1;
    }
    if t1 == Null {
        return t2;
    }
    if t2 == Null {
        return t1;
    }

    match (t1, t2) {
        (Bool, Int) | (Int, Bool) => Int,
        (Int, Float) | (Float, Int) => Float,
        (Bool, Float) | (Float, Bool) => Float,
        (Date, DateTime) | (DateTime, Date) => DateTime,
        _ => String,
    }
}
