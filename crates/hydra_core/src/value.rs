use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

const INTEGER_TYPES: [&str; 13] = [
    "int",
    "integer",
    "bigint",
    "smallint",
    "tinyint",
    "mediumint",
    "int2",
    "int4",
    "int8",
    "serial",
    "bigserial",
    "smallserial",
    "serial4",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Integer,
    Decimal,
    Text,
    Blob,
    DateTime,
    Boolean,
}

impl TypeKind {
    /// Classifies a declared type as reported by the database
    /// (`integer`, `varchar(60)`, `numeric(30,10)`, `bytea`, ...).
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.trim().to_ascii_lowercase();
        if declared.contains("blob") || declared.contains("binary") || declared == "bytea" {
            return TypeKind::Blob;
        }
        if declared.contains("bool") {
            return TypeKind::Boolean;
        }
        if declared.contains("interval") {
            return TypeKind::Text;
        }
        let base = declared.split('(').next().unwrap_or_default();
        if base.split_whitespace().any(|token| INTEGER_TYPES.contains(&token)) {
            return TypeKind::Integer;
        }
        if declared.contains("dec")
            || declared.contains("numeric")
            || declared.contains("real")
            || declared.contains("double")
            || declared.contains("float")
            || declared.contains("money")
        {
            return TypeKind::Decimal;
        }
        if declared.contains("date") || declared.contains("time") {
            return TypeKind::DateTime;
        }
        TypeKind::Text
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(value) => Some(*value),
            FieldValue::Bool(value) => Some(i64::from(*value)),
            FieldValue::Decimal(value) if value.fract().is_zero() => value.to_i64(),
            FieldValue::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self.clone().coerce(TypeKind::Decimal) {
            FieldValue::Decimal(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Converts the value to the representation used for `kind`.
    /// Values that cannot be converted are returned unchanged.
    pub fn coerce(self, kind: TypeKind) -> FieldValue {
        match (kind, self) {
            (_, FieldValue::Null) => FieldValue::Null,
            (TypeKind::Decimal, FieldValue::Int(value)) => FieldValue::Decimal(Decimal::from(value)),
            (TypeKind::Decimal, FieldValue::Float(value)) => match decimal_from_f64(value) {
                Some(decimal) => FieldValue::Decimal(decimal),
                None => FieldValue::Float(value),
            },
            (TypeKind::Decimal, FieldValue::Text(value)) => match parse_decimal(&value) {
                Some(decimal) => FieldValue::Decimal(decimal),
                None => FieldValue::Text(value),
            },
            (TypeKind::Integer, FieldValue::Bool(value)) => FieldValue::Int(i64::from(value)),
            (TypeKind::Integer, FieldValue::Decimal(value)) if value.fract().is_zero() => {
                match value.to_i64() {
                    Some(int) => FieldValue::Int(int),
                    None => FieldValue::Decimal(value),
                }
            }
            (TypeKind::Integer, FieldValue::Float(value))
                if value.fract() == 0.0 && value.abs() < i64::MAX as f64 =>
            {
                FieldValue::Int(value as i64)
            }
            (TypeKind::Integer, FieldValue::Text(value)) => match value.trim().parse::<i64>() {
                Ok(int) => FieldValue::Int(int),
                Err(_) => FieldValue::Text(value),
            },
            (TypeKind::Boolean, FieldValue::Int(value)) => FieldValue::Bool(value != 0),
            (TypeKind::Boolean, FieldValue::Text(value)) => match value.trim() {
                "1" | "true" | "TRUE" | "Y" => FieldValue::Bool(true),
                "0" | "false" | "FALSE" | "N" => FieldValue::Bool(false),
                _ => FieldValue::Text(value),
            },
            (TypeKind::Blob, FieldValue::Bytes(bytes)) => {
                match serde_json::from_slice::<JsonValue>(&bytes) {
                    Ok(json) => FieldValue::Json(json),
                    Err(_) => FieldValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
                }
            }
            (TypeKind::Blob, FieldValue::Text(text)) => match serde_json::from_str(&text) {
                Ok(json) => FieldValue::Json(json),
                Err(_) => FieldValue::Text(text),
            },
            (_, other) => other,
        }
    }
}

pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = trim_fraction_zeros(text.trim());
    Decimal::from_str(text)
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}

/// Fixed-scale columns pad the fraction with zeros that can exceed the
/// 28-digit mantissa.
fn trim_fraction_zeros(text: &str) -> &str {
    if !text.contains('.') || text.contains(['e', 'E']) {
        return text;
    }
    match text.trim_end_matches('0').trim_end_matches('.') {
        "" | "-" | "+" => "0",
        trimmed => trimmed,
    }
}

/// Converts through the shortest round-trip text form so `1.01_f64`
/// becomes exactly `1.01`.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    parse_decimal(&value.to_string()).or_else(|| Decimal::from_f64_retain(value))
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<JsonValue> for FieldValue {
    fn from(value: JsonValue) -> Self {
        FieldValue::Json(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}
