//! Canonical scalar value representation shared between parameter binding,
//! result rows, and the driver boundary.
//!
//! Values are tagged with explicit type information so a value that crosses
//! the driver boundary or lands in a report document stays unambiguous.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::error::{QuarryError, Result};

/// Declared data kind for parameters, custom fields, and column hints.
///
/// `Any` means "no declared type": hints carrying it impose no override on
/// whatever the driver reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// No declared type.
    Any,
    /// Boolean.
    Boolean,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Decimal, carried as a 64-bit float.
    Decimal,
    /// UTF-8 string.
    String,
    /// Calendar date. Generic: resolves to a driver-specific temporal kind
    /// before parameter conversion.
    Date,
    /// Time of day.
    Time,
    /// Date and time with offset.
    Timestamp,
    /// Binary large object. Never converted.
    Blob,
    /// Character large object. Never converted.
    Clob,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataKind::Any => "any",
            DataKind::Boolean => "boolean",
            DataKind::Integer => "integer",
            DataKind::Float => "float",
            DataKind::Decimal => "decimal",
            DataKind::String => "string",
            DataKind::Date => "date",
            DataKind::Time => "time",
            DataKind::Timestamp => "timestamp",
            DataKind::Blob => "blob",
            DataKind::Clob => "clob",
        };
        f.write_str(name)
    }
}

/// Typed scalar value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// Decimal literal, carried as a 64-bit float.
    Decimal(f64),
    /// UTF-8 string literal.
    String(String),
    /// Arbitrary binary payload.
    Bytes(Vec<u8>),
    /// Calendar date.
    Date(Date),
    /// Time of day.
    Time(Time),
    /// Date and time in UTC.
    Timestamp(OffsetDateTime),
}

impl Value {
    /// Reports the kind this value carries.
    pub fn kind(&self) -> DataKind {
        match self {
            Value::Null => DataKind::Any,
            Value::Bool(_) => DataKind::Boolean,
            Value::Int(_) => DataKind::Integer,
            Value::Float(_) => DataKind::Float,
            Value::Decimal(_) => DataKind::Decimal,
            Value::String(_) => DataKind::String,
            Value::Bytes(_) => DataKind::Blob,
            Value::Date(_) => DataKind::Date,
            Value::Time(_) => DataKind::Time,
            Value::Timestamp(_) => DataKind::Timestamp,
        }
    }

    /// Whether this value is the null literal.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{v}"),
            Value::Time(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
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

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

/// Coerces `value` into `target`, the generic conversion used for parameter
/// defaults. Null passes through untouched; `Any` imposes nothing.
///
/// Failure carries the offending value and the target kind; callers never
/// retry a conversion.
pub fn coerce(value: &Value, target: DataKind) -> Result<Value> {
    if value.is_null() || target == DataKind::Any {
        return Ok(value.clone());
    }
    let mismatch = || QuarryError::ParameterConversion {
        value: value.to_string(),
        target,
    };
    match target {
        DataKind::Any => unreachable!("handled above"),
        DataKind::Boolean => match value {
            Value::Bool(v) => Ok(Value::Bool(*v)),
            Value::Int(v) => Ok(Value::Bool(*v != 0)),
            Value::Float(v) | Value::Decimal(v) => Ok(Value::Bool(*v != 0.0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        DataKind::Integer => match value {
            Value::Int(v) => Ok(Value::Int(*v)),
            Value::Bool(v) => Ok(Value::Int(i64::from(*v))),
            Value::Float(v) | Value::Decimal(v) => Ok(Value::Int(v.round() as i64)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        DataKind::Float | DataKind::Decimal => {
            let parsed = match value {
                Value::Int(v) => Some(*v as f64),
                Value::Float(v) | Value::Decimal(v) => Some(*v),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            let v = parsed.ok_or_else(mismatch)?;
            Ok(match target {
                DataKind::Decimal => Value::Decimal(v),
                _ => Value::Float(v),
            })
        }
        DataKind::String => Ok(Value::String(value.to_string())),
        DataKind::Date => match value {
            Value::Date(v) => Ok(Value::Date(*v)),
            Value::Timestamp(v) => Ok(Value::Date(v.date())),
            Value::String(s) => parse_date(s.trim()).ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        DataKind::Time => match value {
            Value::Time(v) => Ok(Value::Time(*v)),
            Value::Timestamp(v) => Ok(Value::Time(v.time())),
            Value::String(s) => {
                Time::parse(s.trim(), format_description!("[hour]:[minute]:[second]"))
                    .map(Value::Time)
                    .map_err(|_| mismatch())
            }
            _ => Err(mismatch()),
        },
        DataKind::Timestamp => match value {
            Value::Timestamp(v) => Ok(Value::Timestamp(*v)),
            Value::Date(v) => Ok(Value::Timestamp(v.midnight().assume_utc())),
            Value::String(s) => parse_timestamp(s.trim()).ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        DataKind::Blob => match value {
            Value::Bytes(v) => Ok(Value::Bytes(v.clone())),
            Value::String(s) => Ok(Value::Bytes(s.clone().into_bytes())),
            _ => Err(mismatch()),
        },
        DataKind::Clob => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Bytes(v) => String::from_utf8(v.clone())
                .map(Value::String)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
    }
}

fn parse_date(s: &str) -> Option<Value> {
    if let Ok(date) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
        return Some(Value::Date(date));
    }
    OffsetDateTime::parse(s, &Rfc3339)
        .ok()
        .map(|ts| Value::Date(ts.date()))
}

fn parse_timestamp(s: &str) -> Option<Value> {
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(Value::Timestamp(ts));
    }
    let datetime = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(dt) = PrimitiveDateTime::parse(s, datetime) {
        return Some(Value::Timestamp(dt.assume_utc()));
    }
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| Value::Timestamp(d.midnight().assume_utc()))
}
