//! Host field values and their canonical stored form
//!
//! Live entities hold typed [`Value`]s. Everything that leaves the entity,
//! whether a backend row or an audit diff, uses the canonical stored form
//! produced by [`FieldType::to_stored`]. Dates, times and objects become
//! strings there, and [`FieldType::from_stored`] turns them back into typed
//! values.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde_json::Value as Json;

use super::schema::FieldType;
use crate::error::{AuditError, AuditResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// A live field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Array and object payloads
    Json(Json),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Self::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Self::Json(j) => write!(f, "{}", j),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Self::DateTime(dt)
    }
}

impl From<NaiveTime> for Value {
    fn from(t: NaiveTime) -> Self {
        Self::Time(t)
    }
}

impl From<Json> for Value {
    fn from(j: Json) -> Self {
        match j {
            Json::Null => Self::Null,
            other => Self::Json(other),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Result of rendering a stored value as text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Text(String),
    Unrenderable,
}

impl Rendered {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            Self::Unrenderable => None,
        }
    }
}

/// Compare two stored values, treating numbers by value
pub fn stored_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Render a stored value for a field the schema does not know
pub fn render_raw(stored: &Json) -> Rendered {
    match stored {
        Json::Null => Rendered::Text(String::new()),
        Json::Bool(b) => Rendered::Text(b.to_string()),
        Json::Number(n) => Rendered::Text(n.to_string()),
        Json::String(s) => Rendered::Text(s.clone()),
        Json::Array(_) | Json::Object(_) => Rendered::Unrenderable,
    }
}

fn invalid(field_type: &FieldType, what: impl fmt::Display) -> AuditError {
    AuditError::Validation(format!("{} is not a valid {} value", what, field_type.name()))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).ok()
}

fn float_json(x: f64) -> Json {
    serde_json::Number::from_f64(x)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

impl FieldType {
    /// Coerce a value assigned to a field into this type
    ///
    /// Sub-second precision is dropped from datetimes and times so the live
    /// value always survives a trip through the stored form unchanged.
    pub fn normalize(&self, value: Value) -> AuditResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match (self, value) {
            (Self::String | Self::Text, Value::String(s)) => Ok(Value::String(s)),
            (Self::Enum(allowed), Value::String(s)) => {
                if allowed.iter().any(|a| a == &s) {
                    Ok(Value::String(s))
                } else {
                    Err(AuditError::Validation(format!(
                        "'{}' is not one of [{}]",
                        s,
                        allowed.join(", ")
                    )))
                }
            }
            (Self::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Self::Boolean, Value::Integer(i @ (0 | 1))) => Ok(Value::Bool(i == 1)),
            (Self::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (Self::Float | Self::Money, Value::Float(x)) if !x.is_finite() => Err(
                AuditError::Validation(format!("{} cannot be stored as {:?}", x, self)),
            ),
            (Self::Float | Self::Money, Value::Float(x)) => Ok(Value::Float(x)),
            (Self::Float | Self::Money, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (Self::Date, Value::Date(d)) => Ok(Value::Date(d)),
            (Self::Date, Value::DateTime(dt)) => Ok(Value::Date(dt.date())),
            (Self::Date, Value::String(s)) => {
                parse_date(&s).map(Value::Date).ok_or_else(|| invalid(self, s))
            }
            (Self::DateTime, Value::DateTime(dt)) => Ok(Value::DateTime(
                dt.with_nanosecond(0).unwrap_or(dt),
            )),
            (Self::DateTime, Value::String(s)) => {
                parse_datetime(&s).map(Value::DateTime).ok_or_else(|| invalid(self, s))
            }
            (Self::Time, Value::Time(t)) => Ok(Value::Time(t.with_nanosecond(0).unwrap_or(t))),
            (Self::Time, Value::DateTime(dt)) => {
                let t = dt.time();
                Ok(Value::Time(t.with_nanosecond(0).unwrap_or(t)))
            }
            (Self::Time, Value::String(s)) => {
                parse_time(&s).map(Value::Time).ok_or_else(|| invalid(self, s))
            }
            (Self::Array, Value::Json(j @ (Json::Array(_) | Json::Object(_)))) => {
                Ok(Value::Json(j))
            }
            (Self::Object, Value::Json(j)) => Ok(Value::Json(j)),
            (_, other) => Err(invalid(self, format!("{:?}", other))),
        }
    }

    /// Canonical stored form of a live value
    pub fn to_stored(&self, value: &Value) -> Json {
        match (self, value) {
            (_, Value::Null) => Json::Null,
            (Self::Object, Value::Json(j)) => Json::String(j.to_string()),
            (_, Value::Bool(b)) => Json::Bool(*b),
            (_, Value::Integer(i)) => Json::from(*i),
            (_, Value::Float(x)) => float_json(*x),
            (_, Value::String(s)) => Json::String(s.clone()),
            (_, Value::Date(d)) => Json::String(d.format(DATE_FORMAT).to_string()),
            (_, Value::DateTime(dt)) => Json::String(dt.format(DATETIME_FORMAT).to_string()),
            (_, Value::Time(t)) => Json::String(t.format(TIME_FORMAT).to_string()),
            (_, Value::Json(j)) => j.clone(),
        }
    }

    /// Decode a stored value back into a live value
    pub fn from_stored(&self, stored: &Json) -> AuditResult<Value> {
        if stored.is_null() {
            return Ok(Value::Null);
        }

        let value = match (self, stored) {
            (Self::String | Self::Text | Self::Enum(_), Json::String(s)) => {
                Value::String(s.clone())
            }
            (Self::Boolean, Json::Bool(b)) => Value::Bool(*b),
            (Self::Boolean, Json::Number(n)) => Value::Bool(n.as_i64() == Some(1)),
            (Self::Integer, Json::Number(n)) => {
                Value::Integer(n.as_i64().ok_or_else(|| invalid(self, n))?)
            }
            (Self::Float | Self::Money, Json::Number(n)) => {
                Value::Float(n.as_f64().ok_or_else(|| invalid(self, n))?)
            }
            (Self::Date, Json::String(s)) => {
                Value::Date(parse_date(s).ok_or_else(|| invalid(self, s))?)
            }
            (Self::DateTime, Json::String(s)) => {
                Value::DateTime(parse_datetime(s).ok_or_else(|| invalid(self, s))?)
            }
            (Self::Time, Json::String(s)) => {
                Value::Time(parse_time(s).ok_or_else(|| invalid(self, s))?)
            }
            (Self::Array, j @ (Json::Array(_) | Json::Object(_))) => Value::Json(j.clone()),
            (Self::Object, Json::String(s)) => Value::Json(serde_json::from_str(s)?),
            (Self::Object, j) => Value::Json(j.clone()),
            (_, other) => return Err(invalid(self, other)),
        };

        Ok(value)
    }

    /// Render a stored value as description text
    pub fn render(&self, stored: &Json) -> Rendered {
        match (self, stored) {
            (_, Json::Null) => Rendered::Text(String::new()),
            (Self::Money, Json::Number(n)) => match n.as_f64() {
                Some(x) => Rendered::Text(format!("{:.2}", x)),
                None => Rendered::Text(n.to_string()),
            },
            (Self::Array, j @ (Json::Array(_) | Json::Object(_))) => Rendered::Text(j.to_string()),
            (Self::Object, j @ Json::Object(_)) => Rendered::Text(j.to_string()),
            (_, other) => render_raw(other),
        }
    }
}
