//! Component descriptors
//!
//! A [`Field`] maps a client-side attribute name to the server-side (wire)
//! name inside one of the three attribute groups, with an optional
//! coercion applied on read and write.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use std::fmt;

/// Which part of the HTTP exchange carries the attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Body,
    Header,
    Uri,
}

/// Two-way conversion between the wire form and the client form
pub trait Formatter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Wire form -> client form
    fn deserialize(&self, value: &Value) -> Result<Value>;

    /// Client form -> wire form
    fn serialize(&self, value: &Value) -> Result<Value>;
}

/// Type coercion declared on a field
#[derive(Clone, Copy)]
pub enum Coercion {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Dict,
    Format(&'static dyn Formatter),
}

impl fmt::Debug for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coercion::String => write!(f, "String"),
            Coercion::Integer => write!(f, "Integer"),
            Coercion::Float => write!(f, "Float"),
            Coercion::Boolean => write!(f, "Boolean"),
            Coercion::List => write!(f, "List"),
            Coercion::Dict => write!(f, "Dict"),
            Coercion::Format(formatter) => write!(f, "Format({})", formatter.name()),
        }
    }
}

impl Coercion {
    /// Whether the value already has the client-side type
    fn matches(&self, value: &Value) -> bool {
        match self {
            Coercion::String => value.is_string(),
            Coercion::Integer => value.is_i64() || value.is_u64(),
            Coercion::Float => value.is_number(),
            Coercion::Boolean => value.is_boolean(),
            Coercion::List => value.is_array(),
            Coercion::Dict => value.is_object(),
            Coercion::Format(_) => false,
        }
    }

    /// Direct type conversion
    fn convert(&self, value: &Value) -> Result<Value> {
        let fail = || {
            Error::InvalidValue(format!("cannot convert {} to {:?}", value, self))
        };

        match self {
            Coercion::String => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(fail()),
            },
            Coercion::Integer => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
                Value::Number(n) => match n.as_f64() {
                    // 2^63 itself is out of range
                    Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                        Ok(Value::from(f as i64))
                    },
                    _ => Err(fail()),
                },
                Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| fail()),
                _ => Err(fail()),
            },
            Coercion::Float => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(fail),
                _ => Err(fail()),
            },
            Coercion::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(fail),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(fail()),
                },
                _ => Err(fail()),
            },
            Coercion::List => match value {
                Value::Array(_) => Ok(value.clone()),
                _ => Err(fail()),
            },
            Coercion::Dict => match value {
                Value::Object(_) => Ok(value.clone()),
                _ => Err(fail()),
            },
            Coercion::Format(formatter) => formatter.deserialize(value),
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Boolean sent over the wire as a string
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolStr;

impl Formatter for BoolStr {
    fn name(&self) -> &'static str {
        "BoolStr"
    }

    fn deserialize(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => parse_bool(s)
                .map(Value::Bool)
                .ok_or_else(|| Error::InvalidValue(format!("'{}' is not a boolean", s))),
            other => Err(Error::InvalidValue(format!("{} is not a boolean", other))),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Value> {
        let parsed = self.deserialize(value)?;
        Ok(Value::String(parsed.as_bool().unwrap_or(false).to_string()))
    }
}

/// ISO-8601 timestamp, normalized to RFC 3339 in UTC.
/// Timestamps without an offset are taken as UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timestamp;

impl Timestamp {
    fn normalize(s: &str) -> Option<String> {
        let parsed = DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                    .ok()
                    .map(|naive| naive.and_utc())
            })?;
        Some(parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Formatter for Timestamp {
    fn name(&self) -> &'static str {
        "Timestamp"
    }

    fn deserialize(&self, value: &Value) -> Result<Value> {
        match value.as_str().and_then(Self::normalize) {
            Some(normalized) => Ok(Value::String(normalized)),
            None => Err(Error::InvalidValue(format!("{} is not a timestamp", value))),
        }
    }

    fn serialize(&self, value: &Value) -> Result<Value> {
        self.deserialize(value)
    }
}

/// Value returned when an attribute is absent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FieldDefault {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Str(&'static str),
    EmptyList,
    EmptyDict,
}

impl FieldDefault {
    pub fn to_value(self) -> Value {
        match self {
            FieldDefault::Null => Value::Null,
            FieldDefault::Bool(b) => Value::Bool(b),
            FieldDefault::Int(i) => Value::from(i),
            FieldDefault::Str(s) => Value::String(s.to_string()),
            FieldDefault::EmptyList => Value::Array(Vec::new()),
            FieldDefault::EmptyDict => Value::Object(Default::default()),
        }
    }
}

/// One attribute declaration
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// Client-side name
    pub name: &'static str,
    /// Server-side name
    pub wire: &'static str,
    pub location: Location,
    pub coercion: Option<Coercion>,
    pub default: FieldDefault,
    pub alternate_id: bool,
}

impl Field {
    fn new(name: &'static str, wire: &'static str, location: Location) -> Self {
        Self {
            name,
            wire,
            location,
            coercion: None,
            default: FieldDefault::Null,
            alternate_id: false,
        }
    }

    /// Body attribute
    pub fn body(name: &'static str, wire: &'static str) -> Self {
        Self::new(name, wire, Location::Body)
    }

    /// Header attribute
    pub fn header(name: &'static str, wire: &'static str) -> Self {
        Self::new(name, wire, Location::Header)
    }

    /// URI attribute, used to fill placeholders in the base path
    pub fn uri(name: &'static str, wire: &'static str) -> Self {
        Self::new(name, wire, Location::Uri)
    }

    pub fn coerce(mut self, coercion: Coercion) -> Self {
        self.coercion = Some(coercion);
        self
    }

    pub fn default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }

    pub fn alternate_id(mut self) -> Self {
        self.alternate_id = true;
        self
    }

    /// Client-side value from the stored wire value.
    /// A stored value that cannot take the declared type is `InvalidValue`.
    pub fn read(&self, stored: Option<&Value>) -> Result<Value> {
        let Some(value) = stored else {
            return Ok(self.default.to_value());
        };
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self.coercion {
            Some(coercion) if !coercion.matches(value) => coercion
                .convert(value)
                .map_err(|e| Error::InvalidValue(format!("{}: {}", self.name, e))),
            _ => Ok(value.clone()),
        }
    }

    /// Wire value to store for a client-side assignment
    pub fn prepare_write(&self, value: Value) -> Result<Value> {
        let Some(coercion) = self.coercion else {
            return Ok(value);
        };
        if value.is_null() || value == self.default.to_value() {
            return Ok(value);
        }
        match coercion {
            Coercion::Format(formatter) => formatter.serialize(&value),
            _ if coercion.matches(&value) => Ok(value),
            _ => coercion.convert(&value),
        }
    }
}
