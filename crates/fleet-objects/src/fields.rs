// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field descriptors.
//!
//! A [`Field`] describes one attribute of an object type: its semantic
//! [`FieldKind`], whether it accepts null, an optional default, and how its
//! values convert to and from the JSON wire primitive.
//!
//! Values are always coerced on assignment, so an entity never holds a
//! value its field could not serialize.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value as Json;

use crate::compat::Hydration;
use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::value::Value;

/// Wire format of datetime fields (`1955-11-05T00:00:00Z`).
pub const ISO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// User-supplied conversion rules for a [`FieldKind::Custom`] field.
pub trait FieldCodec: fmt::Debug + Send + Sync {
    /// Short name used in messages.
    fn name(&self) -> &str;

    /// Validate or normalize an assigned value.
    fn coerce(&self, value: Value) -> std::result::Result<Value, String>;

    /// Convert a coerced value to its wire form.
    fn to_primitive(&self, value: &Value) -> std::result::Result<Json, String>;

    /// Convert a wire value back to a coerced value.
    fn from_primitive(&self, primitive: &Json) -> std::result::Result<Value, String>;
}

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// Semantic type of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Integer,
    NonNegativeInteger,
    Float,
    NonNegativeFloat,
    String,
    Boolean,
    DateTime,
    Uuid,
    IpAddress,
    /// String restricted to a fixed set of values.
    Enum(Vec<String>),
    List(Box<FieldKind>),
    Set(Box<FieldKind>),
    /// String-keyed map.
    Dict(Box<FieldKind>),
    /// Element kind that also accepts null (container elements only).
    Nullable(Box<FieldKind>),
    /// A nested entity of the named type.
    Object(String),
    /// A sequence of entities of the named type.
    ListOfObjects(String),
    Custom(Arc<dyn FieldCodec>),
}

impl FieldKind {
    /// Enum kind from a list of valid values.
    pub fn enumeration<I, S>(valid: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(valid.into_iter().map(Into::into).collect())
    }

    /// True for kinds that hold entities (and so need a relationship entry).
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_) | Self::ListOfObjects(_))
    }

    /// Name used in messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Integer => "Integer".into(),
            Self::NonNegativeInteger => "NonNegativeInteger".into(),
            Self::Float => "Float".into(),
            Self::NonNegativeFloat => "NonNegativeFloat".into(),
            Self::String => "String".into(),
            Self::Boolean => "Boolean".into(),
            Self::DateTime => "DateTime".into(),
            Self::Uuid => "UUID".into(),
            Self::IpAddress => "IPAddress".into(),
            Self::Enum(_) => "Enum".into(),
            Self::List(k) => format!("List({})", k.describe()),
            Self::Set(k) => format!("Set({})", k.describe()),
            Self::Dict(k) => format!("Dict({})", k.describe()),
            Self::Nullable(k) => format!("Nullable({})", k.describe()),
            Self::Object(name) => format!("Object({name})"),
            Self::ListOfObjects(name) => format!("ListOfObjects({name})"),
            Self::Custom(codec) => codec.name().to_string(),
        }
    }

    /// Coerce an assigned value to this kind.
    pub fn coerce(&self, field: &str, value: Value) -> Result<Value> {
        let bad = |v: &Value| {
            ObjectError::invalid(
                field,
                format!("{} is not a valid {}", v.kind_name(), self.describe()),
            )
        };

        match self {
            Self::Integer | Self::NonNegativeInteger => {
                let n = match &value {
                    Value::Int(v) => *v,
                    Value::Bool(v) => i64::from(*v),
                    Value::Float(v) if v.is_finite() => v.trunc() as i64,
                    Value::Str(s) => s
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| ObjectError::invalid(field, format!("'{s}' is not an integer")))?,
                    other => return Err(bad(other)),
                };
                if matches!(self, Self::NonNegativeInteger) && n < 0 {
                    return Err(ObjectError::invalid(field, format!("{n} is negative")));
                }
                Ok(Value::Int(n))
            }
            Self::Float | Self::NonNegativeFloat => {
                let n = match &value {
                    Value::Float(v) => *v,
                    Value::Int(v) => *v as f64,
                    Value::Bool(v) => f64::from(u8::from(*v)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| ObjectError::invalid(field, format!("'{s}' is not a float")))?,
                    other => return Err(bad(other)),
                };
                if matches!(self, Self::NonNegativeFloat) && n < 0.0 {
                    return Err(ObjectError::invalid(field, format!("{n} is negative")));
                }
                Ok(Value::Float(n))
            }
            Self::String => match value {
                Value::Str(s) => Ok(Value::Str(s)),
                Value::Int(v) => Ok(Value::Str(v.to_string())),
                Value::Float(v) => Ok(Value::Str(v.to_string())),
                Value::Bool(v) => Ok(Value::Str(python_bool(v).to_string())),
                Value::DateTime(v) => Ok(Value::Str(isotime(&v))),
                other => Err(bad(&other)),
            },
            Self::Boolean => Ok(Value::Bool(value.is_truthy())),
            Self::DateTime => match value {
                Value::DateTime(v) => Ok(Value::DateTime(v)),
                Value::Str(s) => parse_datetime(&s)
                    .map(Value::DateTime)
                    .ok_or_else(|| ObjectError::invalid(field, format!("'{s}' is not a datetime"))),
                other => Err(bad(&other)),
            },
            Self::Uuid => match value {
                Value::Str(s) => uuid::Uuid::parse_str(&s)
                    .map(|u| Value::Str(u.hyphenated().to_string()))
                    .map_err(|_| ObjectError::invalid(field, format!("'{s}' is not a UUID"))),
                other => Err(bad(&other)),
            },
            Self::IpAddress => match value {
                Value::Str(s) => s
                    .parse::<IpAddr>()
                    .map(|ip| Value::Str(ip.to_string()))
                    .map_err(|_| ObjectError::invalid(field, format!("'{s}' is not an IP address"))),
                other => Err(bad(&other)),
            },
            Self::Enum(valid) => {
                let coerced = Self::String.coerce(field, value)?;
                match coerced.as_str() {
                    Some(s) if valid.iter().any(|v| v == s) => Ok(coerced),
                    Some(s) => Err(ObjectError::invalid(
                        field,
                        format!("'{s}' is not one of {}", valid.join(", ")),
                    )),
                    None => Err(bad(&coerced)),
                }
            }
            Self::List(inner) => match value {
                Value::List(items) | Value::Tuple(items) | Value::Set(items) => items
                    .into_iter()
                    .map(|v| inner.coerce(field, v))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List),
                other => Err(bad(&other)),
            },
            Self::Set(inner) => match value {
                Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                    let coerced = items
                        .into_iter()
                        .map(|v| inner.coerce(field, v))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Value::set_of(coerced))
                }
                other => Err(bad(&other)),
            },
            Self::Dict(inner) => match value {
                Value::Map(entries) => entries
                    .into_iter()
                    .map(|(k, v)| Ok((k, inner.coerce(field, v)?)))
                    .collect::<Result<BTreeMap<_, _>>>()
                    .map(Value::Map),
                other => Err(bad(&other)),
            },
            Self::Nullable(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => inner.coerce(field, other),
            },
            Self::Object(type_name) => match value {
                Value::Entity(e) if e.type_name() == type_name => Ok(Value::Entity(e)),
                Value::Entity(e) => Err(ObjectError::invalid(
                    field,
                    format!("expected {type_name} object, got {}", e.type_name()),
                )),
                other => Err(bad(&other)),
            },
            Self::ListOfObjects(type_name) => match value {
                Value::List(items) | Value::Tuple(items) => {
                    let element = Self::Object(type_name.clone());
                    items
                        .into_iter()
                        .map(|v| element.coerce(field, v))
                        .collect::<Result<Vec<_>>>()
                        .map(Value::List)
                }
                other => Err(bad(&other)),
            },
            Self::Custom(codec) => codec
                .coerce(value)
                .map_err(|reason| ObjectError::invalid(field, reason)),
        }
    }

    /// Convert a coerced value to its wire form.
    pub fn to_primitive(&self, field: &str, value: &Value) -> Result<Json> {
        if value.is_null() {
            return Ok(Json::Null);
        }
        let mismatch = || {
            ObjectError::invalid(
                field,
                format!("cannot serialize {} as {}", value.kind_name(), self.describe()),
            )
        };

        match self {
            Self::Integer | Self::NonNegativeInteger => {
                value.as_i64().map(Json::from).ok_or_else(mismatch)
            }
            Self::Float | Self::NonNegativeFloat => value
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Json::Number)
                .ok_or_else(mismatch),
            Self::String | Self::Uuid | Self::IpAddress | Self::Enum(_) => {
                value.as_str().map(Json::from).ok_or_else(mismatch)
            }
            Self::Boolean => value.as_bool().map(Json::Bool).ok_or_else(mismatch),
            Self::DateTime => value
                .as_datetime()
                .map(|dt| Json::String(isotime(dt)))
                .ok_or_else(mismatch),
            Self::List(inner) | Self::Set(inner) => value
                .as_sequence()
                .ok_or_else(mismatch)?
                .iter()
                .map(|v| inner.to_primitive(field, v))
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            Self::Dict(inner) => value
                .as_map()
                .ok_or_else(mismatch)?
                .iter()
                .map(|(k, v)| Ok((k.clone(), inner.to_primitive(field, v)?)))
                .collect::<Result<serde_json::Map<_, _>>>()
                .map(Json::Object),
            Self::Nullable(inner) => inner.to_primitive(field, value),
            Self::Object(_) => value.as_entity().ok_or_else(mismatch)?.to_primitive(None)?.to_json(),
            Self::ListOfObjects(_) => value
                .as_sequence()
                .ok_or_else(mismatch)?
                .iter()
                .map(|v| v.as_entity().ok_or_else(mismatch)?.to_primitive(None)?.to_json())
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            Self::Custom(codec) => codec
                .to_primitive(value)
                .map_err(|reason| ObjectError::invalid(field, reason)),
        }
    }

    /// Convert a wire value back to an in-memory value.
    pub fn from_primitive(&self, field: &str, primitive: &Json, hydration: &Hydration<'_>) -> Result<Value> {
        if primitive.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || ObjectError::invalid(field, format!("unexpected primitive for {}", self.describe()));

        match self {
            Self::List(inner) => primitive
                .as_array()
                .ok_or_else(mismatch)?
                .iter()
                .map(|p| inner.from_primitive(field, p, hydration))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Self::Set(inner) => {
                let items = primitive
                    .as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .map(|p| inner.from_primitive(field, p, hydration))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::set_of(items))
            }
            Self::Dict(inner) => primitive
                .as_object()
                .ok_or_else(mismatch)?
                .iter()
                .map(|(k, p)| Ok((k.clone(), inner.from_primitive(field, p, hydration)?)))
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Value::Map),
            Self::Nullable(inner) => inner.from_primitive(field, primitive, hydration),
            Self::Object(_) => {
                let entity = Entity::from_json(hydration, primitive)?;
                self.coerce(field, Value::from(entity))
            }
            Self::ListOfObjects(_) => {
                let items = primitive
                    .as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .map(|p| Entity::from_json(hydration, p).map(Value::from))
                    .collect::<Result<Vec<_>>>()?;
                self.coerce(field, Value::List(items))
            }
            Self::Custom(codec) => codec
                .from_primitive(primitive)
                .map_err(|reason| ObjectError::invalid(field, reason)),
            _ => self.coerce(field, Value::from_plain_json(primitive)),
        }
    }

    /// Human-readable rendering used by entity `Display`.
    pub fn stringify(&self, value: &Value) -> String {
        stringify(value)
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Descriptor for one declared attribute. Immutable once on a type.
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldKind,
    nullable: bool,
    default: Option<Value>,
}

impl Field {
    /// A non-nullable field without default.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            nullable: false,
            default: None,
        }
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    pub fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn datetime() -> Self {
        Self::new(FieldKind::DateTime)
    }

    pub fn uuid() -> Self {
        Self::new(FieldKind::Uuid)
    }

    pub fn object(type_name: impl Into<String>) -> Self {
        Self::new(FieldKind::Object(type_name.into()))
    }

    pub fn list_of_objects(type_name: impl Into<String>) -> Self {
        Self::new(FieldKind::ListOfObjects(type_name.into()))
    }

    /// Accept null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Declare a default used by `set_defaults` and for null assignment.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Coerce an assigned value.
    ///
    /// Null is kept on nullable fields, replaced by a copy of the default on
    /// non-nullable fields that have one, and rejected otherwise.
    pub fn coerce(&self, name: &str, value: Value) -> Result<Value> {
        if value.is_null() {
            if self.nullable {
                return Ok(Value::Null);
            }
            return match &self.default {
                Some(default) => Ok(default.clone()),
                None => Err(ObjectError::invalid(name, "field is not nullable")),
            };
        }
        self.kind.coerce(name, value)
    }

    pub fn to_primitive(&self, name: &str, value: &Value) -> Result<Json> {
        self.kind.to_primitive(name, value)
    }

    pub fn from_primitive(&self, name: &str, primitive: &Json, hydration: &Hydration<'_>) -> Result<Value> {
        let value = self.kind.from_primitive(name, primitive, hydration)?;
        if value.is_null() && !self.nullable {
            return self.coerce(name, value);
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Render a datetime in wire format.
pub fn isotime(dt: &DateTime<Utc>) -> String {
    dt.format(ISO_TIME_FORMAT).to_string()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive timestamps are taken as UTC.
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn python_bool(v: bool) -> &'static str {
    if v {
        "True"
    } else {
        "False"
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(v) => python_bool(*v).to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Str(v) => format!("'{v}'"),
        Value::DateTime(v) => isotime(v),
        Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
            let inner: Vec<String> = items.iter().map(stringify).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Map(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{k}={}", stringify(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Entity(e) => e.to_string(),
    }
}
