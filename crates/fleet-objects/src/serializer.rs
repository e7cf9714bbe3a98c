// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire serializer for RPC arguments and results.
//!
//! Converts arbitrary [`Value`]s to JSON and back, turning entities into
//! their primitives on the way out and hydrating any JSON object carrying
//! the primitive name key on the way in.
//!
//! Sets go out as sequences and come back as lists; the wire has no set
//! type.
//!
//! # Version skew
//!
//! When hydration fails with `IncompatibleVersion`:
//!
//! 1. a version with a PATCH component is retried once as `MAJOR.MINOR`
//!    (PATCH changes are additive by construction);
//! 2. otherwise, if a [`BackportAuthority`] is configured, it is asked for
//!    the primitive at the newest version this node knows, and that result
//!    is hydrated instead.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::compat::Hydration;
use crate::config::SerializerConfig;
use crate::context::RequestContext;
use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::fields::isotime;
use crate::primitive::WirePrimitive;
use crate::registry::Registry;
use crate::value::Value;
use crate::version::ObjectVersion;

/// A peer able to rewrite a primitive at an older version.
pub trait BackportAuthority: Send + Sync {
    fn backport(
        &self,
        context: Option<&RequestContext>,
        primitive: &WirePrimitive,
        target: &ObjectVersion,
    ) -> Result<WirePrimitive>;
}

impl<F> BackportAuthority for F
where
    F: Fn(Option<&RequestContext>, &WirePrimitive, &ObjectVersion) -> Result<WirePrimitive> + Send + Sync,
{
    fn backport(
        &self,
        context: Option<&RequestContext>,
        primitive: &WirePrimitive,
        target: &ObjectVersion,
    ) -> Result<WirePrimitive> {
        self(context, primitive, target)
    }
}

/// Entity-aware serializer for one node.
#[derive(Clone)]
pub struct WireSerializer {
    registry: Arc<Registry>,
    backport: Option<Arc<dyn BackportAuthority>>,
    config: SerializerConfig,
}

impl WireSerializer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            backport: None,
            config: SerializerConfig::default(),
        }
    }

    /// Use `authority` for versions this node cannot hydrate.
    pub fn with_backport(mut self, authority: Arc<dyn BackportAuthority>) -> Self {
        self.backport = Some(authority);
        self
    }

    pub fn with_config(mut self, config: SerializerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Serialize
    // -----------------------------------------------------------------------

    /// Convert a value to its wire form.
    pub fn serialize(&self, context: Option<&RequestContext>, value: &Value) -> Result<Json> {
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(v) => Json::Bool(*v),
            Value::Int(v) => Json::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .ok_or_else(|| ObjectError::invalid("value", format!("{v} cannot be sent")))?,
            Value::Str(v) => Json::String(v.clone()),
            Value::DateTime(v) => Json::String(isotime(v)),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => Json::Array(
                items
                    .iter()
                    .map(|i| self.serialize(context, i))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.serialize(context, v)?)))
                    .collect::<Result<Map<_, _>>>()?,
            ),
            Value::Entity(e) => e.to_primitive(None)?.to_json()?,
        })
    }

    // -----------------------------------------------------------------------
    // Deserialize
    // -----------------------------------------------------------------------

    /// Convert a wire value back, hydrating embedded primitives.
    pub fn deserialize(&self, context: Option<&RequestContext>, wire: &Json) -> Result<Value> {
        Ok(match wire {
            Json::Object(_) if WirePrimitive::is_primitive(wire) => {
                Value::from(self.process_object(context, WirePrimitive::from_json(wire)?)?)
            }
            Json::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.deserialize(context, v)?)))
                    .collect::<Result<_>>()?,
            ),
            Json::Array(items) => Value::List(
                items
                    .iter()
                    .map(|i| self.deserialize(context, i))
                    .collect::<Result<_>>()?,
            ),
            scalar => Value::from_plain_json(scalar),
        })
    }

    /// Hydrate one primitive, applying the version-skew fallbacks.
    pub fn process_object(&self, context: Option<&RequestContext>, mut primitive: WirePrimitive) -> Result<Entity> {
        let hydration = Hydration::new(&self.registry, context);
        let err = match Entity::from_primitive(&hydration, &primitive) {
            Ok(entity) => return Ok(entity),
            Err(err @ ObjectError::IncompatibleVersion { .. }) => err,
            Err(err) => return Err(err),
        };

        let version = ObjectVersion::parse(&primitive.version)?;
        if version.has_patch() && self.config.tolerate_patch_skew {
            log::warn!(
                "{} {} unknown, accepting as {}",
                primitive.name,
                version,
                version.truncated()
            );
            primitive.version = version.truncated().to_string();
            return self.process_object(context, primitive);
        }

        let supported = self.registry.versions(&primitive.name);
        match (&self.backport, supported.first()) {
            (Some(authority), Some(target)) if self.config.request_backport => {
                log::warn!(
                    "{} {} unsupported, requesting backport to {}",
                    primitive.name,
                    primitive.version,
                    target
                );
                let backported = authority.backport(context, &primitive, target)?;
                Entity::from_primitive(&hydration, &backported)
            }
            _ => Err(err),
        }
    }
}

impl fmt::Debug for WireSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireSerializer")
            .field("types", &self.registry.len())
            .field("backport", &self.backport.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::TypeDefinition;
    use crate::fields::Field;
    use parking_lot::Mutex;
    use serde_json::json;

    fn registry(versions: &[&str]) -> Arc<Registry> {
        let mut reg = Registry::new();
        for v in versions {
            reg.register(
                TypeDefinition::builder("Widget", v)
                    .field("id", Field::integer())
                    .build()
                    .unwrap(),
            );
        }
        Arc::new(reg)
    }

    fn widget_prim(version: &str) -> Json {
        json!({
            "nova_object.namespace": "nova",
            "nova_object.name": "Widget",
            "nova_object.version": version,
            "nova_object.data": {"id": 3},
        })
    }

    #[test]
    fn test_sets_become_sequences() {
        let ser = WireSerializer::new(registry(&["1.0"]));
        let set = Value::set_of([Value::Int(1), Value::Int(2), Value::Int(3)]);
        let wire = ser.serialize(None, &set).unwrap();
        assert_eq!(wire, json!([1, 2, 3]));
        assert_eq!(
            ser.deserialize(None, &wire).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_nested_containers_hydrate_entities() {
        let ser = WireSerializer::new(registry(&["1.0"]));
        let wire = json!({"items": [widget_prim("1.0"), 4], "flag": true});
        let value = ser.deserialize(None, &wire).unwrap();
        let items = value.as_map().unwrap()["items"].as_sequence().unwrap();
        assert_eq!(items[0].as_entity().unwrap().get("id").unwrap(), &Value::Int(3));
        assert_eq!(items[1], Value::Int(4));
    }

    #[test]
    fn test_entity_round_trip_keeps_context() {
        let reg = registry(&["1.0"]);
        let ser = WireSerializer::new(reg.clone());
        let mut e = reg.create("Widget").unwrap();
        e.set("id", 9i64).unwrap();

        let ctx = RequestContext::new("u", "p");
        let wire = ser.serialize(Some(&ctx), &Value::from(e.clone())).unwrap();
        let back = ser.deserialize(Some(&ctx), &wire).unwrap().into_entity().unwrap();
        assert_eq!(back, e);
        assert_eq!(back.context(), Some(&ctx));
        assert!(back.what_changed().contains("id"));
    }

    #[test]
    fn test_patch_is_truncated_once() {
        let ser = WireSerializer::new(registry(&["1.0"]));
        let e = ser.deserialize(None, &widget_prim("1.0.4")).unwrap().into_entity().unwrap();
        assert_eq!(e.version().to_string(), "1.0");
    }

    #[test]
    fn test_patch_skew_can_be_disabled() {
        let ser = WireSerializer::new(registry(&["1.0"])).with_config(SerializerConfig {
            tolerate_patch_skew: false,
            request_backport: false,
        });
        assert!(matches!(
            ser.deserialize(None, &widget_prim("1.0.4")),
            Err(ObjectError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn test_backport_authority_is_asked_for_newest_known_version() {
        let asked = Arc::new(Mutex::new(Vec::new()));
        let log = asked.clone();
        let authority = move |_: Option<&RequestContext>, prim: &WirePrimitive, target: &ObjectVersion| -> Result<WirePrimitive> {
            log.lock().push(format!("{}->{}", prim.version, target));
            let mut out = prim.clone();
            out.version = target.to_string();
            Ok(out)
        };
        let ser = WireSerializer::new(registry(&["1.0", "1.1"])).with_backport(Arc::new(authority));

        let e = ser.deserialize(None, &widget_prim("1.5")).unwrap().into_entity().unwrap();
        assert_eq!(e.version().to_string(), "1.1");
        assert_eq!(*asked.lock(), vec!["1.5->1.1".to_string()]);
    }

    #[test]
    fn test_without_authority_incompatibility_surfaces() {
        let ser = WireSerializer::new(registry(&["1.0"]));
        let err = ser.deserialize(None, &widget_prim("2.0")).unwrap_err();
        assert_eq!(
            err,
            ObjectError::IncompatibleVersion {
                type_name: "Widget".into(),
                requested: "2.0".into(),
                supported: "1.0".into(),
            }
        );
    }

    #[test]
    fn test_unknown_namespace() {
        let ser = WireSerializer::new(registry(&["1.0"]));
        let mut wire = widget_prim("1.0");
        wire["nova_object.namespace"] = json!("other");
        assert_eq!(
            ser.deserialize(None, &wire).unwrap_err(),
            ObjectError::UnsupportedType("other.Widget".into())
        );
    }
}
