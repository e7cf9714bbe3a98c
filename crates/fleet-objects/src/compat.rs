// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dehydration, hydration and version backports.
//!
//! Backports are driven by each type's relationship tables. A table for a
//! composed field is an ascending list of `(owner version, child version)`
//! thresholds; one table encodes both when the child was added and every
//! later bump of the child version, without listing every pairwise
//! combination.

use serde_json::{Map, Value as Json};

use crate::context::RequestContext;
use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::primitive::{WirePrimitive, CHANGES_KEY, DATA_KEY, NAMESPACE, VERSION_KEY};
use crate::registry::Registry;
use crate::value::Value;
use crate::version::ObjectVersion;

/// What hydration needs besides the primitive itself.
#[derive(Clone, Copy)]
pub struct Hydration<'a> {
    pub registry: &'a Registry,
    pub context: Option<&'a RequestContext>,
}

impl<'a> Hydration<'a> {
    pub fn new(registry: &'a Registry, context: Option<&'a RequestContext>) -> Self {
        Self { registry, context }
    }
}

/// Version a composed child should be sent at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildTarget {
    /// The child did not exist at the target version; remove the field.
    Drop,
    /// Backport the child to this version.
    Backport(ObjectVersion),
    /// Target is at or past the newest threshold; backport only children
    /// newer than this version.
    UpperBound(ObjectVersion),
}

/// Walk a relationship table for `target`.
///
/// `None` only for an empty table.
pub fn child_target(relationship: &[(ObjectVersion, ObjectVersion)], target: &ObjectVersion) -> Option<ChildTarget> {
    for (index, (owner, child)) in relationship.iter().enumerate() {
        if target < owner {
            return Some(match index {
                0 => ChildTarget::Drop,
                _ => ChildTarget::Backport(relationship[index - 1].1),
            });
        }
        if target == owner {
            return Some(ChildTarget::Backport(*child));
        }
    }
    relationship.last().map(|(_, child)| ChildTarget::UpperBound(*child))
}

// ---------------------------------------------------------------------------
// Dehydration
// ---------------------------------------------------------------------------

impl Entity {
    /// Serialize every set field, backporting to `target` when it differs
    /// from this entity's version.
    pub fn to_primitive(&self, target: Option<&ObjectVersion>) -> Result<WirePrimitive> {
        match target {
            Some(target) if !target.is_exactly(self.version()) => self.to_primitive_at(target),
            _ => Ok(self.dehydrate(*self.version(), self.raw_data()?)),
        }
    }

    /// Serialize at `target`, always running [`make_compatible`](Self::make_compatible).
    ///
    /// Unlike [`to_primitive`](Self::to_primitive) this also walks composed
    /// children when `target` is the entity's own version, so children at a
    /// newer PATCH are brought down to their relationship version.
    pub fn to_primitive_at(&self, target: &ObjectVersion) -> Result<WirePrimitive> {
        log::debug!("backporting {} {} to {}", self.type_name(), self.version(), target);
        let mut data = self.raw_data()?;
        self.make_compatible(&mut data, target)?;
        Ok(self.dehydrate(*target, data))
    }

    fn raw_data(&self) -> Result<Map<String, Json>> {
        let mut data = Map::new();
        for (name, field) in self.definition().fields() {
            if let Ok(value) = self.get(name) {
                data.insert(name.to_string(), field.to_primitive(name, value)?);
            }
        }
        Ok(data)
    }

    /// Wrap `data`; change markers for fields a backport removed are dropped.
    fn dehydrate(&self, version: ObjectVersion, data: Map<String, Json>) -> WirePrimitive {
        let changes = self
            .what_changed()
            .into_iter()
            .filter(|name| data.contains_key(name))
            .collect();
        WirePrimitive {
            namespace: NAMESPACE.to_string(),
            name: self.type_name().to_string(),
            version: version.to_string(),
            data,
            changes,
        }
    }

    /// Rewrite primitive `data` of this entity so a peer at `target` can
    /// read it.
    ///
    /// Composed fields follow their relationship tables; a missing table is
    /// an `ActionError`. The type's compatibility hook runs last.
    pub fn make_compatible(&self, data: &mut Map<String, Json>, target: &ObjectVersion) -> Result<()> {
        for (name, field) in self.definition().fields() {
            if !field.kind().is_object() || !self.is_set(name) {
                continue;
            }
            let rule = self
                .definition()
                .relationship(name)
                .and_then(|r| child_target(r, target))
                .ok_or_else(|| ObjectError::action("make_compatible", format!("No rule for {name}")))?;

            match rule {
                ChildTarget::Drop => {
                    log::debug!("{}.{name} did not exist at {target}, dropping", self.type_name());
                    data.remove(name);
                }
                ChildTarget::Backport(to) => self.backport_child(data, name, to, false)?,
                ChildTarget::UpperBound(to) => self.backport_child(data, name, to, true)?,
            }
        }

        if let Some(hook) = self.definition().compat_hook() {
            hook(data, target)?;
        }
        Ok(())
    }

    fn backport_child(&self, data: &mut Map<String, Json>, name: &str, to: ObjectVersion, bound_only: bool) -> Result<()> {
        let Some(slot) = data.get_mut(name) else {
            return Ok(());
        };

        match self.get(name)? {
            Value::Null => Ok(()),
            Value::Entity(child) => backport_one(child, slot, to, bound_only),
            Value::List(items) => {
                let prims = slot
                    .as_array_mut()
                    .ok_or_else(|| ObjectError::malformed(format!("{name} is not a sequence")))?;
                for (child, prim) in items.iter().filter_map(Value::as_entity).zip(prims.iter_mut()) {
                    backport_one(child, prim, to, bound_only)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn backport_one(child: &Entity, prim: &mut Json, to: ObjectVersion, bound_only: bool) -> Result<()> {
    let prim = prim
        .as_object_mut()
        .ok_or_else(|| ObjectError::malformed("child primitive is not an object"))?;
    let current = prim
        .get(VERSION_KEY)
        .and_then(Json::as_str)
        .map(ObjectVersion::parse)
        .transpose()?
        .unwrap_or(*child.version());

    if bound_only && current <= to {
        return Ok(());
    }
    if !current.is_exactly(&to) {
        let data = prim
            .get_mut(DATA_KEY)
            .and_then(Json::as_object_mut)
            .ok_or_else(|| ObjectError::malformed("child primitive has no data"))?;
        child.make_compatible(data, &to)?;
        let kept: Vec<String> = data.keys().cloned().collect();
        if let Some(Json::Array(changes)) = prim.get_mut(CHANGES_KEY) {
            changes.retain(|c| c.as_str().is_some_and(|name| kept.iter().any(|k| k == name)));
        }
    }
    prim.insert(VERSION_KEY.to_string(), Json::String(to.to_string()));
    Ok(())
}

// ---------------------------------------------------------------------------
// Hydration
// ---------------------------------------------------------------------------

impl Entity {
    /// Hydrate an entity from its primitive.
    ///
    /// The type is resolved through the registry (exact, then newest
    /// compatible). Fields absent from `data` stay unset; change markers
    /// naming undeclared or unset fields are dropped.
    pub fn from_primitive(hydration: &Hydration<'_>, primitive: &WirePrimitive) -> Result<Entity> {
        if primitive.namespace != NAMESPACE {
            return Err(ObjectError::UnsupportedType(format!(
                "{}.{}",
                primitive.namespace, primitive.name
            )));
        }
        if !hydration.registry.contains(&primitive.name) {
            log::error!("Unable to instantiate unregistered object type {}", primitive.name);
            return Err(ObjectError::UnsupportedType(primitive.name.clone()));
        }

        let version = ObjectVersion::parse(&primitive.version)?;
        let def = hydration.registry.resolve(&primitive.name, &version)?;
        log::debug!("hydrating {} {} with {}", primitive.name, version, def.version());

        let mut entity = Entity::new(def);
        entity.set_context(hydration.context.cloned());
        entity.set_version(version);

        let def = std::sync::Arc::clone(entity.definition());
        for (name, field) in def.fields() {
            if let Some(raw) = primitive.data.get(name) {
                let value = field.from_primitive(name, raw, hydration)?;
                entity.store(name, value)?;
            }
        }
        entity.replace_changes(&primitive.changes);
        Ok(entity)
    }

    /// Hydrate from raw JSON.
    pub fn from_json(hydration: &Hydration<'_>, json: &Json) -> Result<Entity> {
        Self::from_primitive(hydration, &WirePrimitive::from_json(json)?)
    }
}
