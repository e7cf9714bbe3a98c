// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Versioned, change-tracked entity instances.
//!
//! An [`Entity`] is one instance of a registered [`TypeDefinition`]. Each
//! declared field is either unset or holds a value already coerced by its
//! field descriptor; null is a value, not the absence of one.
//!
//! Assignments through [`Entity::set`] mark the field changed. Nested
//! entities report their own changes upward: a parent considers a composed
//! field changed whenever the child (or any element of a child list) has
//! changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::context::RequestContext;
use crate::definition::TypeDefinition;
use crate::error::{ObjectError, Result};
use crate::value::Value;
use crate::version::ObjectVersion;

/// One instance of an object type.
pub struct Entity {
    def: Arc<TypeDefinition>,
    version: ObjectVersion,
    context: Option<RequestContext>,
    values: BTreeMap<String, Value>,
    changed: BTreeSet<String>,
}

impl Entity {
    /// An empty, orphaned instance of `def`.
    pub fn new(def: Arc<TypeDefinition>) -> Self {
        Self {
            version: *def.version(),
            def,
            context: None,
            values: BTreeMap::new(),
            changed: BTreeSet::new(),
        }
    }

    /// Builder-style context binding.
    pub fn bound(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn definition(&self) -> &Arc<TypeDefinition> {
        &self.def
    }

    pub fn type_name(&self) -> &str {
        self.def.name()
    }

    /// Version of this instance. Matches the definition unless the entity
    /// was hydrated from an older compatible primitive.
    pub fn version(&self) -> &ObjectVersion {
        &self.version
    }

    pub(crate) fn set_version(&mut self, version: ObjectVersion) {
        self.version = version;
    }

    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    pub fn set_context(&mut self, context: Option<RequestContext>) {
        self.context = context;
    }

    // -----------------------------------------------------------------------
    // Field access
    // -----------------------------------------------------------------------

    /// Assign a declared field and mark it changed.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.store(name, value.into())?;
        self.changed.insert(name.to_string());
        Ok(())
    }

    /// Assign without marking the field changed. Used while hydrating.
    pub(crate) fn store(&mut self, name: &str, value: Value) -> Result<()> {
        let coerced = self.def.require_field(name)?.coerce(name, value)?;
        self.store_coerced(name.to_string(), coerced);
        Ok(())
    }

    /// Insert a value that was already coerced against this definition.
    pub(crate) fn store_coerced(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    /// Read a declared field.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.def.require_field(name)?;
        self.values.get(name).ok_or_else(|| self.not_set(name))
    }

    /// Mutable access to a set field. Does not mark the field changed;
    /// nested entities still report their own changes.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Value> {
        self.def.require_field(name)?;
        let def = Arc::clone(&self.def);
        self.values.get_mut(name).ok_or_else(|| ObjectError::AttributeNotSet {
            type_name: def.name().to_string(),
            field: name.to_string(),
        })
    }

    fn not_set(&self, name: &str) -> ObjectError {
        ObjectError::AttributeNotSet {
            type_name: self.type_name().to_string(),
            field: name.to_string(),
        }
    }

    /// True if `name` is declared and has been assigned.
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Set field names in declaration order.
    pub fn set_fields(&self) -> impl Iterator<Item = &str> {
        self.def.field_names().filter(|n| self.values.contains_key(*n))
    }

    // -----------------------------------------------------------------------
    // Change tracking
    // -----------------------------------------------------------------------

    /// Own changed fields plus every composed field whose child has changes.
    pub fn what_changed(&self) -> BTreeSet<String> {
        let mut changes = self.changed.clone();
        for (name, value) in &self.values {
            if child_has_changes(value) {
                changes.insert(name.clone());
            }
        }
        changes
    }

    /// Changed fields with their current values.
    pub fn get_changes(&self) -> BTreeMap<String, Value> {
        self.what_changed()
            .into_iter()
            .filter_map(|name| self.values.get(&name).cloned().map(|v| (name, v)))
            .collect()
    }

    /// Forget changes, for all fields or only `fields`.
    ///
    /// With `recursive`, composed entities under the affected fields are
    /// fully reset as well, whatever `fields` says.
    pub fn reset_changes(&mut self, fields: Option<&[&str]>, recursive: bool) {
        let wanted = |name: &str| fields.map_or(true, |f| f.contains(&name));

        if recursive {
            for (name, value) in self.values.iter_mut() {
                if wanted(name) {
                    reset_children(value);
                }
            }
        }

        match fields {
            Some(fields) => {
                for name in fields {
                    self.changed.remove(*name);
                }
            }
            None => self.changed.clear(),
        }
    }

    /// Mark a set field changed.
    pub(crate) fn mark_changed(&mut self, name: &str) {
        if self.values.contains_key(name) {
            self.changed.insert(name.to_string());
        }
    }

    /// Replace the changed set, keeping only fields that are set.
    pub(crate) fn replace_changes<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.changed = names
            .into_iter()
            .filter(|n| self.values.contains_key(n.as_ref()))
            .map(|n| n.as_ref().to_string())
            .collect();
    }

    // -----------------------------------------------------------------------
    // Defaults
    // -----------------------------------------------------------------------

    /// Assign defaults to unset fields.
    ///
    /// With `attrs`, only those fields are considered and each must declare
    /// a default; without, every field that declares one.
    pub fn set_defaults(&mut self, attrs: Option<&[&str]>) -> Result<()> {
        let targets: Vec<String> = match attrs {
            Some(attrs) => attrs.iter().map(|a| (*a).to_string()).collect(),
            None => self
                .def
                .fields()
                .filter(|(_, f)| f.default_value().is_some())
                .map(|(n, _)| n.to_string())
                .collect(),
        };

        for name in targets {
            let default = self
                .def
                .require_field(&name)?
                .default_value()
                .cloned()
                .ok_or_else(|| ObjectError::action("set_defaults", format!("No default set for field {name}")))?;
            if !self.is_set(&name) {
                self.set(&name, default)?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scoped context
    // -----------------------------------------------------------------------

    /// Run `f` with `context` bound in place of the current one.
    ///
    /// The original context is restored when `f` returns or unwinds.
    pub fn with_context<R>(&mut self, context: RequestContext, f: impl FnOnce(&mut Entity) -> R) -> R {
        let saved = self.context.replace(context);
        let guard = ContextGuard {
            entity: self,
            saved: Some(saved),
        };
        f(&mut *guard.entity)
    }

    /// Run `f` with an elevated copy of the bound context.
    pub fn as_admin<R>(&mut self, f: impl FnOnce(&mut Entity) -> R) -> Result<R> {
        let elevated = self
            .context
            .as_ref()
            .map(RequestContext::elevated)
            .ok_or_else(|| ObjectError::OrphanedEntity {
                method: "as_admin".to_string(),
                type_name: self.type_name().to_string(),
            })?;
        Ok(self.with_context(elevated, f))
    }

    // -----------------------------------------------------------------------
    // Conversion
    // -----------------------------------------------------------------------

    /// Plain JSON view: set fields only, nested entities as objects and
    /// list types as arrays.
    pub fn to_plain(&self) -> Result<Json> {
        if self.def.is_list() {
            let items = match self.values.get(crate::definition::LIST_FIELD) {
                Some(Value::List(items)) => items
                    .iter()
                    .map(|v| plain(self, crate::definition::LIST_FIELD, v))
                    .collect::<Result<Vec<_>>>()?,
                _ => Vec::new(),
            };
            return Ok(Json::Array(items));
        }

        let mut out = serde_json::Map::new();
        for name in self.set_fields() {
            if let Some(value) = self.values.get(name) {
                out.insert(name.to_string(), plain(self, name, value)?);
            }
        }
        Ok(Json::Object(out))
    }
}

fn plain(owner: &Entity, name: &str, value: &Value) -> Result<Json> {
    match value {
        Value::Entity(e) => e.to_plain(),
        Value::List(items) if items.iter().any(|i| i.as_entity().is_some()) => items
            .iter()
            .map(|i| plain(owner, name, i))
            .collect::<Result<Vec<_>>>()
            .map(Json::Array),
        _ => match owner.def.field(name) {
            Some(field) => field.to_primitive(name, value),
            None => Ok(Json::Null),
        },
    }
}

fn child_has_changes(value: &Value) -> bool {
    match value {
        Value::Entity(e) => !e.what_changed().is_empty(),
        Value::List(items) => items
            .iter()
            .any(|i| i.as_entity().is_some_and(|e| !e.what_changed().is_empty())),
        _ => false,
    }
}

fn reset_children(value: &mut Value) {
    match value {
        Value::Entity(e) => e.reset_changes(None, true),
        Value::List(items) => {
            for item in items.iter_mut().filter_map(Value::as_entity_mut) {
                item.reset_changes(None, true);
            }
        }
        _ => {}
    }
}

struct ContextGuard<'a> {
    entity: &'a mut Entity,
    saved: Option<Option<RequestContext>>,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.entity.context = saved;
        }
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

/// Copies declared field values, the changed set and the context; nothing
/// else on the instance is carried over.
impl Clone for Entity {
    fn clone(&self) -> Self {
        let values = self
            .def
            .field_names()
            .filter_map(|n| self.values.get(n).map(|v| (n.to_string(), v.clone())))
            .collect();
        Self {
            def: Arc::clone(&self.def),
            version: self.version,
            context: self.context.clone(),
            values,
            changed: self.changed.clone(),
        }
    }
}

/// Same type and same field values. Context and changes are ignored.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.values == other.values
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.type_name())
            .field("version", &self.version().to_string())
            .field("values", &self.values)
            .field("changed", &self.changed)
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<_> = self.def.fields().collect();
        fields.sort_by_key(|(name, _)| *name);

        write!(f, "{}(", self.type_name())?;
        for (i, (name, field)) in fields.into_iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match self.values.get(name) {
                Some(v) => write!(f, "{name}={}", field.kind().stringify(v))?,
                None => write!(f, "{name}=<?>")?,
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;

    fn child_def() -> Arc<TypeDefinition> {
        Arc::new(
            TypeDefinition::builder("Child", "1.0")
                .field("name", Field::string())
                .build()
                .unwrap(),
        )
    }

    fn parent_def() -> Arc<TypeDefinition> {
        Arc::new(
            TypeDefinition::builder("Parent", "1.0")
                .field("id", Field::integer())
                .field("label", Field::string().nullable())
                .field("flag", Field::boolean().with_default(false))
                .field("child", Field::object("Child").nullable())
                .relationship("child", &[("1.0", "1.0")])
                .build()
                .unwrap(),
        )
    }

    fn child(name: &str) -> Entity {
        let mut c = Entity::new(child_def());
        c.set("name", name).unwrap();
        c
    }

    #[test]
    fn test_unset_is_distinct_from_null() {
        let mut e = Entity::new(parent_def());
        assert!(matches!(e.get("label"), Err(ObjectError::AttributeNotSet { .. })));
        e.set("label", Value::Null).unwrap();
        assert_eq!(e.get("label").unwrap(), &Value::Null);
        assert!(matches!(e.get("nope"), Err(ObjectError::UnknownField { .. })));
        assert!(matches!(e.set("nope", 1i64), Err(ObjectError::UnknownField { .. })));
    }

    #[test]
    fn test_set_tracks_changes_and_coerces() {
        let mut e = Entity::new(parent_def());
        e.set("id", "42").unwrap();
        assert_eq!(e.get("id").unwrap(), &Value::Int(42));
        assert_eq!(e.what_changed(), BTreeSet::from(["id".to_string()]));
        assert!(e.set("id", "x").is_err());

        e.reset_changes(None, false);
        assert!(e.what_changed().is_empty());
    }

    #[test]
    fn test_nested_changes_propagate_upward() {
        let mut e = Entity::new(parent_def());
        e.set("child", child("a")).unwrap();
        e.reset_changes(None, false);
        // the child still carries its own change
        assert!(e.what_changed().contains("child"));

        e.reset_changes(None, true);
        assert!(e.what_changed().is_empty());

        e.get_mut("child").unwrap().as_entity_mut().unwrap().set("name", "b").unwrap();
        assert_eq!(e.what_changed(), BTreeSet::from(["child".to_string()]));
    }

    #[test]
    fn test_reset_with_filter_keeps_other_changes() {
        let mut e = Entity::new(parent_def());
        e.set("id", 1i64).unwrap();
        e.set("label", "x").unwrap();
        e.reset_changes(Some(&["id"]), false);
        assert_eq!(e.what_changed(), BTreeSet::from(["label".to_string()]));
    }

    #[test]
    fn test_set_defaults() {
        let mut e = Entity::new(parent_def());
        e.set_defaults(None).unwrap();
        assert_eq!(e.get("flag").unwrap(), &Value::Bool(false));
        assert!(!e.is_set("id"));

        let err = e.set_defaults(Some(&["id"])).unwrap_err();
        assert!(matches!(err, ObjectError::ActionError { .. }));
    }

    #[test]
    fn test_clone_is_deep() {
        let mut e = Entity::new(parent_def());
        e.set("child", child("a")).unwrap();
        let mut copy = e.clone();
        copy.get_mut("child").unwrap().as_entity_mut().unwrap().set("name", "b").unwrap();
        assert_eq!(e.get("child").unwrap().as_entity().unwrap().get("name").unwrap(), &Value::from("a"));
        assert_ne!(e, copy);
    }

    #[test]
    fn test_context_is_restored_after_scope() {
        let ctx = RequestContext::new("u", "p");
        let mut e = Entity::new(parent_def()).bound(ctx.clone());

        let was_admin = e.as_admin(|inner| inner.context().map(|c| c.is_admin)).unwrap();
        assert_eq!(was_admin, Some(true));
        assert_eq!(e.context(), Some(&ctx));

        let other = RequestContext::new("v", "q");
        let r: Result<()> = e.with_context(other, |_| Err(ObjectError::Transport("boom".into())));
        assert!(r.is_err());
        assert_eq!(e.context(), Some(&ctx));
    }

    #[test]
    fn test_as_admin_requires_context() {
        let mut e = Entity::new(parent_def());
        assert!(matches!(e.as_admin(|_| ()), Err(ObjectError::OrphanedEntity { .. })));
    }

    #[test]
    fn test_display_lists_fields_by_name() {
        let mut e = Entity::new(parent_def());
        e.set("id", 3i64).unwrap();
        e.set("label", "x").unwrap();
        assert_eq!(e.to_string(), "Parent(child=<?>,flag=<?>,id=3,label='x')");
    }

    #[test]
    fn test_to_plain_nests_children() {
        let mut e = Entity::new(parent_def());
        e.set("id", 3i64).unwrap();
        e.set("child", child("a")).unwrap();
        assert_eq!(
            e.to_plain().unwrap(),
            serde_json::json!({"id": 3, "child": {"name": "a"}})
        );
    }
}
