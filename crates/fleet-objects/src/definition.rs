// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type definitions: the schema of one version of one object type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::fields::{Field, FieldKind};
use crate::remote::{CallArgs, ClassCall, Method};
use crate::value::Value;
use crate::version::ObjectVersion;

/// Per-type hook run by `make_compatible` after relationship backports.
///
/// Receives the primitive's `data` map and the target version; typically
/// removes fields that did not exist at that version.
pub type CompatHook = Arc<dyn Fn(&mut Map<String, Json>, &ObjectVersion) -> Result<()> + Send + Sync>;

/// Ordered `(owner version, child version)` thresholds for one composed field.
pub type Relationship = Vec<(ObjectVersion, ObjectVersion)>;

/// Name of the single field carried by list types.
pub const LIST_FIELD: &str = "objects";

// ---------------------------------------------------------------------------
// TypeDefinition
// ---------------------------------------------------------------------------

/// One registered version of an object type.
pub struct TypeDefinition {
    name: String,
    version: ObjectVersion,
    fields: Vec<(String, Field)>,
    relationships: BTreeMap<String, Relationship>,
    methods: BTreeMap<String, Method>,
    compat: Option<CompatHook>,
}

impl TypeDefinition {
    /// Start building a type definition.
    pub fn builder(name: impl Into<String>, version: &str) -> TypeDefinitionBuilder {
        TypeDefinitionBuilder::new(name.into(), version)
    }

    /// Start building a list type whose `objects` field holds `item_type`
    /// entities, with `child_versions` as its relationship table.
    pub fn list(
        name: impl Into<String>,
        version: &str,
        item_type: &str,
        child_versions: &[(&str, &str)],
    ) -> TypeDefinitionBuilder {
        Self::builder(name, version)
            .field(LIST_FIELD, Field::list_of_objects(item_type).with_default(Value::List(Vec::new())))
            .relationship(LIST_FIELD, child_versions)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &ObjectVersion {
        &self.version
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Like [`field`](Self::field) but fails with `UnknownField`.
    pub fn require_field(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| ObjectError::UnknownField {
            type_name: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn relationship(&self, field: &str) -> Option<&[(ObjectVersion, ObjectVersion)]> {
        self.relationships.get(field).map(Vec::as_slice)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub(crate) fn compat_hook(&self) -> Option<&CompatHook> {
        self.compat.as_ref()
    }

    /// True for types declared with [`TypeDefinition::list`].
    pub fn is_list(&self) -> bool {
        matches!(
            self.fields.as_slice(),
            [(name, field)] if name == LIST_FIELD && matches!(field.kind(), FieldKind::ListOfObjects(_))
        )
    }
}

impl fmt::Debug for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDefinition")
            .field("name", &self.name)
            .field("version", &self.version.to_string())
            .field("fields", &self.field_names().collect::<Vec<_>>())
            .field("methods", &self.method_names().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`TypeDefinition`].
pub struct TypeDefinitionBuilder {
    name: String,
    version: String,
    fields: Vec<(String, Field)>,
    relationships: Vec<(String, Vec<(String, String)>)>,
    methods: BTreeMap<String, Method>,
    compat: Option<CompatHook>,
}

impl TypeDefinitionBuilder {
    fn new(name: String, version: &str) -> Self {
        Self {
            name,
            version: version.to_string(),
            fields: Vec::new(),
            relationships: Vec::new(),
            methods: BTreeMap::new(),
            compat: None,
        }
    }

    /// Declare a field. Redeclaring a name replaces the earlier descriptor
    /// in place.
    pub fn field(mut self, name: &str, field: Field) -> Self {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name.to_string(), field)),
        }
        self
    }

    /// Add `created_at` and `updated_at`.
    pub fn timestamps(self) -> Self {
        self.field("created_at", Field::datetime().nullable())
            .field("updated_at", Field::datetime().nullable())
    }

    /// Add the timestamps plus soft-delete fields `deleted_at` and `deleted`.
    pub fn persistent(self) -> Self {
        self.timestamps()
            .field("deleted_at", Field::datetime().nullable())
            .field("deleted", Field::boolean().with_default(false))
    }

    /// Declare the relationship table of a composed field.
    pub fn relationship(mut self, field: &str, entries: &[(&str, &str)]) -> Self {
        let entries = entries
            .iter()
            .map(|(owner, child)| ((*owner).to_string(), (*child).to_string()))
            .collect();
        self.relationships.retain(|(f, _)| f != field);
        self.relationships.push((field.to_string(), entries));
        self
    }

    /// Local class method.
    pub fn class_method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&ClassCall<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.method_entry(name, Method::class(f, false))
    }

    /// Class method forwarded through the indirection transport when one is
    /// configured.
    pub fn remotable_class_method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&ClassCall<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.method_entry(name, Method::class(f, true))
    }

    /// Local instance method.
    pub fn instance_method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Entity, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        self.method_entry(name, Method::instance(f, false))
    }

    /// Instance method that requires a bound context and is forwarded
    /// through the indirection transport when one is configured.
    pub fn remotable_method<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Entity, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        self.method_entry(name, Method::instance(f, true))
    }

    fn method_entry(mut self, name: &str, method: Method) -> Self {
        self.methods.insert(name.to_string(), method);
        self
    }

    /// Install the per-type compatibility hook.
    pub fn compat<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Map<String, Json>, &ObjectVersion) -> Result<()> + Send + Sync + 'static,
    {
        self.compat = Some(Arc::new(hook));
        self
    }

    /// Validate and build.
    ///
    /// Fails if a version does not parse, a relationship names an
    /// undeclared field, or a relationship table is not in ascending
    /// owner-version order.
    pub fn build(self) -> Result<TypeDefinition> {
        let version = ObjectVersion::parse(&self.version)?;

        let mut relationships = BTreeMap::new();
        for (field, entries) in self.relationships {
            if !self.fields.iter().any(|(n, _)| *n == field) {
                return Err(ObjectError::UnknownField {
                    type_name: self.name.clone(),
                    field,
                });
            }
            let parsed = entries
                .iter()
                .map(|(owner, child)| Ok((ObjectVersion::parse(owner)?, ObjectVersion::parse(child)?)))
                .collect::<Result<Relationship>>()?;
            if parsed.windows(2).any(|w| w[0].0 >= w[1].0) {
                return Err(ObjectError::action(
                    "register",
                    format!("relationships for {}.{field} are not in ascending order", self.name),
                ));
            }
            relationships.insert(field, parsed);
        }

        Ok(TypeDefinition {
            name: self.name,
            version,
            fields: self.fields,
            relationships,
            methods: self.methods,
            compat: self.compat,
        })
    }
}
