// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry of object types.
//!
//! Each name maps to every registered version of that type, newest first.
//! A process normally populates one registry at startup and publishes it
//! with [`init`]; after that it is shared read-only behind an `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::definition::TypeDefinition;
use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::version::ObjectVersion;

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Publish `registry` as the process-wide registry.
///
/// Can only succeed once per process; there is no unregister.
pub fn init(registry: Registry) -> Result<Arc<Registry>> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(Arc::clone(&registry))
        .map_err(|_| ObjectError::AlreadyInitialized)?;
    log::debug!("object registry initialized with {} types", registry.len());
    Ok(registry)
}

/// The process-wide registry, if [`init`] has run.
pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Versioned type definitions keyed by type name.
#[derive(Debug, Default)]
pub struct Registry {
    types: HashMap<String, Vec<Arc<TypeDefinition>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type definition.
    ///
    /// A definition with exactly the same version replaces the existing
    /// one; otherwise it is inserted so the list stays newest-first.
    pub fn register(&mut self, def: TypeDefinition) -> Arc<TypeDefinition> {
        let def = Arc::new(def);
        let versions = self.types.entry(def.name().to_string()).or_default();

        if let Some(slot) = versions.iter_mut().find(|d| d.version().is_exactly(def.version())) {
            log::debug!("replacing {} {}", def.name(), def.version());
            *slot = Arc::clone(&def);
            return def;
        }

        let pos = versions
            .iter()
            .position(|d| newer(def.version(), d.version()))
            .unwrap_or(versions.len());
        versions.insert(pos, Arc::clone(&def));
        log::debug!("registered {} {}", def.name(), def.version());
        def
    }

    /// Builder-style registration for chained setup.
    pub fn with(mut self, def: TypeDefinition) -> Self {
        self.register(def);
        self
    }

    /// Resolve `name` at `version`.
    ///
    /// An exact match wins; otherwise the newest registered version that is
    /// compatible with `version` (same MAJOR, at least as new).
    pub fn resolve(&self, name: &str, version: &ObjectVersion) -> Result<Arc<TypeDefinition>> {
        let versions = self.versions_of(name)?;

        if let Some(def) = versions.iter().find(|d| d.version().is_exactly(version)) {
            return Ok(Arc::clone(def));
        }
        if let Some(def) = versions.iter().find(|d| d.version().is_compatible_with(version)) {
            return Ok(Arc::clone(def));
        }

        Err(ObjectError::IncompatibleVersion {
            type_name: name.to_string(),
            requested: version.to_string(),
            supported: versions[0].version().to_string(),
        })
    }

    /// Newest registered version of `name`.
    pub fn latest(&self, name: &str) -> Result<Arc<TypeDefinition>> {
        self.versions_of(name).map(|v| Arc::clone(&v[0]))
    }

    /// Registered versions of `name`, newest first.
    pub fn versions(&self, name: &str) -> Vec<ObjectVersion> {
        self.types
            .get(name)
            .map(|v| v.iter().map(|d| *d.version()).collect())
            .unwrap_or_default()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of registered type names.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// New empty entity of the latest version of `name`.
    pub fn create(&self, name: &str) -> Result<Entity> {
        self.latest(name).map(Entity::new)
    }

    fn versions_of(&self, name: &str) -> Result<&[Arc<TypeDefinition>]> {
        match self.types.get(name) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(ObjectError::UnsupportedType(name.to_string())),
        }
    }
}

/// Total order including PATCH, for keeping the version list sorted.
fn newer(a: &ObjectVersion, b: &ObjectVersion) -> bool {
    (a.major(), a.minor(), a.patch().unwrap_or(0)) > (b.major(), b.minor(), b.patch().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;

    fn def(version: &str) -> TypeDefinition {
        TypeDefinition::builder("Foo", version)
            .field("id", Field::integer())
            .build()
            .unwrap()
    }

    fn v(s: &str) -> ObjectVersion {
        ObjectVersion::parse(s).unwrap()
    }

    #[test]
    fn test_keeps_newest_first() {
        let mut reg = Registry::new();
        reg.register(def("1.0"));
        reg.register(def("1.3"));
        reg.register(def("1.1"));
        let versions: Vec<String> = reg.versions("Foo").iter().map(ToString::to_string).collect();
        assert_eq!(versions, ["1.3", "1.1", "1.0"]);
        assert_eq!(reg.latest("Foo").unwrap().version().to_string(), "1.3");
    }

    #[test]
    fn test_same_version_replaces() {
        let mut reg = Registry::new();
        reg.register(def("1.0"));
        reg.register(
            TypeDefinition::builder("Foo", "1.0")
                .field("id", Field::integer())
                .field("extra", Field::string())
                .build()
                .unwrap(),
        );
        assert_eq!(reg.versions("Foo").len(), 1);
        assert!(reg.latest("Foo").unwrap().has_field("extra"));
    }

    #[test]
    fn test_resolve_prefers_exact_match() {
        let reg = Registry::new().with(def("1.0")).with(def("1.3"));
        assert_eq!(reg.resolve("Foo", &v("1.0")).unwrap().version().to_string(), "1.0");
        assert_eq!(reg.resolve("Foo", &v("1.2")).unwrap().version().to_string(), "1.3");
    }

    #[test]
    fn test_resolve_failures() {
        let reg = Registry::new().with(def("1.0")).with(def("1.3"));
        assert_eq!(
            reg.resolve("Bar", &v("1.0")).unwrap_err(),
            ObjectError::UnsupportedType("Bar".into())
        );
        assert_eq!(
            reg.resolve("Foo", &v("1.4")).unwrap_err(),
            ObjectError::IncompatibleVersion {
                type_name: "Foo".into(),
                requested: "1.4".into(),
                supported: "1.3".into(),
            }
        );
    }

    #[test]
    fn test_create_uses_latest() {
        let reg = Registry::new().with(def("1.0")).with(def("1.3"));
        let e = reg.create("Foo").unwrap();
        assert_eq!(e.version().to_string(), "1.3");
        assert!(reg.create("Nope").is_err());
    }

    #[test]
    fn test_global_init_only_once() {
        let first = init(Registry::new().with(def("1.0"))).unwrap();
        assert!(Arc::ptr_eq(&first, &global().unwrap()));
        assert_eq!(
            init(Registry::new()).unwrap_err(),
            ObjectError::AlreadyInitialized
        );
        assert!(global().unwrap().contains("Foo"));
    }
}
