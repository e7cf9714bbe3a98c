// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Remotable methods and call indirection.
//!
//! Every type carries a method table. Entries marked remotable go through
//! [`Dispatcher`], which forwards them to an [`IndirectionTransport`] when
//! one is configured and runs the local implementation otherwise.
//!
//! Instance calls must run under a request context: an entity without one
//! is orphaned and cannot make remotable calls. Passing the context as the
//! leading positional argument is rejected; bind it to the entity instead.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::definition::TypeDefinition;
use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::registry::Registry;
use crate::value::Value;
use crate::version::ObjectVersion;

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// Arguments of a method call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    /// A context passed as the leading positional argument. Only present
    /// so it can be rejected.
    pub context: Option<RequestContext>,
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Add a keyword argument.
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.to_string(), value.into());
        self
    }

    /// Positional argument `index`, or the keyword `name`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }

    /// Like [`get`](Self::get) but fails with `ActionError` when missing.
    pub fn require(&self, index: usize, name: &str) -> Result<&Value> {
        self.get(index, name)
            .ok_or_else(|| ObjectError::action(name, format!("missing argument '{name}'")))
    }
}

/// Everything a class method sees.
pub struct ClassCall<'a> {
    pub registry: &'a Registry,
    pub def: &'a Arc<TypeDefinition>,
    pub context: &'a RequestContext,
    pub args: &'a CallArgs,
}

impl ClassCall<'_> {
    /// New empty entity of the called type, bound to the call context.
    pub fn new_entity(&self) -> Entity {
        Entity::new(Arc::clone(self.def)).bound(self.context.clone())
    }
}

// ---------------------------------------------------------------------------
// Method table
// ---------------------------------------------------------------------------

pub type ClassMethodFn = Arc<dyn Fn(&ClassCall<'_>) -> Result<Value> + Send + Sync>;
pub type InstanceMethodFn = Arc<dyn Fn(&mut Entity, &CallArgs) -> Result<Value> + Send + Sync>;

/// Implementation of a method.
#[derive(Clone)]
pub enum MethodKind {
    Class(ClassMethodFn),
    Instance(InstanceMethodFn),
}

/// One entry of a type's method table.
#[derive(Clone)]
pub struct Method {
    kind: MethodKind,
    remotable: bool,
}

impl Method {
    pub(crate) fn class<F>(f: F, remotable: bool) -> Self
    where
        F: Fn(&ClassCall<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            kind: MethodKind::Class(Arc::new(f)),
            remotable,
        }
    }

    pub(crate) fn instance<F>(f: F, remotable: bool) -> Self
    where
        F: Fn(&mut Entity, &CallArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            kind: MethodKind::Instance(Arc::new(f)),
            remotable,
        }
    }

    pub fn kind(&self) -> &MethodKind {
        &self.kind
    }

    pub fn is_remotable(&self) -> bool {
        self.remotable
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, MethodKind::Class(_))
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("class", &self.is_class())
            .field("remotable", &self.remotable)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Outcome of a forwarded instance call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionReply {
    /// Post-call values of fields the remote side reports as updated,
    /// already deserialized (nested entities hydrated).
    pub updates: BTreeMap<String, Value>,
    /// The remote entity's changed fields after the call.
    pub changed: BTreeSet<String>,
    /// Return value of the method.
    pub result: Value,
}

/// Carries remotable calls to the node that executes them.
///
/// Implementations may block on the network; timeouts and cancellation are
/// theirs to define.
pub trait IndirectionTransport: Send + Sync {
    fn object_class_action(
        &self,
        context: &RequestContext,
        type_name: &str,
        method: &str,
        version: &ObjectVersion,
        args: &CallArgs,
    ) -> Result<Value>;

    fn object_action(
        &self,
        context: &RequestContext,
        entity: &Entity,
        method: &str,
        args: &CallArgs,
    ) -> Result<ActionReply>;
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs methods from type method tables, forwarding remotable ones when a
/// transport is configured.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    transport: Option<Arc<dyn IndirectionTransport>>,
}

impl Dispatcher {
    /// Dispatcher that always executes locally.
    pub fn local(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            transport: None,
        }
    }

    /// Dispatcher forwarding remotable calls through `transport`.
    pub fn remote(registry: Arc<Registry>, transport: Arc<dyn IndirectionTransport>) -> Self {
        Self {
            registry,
            transport: Some(transport),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn is_remote(&self) -> bool {
        self.transport.is_some()
    }

    /// Call class method `method` of the latest version of `type_name`.
    pub fn call_class(&self, context: &RequestContext, type_name: &str, method: &str, args: CallArgs) -> Result<Value> {
        let def = self.registry.latest(type_name)?;
        self.call_class_on(context, &def, method, args)
    }

    /// Call a class method of a specific definition.
    pub fn call_class_on(
        &self,
        context: &RequestContext,
        def: &Arc<TypeDefinition>,
        method: &str,
        args: CallArgs,
    ) -> Result<Value> {
        let entry = lookup(def, method)?;
        let MethodKind::Class(f) = entry.kind() else {
            return Err(ObjectError::action(method, "not a class method"));
        };

        if entry.is_remotable() {
            if let Some(transport) = &self.transport {
                log::debug!("forwarding {}.{method} (class, {})", def.name(), def.version());
                let mut result = transport.object_class_action(context, def.name(), method, def.version(), &args)?;
                if let Some(entity) = result.as_entity_mut() {
                    entity.set_context(Some(context.clone()));
                }
                return Ok(result);
            }
        }

        let call = ClassCall {
            registry: &self.registry,
            def,
            context,
            args: &args,
        };
        let mut result = f(&call)?;
        if let Some(entity) = result.as_entity_mut() {
            entity.set_context(Some(context.clone()));
        }
        Ok(result)
    }

    /// Call instance method `method` on `entity`.
    ///
    /// Remotable calls reject a positional context with `ActionError` and an
    /// unbound entity with `OrphanedEntity`. When forwarded, every field the
    /// remote side reports is replaced and the changed set becomes exactly
    /// the remote one.
    pub fn call(&self, entity: &mut Entity, method: &str, args: CallArgs) -> Result<Value> {
        let def = Arc::clone(entity.definition());
        let entry = lookup(&def, method)?;
        let MethodKind::Instance(f) = entry.kind() else {
            return Err(ObjectError::action(method, "not an instance method"));
        };

        if !entry.is_remotable() {
            return f(entity, &args);
        }

        if args.context.is_some() {
            return Err(ObjectError::action(method, "Calling remotables with context is deprecated"));
        }
        let Some(context) = entity.context().cloned() else {
            return Err(ObjectError::OrphanedEntity {
                method: method.to_string(),
                type_name: def.name().to_string(),
            });
        };

        let Some(transport) = &self.transport else {
            return f(entity, &args);
        };

        log::debug!("forwarding {}.{method} ({})", def.name(), entity.version());
        let reply = transport.object_action(&context, entity, method, &args)?;
        // Coerce everything first so a bad value leaves the entity untouched
        let mut staged = Vec::with_capacity(reply.updates.len());
        for (name, value) in reply.updates {
            if let Some(field) = def.field(&name) {
                let value = field.coerce(&name, value)?;
                staged.push((name, value));
            }
        }
        for (name, value) in staged {
            entity.store_coerced(name, value);
        }
        entity.reset_changes(None, false);
        entity.replace_changes(&reply.changed);
        Ok(reply.result)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("types", &self.registry.len())
            .field("remote", &self.is_remote())
            .finish()
    }
}

fn lookup<'a>(def: &'a TypeDefinition, method: &str) -> Result<&'a Method> {
    def.method(method).ok_or_else(|| ObjectError::UnknownMethod {
        type_name: def.name().to_string(),
        method: method.to_string(),
    })
}
