// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process conductor.
//!
//! [`LoopbackConductor`] plays the remote node for a [`Dispatcher`]: every
//! argument, entity and result crosses a real serialize/deserialize
//! boundary between the caller's registry and the conductor's, so version
//! skew between the two behaves as it would over the wire.
//!
//! [`RegistryBackport`] is the matching backport authority: a node that
//! knows the newer version hydrates the primitive and re-emits it at the
//! requested one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::compat::Hydration;
use crate::context::RequestContext;
use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::primitive::WirePrimitive;
use crate::registry::Registry;
use crate::remote::{ActionReply, CallArgs, Dispatcher, IndirectionTransport};
use crate::serializer::{BackportAuthority, WireSerializer};
use crate::value::Value;
use crate::version::ObjectVersion;

/// Executes forwarded calls against its own registry.
pub struct LoopbackConductor {
    client: WireSerializer,
    server: WireSerializer,
    dispatcher: Dispatcher,
}

impl LoopbackConductor {
    /// `client` is the caller's serializer; `server_registry` holds the
    /// types (and method implementations) the conductor executes.
    pub fn new(client: WireSerializer, server_registry: Arc<Registry>) -> Self {
        Self {
            client,
            server: WireSerializer::new(Arc::clone(&server_registry)),
            dispatcher: Dispatcher::local(server_registry),
        }
    }

    fn transfer_args(&self, context: &RequestContext, args: &CallArgs) -> Result<CallArgs> {
        let ctx = Some(context);
        let mut out = CallArgs::new();
        for arg in &args.args {
            let wire = self.client.serialize(ctx, arg)?;
            out.args.push(self.server.deserialize(ctx, &wire)?);
        }
        for (name, arg) in &args.kwargs {
            let wire = self.client.serialize(ctx, arg)?;
            out.kwargs.insert(name.clone(), self.server.deserialize(ctx, &wire)?);
        }
        Ok(out)
    }

    fn reply(&self, context: &RequestContext, value: &Value, target: Option<&ObjectVersion>) -> Result<Value> {
        let wire = match (value, target) {
            (Value::Entity(e), Some(target)) => e.to_primitive(Some(target))?.to_json()?,
            _ => self.server.serialize(Some(context), value)?,
        };
        self.client.deserialize(Some(context), &wire)
    }
}

impl IndirectionTransport for LoopbackConductor {
    fn object_class_action(
        &self,
        context: &RequestContext,
        type_name: &str,
        method: &str,
        version: &ObjectVersion,
        args: &CallArgs,
    ) -> Result<Value> {
        log::debug!("conductor: {type_name}.{method} requested at {version}");
        let args = self.transfer_args(context, args)?;
        let result = self.dispatcher.call_class(context, type_name, method, args)?;
        self.reply(context, &result, Some(version))
    }

    fn object_action(
        &self,
        context: &RequestContext,
        entity: &Entity,
        method: &str,
        args: &CallArgs,
    ) -> Result<ActionReply> {
        log::debug!("conductor: {}#{method}", entity.type_name());
        let wire = entity.to_primitive(None)?.to_json()?;
        let mut remote = self
            .server
            .deserialize(Some(context), &wire)?
            .into_entity()
            .ok_or_else(|| ObjectError::malformed("entity did not survive the wire"))?;
        remote.set_context(Some(context.clone()));

        let before = remote.clone();
        let args = self.transfer_args(context, args)?;
        let result = self.dispatcher.call(&mut remote, method, args)?;

        let mut updates = BTreeMap::new();
        for (name, field) in remote.definition().fields() {
            let Ok(value) = remote.get(name) else {
                continue;
            };
            if before.get(name).ok() != Some(value) {
                let primitive = field.to_primitive(name, value)?;
                updates.insert(name.to_string(), self.client.deserialize(Some(context), &primitive)?);
            }
        }

        Ok(ActionReply {
            updates,
            changed: remote.what_changed(),
            result: self.reply(context, &result, None)?,
        })
    }
}

impl fmt::Debug for LoopbackConductor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackConductor")
            .field("client", &self.client)
            .field("server", &self.server)
            .finish()
    }
}

/// Backport authority backed by a registry that knows the newer versions.
#[derive(Debug, Clone)]
pub struct RegistryBackport {
    registry: Arc<Registry>,
}

impl RegistryBackport {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl BackportAuthority for RegistryBackport {
    fn backport(
        &self,
        context: Option<&RequestContext>,
        primitive: &WirePrimitive,
        target: &ObjectVersion,
    ) -> Result<WirePrimitive> {
        log::debug!("backporting {} {} to {target}", primitive.name, primitive.version);
        let entity = Entity::from_primitive(&Hydration::new(&self.registry, context), primitive)?;
        entity.to_primitive_at(target)
    }
}
