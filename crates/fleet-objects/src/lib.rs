// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # fleet-objects - Versioned entities for RPC between skewed nodes
//!
//! A schema-driven entity model for services whose nodes run different
//! releases at the same time. Every entity type is declared once per
//! version, tracks which fields were assigned since it was loaded, and
//! crosses the wire as a self-describing primitive that an older node can
//! still understand.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use fleet_objects::{Field, ObjectVersion, Registry, Result, TypeDefinition};
//!
//! fn main() -> Result<()> {
//!     let registry = Registry::new().with(
//!         TypeDefinition::builder("Widget", "1.1")
//!             .field("id", Field::integer())
//!             .field("color", Field::string().nullable())
//!             .compat(|data, target| {
//!                 if *target < ObjectVersion::new(1, 1) {
//!                     data.remove("color");
//!                 }
//!                 Ok(())
//!             })
//!             .build()?,
//!     );
//!     let registry = Arc::new(registry);
//!
//!     let mut widget = registry.create("Widget")?;
//!     widget.set("id", 1i64)?;
//!     widget.set("color", "blue")?;
//!
//!     // What a 1.0 node would receive
//!     let primitive = widget.to_primitive(Some(&ObjectVersion::new(1, 0)))?;
//!     assert!(!primitive.data.contains_key("color"));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Remote dispatch                              |
//! |   Dispatcher -> IndirectionTransport (LoopbackConductor, ...)       |
//! +---------------------------------------------------------------------+
//! |                        Wire serializer                              |
//! |   Value <-> JSON | PATCH skew | BackportAuthority                   |
//! +---------------------------------------------------------------------+
//! |                        Entities                                     |
//! |   Entity | EntityList | change tracking | to/from primitive        |
//! +---------------------------------------------------------------------+
//! |                        Schema                                       |
//! |   Registry | TypeDefinition | Field | relationships | compat hooks |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Registry`] | Type name to registered versions, resolves compatible definitions |
//! | [`TypeDefinition`] | Fields, relationships, methods and compat hook of one version |
//! | [`Entity`] | A change-tracked instance of a definition |
//! | [`WirePrimitive`] | Envelope carrying an entity over the wire |
//! | [`WireSerializer`] | Entity-aware RPC argument serializer |
//! | [`Dispatcher`] | Runs methods, forwarding remotable ones |

pub mod catalog;
pub mod compat;
pub mod conductor;
pub mod config;
pub mod context;
pub mod definition;
pub mod entity;
pub mod error;
pub mod fields;
pub mod list;
pub mod primitive;
pub mod registry;
pub mod remote;
pub mod serializer;
pub mod value;
pub mod version;

pub use compat::{child_target, ChildTarget, Hydration};
pub use conductor::{LoopbackConductor, RegistryBackport};
pub use config::{ConfigError, ObjectConfig, SerializerConfig};
pub use context::RequestContext;
pub use definition::{TypeDefinition, TypeDefinitionBuilder, LIST_FIELD};
pub use entity::Entity;
pub use error::{ObjectError, Result};
pub use fields::{isotime, Field, FieldCodec, FieldKind};
pub use list::EntityList;
pub use primitive::{equal_primitives, WirePrimitive};
pub use registry::Registry;
pub use remote::{ActionReply, CallArgs, ClassCall, Dispatcher, IndirectionTransport};
pub use serializer::{BackportAuthority, WireSerializer};
pub use value::Value;
pub use version::ObjectVersion;
