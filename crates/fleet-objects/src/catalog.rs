// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Built-in object types.
//!
//! | Type                | Versions      | Notes                                  |
//! |---------------------|---------------|----------------------------------------|
//! | `MonitorMetric`     | 1.0, 1.1      | 1.1 adds `numa_membw_values`           |
//! | `MonitorMetricList` | 1.0, 1.1      | list of `MonitorMetric`                |
//! | `BuildRequest`      | 1.0, 1.1      | composes a `MonitorMetricList`         |
//! | `Migration`         | 1.0, 1.1, 1.2 | 1.1 adds `migration_type`, 1.2 `hidden` |
//! | `MigrationList`     | 1.0           | list of `Migration` 1.2                |
//!
//! Each builder takes the version to declare and includes exactly the
//! fields that exist at that version, so callers can assemble registries
//! for nodes at different releases.
//!
//! `Migration` methods persist through a [`MigrationStore`] supplied at
//! registration time.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::definition::{TypeDefinition, TypeDefinitionBuilder};
use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::fields::{Field, FieldKind};
use crate::list::EntityList;
use crate::registry::Registry;
use crate::remote::ClassCall;
use crate::value::Value;
use crate::version::ObjectVersion;

/// Valid `MonitorMetric.name` values.
pub const METRIC_NAMES: &[&str] = &[
    "cpu.frequency",
    "cpu.user.time",
    "cpu.kernel.time",
    "cpu.idle.time",
    "cpu.iowait.time",
    "cpu.user.percent",
    "cpu.kernel.percent",
    "cpu.idle.percent",
    "cpu.iowait.percent",
    "cpu.percent",
    "numa.membw.current",
    "numa.membw.max",
];

/// Valid `Migration.migration_type` values.
pub const MIGRATION_TYPES: &[&str] = &["migration", "resize", "live-migration", "evacuation"];

/// Statuses after which a migration is no longer in progress.
const FINISHED_STATUSES: &[&str] = &["confirmed", "reverted", "error", "failed", "completed", "cancelled"];

/// Register every version of every built-in type.
pub fn register_all(registry: &mut Registry, store: &Arc<MigrationStore>) -> Result<()> {
    for version in ["1.0", "1.1"] {
        registry.register(monitor_metric(version)?);
        registry.register(monitor_metric_list(version)?);
        registry.register(build_request(version)?);
    }
    for version in ["1.0", "1.1", "1.2"] {
        registry.register(migration(version, store)?);
    }
    registry.register(migration_list("1.0", store)?);
    Ok(())
}

/// A registry holding the whole catalog.
pub fn registry(store: &Arc<MigrationStore>) -> Result<Registry> {
    let mut registry = Registry::new();
    register_all(&mut registry, store)?;
    Ok(registry)
}

fn at_least(version: &str, major: u32, minor: u32) -> Result<bool> {
    Ok(ObjectVersion::parse(version)? >= ObjectVersion::new(major, minor))
}

fn drop_before(data: &mut serde_json::Map<String, serde_json::Value>, target: &ObjectVersion, since: ObjectVersion, field: &str) {
    if *target < since {
        data.remove(field);
    }
}

// ---------------------------------------------------------------------------
// MonitorMetric
// ---------------------------------------------------------------------------

pub fn monitor_metric(version: &str) -> Result<TypeDefinition> {
    let mut b = TypeDefinition::builder("MonitorMetric", version)
        .field("name", Field::new(FieldKind::enumeration(METRIC_NAMES.iter().copied())))
        .field("value", Field::integer())
        .field("timestamp", Field::datetime())
        .field("source", Field::string());
    if at_least(version, 1, 1)? {
        b = b.field(
            "numa_membw_values",
            Field::new(FieldKind::Dict(Box::new(FieldKind::Integer))).nullable(),
        );
    }
    b.compat(|data, target| {
        drop_before(data, target, ObjectVersion::new(1, 1), "numa_membw_values");
        Ok(())
    })
    .build()
}

pub fn monitor_metric_list(version: &str) -> Result<TypeDefinition> {
    let children: &[(&str, &str)] = if at_least(version, 1, 1)? {
        &[("1.0", "1.0"), ("1.1", "1.1")]
    } else {
        &[("1.0", "1.0")]
    };
    TypeDefinition::list("MonitorMetricList", version, "MonitorMetric", children).build()
}

// ---------------------------------------------------------------------------
// BuildRequest
// ---------------------------------------------------------------------------

pub fn build_request(version: &str) -> Result<TypeDefinition> {
    let metrics: &[(&str, &str)] = if at_least(version, 1, 1)? {
        &[("1.0", "1.0"), ("1.1", "1.1")]
    } else {
        &[("1.0", "1.0")]
    };
    TypeDefinition::builder("BuildRequest", version)
        .field("id", Field::integer())
        .field("instance_uuid", Field::uuid())
        .field("project_id", Field::string())
        .field("metrics", Field::object("MonitorMetricList").nullable())
        .timestamps()
        .relationship("metrics", metrics)
        .build()
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

pub fn migration(version: &str, store: &Arc<MigrationStore>) -> Result<TypeDefinition> {
    let nullable_string = || Field::string().nullable();
    let mut b = TypeDefinition::builder("Migration", version)
        .field("id", Field::integer())
        .field("source_compute", nullable_string())
        .field("dest_compute", nullable_string())
        .field("source_node", nullable_string())
        .field("dest_node", nullable_string())
        .field("dest_host", nullable_string())
        .field("old_instance_type_id", Field::integer().nullable())
        .field("new_instance_type_id", Field::integer().nullable())
        .field("instance_uuid", Field::uuid().nullable())
        .field("status", nullable_string())
        .persistent();
    if at_least(version, 1, 1)? {
        b = b.field(
            "migration_type",
            Field::new(FieldKind::enumeration(MIGRATION_TYPES.iter().copied())).nullable(),
        );
    }
    if at_least(version, 1, 2)? {
        b = b.field("hidden", Field::boolean().with_default(false));
    }

    let b = b.compat(|data, target| {
        drop_before(data, target, ObjectVersion::new(1, 2), "hidden");
        drop_before(data, target, ObjectVersion::new(1, 1), "migration_type");
        Ok(())
    });
    migration_methods(b, store).build()
}

fn migration_methods(b: TypeDefinitionBuilder, store: &Arc<MigrationStore>) -> TypeDefinitionBuilder {
    let get_store = Arc::clone(store);
    let create_store = Arc::clone(store);
    let save_store = Arc::clone(store);

    b.remotable_class_method("get_by_id", move |call: &ClassCall<'_>| {
        let id = call
            .args
            .require(0, "migration_id")?
            .as_i64()
            .ok_or_else(|| ObjectError::action("get_by_id", "migration_id must be an integer"))?;
        let record = get_store.get(id)?;
        let mut migration = call.new_entity();
        load_record(&mut migration, &record)?;
        Ok(Value::from(migration))
    })
    .remotable_method("create", move |migration, _| {
        if migration.is_set("id") {
            return Err(ObjectError::action("create", "already created"));
        }
        let record = create_store.create(pending_updates(migration));
        load_record(migration, &record)?;
        Ok(Value::Null)
    })
    .remotable_method("save", move |migration, _| {
        let id = migration
            .get("id")?
            .as_i64()
            .ok_or_else(|| ObjectError::action("save", "id is not an integer"))?;
        let record = save_store.update(id, pending_updates(migration))?;
        load_record(migration, &record)?;
        Ok(Value::Null)
    })
}

pub fn migration_list(version: &str, store: &Arc<MigrationStore>) -> Result<TypeDefinition> {
    let store = Arc::clone(store);
    TypeDefinition::list("MigrationList", version, "Migration", &[("1.0", "1.2")])
        .remotable_class_method("get_in_progress_by_host_and_node", move |call| {
            let host = string_arg(call, 0, "host")?;
            let node = string_arg(call, 1, "node")?;
            let item_def = call.registry.latest("Migration")?;
            let list = EntityList::from_records(
                call.context,
                Arc::clone(call.def),
                &item_def,
                store.in_progress(&host, &node),
                |migration, record| load_record(migration, &record),
            )?;
            Ok(Value::from(list))
        })
        .build()
}

fn string_arg(call: &ClassCall<'_>, index: usize, name: &str) -> Result<String> {
    call.args
        .require(index, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ObjectError::action(name, format!("{name} must be a string")))
}

/// Changed fields minus `id`, the way they are written to the store.
fn pending_updates(migration: &Entity) -> Record {
    let mut updates = migration.get_changes();
    updates.remove("id");
    updates
}

/// Copy a stored record into `migration` and clear its changes.
fn load_record(migration: &mut Entity, record: &Record) -> Result<()> {
    let def = Arc::clone(migration.definition());
    for (name, _) in def.fields() {
        let value = record.get(name).cloned().unwrap_or(Value::Null);
        migration.set(name, value)?;
    }
    migration.reset_changes(None, false);
    Ok(())
}

// ---------------------------------------------------------------------------
// MigrationStore
// ---------------------------------------------------------------------------

/// A stored row: field name to value.
pub type Record = BTreeMap<String, Value>;

/// In-memory persistence for migrations.
#[derive(Debug, Default)]
pub struct MigrationStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    rows: BTreeMap<i64, Record>,
    last_id: i64,
}

impl MigrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row and return it with `id` and `created_at` filled in.
    pub fn create(&self, mut values: Record) -> Record {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = inner.last_id;
        values.insert("id".into(), Value::Int(id));
        values.insert("created_at".into(), Value::DateTime(Utc::now()));
        values.entry("deleted".into()).or_insert(Value::Bool(false));
        inner.rows.insert(id, values.clone());
        log::debug!("migration {id} created");
        values
    }

    pub fn get(&self, id: i64) -> Result<Record> {
        self.inner
            .lock()
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Merge `values` into row `id` and stamp `updated_at`.
    pub fn update(&self, id: i64, values: Record) -> Result<Record> {
        let mut inner = self.inner.lock();
        let row = inner.rows.get_mut(&id).ok_or_else(|| not_found(id))?;
        row.extend(values);
        row.insert("updated_at".into(), Value::DateTime(Utc::now()));
        Ok(row.clone())
    }

    /// Rows touching `host`/`node` on either side whose status is not final.
    pub fn in_progress(&self, host: &str, node: &str) -> Vec<Record> {
        let is = |row: &Record, field: &str, want: &str| row.get(field).and_then(Value::as_str) == Some(want);
        self.inner
            .lock()
            .rows
            .values()
            .filter(|row| {
                let finished = row
                    .get("status")
                    .and_then(Value::as_str)
                    .is_some_and(|s| FINISHED_STATUSES.contains(&s));
                let source = is(row, "source_compute", host) && is(row, "source_node", node);
                let dest = is(row, "dest_compute", host) && is(row, "dest_node", node);
                !finished && (source || dest)
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found(id: i64) -> ObjectError {
    ObjectError::action("get_by_id", format!("Migration {id} could not be found"))
}
