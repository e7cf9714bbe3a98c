// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Remotable calls and serializer fallbacks between an old node (only the
// 1.0 types) and a new node running the full catalog.

use std::sync::Arc;

use fleet_objects::catalog::{self, MigrationStore};
use fleet_objects::{
    CallArgs, Dispatcher, Entity, EntityList, Field, Hydration, LoopbackConductor, ObjectError, ObjectVersion,
    Registry, RegistryBackport, RequestContext, TypeDefinition, Value, WireSerializer,
};
use serde_json::json;

fn old_registry(store: &Arc<MigrationStore>) -> Arc<Registry> {
    let mut reg = Registry::new();
    reg.register(catalog::monitor_metric("1.0").unwrap());
    reg.register(catalog::monitor_metric_list("1.0").unwrap());
    reg.register(catalog::build_request("1.0").unwrap());
    reg.register(catalog::migration("1.0", store).unwrap());
    Arc::new(reg)
}

fn new_registry(store: &Arc<MigrationStore>) -> Arc<Registry> {
    Arc::new(catalog::registry(store).unwrap())
}

/// Dispatcher on the old node forwarding to a conductor on the new one.
fn skewed(server_store: &Arc<MigrationStore>) -> (Arc<Registry>, Dispatcher) {
    let old = old_registry(&Arc::new(MigrationStore::new()));
    let conductor = LoopbackConductor::new(WireSerializer::new(old.clone()), new_registry(server_store));
    (old.clone(), Dispatcher::remote(old, Arc::new(conductor)))
}

fn metric(registry: &Registry, with_numa: bool) -> Entity {
    let mut m = registry.create("MonitorMetric").unwrap();
    m.set("name", "cpu.frequency").unwrap();
    m.set("value", 2400i64).unwrap();
    m.set("timestamp", "2026-01-02T03:04:05Z").unwrap();
    m.set("source", "libvirt").unwrap();
    if with_numa {
        let mut values = std::collections::BTreeMap::new();
        values.insert("0".to_string(), Value::Int(10));
        m.set("numa_membw_values", Value::Map(values)).unwrap();
    }
    m
}

#[test]
fn test_remote_create_and_save_update_caller() {
    let store = Arc::new(MigrationStore::new());
    let (old, dispatcher) = skewed(&store);
    let ctx = RequestContext::new("user", "project");

    let mut m = old.create("Migration").unwrap().bound(ctx.clone());
    m.set("status", "migrating").unwrap();
    m.set("source_compute", "host1").unwrap();
    m.set("source_node", "node1").unwrap();
    dispatcher.call(&mut m, "create", CallArgs::new()).unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(m.get("id").unwrap(), &Value::Int(1));
    assert!(m.get("created_at").unwrap().as_datetime().is_some());
    assert_eq!(m.get("deleted").unwrap(), &Value::Bool(false));
    assert!(m.what_changed().is_empty());

    m.set("status", "finished").unwrap();
    dispatcher.call(&mut m, "save", CallArgs::new()).unwrap();
    assert_eq!(store.get(1).unwrap()["status"], Value::from("finished"));
    assert!(m.get("updated_at").unwrap().as_datetime().is_some());
    assert!(m.what_changed().is_empty());
}

#[test]
fn test_remote_class_call_is_backported_for_caller() {
    let store = Arc::new(MigrationStore::new());
    let mut record = catalog::Record::new();
    record.insert("status".into(), Value::from("migrating"));
    record.insert("migration_type".into(), Value::from("live-migration"));
    record.insert("hidden".into(), Value::Bool(true));
    store.create(record);

    let (_, dispatcher) = skewed(&store);
    let ctx = RequestContext::new("user", "project");
    let m = dispatcher
        .call_class(&ctx, "Migration", "get_by_id", CallArgs::new().arg(1i64))
        .unwrap()
        .into_entity()
        .unwrap();

    assert_eq!(m.version().to_string(), "1.0");
    assert!(!m.definition().has_field("migration_type"));
    assert!(!m.definition().has_field("hidden"));
    assert_eq!(m.get("status").unwrap(), &Value::from("migrating"));
    assert_eq!(m.context(), Some(&ctx));
}

#[test]
fn test_remote_call_on_orphan_is_rejected_before_transport() {
    let store = Arc::new(MigrationStore::new());
    let (old, dispatcher) = skewed(&store);
    let mut m = old.create("Migration").unwrap();
    m.set("status", "new").unwrap();

    assert!(matches!(
        dispatcher.call(&mut m, "create", CallArgs::new()),
        Err(ObjectError::OrphanedEntity { .. })
    ));
    assert!(store.is_empty());
}

#[test]
fn test_remote_list_method_returns_hydrated_items() {
    let store = Arc::new(MigrationStore::new());
    let server = new_registry(&store);
    let local = Dispatcher::local(server.clone());
    let ctx = RequestContext::new("user", "project");

    for (host, status) in [("host1", "migrating"), ("host1", "completed"), ("host2", "migrating")] {
        let mut m = server.create("Migration").unwrap().bound(ctx.clone());
        m.set("dest_compute", host).unwrap();
        m.set("dest_node", "node1").unwrap();
        m.set("status", status).unwrap();
        local.call(&mut m, "create", CallArgs::new()).unwrap();
    }

    let conductor = LoopbackConductor::new(WireSerializer::new(server.clone()), server.clone());
    let remote = Dispatcher::remote(server, Arc::new(conductor));
    let out = remote
        .call_class(
            &ctx,
            "MigrationList",
            "get_in_progress_by_host_and_node",
            CallArgs::new().kwarg("host", "host1").kwarg("node", "node1"),
        )
        .unwrap();
    let list = EntityList::from_entity(out.into_entity().unwrap()).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list.get(0).unwrap().get("status").unwrap(), &Value::from("migrating"));
    assert_eq!(list.as_entity().context(), Some(&ctx));
}

#[test]
fn test_nested_build_request_backport() {
    let store = Arc::new(MigrationStore::new());
    let new = new_registry(&store);

    let mut metrics = EntityList::new(new.latest("MonitorMetricList").unwrap()).unwrap();
    metrics.push(metric(&new, true)).unwrap();

    let mut request = new.create("BuildRequest").unwrap();
    request.set("id", 4i64).unwrap();
    request.set("instance_uuid", uuid::Uuid::new_v4().to_string()).unwrap();
    request.set("project_id", "project").unwrap();
    request.set("metrics", metrics).unwrap();

    let prim = request.to_primitive(Some(&ObjectVersion::new(1, 0))).unwrap();
    let list = &prim.data["metrics"];
    assert_eq!(list["nova_object.version"], json!("1.0"));
    let item = &list["nova_object.data"]["objects"][0];
    assert_eq!(item["nova_object.version"], json!("1.0"));
    assert!(item["nova_object.data"].get("numa_membw_values").is_none());
    assert_eq!(item["nova_object.data"]["value"], json!(2400));

    let old = old_registry(&store);
    let back = Entity::from_primitive(&Hydration::new(&old, None), &prim).unwrap();
    let metrics = EntityList::from_entity(back.get("metrics").unwrap().as_entity().unwrap().clone()).unwrap();
    assert_eq!(metrics.len(), 1);
    assert!(!metrics.get(0).unwrap().definition().has_field("numa_membw_values"));
}

#[test]
fn test_serializer_patch_then_backport() {
    let store = Arc::new(MigrationStore::new());
    let new = new_registry(&store);
    let old = old_registry(&store);

    let mut prim = metric(&new, true).to_primitive(None).unwrap();
    prim.version = "1.1.2".to_string();
    let wire = prim.to_json().unwrap();

    let strict = WireSerializer::new(old.clone());
    assert!(matches!(
        strict.deserialize(None, &wire),
        Err(ObjectError::IncompatibleVersion { .. })
    ));

    let ser = WireSerializer::new(old).with_backport(Arc::new(RegistryBackport::new(new)));
    let ctx = RequestContext::new("user", "project");
    let m = ser.deserialize(Some(&ctx), &wire).unwrap().into_entity().unwrap();
    assert_eq!(m.version().to_string(), "1.0");
    assert_eq!(m.get("value").unwrap(), &Value::Int(2400));
    assert_eq!(m.context(), Some(&ctx));
}

#[test]
fn test_invalid_enum_value_is_rejected() {
    let store = Arc::new(MigrationStore::new());
    let reg = new_registry(&store);
    let mut m = reg.create("MonitorMetric").unwrap();
    assert!(matches!(
        m.set("name", "gpu.frequency"),
        Err(ObjectError::InvalidValue { .. })
    ));
    assert!(!m.is_set("name"));
}

#[test]
fn test_backport_authority_repairs_child_patch_skew() {
    let child = |version: &str| {
        TypeDefinition::builder("Part", version)
            .field("n", Field::integer())
            .build()
            .unwrap()
    };
    let parent = || {
        TypeDefinition::builder("Holder", "1.0")
            .field("id", Field::integer())
            .field("part", Field::object("Part"))
            .relationship("part", &[("1.0", "1.0")])
            .build()
            .unwrap()
    };
    let new = Arc::new(Registry::new().with(child("1.0.1")).with(parent()));
    let old = Arc::new(Registry::new().with(child("1.0")).with(parent()));

    let mut part = new.create("Part").unwrap();
    part.set("n", 9i64).unwrap();
    let mut holder = new.create("Holder").unwrap();
    holder.set("id", 1i64).unwrap();
    holder.set("part", part).unwrap();
    let wire = WireSerializer::new(new.clone())
        .serialize(None, &Value::Entity(Box::new(holder)))
        .unwrap();
    assert_eq!(wire["nova_object.data"]["part"]["nova_object.version"], json!("1.0.1"));

    assert!(matches!(
        WireSerializer::new(old.clone()).deserialize(None, &wire),
        Err(ObjectError::IncompatibleVersion { .. })
    ));

    let ser = WireSerializer::new(old).with_backport(Arc::new(RegistryBackport::new(new)));
    let back = ser.deserialize(None, &wire).unwrap().into_entity().unwrap();
    let part = back.get("part").unwrap().as_entity().unwrap();
    assert_eq!(part.version().to_string(), "1.0");
    assert_eq!(part.get("n").unwrap(), &Value::Int(9));
}
