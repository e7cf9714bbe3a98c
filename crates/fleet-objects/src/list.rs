// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity lists.
//!
//! A list type is an ordinary registered type with a single `objects`
//! field (see [`TypeDefinition::list`]), so it is versioned, serialized and
//! backported like any other entity. [`EntityList`] wraps such an entity
//! with sequence accessors.

use std::sync::Arc;

use crate::context::RequestContext;
use crate::definition::{TypeDefinition, LIST_FIELD};
use crate::entity::Entity;
use crate::error::{ObjectError, Result};
use crate::fields::FieldKind;
use crate::value::Value;

/// A versioned sequence of entities of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityList {
    inner: Entity,
}

impl EntityList {
    /// An empty list. The empty `objects` field does not count as a change.
    pub fn new(def: Arc<TypeDefinition>) -> Result<Self> {
        let mut inner = Entity::new(def);
        inner.store(LIST_FIELD, Value::List(Vec::new()))?;
        Self::from_entity(inner)
    }

    /// Wrap an entity of a list type.
    pub fn from_entity(mut inner: Entity) -> Result<Self> {
        if !inner.definition().is_list() {
            return Err(ObjectError::action(
                "make_list",
                format!("{} is not a list type", inner.type_name()),
            ));
        }
        if !inner.is_set(LIST_FIELD) {
            inner.store(LIST_FIELD, Value::List(Vec::new()))?;
        }
        Ok(Self { inner })
    }

    /// Build one item per record, bind `context` everywhere and clear all
    /// changes.
    pub fn from_records<R, I, F>(
        context: &RequestContext,
        list_def: Arc<TypeDefinition>,
        item_def: &Arc<TypeDefinition>,
        records: I,
        mut build: F,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        F: FnMut(&mut Entity, R) -> Result<()>,
    {
        let mut list = Self::new(list_def)?;
        for record in records {
            let mut item = Entity::new(Arc::clone(item_def)).bound(context.clone());
            build(&mut item, record)?;
            item.reset_changes(None, true);
            list.push(item)?;
        }
        list.inner.set_context(Some(context.clone()));
        list.inner.reset_changes(None, true);
        Ok(list)
    }

    /// Name of the element type.
    pub fn item_type(&self) -> &str {
        match self.inner.definition().field(LIST_FIELD).map(|f| f.kind()) {
            Some(FieldKind::ListOfObjects(name)) => name.as_str(),
            _ => "",
        }
    }

    /// Append an element; marks `objects` changed.
    pub fn push(&mut self, item: Entity) -> Result<()> {
        if item.type_name() != self.item_type() {
            return Err(ObjectError::invalid(
                LIST_FIELD,
                format!("expected {} object, got {}", self.item_type(), item.type_name()),
            ));
        }
        if let Value::List(items) = self.inner.get_mut(LIST_FIELD)? {
            items.push(Value::from(item));
        }
        self.inner.mark_changed(LIST_FIELD);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items().get(index).and_then(Value::as_entity)
    }

    /// Mutable element access. Changes to the element surface as a change
    /// of `objects` on the list.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        match self.inner.get_mut(LIST_FIELD) {
            Ok(Value::List(items)) => items.get_mut(index).and_then(Value::as_entity_mut),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.items().iter().filter_map(Value::as_entity)
    }

    pub fn as_entity(&self) -> &Entity {
        &self.inner
    }

    pub fn as_entity_mut(&mut self) -> &mut Entity {
        &mut self.inner
    }

    pub fn into_entity(self) -> Entity {
        self.inner
    }

    fn items(&self) -> &[Value] {
        self.inner
            .get(LIST_FIELD)
            .ok()
            .and_then(Value::as_sequence)
            .unwrap_or(&[])
    }
}

impl From<EntityList> for Value {
    fn from(list: EntityList) -> Self {
        Value::from(list.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Field;

    fn item_def() -> Arc<TypeDefinition> {
        Arc::new(
            TypeDefinition::builder("Item", "1.0")
                .field("n", Field::integer())
                .build()
                .unwrap(),
        )
    }

    fn list_def() -> Arc<TypeDefinition> {
        Arc::new(
            TypeDefinition::list("ItemList", "1.0", "Item", &[("1.0", "1.0")])
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_new_list_is_clean() {
        let list = EntityList::new(list_def()).unwrap();
        assert!(list.is_empty());
        assert!(list.as_entity().what_changed().is_empty());
        assert_eq!(list.item_type(), "Item");
    }

    #[test]
    fn test_push_checks_type_and_marks_change() {
        let mut list = EntityList::new(list_def()).unwrap();
        let wrong = Entity::new(list_def());
        assert!(list.push(wrong).is_err());

        list.push(Entity::new(item_def())).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.as_entity().what_changed().contains(LIST_FIELD));
    }

    #[test]
    fn test_from_records_binds_context_and_resets() {
        let ctx = RequestContext::new("u", "p");
        let list = EntityList::from_records(&ctx, list_def(), &item_def(), [1i64, 2, 3], |item, n| {
            item.set("n", n)
        })
        .unwrap();

        assert_eq!(list.len(), 3);
        assert!(list.as_entity().what_changed().is_empty());
        assert_eq!(list.as_entity().context(), Some(&ctx));
        assert!(list.iter().all(|i| i.context() == Some(&ctx)));
        assert_eq!(list.get(2).unwrap().get("n").unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_element_change_surfaces_on_list() {
        let ctx = RequestContext::new("u", "p");
        let mut list =
            EntityList::from_records(&ctx, list_def(), &item_def(), [1i64], |item, n| item.set("n", n)).unwrap();
        list.get_mut(0).unwrap().set("n", 5i64).unwrap();
        assert!(list.as_entity().what_changed().contains(LIST_FIELD));
    }

    #[test]
    fn test_non_list_type_is_rejected() {
        assert!(EntityList::new(item_def()).is_err());
    }
}
