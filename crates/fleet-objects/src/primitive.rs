// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire primitive envelope.
//!
//! ```text
//! {
//!   "nova_object.namespace": "nova",
//!   "nova_object.name": "<TypeName>",
//!   "nova_object.version": "<MAJOR.MINOR[.PATCH]>",
//!   "nova_object.data": { <field>: <primitive value>, ... },
//!   "nova_object.changes": [ "<field>", ... ]
//! }
//! ```
//!
//! `changes` is omitted when empty.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::entity::Entity;
use crate::error::{ObjectError, Result};

/// Namespace every primitive must carry.
pub const NAMESPACE: &str = "nova";

pub const NAMESPACE_KEY: &str = "nova_object.namespace";
pub const NAME_KEY: &str = "nova_object.name";
pub const VERSION_KEY: &str = "nova_object.version";
pub const DATA_KEY: &str = "nova_object.data";
pub const CHANGES_KEY: &str = "nova_object.changes";

/// Serialized form of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePrimitive {
    #[serde(rename = "nova_object.namespace")]
    pub namespace: String,
    #[serde(rename = "nova_object.name")]
    pub name: String,
    #[serde(rename = "nova_object.version")]
    pub version: String,
    #[serde(rename = "nova_object.data")]
    pub data: Map<String, Json>,
    #[serde(rename = "nova_object.changes", default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
}

impl WirePrimitive {
    /// A primitive in the default namespace with no data.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            namespace: NAMESPACE.to_string(),
            name: name.into(),
            version: version.into(),
            data: Map::new(),
            changes: Vec::new(),
        }
    }

    /// True if `json` looks like an entity primitive (carries the name key).
    pub fn is_primitive(json: &Json) -> bool {
        json.as_object().is_some_and(|m| m.contains_key(NAME_KEY))
    }

    pub fn from_json(json: &Json) -> Result<Self> {
        if !json.is_object() {
            return Err(ObjectError::malformed("primitive is not a JSON object"));
        }
        Ok(Self::deserialize(json)?)
    }

    pub fn to_json(&self) -> Result<Json> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Compare two entities by their primitives, ignoring change markers and
/// any `ignore` keys at every nesting level.
pub fn equal_primitives(a: &Entity, b: &Entity, ignore: &[&str]) -> Result<bool> {
    let mut keys = vec![CHANGES_KEY];
    keys.extend_from_slice(ignore);

    let mut left = a.to_primitive(None)?.to_json()?;
    let mut right = b.to_primitive(None)?.to_json()?;
    strip(&mut left, &keys);
    strip(&mut right, &keys);
    Ok(left == right)
}

fn strip(json: &mut Json, keys: &[&str]) {
    match json {
        Json::Object(map) => {
            for key in keys {
                map.remove(*key);
            }
            for value in map.values_mut() {
                strip(value, keys);
            }
        }
        Json::Array(items) => {
            for item in items {
                strip(item, keys);
            }
        }
        _ => {}
    }
}
