// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the object model.

use thiserror::Error;

/// Result type for object model operations.
pub type Result<T> = std::result::Result<T, ObjectError>;

/// Errors raised by the object model.
///
/// None of these are retried inside the crate, except that the wire
/// serializer turns an [`ObjectError::IncompatibleVersion`] into a PATCH
/// truncation retry or a backport request when configured to.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObjectError {
    /// No type of this name is registered.
    #[error("Unsupported object type {0}")]
    UnsupportedType(String),

    /// The type is known but no registered version can accept `requested`.
    #[error("Version {requested} of {type_name} is not supported, supported version is {supported}")]
    IncompatibleVersion {
        type_name: String,
        requested: String,
        supported: String,
    },

    /// Read of a declared field that has not been assigned.
    #[error("Attribute '{field}' of {type_name} object is not set")]
    AttributeNotSet { type_name: String, field: String },

    /// Access to an attribute the type does not declare.
    #[error("{type_name} object has no attribute '{field}'")]
    UnknownField { type_name: String, field: String },

    /// Remotable instance call on an entity with no request context.
    #[error("Cannot call {method} on orphaned {type_name} object")]
    OrphanedEntity { method: String, type_name: String },

    /// Misuse of the object API.
    #[error("Object action {action} failed because: {reason}")]
    ActionError { action: String, reason: String },

    /// A value could not be coerced to the field's kind.
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Version string is not `X.Y` or `X.Y.Z`.
    #[error("Invalid object version: '{0}'")]
    InvalidVersion(String),

    /// Wire document is missing keys or has the wrong shape.
    #[error("Malformed object primitive: {0}")]
    MalformedPrimitive(String),

    /// Method name is not present in the type's method table.
    #[error("{type_name} has no method '{method}'")]
    UnknownMethod { type_name: String, method: String },

    /// Failure reported by an indirection transport or backport authority.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The process-wide registry was initialized twice.
    #[error("Object registry already initialized")]
    AlreadyInitialized,
}

impl ObjectError {
    pub(crate) fn action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionError {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPrimitive(reason.into())
    }
}

impl From<serde_json::Error> for ObjectError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedPrimitive(e.to_string())
    }
}
