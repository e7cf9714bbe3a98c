// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request-scoped credentials carried by entities.

use serde::{Deserialize, Serialize};

/// Credentials and identity of the request an entity is operating under.
///
/// Entities hold their context by value; cloning an entity shares nothing
/// with the original beyond this small record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique id of the originating request (`req-<uuid>`).
    pub request_id: String,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub is_admin: bool,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl RequestContext {
    /// Create a context for a user within a project.
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            request_id: Self::generate_request_id(),
            user_id: Some(user_id.into()),
            project_id: Some(project_id.into()),
            is_admin: false,
            roles: Vec::new(),
        }
    }

    /// Create an administrative context not tied to a user.
    pub fn admin() -> Self {
        Self {
            request_id: Self::generate_request_id(),
            user_id: None,
            project_id: None,
            is_admin: true,
            roles: vec!["admin".to_string()],
        }
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// A copy of this context with administrative rights.
    pub fn elevated(&self) -> Self {
        let mut ctx = self.clone();
        ctx.is_admin = true;
        if !ctx.roles.iter().any(|r| r == "admin") {
            ctx.roles.push("admin".to_string());
        }
        ctx
    }

    fn generate_request_id() -> String {
        format!("req-{}", uuid::Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevated_keeps_identity() {
        let ctx = RequestContext::new("alice", "proj").with_role("member");
        let admin = ctx.elevated();
        assert!(admin.is_admin);
        assert_eq!(admin.request_id, ctx.request_id);
        assert_eq!(admin.user_id.as_deref(), Some("alice"));
        assert_eq!(admin.roles, vec!["member", "admin"]);
        assert!(!ctx.is_admin);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::new("u", "p");
        let b = RequestContext::new("u", "p");
        assert!(a.request_id.starts_with("req-"));
        assert_ne!(a.request_id, b.request_id);
    }
}
