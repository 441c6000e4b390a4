//! Role and access policy models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Dashboard roles, lowest privilege first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Operator,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }

    /// Resolve a stored role string, falling back to `Customer`.
    ///
    /// Users without a role row, or with a role this kernel does not know,
    /// get the least privileged role.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            None => Role::Customer,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(role = %raw, "unknown stored role, treating as customer");
                Role::Customer
            }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for role strings outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "operator" => Ok(Role::Operator),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Per-route authorization rules, fixed at route registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    allowed_roles: Vec<Role>,
    required_role: Option<Role>,
    admin_override: bool,
}

impl AccessPolicy {
    /// Any authenticated caller passes.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Only callers whose role is in `roles` pass.
    ///
    /// An empty list behaves like [`AccessPolicy::authenticated`].
    pub fn allow(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed_roles: roles.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Only callers with exactly `role` pass.
    pub fn require(role: Role) -> Self {
        Self {
            required_role: Some(role),
            ..Self::default()
        }
    }

    /// Let admins through regardless of the listed roles.
    pub fn with_admin_override(mut self) -> Self {
        self.admin_override = true;
        self
    }

    pub fn allowed_roles(&self) -> &[Role] {
        &self.allowed_roles
    }

    pub fn required_role(&self) -> Option<Role> {
        self.required_role
    }

    /// Check a resolved role against this policy.
    pub fn permits(&self, role: Role) -> bool {
        if self.admin_override && role == Role::Admin {
            return true;
        }

        if let Some(required) = self.required_role
            && required != role
        {
            return false;
        }

        self.allowed_roles.is_empty() || self.allowed_roles.contains(&role)
    }

    /// Caller-facing explanation for a failed [`permits`](Self::permits) check.
    pub fn denial_message(&self) -> String {
        if let Some(required) = self.required_role {
            return format!("requires {required} role");
        }

        let roles: Vec<&str> = self.allowed_roles.iter().map(|r| r.as_str()).collect();
        format!("requires one of: {}", roles.join(", "))
    }
}
