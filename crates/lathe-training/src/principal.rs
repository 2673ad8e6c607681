//! The caller identity as seen by the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    /// May read and stop any job.
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub fn user(id: i64) -> Self {
        Self { id: UserId(id), role: Role::User }
    }

    #[must_use]
    pub fn admin(id: i64) -> Self {
        Self { id: UserId(id), role: Role::Admin }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when this principal may act on resources owned by `owner`.
    #[must_use]
    pub fn can_access(&self, owner: UserId) -> bool {
        self.is_admin() || self.id == owner
    }
}

/// Supplies the authenticated caller for the current request.
pub trait PrincipalProvider: Send + Sync {
    fn current_principal(&self) -> Principal;
}

/// Always returns the same principal.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrincipal(pub Principal);

impl PrincipalProvider for StaticPrincipal {
    fn current_principal(&self) -> Principal {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access() {
        assert!(Principal::user(1).can_access(UserId(1)));
        assert!(!Principal::user(2).can_access(UserId(1)));
        assert!(Principal::admin(2).can_access(UserId(1)));
        assert_eq!(StaticPrincipal(Principal::user(5)).current_principal().id, UserId(5));
    }
}
