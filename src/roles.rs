//! # Role Assignment Policy
//!
//! Decides which realm roles a newly registered user receives. The
//! registration flow only sees the [`RolePolicy`] trait.

/// Source of the default role set for new users
pub trait RolePolicy: Send + Sync {
    /// Roles to assign after registration; may be empty
    fn default_roles(&self, username: &str) -> Vec<String>;
}

/// Same configured roles for every user (`DEFAULT_ROLES`)
#[derive(Debug, Clone, Default)]
pub struct StaticRolePolicy {
    roles: Vec<String>,
}

impl StaticRolePolicy {
    pub fn new(roles: Vec<String>) -> Self {
        Self { roles }
    }
}

impl RolePolicy for StaticRolePolicy {
    fn default_roles(&self, _username: &str) -> Vec<String> {
        self.roles.clone()
    }
}
