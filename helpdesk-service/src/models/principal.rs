//! Principal model - the authenticated identity of a request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Roles are referenced by id everywhere inside the service.
pub type RoleId = Uuid;

/// Coarse classification of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Admin,
    Agent,
    User,
}

impl UserType {
    pub const ALL: [UserType; 3] = [UserType::Admin, UserType::Agent, UserType::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Admin => "admin",
            UserType::Agent => "agent",
            UserType::User => "user",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserType::Admin),
            "agent" => Ok(UserType::Agent),
            "user" => Ok(UserType::User),
            _ => Err(format!("Invalid user type: {}", s)),
        }
    }
}

/// Authenticated identity, rebuilt per request from a verified token or a fresh
/// store lookup. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub display_name: String,
    /// Sorted and free of duplicates.
    pub roles: Vec<RoleId>,
    pub user_type: UserType,
}

impl Principal {
    pub fn new(
        user_id: Uuid,
        display_name: impl Into<String>,
        roles: impl IntoIterator<Item = RoleId>,
        user_type: UserType,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            roles: normalize_roles(roles),
            user_type,
        }
    }

    /// Replace the role set, e.g. with a freshly aggregated one.
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.roles = normalize_roles(roles);
        self
    }

    pub fn has_role(&self, role_id: &RoleId) -> bool {
        self.roles.binary_search(role_id).is_ok()
    }
}

pub(crate) fn normalize_roles(roles: impl IntoIterator<Item = RoleId>) -> Vec<RoleId> {
    let mut roles: Vec<RoleId> = roles.into_iter().collect();
    roles.sort_unstable();
    roles.dedup();
    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_are_deduplicated_and_sorted() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let principal = Principal::new(Uuid::new_v4(), "Ada", [b, a, b], UserType::Agent);

        assert_eq!(principal.roles.len(), 2);
        assert!(principal.roles.windows(2).all(|w| w[0] < w[1]));
        assert!(principal.has_role(&a));
        assert!(principal.has_role(&b));
        assert!(!principal.has_role(&Uuid::new_v4()));
    }

    #[test]
    fn test_user_type_parsing() {
        assert_eq!("Admin".parse::<UserType>(), Ok(UserType::Admin));
        assert_eq!("agent".parse::<UserType>(), Ok(UserType::Agent));
        assert!("guest".parse::<UserType>().is_err());
        assert_eq!(UserType::User.to_string(), "user");
    }
}
