//! User model - the account record consulted at login and role aggregation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{RoleId, UserType};

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub user_type: String,
    /// Primary role. Never repeated among the user's secondary grants.
    pub role_id: RoleId,
    pub password_hash: String,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        user_type: UserType,
        role_id: RoleId,
        password_hash: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            user_type: user_type.to_string(),
            role_id,
            password_hash,
            is_active: true,
            created_utc: now,
            updated_utc: now,
            deleted_utc: None,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Parsed account type. Unknown values fall back to the least privileged type.
    pub fn kind(&self) -> UserType {
        self.user_type.parse().unwrap_or_else(|_| {
            tracing::warn!(user_id = %self.user_id, user_type = %self.user_type, "Unknown user type");
            UserType::User
        })
    }

    pub fn can_login(&self) -> bool {
        self.is_active && self.deleted_utc.is_none()
    }
}

/// User without credentials, safe for API responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SanitizedUser {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub user_type: UserType,
    pub role_id: RoleId,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for SanitizedUser {
    fn from(user: User) -> Self {
        let user_type = user.kind();
        Self {
            user_id: user.user_id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            user_type,
            role_id: user.role_id,
            is_active: user.is_active,
            created_utc: user.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_and_kind() {
        let user = User::new("Grace", "Hopper", "grace@example.com", UserType::Agent, Uuid::new_v4(), String::new());
        assert_eq!(user.display_name(), "Grace Hopper");
        assert_eq!(user.kind(), UserType::Agent);
        assert!(user.can_login());
    }

    #[test]
    fn test_inactive_user_cannot_login() {
        let mut user = User::new("A", "B", "a@example.com", UserType::User, Uuid::new_v4(), String::new());
        user.is_active = false;
        assert!(!user.can_login());
    }
}
