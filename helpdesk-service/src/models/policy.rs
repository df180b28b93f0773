//! Policy model - grants one action on one object to one role.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::RoleId;

/// Actions seeded for every standard object.
pub const STANDARD_ACTIONS: [&str; 5] = ["create", "view", "list", "update", "delete"];

/// Durable policy row. `(role_id, object_id, action)` is unique among live rows.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Policy {
    pub policy_id: Uuid,
    pub role_id: RoleId,
    pub object_id: Uuid,
    pub action: String,
    pub is_standard: bool,
    pub created_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl Policy {
    pub fn new(role_id: RoleId, object_id: Uuid, action: &str, created_by: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            policy_id: Uuid::new_v4(),
            role_id,
            object_id,
            action: action.trim().to_lowercase(),
            is_standard: false,
            created_by,
            created_utc: now,
            updated_utc: now,
            deleted_utc: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_utc.is_some()
    }
}

/// One tuple of the in-memory policy mirror.
///
/// Role rules use the role id as subject and the lowercase object name as object.
/// User-type rules live in the `user_type_` namespace on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, FromRow)]
pub struct PolicyRule {
    pub subject: String,
    pub object: String,
    pub action: String,
}

pub const USER_TYPE_PREFIX: &str = "user_type_";

impl PolicyRule {
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
        }
    }

    pub fn for_role(role_id: RoleId, object_name: &str, action: &str) -> Self {
        Self::new(role_id.to_string(), object_name.to_lowercase(), action.to_lowercase())
    }

    pub fn for_user_type(
        principal: super::UserType,
        target: super::UserType,
        action: &str,
    ) -> Self {
        Self::new(
            user_type_subject(principal),
            user_type_subject(target),
            action.to_lowercase(),
        )
    }
}

pub fn user_type_subject(user_type: super::UserType) -> String {
    format!("{}{}", USER_TYPE_PREFIX, user_type.as_str())
}
