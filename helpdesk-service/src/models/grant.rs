//! Secondary role grant model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::RoleId;

/// Extra role held by a user on top of their primary role.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct SecondaryRoleGrant {
    pub user_id: Uuid,
    pub role_id: RoleId,
    pub granted_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
}

impl SecondaryRoleGrant {
    pub fn new(user_id: Uuid, role_id: RoleId) -> Self {
        Self {
            user_id,
            role_id,
            granted_utc: Utc::now(),
            revoked_utc: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.revoked_utc.is_none()
    }
}
