//! Role model - named bundle of policies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role entity. Soft-deleted roles keep their row with `deleted_utc` set.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Role {
    pub role_id: Uuid,
    pub role_name: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl Role {
    pub fn new(role_name: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            role_id: Uuid::new_v4(),
            role_name: role_name.into(),
            description,
            created_utc: now,
            updated_utc: now,
            deleted_utc: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_utc.is_some()
    }
}
