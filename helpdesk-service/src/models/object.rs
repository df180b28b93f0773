//! Object model - a protectable resource class such as "ticket".

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Object {
    pub object_id: Uuid,
    pub object_name: String,
    pub description: Option<String>,
    /// Seeded objects that cannot be deleted.
    pub is_standard: bool,
    pub created_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl Object {
    pub fn new(
        object_name: impl Into<String>,
        description: Option<String>,
        created_by: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            object_id: Uuid::new_v4(),
            object_name: object_name.into(),
            description,
            is_standard: false,
            created_by,
            created_utc: now,
            updated_utc: now,
            deleted_utc: None,
        }
    }

    /// Name as it appears in enforcer rules.
    pub fn rule_name(&self) -> String {
        self.object_name.to_lowercase()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_utc.is_some()
    }
}
