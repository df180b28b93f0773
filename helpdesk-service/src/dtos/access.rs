use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{RoleId, UserType};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePolicyRequest {
    pub role_id: RoleId,
    pub object_id: Uuid,

    #[validate(length(min = 1, max = 64, message = "Action must be 1-64 characters"))]
    #[schema(example = "create")]
    pub action: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Role name must be 1-100 characters"))]
    #[schema(example = "L1 Support")]
    pub role_name: String,

    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Absent fields are left unchanged.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Role name must be 1-100 characters"))]
    #[schema(example = "L2 Support")]
    pub role_name: Option<String>,

    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateObjectRequest {
    #[validate(length(min = 1, max = 100, message = "Object name must be 1-100 characters"))]
    #[schema(example = "asset")]
    pub object_name: String,

    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateObjectRequest {
    #[validate(length(min = 1, max = 100, message = "Object name must be 1-100 characters"))]
    pub object_name: Option<String>,

    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    /// Rules held by the enforcer after the reload.
    pub rules: usize,
}

/// What the caller may do right now.
#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionsResponse {
    pub user_id: Uuid,
    pub user_type: UserType,
    pub roles: Vec<RoleId>,
    pub object_actions: Vec<String>,
    pub system_actions: Vec<String>,
    /// `TARGETTYPE_ACTION` for every account type the caller may manage.
    pub user_type_actions: Vec<String>,
}
