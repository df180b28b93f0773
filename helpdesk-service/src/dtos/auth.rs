use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Role, SanitizedUser};
use crate::services::{AuthToken, LoginOutcome, PermissionSummary};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "agent@helpdesk.example")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,

    #[validate(length(min = 1, max = 128, message = "Device id must be 1-128 characters"))]
    #[schema(example = "browser-7f3a")]
    pub device_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: SanitizedUser,
    pub roles: Vec<Role>,
    pub permissions: PermissionSummary,
    pub tokens: AuthToken,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            user: outcome.user,
            roles: outcome.roles,
            permissions: outcome.permissions,
            tokens: outcome.token,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    pub user_id: Uuid,

    #[validate(length(min = 1, max = 128, message = "Device id must be 1-128 characters"))]
    #[schema(example = "browser-7f3a")]
    pub device_id: String,

    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}
