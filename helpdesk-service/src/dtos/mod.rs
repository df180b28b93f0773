pub mod access;
pub mod auth;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Documented shape of the error envelope every failure uses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "FORBIDDEN")]
    pub code: String,
    #[schema(example = "Permission denied")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Policy deleted")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
