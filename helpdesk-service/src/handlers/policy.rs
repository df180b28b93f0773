use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        access::{CreatePolicyRequest, ReloadResponse},
        ErrorResponse, MessageResponse,
    },
    middleware::CurrentPrincipal,
    models::Policy,
    services::NewPolicy,
    utils::{ValidPath, ValidatedJson},
    AppState,
};

/// POST /policies
#[utoipa::path(
    post,
    path = "/policies",
    request_body = CreatePolicyRequest,
    responses(
        (status = 201, description = "Policy created and enforced", body = Policy),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Missing policy:create", body = ErrorResponse),
        (status = 404, description = "Unknown role or object", body = ErrorResponse),
        (status = 409, description = "Duplicate policy", body = ErrorResponse),
        (status = 500, description = "Store and enforcer could not be kept consistent", body = ErrorResponse)
    ),
    tag = "Policies",
    security(("bearer_auth" = []))
)]
pub async fn create_policy(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ValidatedJson(req): ValidatedJson<CreatePolicyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let policy = state
        .policy_service
        .create_policy(
            NewPolicy {
                role_id: req.role_id,
                object_id: req.object_id,
                action: req.action,
            },
            Some(principal.user_id),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

/// GET /policies
#[utoipa::path(
    get,
    path = "/policies",
    responses(
        (status = 200, description = "Live policies", body = Vec<Policy>),
        (status = 403, description = "Missing policy:list", body = ErrorResponse)
    ),
    tag = "Policies",
    security(("bearer_auth" = []))
)]
pub async fn list_policies(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.policy_service.list_policies().await?))
}

/// GET /policies/:policy_id
#[utoipa::path(
    get,
    path = "/policies/{policy_id}",
    params(("policy_id" = Uuid, Path, description = "Policy id")),
    responses(
        (status = 200, description = "Policy", body = Policy),
        (status = 404, description = "Policy not found", body = ErrorResponse)
    ),
    tag = "Policies",
    security(("bearer_auth" = []))
)]
pub async fn get_policy(
    State(state): State<AppState>,
    ValidPath(policy_id): ValidPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.policy_service.get_policy(policy_id).await?))
}

/// DELETE /policies/:policy_id
#[utoipa::path(
    delete,
    path = "/policies/{policy_id}",
    params(("policy_id" = Uuid, Path, description = "Policy id")),
    responses(
        (status = 200, description = "Policy deleted", body = MessageResponse),
        (status = 404, description = "Policy not found", body = ErrorResponse),
        (status = 409, description = "Standard policy", body = ErrorResponse),
        (status = 500, description = "Store and enforcer could not be kept consistent", body = ErrorResponse)
    ),
    tag = "Policies",
    security(("bearer_auth" = []))
)]
pub async fn delete_policy(
    State(state): State<AppState>,
    ValidPath(policy_id): ValidPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.policy_service.delete_policy(policy_id).await?;
    Ok(Json(MessageResponse::new("Policy deleted")))
}

/// POST /enforcer/reload
#[utoipa::path(
    post,
    path = "/enforcer/reload",
    responses(
        (status = 200, description = "Enforcer rebuilt from the store", body = ReloadResponse),
        (status = 403, description = "Missing policy:update", body = ErrorResponse)
    ),
    tag = "Policies",
    security(("bearer_auth" = []))
)]
pub async fn reload_policies(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let rules = state.policy_service.reload_policies().await?;
    Ok(Json(ReloadResponse { rules }))
}
