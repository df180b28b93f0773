use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{access::{CreateRoleRequest, UpdateRoleRequest}, ErrorResponse, MessageResponse},
    models::Role,
    utils::{ValidPath, ValidatedJson},
    AppState,
};

/// POST /roles
#[utoipa::path(
    post,
    path = "/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role name taken", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state
        .catalog_service
        .create_role(&req.role_name, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// GET /roles
#[utoipa::path(
    get,
    path = "/roles",
    responses((status = 200, description = "Live roles", body = Vec<Role>)),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn list_roles(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog_service.list_roles().await?))
}

/// GET /roles/:role_id
#[utoipa::path(
    get,
    path = "/roles/{role_id}",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = Role),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    ValidPath(role_id): ValidPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog_service.get_role(role_id).await?))
}

/// PATCH /roles/:role_id
#[utoipa::path(
    patch,
    path = "/roles/{role_id}",
    params(("role_id" = Uuid, Path, description = "Role id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 404, description = "Role not found", body = ErrorResponse),
        (status = 409, description = "Role name taken or role protected", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    ValidPath(role_id): ValidPath<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state
        .catalog_service
        .update_role(role_id, req.role_name.as_deref(), req.description)
        .await?;
    Ok(Json(role))
}

/// DELETE /roles/:role_id
#[utoipa::path(
    delete,
    path = "/roles/{role_id}",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted", body = MessageResponse),
        (status = 404, description = "Role not found", body = ErrorResponse),
        (status = 409, description = "Role is still a primary role", body = ErrorResponse)
    ),
    tag = "Roles",
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    ValidPath(role_id): ValidPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.catalog_service.delete_role(role_id).await?;
    Ok(Json(MessageResponse::new("Role deleted")))
}
