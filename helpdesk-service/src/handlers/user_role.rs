use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{access::PermissionsResponse, ErrorResponse, MessageResponse},
    middleware::CurrentPrincipal,
    models::{Role, SanitizedUser, SecondaryRoleGrant, UserType},
    services::{enforcer::USER_TYPE_ACTIONS, ServiceError},
    utils::ValidPath,
    AppState,
};

/// POST /users/:user_id/role/:role_id
#[utoipa::path(
    post,
    path = "/users/{user_id}/role/{role_id}",
    params(
        ("user_id" = Uuid, Path, description = "User id"),
        ("role_id" = Uuid, Path, description = "Role to grant")
    ),
    responses(
        (status = 201, description = "Role granted", body = SecondaryRoleGrant),
        (status = 404, description = "Unknown user or role", body = ErrorResponse),
        (status = 409, description = "Primary role or already granted", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn grant_role(
    State(state): State<AppState>,
    ValidPath((user_id, role_id)): ValidPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let grant = state.grant_service.grant_role(user_id, role_id).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// DELETE /users/:user_id/role/:role_id
#[utoipa::path(
    delete,
    path = "/users/{user_id}/role/{role_id}",
    params(
        ("user_id" = Uuid, Path, description = "User id"),
        ("role_id" = Uuid, Path, description = "Role to revoke")
    ),
    responses(
        (status = 200, description = "Role revoked", body = MessageResponse),
        (status = 404, description = "No live grant", body = ErrorResponse),
        (status = 409, description = "Primary role", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    ValidPath((user_id, role_id)): ValidPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    state.grant_service.revoke_role(user_id, role_id).await?;
    Ok(Json(MessageResponse::new("Role revoked")))
}

/// GET /roles/:role_id/users
#[utoipa::path(
    get,
    path = "/roles/{role_id}/users",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Users holding the role", body = Vec<SanitizedUser>),
        (status = 404, description = "Role not found", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn role_users(
    State(state): State<AppState>,
    ValidPath(role_id): ValidPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.grant_service.role_users(role_id).await?))
}

/// GET /users/:user_id/roles
#[utoipa::path(
    get,
    path = "/users/{user_id}/roles",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Primary and secondary roles", body = Vec<Role>),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn user_roles(
    State(state): State<AppState>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.grant_service.user_roles(user_id).await?))
}

/// GET /me/permissions
#[utoipa::path(
    get,
    path = "/me/permissions",
    responses(
        (status = 200, description = "Permissions of the caller", body = PermissionsResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "User Roles",
    security(("bearer_auth" = []))
)]
pub async fn my_permissions(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<impl IntoResponse, AppError> {
    // The stored account, not the token claim, decides the user type.
    let user = state
        .store
        .find_user_by_id(principal.user_id)
        .await
        .map_err(ServiceError::from)?
        .filter(|user| user.can_login())
        .ok_or(ServiceError::Unauthenticated)?;
    let user_type = user.kind();
    let roles = state.roles.roles_for(&user).await?;
    let summary = state
        .roles
        .permission_summary(state.evaluator.as_ref(), &roles)
        .await?;

    let mut user_type_actions = Vec::new();
    for target in UserType::ALL {
        for action in USER_TYPE_ACTIONS {
            if state
                .evaluator
                .enforce_user_type(user_type, target, action)
                .map_err(ServiceError::from)?
            {
                user_type_actions.push(format!("{}_{}", target, action).to_uppercase());
            }
        }
    }

    Ok(Json(PermissionsResponse {
        user_id: user.user_id,
        user_type,
        roles,
        object_actions: summary.object_actions,
        system_actions: summary.system_actions,
        user_type_actions,
    }))
}
