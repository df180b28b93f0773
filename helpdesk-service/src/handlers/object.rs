use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{access::{CreateObjectRequest, UpdateObjectRequest}, ErrorResponse, MessageResponse},
    middleware::CurrentPrincipal,
    models::Object,
    utils::{ValidPath, ValidatedJson},
    AppState,
};

/// POST /objects
#[utoipa::path(
    post,
    path = "/objects",
    request_body = CreateObjectRequest,
    responses(
        (status = 201, description = "Object created", body = Object),
        (status = 409, description = "Object name taken", body = ErrorResponse)
    ),
    tag = "Objects",
    security(("bearer_auth" = []))
)]
pub async fn create_object(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ValidatedJson(req): ValidatedJson<CreateObjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let object = state
        .catalog_service
        .create_object(&req.object_name, req.description, Some(principal.user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(object)))
}

/// GET /objects
#[utoipa::path(
    get,
    path = "/objects",
    responses((status = 200, description = "Live objects", body = Vec<Object>)),
    tag = "Objects",
    security(("bearer_auth" = []))
)]
pub async fn list_objects(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog_service.list_objects().await?))
}

/// GET /objects/:object_id
#[utoipa::path(
    get,
    path = "/objects/{object_id}",
    params(("object_id" = Uuid, Path, description = "Object id")),
    responses(
        (status = 200, description = "Object", body = Object),
        (status = 404, description = "Object not found", body = ErrorResponse)
    ),
    tag = "Objects",
    security(("bearer_auth" = []))
)]
pub async fn get_object(
    State(state): State<AppState>,
    ValidPath(object_id): ValidPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog_service.get_object(object_id).await?))
}

/// PATCH /objects/:object_id
#[utoipa::path(
    patch,
    path = "/objects/{object_id}",
    params(("object_id" = Uuid, Path, description = "Object id")),
    request_body = UpdateObjectRequest,
    responses(
        (status = 200, description = "Object updated", body = Object),
        (status = 404, description = "Object not found", body = ErrorResponse),
        (status = 409, description = "Object name taken or standard object", body = ErrorResponse)
    ),
    tag = "Objects",
    security(("bearer_auth" = []))
)]
pub async fn update_object(
    State(state): State<AppState>,
    ValidPath(object_id): ValidPath<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateObjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let object = state
        .catalog_service
        .update_object(object_id, req.object_name.as_deref(), req.description)
        .await?;
    Ok(Json(object))
}

/// DELETE /objects/:object_id
#[utoipa::path(
    delete,
    path = "/objects/{object_id}",
    params(("object_id" = Uuid, Path, description = "Object id")),
    responses(
        (status = 200, description = "Object deleted", body = MessageResponse),
        (status = 404, description = "Object not found", body = ErrorResponse),
        (status = 409, description = "Standard object", body = ErrorResponse)
    ),
    tag = "Objects",
    security(("bearer_auth" = []))
)]
pub async fn delete_object(
    State(state): State<AppState>,
    ValidPath(object_id): ValidPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.catalog_service.delete_object(object_id).await?;
    Ok(Json(MessageResponse::new("Object deleted")))
}
