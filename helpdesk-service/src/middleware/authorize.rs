use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use super::auth::Authenticated;
use crate::{services::ServiceError, AppState};

/// Object and action a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    pub object: &'static str,
    pub action: &'static str,
}

impl Permission {
    pub const fn new(object: &'static str, action: &'static str) -> Self {
        Self { object, action }
    }
}

/// State handed to [`authorize_middleware`] for one guarded route.
pub fn guard(state: &AppState, object: &'static str, action: &'static str) -> (AppState, Permission) {
    (state.clone(), Permission::new(object, action))
}

/// Admit a request only when one of the caller's current roles holds the
/// route's permission.
///
/// Roles are re-aggregated from the store on every request, so a grant or
/// revocation applies to tokens issued before it. The admitted principal,
/// carrying those roles, is placed in the request extensions.
pub async fn authorize_middleware(
    State((state, permission)): State<(AppState, Permission)>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = req
        .extensions()
        .get::<Authenticated>()
        .and_then(Authenticated::principal)
        .cloned()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

    let roles = match state.roles.effective_roles(principal.user_id).await {
        Ok(roles) => roles,
        Err(ServiceError::NotFound(_)) | Err(ServiceError::Unauthenticated) => {
            tracing::warn!(user_id = %principal.user_id, "Token subject is no longer an active user");
            return Err(AppError::Unauthorized(anyhow::anyhow!("Authentication required")));
        }
        Err(err) => return Err(err.into()),
    };

    let allowed = state
        .evaluator
        .enforce_any(&roles, permission.object, permission.action)
        .map_err(|err| {
            // Unable to evaluate counts as a denial.
            tracing::error!(
                user_id = %principal.user_id,
                object = permission.object,
                action = permission.action,
                error = %err,
                "Policy evaluation failed"
            );
            AppError::Forbidden(anyhow::anyhow!("Permission denied"))
        })?;

    if !allowed {
        tracing::info!(
            user_id = %principal.user_id,
            object = permission.object,
            action = permission.action,
            "Access denied"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Permission denied: {}:{}",
            permission.object,
            permission.action
        )));
    }

    req.extensions_mut().insert(principal.with_roles(roles));
    Ok(next.run(req).await)
}
