use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{
    models::Principal,
    services::{TokenError, TokenService},
    AppState,
};

/// Outcome of reading the `Authorization` header.
#[derive(Debug, Clone)]
pub enum Authenticated {
    /// No header was sent. Routes that need a principal reject later.
    Anonymous,
    Principal(Principal),
}

impl Authenticated {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Authenticated::Anonymous => None,
            Authenticated::Principal(principal) => Some(principal),
        }
    }
}

/// Resolve the caller from request headers.
///
/// A missing header yields `Anonymous`. A header that is present but not a
/// well-formed bearer credential, or whose token fails verification, is an error.
pub fn authenticate(tokens: &TokenService, headers: &HeaderMap) -> Result<Authenticated, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Authenticated::Anonymous);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Malformed Authorization header")))?;

    match tokens.verify_token(token) {
        Ok(principal) => Ok(Authenticated::Principal(principal)),
        Err(err @ TokenError::Expired { .. }) => {
            if let Some(principal) = err.principal() {
                tracing::info!(user_id = %principal.user_id, "Expired access token presented");
            }
            Err(AppError::TokenExpired(anyhow::anyhow!("Token expired")))
        }
        Err(err) => {
            tracing::debug!(error = %err, "Access token rejected");
            Err(AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))
        }
    }
}

/// Attach an [`Authenticated`] to every request, rejecting bad credentials
/// before any handler runs.
pub async fn authentication_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authenticated = authenticate(&state.tokens, req.headers())?;
    req.extensions_mut().insert(authenticated);
    Ok(next.run(req).await)
}

/// Principal of an authenticated request. Rejects anonymous callers with 401.
///
/// Behind an authorization guard this carries the freshly aggregated roles
/// rather than the ones embedded in the token.
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(CurrentPrincipal(principal.clone()));
        }
        parts
            .extensions
            .get::<Authenticated>()
            .and_then(Authenticated::principal)
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
    }
}

/// Principal if the caller sent credentials.
pub struct MaybePrincipal(pub Option<Principal>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybePrincipal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match CurrentPrincipal::from_request_parts(parts, state).await {
            Ok(CurrentPrincipal(principal)) => Ok(MaybePrincipal(Some(principal))),
            Err(_) => Ok(MaybePrincipal(None)),
        }
    }
}
