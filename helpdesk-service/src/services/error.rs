use service_core::error::AppError;
use thiserror::Error;

use super::enforcer::EnforcerError;
use super::token::TokenError;

/// Failures at the durable store boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Classify a sqlx error, turning unique violations into `Conflict`.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound;
        }
        StoreError::Database(err)
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Token expired")]
    Expired,

    #[error("Permission denied")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("Role already granted to user")]
    AlreadyGranted,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Policy store and enforcer diverged: {0}")]
    Consistency(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Enforcer error: {0}")]
    Enforcer(#[from] EnforcerError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired { .. } => ServiceError::Expired,
            TokenError::Encoding(e) => ServiceError::Internal(anyhow::anyhow!(e)),
            TokenError::InvalidPrincipal => {
                ServiceError::Internal(anyhow::anyhow!("Cannot issue a token for an empty principal"))
            }
            TokenError::InvalidSignature | TokenError::Malformed(_) => ServiceError::Unauthenticated,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Authentication required"))
            }
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::Expired => AppError::TokenExpired(anyhow::anyhow!("Token expired")),
            ServiceError::Forbidden => AppError::Forbidden(anyhow::anyhow!("Permission denied")),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::AlreadyGranted => {
                AppError::Conflict(anyhow::anyhow!("Role already granted to user"))
            }
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::Consistency(msg) => AppError::ConsistencyError(anyhow::anyhow!(msg)),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Store(StoreError::NotFound) => {
                AppError::NotFound(anyhow::anyhow!("Record not found"))
            }
            ServiceError::Store(StoreError::Conflict(_)) => {
                AppError::Conflict(anyhow::anyhow!("Record already exists"))
            }
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Enforcer(e) => AppError::InternalError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
