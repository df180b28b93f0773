use std::sync::Arc;
use uuid::Uuid;

use super::enforcer::PolicyEvaluator;
use super::error::ServiceError;
use super::roles::{PermissionSummary, RoleAggregator};
use super::store::AccessStore;
use super::token::{AuthToken, TokenService};
use crate::models::{Principal, Role, RoleId, SanitizedUser, Session, User};
use crate::utils::{verify_dummy, verify_password, Password};

/// Result of a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: SanitizedUser,
    pub roles: Vec<Role>,
    pub permissions: PermissionSummary,
    pub token: AuthToken,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AccessStore>,
    tokens: Arc<TokenService>,
    roles: Arc<RoleAggregator>,
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AccessStore>,
        tokens: Arc<TokenService>,
        roles: Arc<RoleAggregator>,
        evaluator: Arc<dyn PolicyEvaluator>,
    ) -> Self {
        Self {
            store,
            tokens,
            roles,
            evaluator,
        }
    }

    /// Check credentials and open a session for `device_id`.
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
        device_id: &str,
    ) -> Result<LoginOutcome, ServiceError> {
        let Some(user) = self.store.find_user_by_email(email.trim()).await? else {
            verify_dummy(password);
            tracing::warn!("Login failed: unknown email");
            return Err(ServiceError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash) {
            tracing::warn!(user_id = %user.user_id, "Login failed: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }
        if !user.can_login() {
            tracing::warn!(user_id = %user.user_id, "Login refused: account inactive");
            return Err(ServiceError::InvalidCredentials);
        }

        let role_ids = self.roles.roles_for(&user).await?;
        let (token, session) = self.issue_session(&user, role_ids.clone(), device_id)?;
        self.store.upsert_session(&session).await?;

        let roles = self.store.find_roles(&role_ids).await?;
        let permissions = self
            .roles
            .permission_summary(self.evaluator.as_ref(), &role_ids)
            .await?;

        tracing::info!(user_id = %user.user_id, device_id = %device_id, "User logged in");
        Ok(LoginOutcome {
            user: user.into(),
            roles,
            permissions,
            token,
        })
    }

    /// Redeem a refresh token for a new pair. The stored session is rotated, so
    /// the redeemed refresh token stops working.
    pub async fn refresh(
        &self,
        user_id: Uuid,
        device_id: &str,
        refresh_token: &str,
    ) -> Result<AuthToken, ServiceError> {
        let claimed = self.tokens.verify_refresh_token(refresh_token).map_err(|e| {
            if let Some(principal) = e.principal() {
                tracing::info!(user_id = %principal.user_id, "Expired refresh token presented");
            }
            ServiceError::from(e)
        })?;
        if claimed.user_id != user_id {
            tracing::warn!(user_id = %user_id, token_user = %claimed.user_id, "Refresh token user mismatch");
            return Err(ServiceError::Unauthenticated);
        }

        let session = self
            .store
            .find_session(user_id, device_id)
            .await?
            .ok_or(ServiceError::Unauthenticated)?;
        if !session.matches(refresh_token) {
            tracing::warn!(user_id = %user_id, device_id = %device_id, "Refresh token does not match session");
            return Err(ServiceError::Unauthenticated);
        }
        if session.is_expired() {
            tracing::info!(user_id = %user_id, device_id = %device_id, "Refresh of expired session");
            return Err(ServiceError::Unauthenticated);
        }

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .filter(User::can_login)
            .ok_or(ServiceError::Unauthenticated)?;

        let role_ids = self.roles.roles_for(&user).await?;
        let (token, next) = self.issue_session(&user, role_ids, device_id)?;
        if !self.store.rotate_session(&next, &session.refresh_token_hash).await? {
            tracing::warn!(user_id = %user_id, device_id = %device_id, "Refresh token already rotated");
            return Err(ServiceError::Unauthenticated);
        }

        tracing::info!(user_id = %user_id, device_id = %device_id, "Session refreshed");
        Ok(token)
    }

    fn issue_session(
        &self,
        user: &User,
        role_ids: Vec<RoleId>,
        device_id: &str,
    ) -> Result<(AuthToken, Session), ServiceError> {
        let principal = Principal::new(user.user_id, user.display_name(), role_ids, user.kind());
        let token = self.tokens.issue_token(&principal)?;

        let session = Session::new(
            user.user_id,
            device_id,
            &token.refresh_token,
            token.refresh_token_expiration,
        );
        Ok((token, session))
    }
}
