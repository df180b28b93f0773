use std::sync::Arc;
use uuid::Uuid;

use super::error::{ServiceError, StoreError};
use super::roles::RoleAggregator;
use super::store::AccessStore;
use crate::models::{Role, RoleId, SanitizedUser, SecondaryRoleGrant, User};

/// Secondary role grants. A user's primary role is never duplicated as a grant.
#[derive(Clone)]
pub struct GrantService {
    store: Arc<dyn AccessStore>,
    roles: Arc<RoleAggregator>,
}

impl GrantService {
    pub fn new(store: Arc<dyn AccessStore>, roles: Arc<RoleAggregator>) -> Self {
        Self { store, roles }
    }

    pub async fn grant_role(
        &self,
        user_id: Uuid,
        role_id: RoleId,
    ) -> Result<SecondaryRoleGrant, ServiceError> {
        let user = self.user(user_id).await?;
        self.role(role_id).await?;

        if user.role_id == role_id {
            return Err(ServiceError::Conflict(
                "Role is already the user's primary role".to_string(),
            ));
        }
        if self.store.find_active_grant(user_id, role_id).await?.is_some() {
            return Err(ServiceError::AlreadyGranted);
        }

        let grant = SecondaryRoleGrant::new(user_id, role_id);
        self.store.insert_grant(&grant).await.map_err(|e| match e {
            // Lost a race with a concurrent grant of the same role.
            StoreError::Conflict(_) => ServiceError::AlreadyGranted,
            other => other.into(),
        })?;
        self.roles.invalidate(user_id);

        tracing::info!(user_id = %user_id, role_id = %role_id, "Role granted");
        Ok(grant)
    }

    pub async fn revoke_role(&self, user_id: Uuid, role_id: RoleId) -> Result<(), ServiceError> {
        let user = self.user(user_id).await?;
        if user.role_id == role_id {
            return Err(ServiceError::Conflict(
                "The primary role cannot be revoked".to_string(),
            ));
        }

        if !self.store.revoke_grant(user_id, role_id).await? {
            return Err(ServiceError::NotFound("Role grant"));
        }
        self.roles.invalidate(user_id);

        tracing::info!(user_id = %user_id, role_id = %role_id, "Role revoked");
        Ok(())
    }

    /// Users holding `role_id` as primary or secondary role.
    pub async fn role_users(&self, role_id: RoleId) -> Result<Vec<SanitizedUser>, ServiceError> {
        self.role(role_id).await?;
        let users = self.store.list_role_holders(role_id).await?;
        Ok(users.into_iter().map(SanitizedUser::from).collect())
    }

    /// Live roles of a user, primary included.
    pub async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let user = self.user(user_id).await?;
        let ids = self.roles.roles_for(&user).await?;
        Ok(self.store.find_roles(&ids).await?)
    }

    async fn user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))
    }

    async fn role(&self, role_id: RoleId) -> Result<Role, ServiceError> {
        self.store
            .find_role(role_id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))
    }
}
