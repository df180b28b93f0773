use async_trait::async_trait;
use uuid::Uuid;

use super::error::StoreError;
use crate::models::{
    Object, Policy, PolicyRule, Role, RoleId, SecondaryRoleGrant, Session, User,
};

/// Durable store of roles, objects, policies, grants, users and sessions.
///
/// Lookups only return live rows: soft-deleted roles, objects, policies and users,
/// and revoked grants, are invisible.
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    // ==================== Role Operations ====================

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError>;
    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError>;
    async fn find_roles(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, StoreError>;
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;
    /// Writes name and description of a live role. Fails with
    /// `StoreError::Conflict` when another live role owns the name.
    async fn update_role(&self, role: &Role) -> Result<bool, StoreError>;
    /// Returns false when no live role matched.
    async fn soft_delete_role(&self, role_id: RoleId) -> Result<bool, StoreError>;

    // ==================== Object Operations ====================

    async fn insert_object(&self, object: &Object) -> Result<(), StoreError>;
    async fn find_object(&self, object_id: Uuid) -> Result<Option<Object>, StoreError>;
    async fn list_objects(&self) -> Result<Vec<Object>, StoreError>;
    async fn update_object(&self, object: &Object) -> Result<bool, StoreError>;
    async fn soft_delete_object(&self, object_id: Uuid) -> Result<bool, StoreError>;

    // ==================== Policy Operations ====================

    /// Fails with `StoreError::Conflict` when the tuple already has a live row.
    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError>;
    async fn find_policy(&self, policy_id: Uuid) -> Result<Option<Policy>, StoreError>;
    async fn list_policies(&self) -> Result<Vec<Policy>, StoreError>;
    async fn soft_delete_policy(&self, policy_id: Uuid) -> Result<bool, StoreError>;
    /// Physically removes the row. Deleting a missing row is not an error.
    async fn hard_delete_policy(&self, policy_id: Uuid) -> Result<bool, StoreError>;
    /// Rules of every live policy whose role and object are also live.
    async fn list_active_rules(&self) -> Result<Vec<PolicyRule>, StoreError>;
    /// Upper-case names of system objects granted to any of `role_ids`.
    async fn list_system_actions(&self, role_ids: &[RoleId]) -> Result<Vec<String>, StoreError>;

    // ==================== User Operations ====================

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    // ==================== Grant Operations ====================

    /// Fails with `StoreError::Conflict` when a live grant already exists.
    async fn insert_grant(&self, grant: &SecondaryRoleGrant) -> Result<(), StoreError>;
    async fn find_active_grant(
        &self,
        user_id: Uuid,
        role_id: RoleId,
    ) -> Result<Option<SecondaryRoleGrant>, StoreError>;
    async fn revoke_grant(&self, user_id: Uuid, role_id: RoleId) -> Result<bool, StoreError>;
    /// Role ids of live grants whose role is not deleted.
    async fn list_secondary_role_ids(&self, user_id: Uuid) -> Result<Vec<RoleId>, StoreError>;
    /// Users holding the role as primary or through a live grant.
    async fn list_role_holders(&self, role_id: RoleId) -> Result<Vec<User>, StoreError>;

    // ==================== Session Operations ====================

    /// Insert or replace the session of `(user_id, device_id)`.
    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError>;
    /// Replace the session only while it still holds `previous_hash`.
    /// Returns false when another rotation got there first.
    async fn rotate_session(&self, session: &Session, previous_hash: &str) -> Result<bool, StoreError>;
    async fn find_session(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Session>, StoreError>;
}
