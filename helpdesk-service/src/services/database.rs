//! PostgreSQL implementation of the access store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::error::StoreError;
use super::store::AccessStore;
use crate::models::{
    Object, Policy, PolicyRule, Role, RoleId, SecondaryRoleGrant, Session, User,
};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessStore for Database {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    // ==================== Role Operations ====================

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roles (role_id, role_name, description, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(role.role_id)
        .bind(&role.role_name)
        .bind(&role.description)
        .bind(role.created_utc)
        .bind(role.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError> {
        sqlx::query_as::<_, Role>(
            "SELECT * FROM roles WHERE role_id = $1 AND deleted_utc IS NULL",
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn find_roles(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT * FROM roles
            WHERE role_id = ANY($1) AND deleted_utc IS NULL
            ORDER BY role_name
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        sqlx::query_as::<_, Role>(
            "SELECT * FROM roles WHERE deleted_utc IS NULL ORDER BY role_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn update_role(&self, role: &Role) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE roles SET role_name = $2, description = $3, updated_utc = $4
            WHERE role_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(role.role_id)
        .bind(&role.role_name)
        .bind(&role.description)
        .bind(role.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_role(&self, role_id: RoleId) -> Result<bool, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE roles SET deleted_utc = $2, updated_utc = $2
            WHERE role_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(role_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Object Operations ====================

    async fn insert_object(&self, object: &Object) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO objects (object_id, object_name, description, is_standard, created_by, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(object.object_id)
        .bind(&object.object_name)
        .bind(&object.description)
        .bind(object.is_standard)
        .bind(object.created_by)
        .bind(object.created_utc)
        .bind(object.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_object(&self, object_id: Uuid) -> Result<Option<Object>, StoreError> {
        sqlx::query_as::<_, Object>(
            "SELECT * FROM objects WHERE object_id = $1 AND deleted_utc IS NULL",
        )
        .bind(object_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn list_objects(&self) -> Result<Vec<Object>, StoreError> {
        sqlx::query_as::<_, Object>(
            "SELECT * FROM objects WHERE deleted_utc IS NULL ORDER BY object_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn update_object(&self, object: &Object) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE objects SET object_name = $2, description = $3, updated_utc = $4
            WHERE object_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(object.object_id)
        .bind(&object.object_name)
        .bind(&object.description)
        .bind(object.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_object(&self, object_id: Uuid) -> Result<bool, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE objects SET deleted_utc = $2, updated_utc = $2
            WHERE object_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(object_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Policy Operations ====================

    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO object_policies (policy_id, role_id, object_id, action, is_standard, created_by, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(policy.policy_id)
        .bind(policy.role_id)
        .bind(policy.object_id)
        .bind(&policy.action)
        .bind(policy.is_standard)
        .bind(policy.created_by)
        .bind(policy.created_utc)
        .bind(policy.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_policy(&self, policy_id: Uuid) -> Result<Option<Policy>, StoreError> {
        sqlx::query_as::<_, Policy>(
            "SELECT * FROM object_policies WHERE policy_id = $1 AND deleted_utc IS NULL",
        )
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn list_policies(&self) -> Result<Vec<Policy>, StoreError> {
        sqlx::query_as::<_, Policy>(
            "SELECT * FROM object_policies WHERE deleted_utc IS NULL ORDER BY created_utc",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn soft_delete_policy(&self, policy_id: Uuid) -> Result<bool, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE object_policies SET deleted_utc = $2, updated_utc = $2
            WHERE policy_id = $1 AND deleted_utc IS NULL
            "#,
        )
        .bind(policy_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn hard_delete_policy(&self, policy_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM object_policies WHERE policy_id = $1")
            .bind(policy_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_rules(&self) -> Result<Vec<PolicyRule>, StoreError> {
        sqlx::query_as::<_, PolicyRule>(
            r#"
            SELECT p.role_id::text AS subject, LOWER(o.object_name) AS object, p.action AS action
            FROM object_policies p
            INNER JOIN roles r ON r.role_id = p.role_id AND r.deleted_utc IS NULL
            INNER JOIN objects o ON o.object_id = p.object_id AND o.deleted_utc IS NULL
            WHERE p.deleted_utc IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn list_system_actions(&self, role_ids: &[RoleId]) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT UPPER(so.system_object_name)
            FROM system_objects so
            INNER JOIN system_object_policies sop ON sop.system_object_id = so.system_object_id
            INNER JOIN roles r ON r.role_id = sop.role_id AND r.deleted_utc IS NULL
            WHERE sop.role_id = ANY($1)
            ORDER BY 1
            "#,
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    // ==================== User Operations ====================

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, first_name, last_name, email, user_type, role_id, password_hash, is_active, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.user_type)
        .bind(user.role_id)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE user_id = $1 AND deleted_utc IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND deleted_utc IS NULL",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    // ==================== Grant Operations ====================

    async fn insert_grant(&self, grant: &SecondaryRoleGrant) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users_roles (user_id, role_id, granted_utc)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(grant.user_id)
        .bind(grant.role_id)
        .bind(grant.granted_utc)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn find_active_grant(
        &self,
        user_id: Uuid,
        role_id: RoleId,
    ) -> Result<Option<SecondaryRoleGrant>, StoreError> {
        sqlx::query_as::<_, SecondaryRoleGrant>(
            r#"
            SELECT user_id, role_id, granted_utc, revoked_utc FROM users_roles
            WHERE user_id = $1 AND role_id = $2 AND revoked_utc IS NULL
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn revoke_grant(&self, user_id: Uuid, role_id: RoleId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users_roles SET revoked_utc = $3
            WHERE user_id = $1 AND role_id = $2 AND revoked_utc IS NULL
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_secondary_role_ids(&self, user_id: Uuid) -> Result<Vec<RoleId>, StoreError> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT ur.role_id FROM users_roles ur
            INNER JOIN roles r ON r.role_id = ur.role_id AND r.deleted_utc IS NULL
            WHERE ur.user_id = $1 AND ur.revoked_utc IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    async fn list_role_holders(&self, role_id: RoleId) -> Result<Vec<User>, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            WHERE u.deleted_utc IS NULL
              AND (
                u.role_id = $1
                OR EXISTS (
                    SELECT 1 FROM users_roles ur
                    WHERE ur.user_id = u.user_id AND ur.role_id = $1 AND ur.revoked_utc IS NULL
                )
              )
            ORDER BY u.email
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }

    // ==================== Session Operations ====================

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (user_id, device_id, refresh_token_hash, expires_utc, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, device_id) DO UPDATE
            SET refresh_token_hash = EXCLUDED.refresh_token_hash,
                expires_utc = EXCLUDED.expires_utc,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(session.user_id)
        .bind(&session.device_id)
        .bind(&session.refresh_token_hash)
        .bind(session.expires_utc)
        .bind(session.created_utc)
        .bind(session.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    async fn rotate_session(&self, session: &Session, previous_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET refresh_token_hash = $3, expires_utc = $4, updated_utc = $5
            WHERE user_id = $1 AND device_id = $2 AND refresh_token_hash = $6
            "#,
        )
        .bind(session.user_id)
        .bind(&session.device_id)
        .bind(&session.refresh_token_hash)
        .bind(session.expires_utc)
        .bind(session.updated_utc)
        .bind(previous_hash)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_session(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE user_id = $1 AND device_id = $2",
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)
    }
}
