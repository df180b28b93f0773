use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::bootstrap::ADMIN_ROLE_ID;
use super::enforcer::PolicyEvaluator;
use super::error::{ServiceError, StoreError};
use super::store::AccessStore;
use crate::models::{Object, Role, RoleId};

/// Roles and protected object classes.
///
/// Deleting either one hides every policy that references it, so the enforcer is
/// reloaded afterwards.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn AccessStore>,
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn AccessStore>, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self { store, evaluator }
    }

    // ==================== Roles ====================

    pub async fn create_role(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Role, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("role name must not be empty".to_string()));
        }

        let role = Role::new(name, description);
        self.store.insert_role(&role).await.map_err(|e| match e {
            StoreError::Conflict(_) => {
                ServiceError::Conflict(format!("Role '{}' already exists", name))
            }
            other => other.into(),
        })?;

        tracing::info!(role_id = %role.role_id, role_name = %role.role_name, "Role created");
        Ok(role)
    }

    pub async fn get_role(&self, role_id: RoleId) -> Result<Role, ServiceError> {
        self.store
            .find_role(role_id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        Ok(self.store.list_roles().await?)
    }

    /// Rename or re-describe a role. The administrator role keeps its name.
    pub async fn update_role(
        &self,
        role_id: RoleId,
        name: Option<&str>,
        description: Option<String>,
    ) -> Result<Role, ServiceError> {
        let mut role = self.get_role(role_id).await?;

        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::Validation("role name must not be empty".to_string()));
            }
            if role_id == ADMIN_ROLE_ID && name != role.role_name {
                return Err(ServiceError::Conflict(
                    "The administrator role cannot be renamed".to_string(),
                ));
            }
            role.role_name = name.to_string();
        }
        if description.is_some() {
            role.description = description;
        }
        role.updated_utc = Utc::now();

        let updated = self.store.update_role(&role).await.map_err(|e| match e {
            StoreError::Conflict(_) => {
                ServiceError::Conflict(format!("Role '{}' already exists", role.role_name))
            }
            other => other.into(),
        })?;
        if !updated {
            return Err(ServiceError::NotFound("Role"));
        }

        tracing::info!(role_id = %role.role_id, role_name = %role.role_name, "Role updated");
        Ok(role)
    }

    /// Soft-delete a role nobody holds as primary.
    pub async fn delete_role(&self, role_id: RoleId) -> Result<(), ServiceError> {
        if role_id == ADMIN_ROLE_ID {
            return Err(ServiceError::Conflict(
                "The administrator role cannot be deleted".to_string(),
            ));
        }
        self.get_role(role_id).await?;

        let primary_holders = self
            .store
            .list_role_holders(role_id)
            .await?
            .into_iter()
            .filter(|u| u.role_id == role_id)
            .count();
        if primary_holders > 0 {
            return Err(ServiceError::Conflict(format!(
                "Role is the primary role of {} user(s)",
                primary_holders
            )));
        }

        if !self.store.soft_delete_role(role_id).await? {
            return Err(ServiceError::NotFound("Role"));
        }
        tracing::info!(role_id = %role_id, "Role deleted");

        self.resync().await
    }

    // ==================== Objects ====================

    pub async fn create_object(
        &self,
        name: &str,
        description: Option<String>,
        created_by: Option<Uuid>,
    ) -> Result<Object, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("object name must not be empty".to_string()));
        }

        let object = Object::new(name, description, created_by);
        self.store.insert_object(&object).await.map_err(|e| match e {
            StoreError::Conflict(_) => {
                ServiceError::Conflict(format!("Object '{}' already exists", name))
            }
            other => other.into(),
        })?;

        tracing::info!(
            object_id = %object.object_id,
            object_name = %object.object_name,
            "Object created"
        );
        Ok(object)
    }

    pub async fn get_object(&self, object_id: Uuid) -> Result<Object, ServiceError> {
        self.store
            .find_object(object_id)
            .await?
            .ok_or(ServiceError::NotFound("Object"))
    }

    pub async fn list_objects(&self) -> Result<Vec<Object>, ServiceError> {
        Ok(self.store.list_objects().await?)
    }

    /// Rename or re-describe an object. Rules are keyed by object name, so a
    /// rename reloads the enforcer.
    pub async fn update_object(
        &self,
        object_id: Uuid,
        name: Option<&str>,
        description: Option<String>,
    ) -> Result<Object, ServiceError> {
        let mut object = self.get_object(object_id).await?;
        let mut renamed = false;

        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::Validation("object name must not be empty".to_string()));
            }
            if name != object.object_name {
                if object.is_standard {
                    return Err(ServiceError::Conflict(
                        "Standard objects cannot be renamed".to_string(),
                    ));
                }
                renamed = object.rule_name() != name.to_lowercase();
                object.object_name = name.to_string();
            }
        }
        if description.is_some() {
            object.description = description;
        }
        object.updated_utc = Utc::now();

        let updated = self.store.update_object(&object).await.map_err(|e| match e {
            StoreError::Conflict(_) => {
                ServiceError::Conflict(format!("Object '{}' already exists", object.object_name))
            }
            other => other.into(),
        })?;
        if !updated {
            return Err(ServiceError::NotFound("Object"));
        }
        tracing::info!(
            object_id = %object.object_id,
            object_name = %object.object_name,
            "Object updated"
        );

        if renamed {
            self.resync().await?;
        }
        Ok(object)
    }

    pub async fn delete_object(&self, object_id: Uuid) -> Result<(), ServiceError> {
        let object = self.get_object(object_id).await?;
        if object.is_standard {
            return Err(ServiceError::Conflict(
                "Standard objects cannot be deleted".to_string(),
            ));
        }

        if !self.store.soft_delete_object(object_id).await? {
            return Err(ServiceError::NotFound("Object"));
        }
        tracing::info!(object_id = %object_id, "Object deleted");

        self.resync().await
    }

    /// The row has already changed, so a failed reload leaves stale rules in the
    /// mirror until the next successful one.
    async fn resync(&self) -> Result<(), ServiceError> {
        self.evaluator.reload().await.map(|_| ()).map_err(|e| {
            tracing::error!(error = %e, "Enforcer reload after catalog change failed");
            ServiceError::Consistency(format!("enforcer reload failed: {}", e))
        })
    }
}
