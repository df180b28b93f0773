//! Keeps the durable policy store and the enforcer mirror in agreement.
//!
//! Every mutation touches both sides. When the second step fails the first is
//! undone before returning, so a client never observes a policy that exists in
//! only one of them. The store is authoritative: `reload_policies` rebuilds the
//! mirror from it.

use std::sync::Arc;
use uuid::Uuid;

use super::enforcer::PolicyEvaluator;
use super::error::{ServiceError, StoreError};
use super::store::AccessStore;
use crate::models::{Policy, PolicyRule, RoleId};

#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub role_id: RoleId,
    pub object_id: Uuid,
    pub action: String,
}

#[derive(Clone)]
pub struct PolicyService {
    store: Arc<dyn AccessStore>,
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl PolicyService {
    pub fn new(store: Arc<dyn AccessStore>, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self { store, evaluator }
    }

    /// Persist a policy and mirror it into the enforcer.
    pub async fn create_policy(
        &self,
        input: NewPolicy,
        created_by: Option<Uuid>,
    ) -> Result<Policy, ServiceError> {
        let action = input.action.trim().to_lowercase();
        if action.is_empty() {
            return Err(ServiceError::Validation("action must not be empty".to_string()));
        }

        self.store
            .find_role(input.role_id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))?;
        let object = self
            .store
            .find_object(input.object_id)
            .await?
            .ok_or(ServiceError::NotFound("Object"))?;

        let policy = Policy::new(input.role_id, object.object_id, &action, created_by);
        self.store.insert_policy(&policy).await.map_err(|e| match e {
            StoreError::Conflict(_) => ServiceError::Conflict(format!(
                "Role already has '{}' on '{}'",
                action, object.object_name
            )),
            other => ServiceError::Store(other),
        })?;

        let rule = PolicyRule::for_role(policy.role_id, &object.object_name, &policy.action);
        if let Err(mirror_err) = self.evaluator.add_policy(rule).await {
            tracing::error!(
                policy_id = %policy.policy_id,
                error = %mirror_err,
                "Failed to mirror new policy, removing stored row"
            );
            if let Err(undo_err) = self.store.hard_delete_policy(policy.policy_id).await {
                tracing::error!(
                    policy_id = %policy.policy_id,
                    error = %undo_err,
                    "Compensating delete failed, store holds an unmirrored policy until reload"
                );
            }
            return Err(ServiceError::Consistency(format!(
                "policy {} was not applied: {}",
                policy.policy_id, mirror_err
            )));
        }

        tracing::info!(
            policy_id = %policy.policy_id,
            role_id = %policy.role_id,
            object = %object.object_name,
            action = %policy.action,
            "Policy created"
        );
        Ok(policy)
    }

    /// Remove a policy from the enforcer, then soft-delete its row.
    pub async fn delete_policy(&self, policy_id: Uuid) -> Result<(), ServiceError> {
        let policy = self
            .store
            .find_policy(policy_id)
            .await?
            .ok_or(ServiceError::NotFound("Policy"))?;
        if policy.is_standard {
            return Err(ServiceError::Conflict(
                "Standard policies cannot be deleted".to_string(),
            ));
        }

        let rule = self.rule_for(&policy).await?;

        if let Some(rule) = &rule {
            self.evaluator.remove_policy(rule).await.map_err(|e| {
                tracing::error!(policy_id = %policy_id, error = %e, "Failed to unmirror policy");
                ServiceError::Consistency(format!("policy {} was not removed: {}", policy_id, e))
            })?;
        }

        let deleted = match self.store.soft_delete_policy(policy_id).await {
            Ok(deleted) => deleted,
            Err(store_err) => {
                tracing::error!(
                    policy_id = %policy_id,
                    error = %store_err,
                    "Failed to delete policy row, restoring mirror"
                );
                if let Some(rule) = rule {
                    if let Err(undo_err) = self.evaluator.add_policy(rule).await {
                        return Err(ServiceError::Consistency(format!(
                            "policy {} removed from enforcer but not from store: {}",
                            policy_id, undo_err
                        )));
                    }
                }
                return Err(ServiceError::Store(store_err));
            }
        };

        if !deleted {
            // Deleted concurrently; the mirror removal above already matches.
            return Err(ServiceError::NotFound("Policy"));
        }

        // A reload between the two steps reads the row while it is still live.
        if let Some(rule) = &rule {
            self.evaluator.remove_policy(rule).await.map_err(|e| {
                tracing::error!(
                    policy_id = %policy_id,
                    error = %e,
                    "Policy row deleted but mirror rule may have been restored"
                );
                ServiceError::Consistency(format!("policy {} is still enforced: {}", policy_id, e))
            })?;
        }

        tracing::info!(policy_id = %policy_id, "Policy deleted");
        Ok(())
    }

    pub async fn get_policy(&self, policy_id: Uuid) -> Result<Policy, ServiceError> {
        self.store
            .find_policy(policy_id)
            .await?
            .ok_or(ServiceError::NotFound("Policy"))
    }

    pub async fn list_policies(&self) -> Result<Vec<Policy>, ServiceError> {
        Ok(self.store.list_policies().await?)
    }

    /// Discard the mirror and rebuild it from the store. Returns the rule count.
    pub async fn reload_policies(&self) -> Result<usize, ServiceError> {
        let count = self.evaluator.reload().await?;
        tracing::info!(rules = count, "Policies reloaded");
        Ok(count)
    }

    /// Mirror rule for a stored policy. `None` when its object no longer exists,
    /// in which case the mirror does not hold it either.
    async fn rule_for(&self, policy: &Policy) -> Result<Option<PolicyRule>, ServiceError> {
        let object = self.store.find_object(policy.object_id).await?;
        Ok(object.map(|o| PolicyRule::for_role(policy.role_id, &o.object_name, &policy.action)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Object, Role};
    use crate::services::enforcer::{Enforcer, EnforcerError};
    use crate::services::memory::{MemoryStore, StoreOperation};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Enforcer wrapper whose writes can be switched off.
    struct FlakyEvaluator {
        inner: Enforcer,
        fail_add: AtomicBool,
        fail_remove: AtomicBool,
        /// Run a full reload right after each removal.
        reload_after_remove: AtomicBool,
    }

    #[async_trait]
    impl PolicyEvaluator for FlakyEvaluator {
        async fn add_policy(&self, rule: PolicyRule) -> Result<bool, EnforcerError> {
            if self.fail_add.load(Ordering::SeqCst) {
                return Err(EnforcerError::Unavailable("add disabled".to_string()));
            }
            self.inner.add_policy(rule).await
        }

        async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, EnforcerError> {
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(EnforcerError::Unavailable("remove disabled".to_string()));
            }
            let removed = self.inner.remove_policy(rule).await?;
            if self.reload_after_remove.load(Ordering::SeqCst) {
                self.inner.reload().await?;
            }
            Ok(removed)
        }

        fn enforce(&self, subject: &str, object: &str, action: &str) -> Result<bool, EnforcerError> {
            self.inner.enforce(subject, object, action)
        }

        fn permitted_object_actions(&self, roles: &[RoleId]) -> Result<Vec<String>, EnforcerError> {
            self.inner.permitted_object_actions(roles)
        }

        async fn reload(&self) -> Result<usize, EnforcerError> {
            self.inner.reload().await
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        evaluator: Arc<FlakyEvaluator>,
        service: PolicyService,
        role: Role,
        object: Object,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let role = Role::new("R1", None);
        let object = Object::new("Ticket", None, None);
        store.insert_role(&role).await.unwrap();
        store.insert_object(&object).await.unwrap();

        let evaluator = Arc::new(FlakyEvaluator {
            inner: Enforcer::new(store.clone()),
            fail_add: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            reload_after_remove: AtomicBool::new(false),
        });
        let service = PolicyService::new(store.clone(), evaluator.clone());
        Fixture {
            store,
            evaluator,
            service,
            role,
            object,
        }
    }

    fn new_policy(f: &Fixture, action: &str) -> NewPolicy {
        NewPolicy {
            role_id: f.role.role_id,
            object_id: f.object.object_id,
            action: action.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let f = fixture().await;
        let policy = f.service.create_policy(new_policy(&f, "create"), None).await.unwrap();
        assert!(f.evaluator.enforce_any(&[f.role.role_id], "ticket", "create").unwrap());

        f.service.delete_policy(policy.policy_id).await.unwrap();
        assert!(!f.evaluator.enforce_any(&[f.role.role_id], "ticket", "create").unwrap());
        assert!(f.service.list_policies().await.unwrap().is_empty());
        assert!(matches!(
            f.service.get_policy(policy.policy_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_role_or_object_touches_nothing() {
        let f = fixture().await;
        let mut input = new_policy(&f, "view");
        input.role_id = Uuid::new_v4();
        assert!(matches!(
            f.service.create_policy(input, None).await,
            Err(ServiceError::NotFound("Role"))
        ));

        let mut input = new_policy(&f, "view");
        input.object_id = Uuid::new_v4();
        assert!(matches!(
            f.service.create_policy(input, None).await,
            Err(ServiceError::NotFound("Object"))
        ));

        assert_eq!(f.store.policy_row_count(), 0);
        assert!(f.evaluator.permitted_object_actions(&[f.role.role_id]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_role_is_not_found() {
        let f = fixture().await;
        f.store.soft_delete_role(f.role.role_id).await.unwrap();
        assert!(matches!(
            f.service.create_policy(new_policy(&f, "view"), None).await,
            Err(ServiceError::NotFound("Role"))
        ));
    }

    #[tokio::test]
    async fn test_mirror_failure_rolls_back_row() {
        let f = fixture().await;
        f.evaluator.fail_add.store(true, Ordering::SeqCst);

        let result = f.service.create_policy(new_policy(&f, "create"), None).await;
        assert!(matches!(result, Err(ServiceError::Consistency(_))));
        assert_eq!(f.store.policy_row_count(), 0);
        assert!(!f.evaluator.enforce_any(&[f.role.role_id], "ticket", "create").unwrap());
    }

    #[tokio::test]
    async fn test_failed_compensation_still_reports_consistency() {
        let f = fixture().await;
        f.evaluator.fail_add.store(true, Ordering::SeqCst);
        f.store.fail_on(StoreOperation::HardDeletePolicy);

        let result = f.service.create_policy(new_policy(&f, "create"), None).await;
        assert!(matches!(result, Err(ServiceError::Consistency(_))));

        // The next reload converges the mirror on the store.
        f.evaluator.fail_add.store(false, Ordering::SeqCst);
        f.store.clear_faults();
        f.service.reload_policies().await.unwrap();
        assert!(f.evaluator.enforce_any(&[f.role.role_id], "ticket", "create").unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict() {
        let f = fixture().await;
        f.service.create_policy(new_policy(&f, "view"), None).await.unwrap();
        assert!(matches!(
            f.service.create_policy(new_policy(&f, "VIEW"), None).await,
            Err(ServiceError::Conflict(_))
        ));
        assert_eq!(f.store.policy_row_count(), 1);
    }

    #[tokio::test]
    async fn test_unmirror_failure_keeps_row() {
        let f = fixture().await;
        let policy = f.service.create_policy(new_policy(&f, "update"), None).await.unwrap();
        f.evaluator.fail_remove.store(true, Ordering::SeqCst);

        let result = f.service.delete_policy(policy.policy_id).await;
        assert!(matches!(result, Err(ServiceError::Consistency(_))));
        assert!(f.service.get_policy(policy.policy_id).await.is_ok());
        assert!(f.evaluator.enforce_any(&[f.role.role_id], "ticket", "update").unwrap());
    }

    #[tokio::test]
    async fn test_reload_during_delete_does_not_resurrect_rule() {
        let f = fixture().await;
        let policy = f.service.create_policy(new_policy(&f, "create"), None).await.unwrap();
        f.evaluator.reload_after_remove.store(true, Ordering::SeqCst);

        f.service.delete_policy(policy.policy_id).await.unwrap();
        assert!(!f.evaluator.enforce_any(&[f.role.role_id], "ticket", "create").unwrap());

        f.service.reload_policies().await.unwrap();
        assert!(!f.evaluator.enforce_any(&[f.role.role_id], "ticket", "create").unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_on_delete_restores_mirror() {
        let f = fixture().await;
        let policy = f.service.create_policy(new_policy(&f, "delete"), None).await.unwrap();
        f.store.fail_on(StoreOperation::SoftDeletePolicy);

        let result = f.service.delete_policy(policy.policy_id).await;
        assert!(matches!(result, Err(ServiceError::Store(_))));
        assert!(f.evaluator.enforce_any(&[f.role.role_id], "ticket", "delete").unwrap());
        assert!(f.service.get_policy(policy.policy_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_standard_policy_is_protected() {
        let store = Arc::new(MemoryStore::seeded());
        let enforcer = Arc::new(Enforcer::load(store.clone()).await.unwrap());
        let service = PolicyService::new(store.clone(), enforcer);

        let standard = service.list_policies().await.unwrap().remove(0);
        assert!(standard.is_standard);
        assert!(matches!(
            service.delete_policy(standard.policy_id).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_action_is_rejected() {
        let f = fixture().await;
        assert!(matches!(
            f.service.create_policy(new_policy(&f, "  "), None).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
