//! In-memory policy mirror used to answer authorization checks.
//!
//! Readers take a cheap clone of the current snapshot and evaluate without holding
//! any lock. Writers serialize on an async mutex, build the next snapshot and swap
//! it in, so a reload can never lose a concurrent add.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;

use super::error::StoreError;
use super::store::AccessStore;
use crate::models::policy::user_type_subject;
use crate::models::{PolicyRule, RoleId, UserType};

/// Actions the built-in user-type matrix grants.
pub const USER_TYPE_ACTIONS: [&str; 4] = ["create", "view", "update", "delete"];

#[derive(Error, Debug)]
pub enum EnforcerError {
    #[error("Policy snapshot lock poisoned")]
    Poisoned,

    #[error("Failed to load policies: {0}")]
    Load(#[from] StoreError),

    #[error("Policy mirror unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Mirror a rule. `Ok(false)` means it was already present.
    async fn add_policy(&self, rule: PolicyRule) -> Result<bool, EnforcerError>;

    /// Drop a rule. `Ok(false)` means it was already absent.
    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, EnforcerError>;

    /// Exact-match lookup of `(subject, object, action)`.
    fn enforce(&self, subject: &str, object: &str, action: &str) -> Result<bool, EnforcerError>;

    /// True when any of `roles` holds the permission. Stops at the first match.
    fn enforce_any(
        &self,
        roles: &[RoleId],
        object: &str,
        action: &str,
    ) -> Result<bool, EnforcerError> {
        let object = object.to_lowercase();
        let action = action.to_lowercase();
        for role in roles {
            if self.enforce(&role.to_string(), &object, &action)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether a principal of one user type may act on accounts of another.
    fn enforce_user_type(
        &self,
        principal: UserType,
        target: UserType,
        action: &str,
    ) -> Result<bool, EnforcerError> {
        self.enforce(
            &user_type_subject(principal),
            &user_type_subject(target),
            &action.to_lowercase(),
        )
    }

    /// `OBJECT_ACTION` strings of every rule any of `roles` holds, sorted.
    fn permitted_object_actions(&self, roles: &[RoleId]) -> Result<Vec<String>, EnforcerError>;

    /// Replace the mirror with the store's live state. Returns the rule count.
    async fn reload(&self) -> Result<usize, EnforcerError>;
}

/// subject -> object -> actions
#[derive(Debug, Default, Clone)]
struct PolicySnapshot {
    rules: HashMap<String, HashMap<String, HashSet<String>>>,
}

impl PolicySnapshot {
    fn from_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Self {
        let mut snapshot = Self::default();
        for rule in rules {
            snapshot.insert(rule);
        }
        snapshot
    }

    fn insert(&mut self, rule: PolicyRule) -> bool {
        self.rules
            .entry(rule.subject)
            .or_default()
            .entry(rule.object)
            .or_default()
            .insert(rule.action)
    }

    fn remove(&mut self, rule: &PolicyRule) -> bool {
        let Some(objects) = self.rules.get_mut(&rule.subject) else {
            return false;
        };
        let Some(actions) = objects.get_mut(&rule.object) else {
            return false;
        };
        let removed = actions.remove(&rule.action);
        if actions.is_empty() {
            objects.remove(&rule.object);
        }
        if objects.is_empty() {
            self.rules.remove(&rule.subject);
        }
        removed
    }

    fn contains(&self, subject: &str, object: &str, action: &str) -> bool {
        self.rules
            .get(subject)
            .and_then(|objects| objects.get(object))
            .is_some_and(|actions| actions.contains(action))
    }

    fn len(&self) -> usize {
        self.rules
            .values()
            .flat_map(|objects| objects.values())
            .map(|actions| actions.len())
            .sum()
    }
}

/// Built-in user-type rules: admins manage agents and users, agents manage users.
pub fn default_user_type_rules() -> Vec<PolicyRule> {
    let pairs = [
        (UserType::Admin, UserType::Agent),
        (UserType::Admin, UserType::User),
        (UserType::Agent, UserType::User),
    ];
    pairs
        .iter()
        .flat_map(|(principal, target)| {
            USER_TYPE_ACTIONS
                .iter()
                .map(move |action| PolicyRule::for_user_type(*principal, *target, action))
        })
        .collect()
}

pub struct Enforcer {
    store: Arc<dyn AccessStore>,
    snapshot: RwLock<Arc<PolicySnapshot>>,
    writer: Mutex<()>,
}

impl Enforcer {
    /// Enforcer holding only the built-in user-type rules until the first reload.
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(PolicySnapshot::from_rules(
                default_user_type_rules(),
            ))),
            writer: Mutex::new(()),
        }
    }

    /// Build an enforcer and load every live policy from the store.
    pub async fn load(store: Arc<dyn AccessStore>) -> Result<Self, EnforcerError> {
        let enforcer = Self::new(store);
        let count = enforcer.reload().await?;
        tracing::info!(rules = count, "Policy enforcer loaded");
        Ok(enforcer)
    }

    fn current(&self) -> Result<Arc<PolicySnapshot>, EnforcerError> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| EnforcerError::Poisoned)
    }

    fn publish(&self, next: PolicySnapshot) -> Result<(), EnforcerError> {
        let mut guard = self.snapshot.write().map_err(|_| EnforcerError::Poisoned)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

#[async_trait]
impl PolicyEvaluator for Enforcer {
    async fn add_policy(&self, rule: PolicyRule) -> Result<bool, EnforcerError> {
        let _writer = self.writer.lock().await;
        let current = self.current()?;
        if current.contains(&rule.subject, &rule.object, &rule.action) {
            return Ok(false);
        }
        let mut next = PolicySnapshot::clone(&current);
        next.insert(rule);
        self.publish(next)?;
        Ok(true)
    }

    async fn remove_policy(&self, rule: &PolicyRule) -> Result<bool, EnforcerError> {
        let _writer = self.writer.lock().await;
        let current = self.current()?;
        if !current.contains(&rule.subject, &rule.object, &rule.action) {
            return Ok(false);
        }
        let mut next = PolicySnapshot::clone(&current);
        next.remove(rule);
        self.publish(next)?;
        Ok(true)
    }

    fn enforce(&self, subject: &str, object: &str, action: &str) -> Result<bool, EnforcerError> {
        Ok(self.current()?.contains(subject, object, action))
    }

    fn permitted_object_actions(&self, roles: &[RoleId]) -> Result<Vec<String>, EnforcerError> {
        let snapshot = self.current()?;
        let mut actions: Vec<String> = roles
            .iter()
            .filter_map(|role| snapshot.rules.get(&role.to_string()))
            .flat_map(|objects| {
                objects.iter().flat_map(|(object, actions)| {
                    actions
                        .iter()
                        .map(move |action| format!("{}_{}", object, action).to_uppercase())
                })
            })
            .collect();
        actions.sort();
        actions.dedup();
        Ok(actions)
    }

    async fn reload(&self) -> Result<usize, EnforcerError> {
        let _writer = self.writer.lock().await;
        let rules = self.store.list_active_rules().await?;
        let next = PolicySnapshot::from_rules(rules.into_iter().chain(default_user_type_rules()));
        let count = next.len();
        self.publish(next)?;
        tracing::debug!(rules = count, "Policy snapshot reloaded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Object, Policy, Role};
    use crate::services::memory::{MemoryStore, StoreOperation};
    use uuid::Uuid;

    fn empty_enforcer() -> Enforcer {
        Enforcer::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_add_enforce_remove() {
        let enforcer = empty_enforcer();
        let role = Uuid::new_v4();
        let rule = PolicyRule::for_role(role, "ticket", "create");

        assert!(!enforcer.enforce_any(&[role], "ticket", "create").unwrap());
        assert!(enforcer.add_policy(rule.clone()).await.unwrap());
        assert!(!enforcer.add_policy(rule.clone()).await.unwrap());
        assert!(enforcer.enforce_any(&[role], "Ticket", "CREATE").unwrap());

        assert!(enforcer.remove_policy(&rule).await.unwrap());
        assert!(!enforcer.remove_policy(&rule).await.unwrap());
        assert!(!enforcer.enforce_any(&[role], "ticket", "create").unwrap());
    }

    #[tokio::test]
    async fn test_exact_match_only() {
        let enforcer = empty_enforcer();
        let role = Uuid::new_v4();
        enforcer
            .add_policy(PolicyRule::for_role(role, "ticket", "view"))
            .await
            .unwrap();

        assert!(!enforcer.enforce_any(&[role], "ticket", "update").unwrap());
        assert!(!enforcer.enforce_any(&[role], "ticket_status", "view").unwrap());
        assert!(!enforcer.enforce_any(&[Uuid::new_v4()], "ticket", "view").unwrap());
        assert!(!enforcer.enforce_any(&[], "ticket", "view").unwrap());
    }

    #[tokio::test]
    async fn test_any_role_grants() {
        let enforcer = empty_enforcer();
        let (r1, r2) = (Uuid::new_v4(), Uuid::new_v4());
        enforcer
            .add_policy(PolicyRule::for_role(r2, "note", "create"))
            .await
            .unwrap();
        assert!(enforcer.enforce_any(&[r1, r2], "note", "create").unwrap());
    }

    #[tokio::test]
    async fn test_user_type_matrix() {
        let enforcer = empty_enforcer();
        assert!(enforcer
            .enforce_user_type(UserType::Admin, UserType::Agent, "update")
            .unwrap());
        assert!(enforcer
            .enforce_user_type(UserType::Agent, UserType::User, "delete")
            .unwrap());
        assert!(!enforcer
            .enforce_user_type(UserType::Agent, UserType::Admin, "view")
            .unwrap());
        assert!(!enforcer
            .enforce_user_type(UserType::User, UserType::User, "view")
            .unwrap());
    }

    #[tokio::test]
    async fn test_reload_matches_store() {
        let store = Arc::new(MemoryStore::new());
        let role = Role::new("support", None);
        let object = Object::new("Ticket", None, None);
        store.insert_role(&role).await.unwrap();
        store.insert_object(&object).await.unwrap();
        store
            .insert_policy(&Policy::new(role.role_id, object.object_id, "view", None))
            .await
            .unwrap();

        let enforcer = Enforcer::load(store.clone()).await.unwrap();
        assert!(enforcer.enforce_any(&[role.role_id], "ticket", "view").unwrap());

        // A stray rule that the store does not know about disappears on reload.
        enforcer
            .add_policy(PolicyRule::for_role(role.role_id, "ticket", "delete"))
            .await
            .unwrap();
        let count = enforcer.reload().await.unwrap();
        assert_eq!(count, 1 + default_user_type_rules().len());
        assert!(!enforcer.enforce_any(&[role.role_id], "ticket", "delete").unwrap());
        assert!(enforcer
            .enforce_user_type(UserType::Admin, UserType::User, "create")
            .unwrap());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let enforcer = Enforcer::new(store.clone());
        let role = Uuid::new_v4();
        enforcer
            .add_policy(PolicyRule::for_role(role, "ticket", "view"))
            .await
            .unwrap();

        store.fail_on(StoreOperation::ListActiveRules);
        assert!(matches!(enforcer.reload().await, Err(EnforcerError::Load(_))));
        assert!(enforcer.enforce_any(&[role], "ticket", "view").unwrap());
    }

    #[tokio::test]
    async fn test_permitted_object_actions() {
        let enforcer = empty_enforcer();
        let role = Uuid::new_v4();
        enforcer
            .add_policy(PolicyRule::for_role(role, "ticket", "view"))
            .await
            .unwrap();
        enforcer
            .add_policy(PolicyRule::for_role(role, "note", "create"))
            .await
            .unwrap();

        let actions = enforcer.permitted_object_actions(&[role]).unwrap();
        assert_eq!(actions, vec!["NOTE_CREATE", "TICKET_VIEW"]);
        assert!(enforcer
            .permitted_object_actions(&[Uuid::new_v4()])
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_survive_reload() {
        let store = Arc::new(MemoryStore::new());
        let enforcer = Arc::new(Enforcer::new(store.clone()));
        let role = Role::new("agents", None);
        store.insert_role(&role).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let (store, adder) = (store.clone(), enforcer.clone());
            let role_id = role.role_id;
            handles.push(tokio::spawn(async move {
                let object = Object::new(format!("object_{}", i), None, None);
                store.insert_object(&object).await.unwrap();
                store
                    .insert_policy(&Policy::new(role_id, object.object_id, "view", None))
                    .await
                    .unwrap();
                adder
                    .add_policy(PolicyRule::for_role(role_id, &object.object_name, "view"))
                    .await
                    .map(|_| ())
            }));

            let reloader = enforcer.clone();
            handles.push(tokio::spawn(async move { reloader.reload().await.map(|_| ()) }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(enforcer.permitted_object_actions(&[role.role_id]).unwrap().len(), 20);
        enforcer.reload().await.unwrap();
        assert_eq!(enforcer.permitted_object_actions(&[role.role_id]).unwrap().len(), 20);
    }
}
