//! In-memory access store for tests and local runs without PostgreSQL.
//!
//! Individual operations can be made to fail to exercise compensation paths.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::bootstrap::{ADMIN_ROLE_ID, ADMIN_ROLE_NAME, STANDARD_OBJECTS, STANDARD_SYSTEM_OBJECTS};
use super::error::StoreError;
use super::store::AccessStore;
use crate::models::{
    Object, Policy, PolicyRule, Role, RoleId, SecondaryRoleGrant, Session, User, STANDARD_ACTIONS,
};

/// Store operations that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    InsertPolicy,
    SoftDeletePolicy,
    HardDeletePolicy,
    ListActiveRules,
    FindUser,
    InsertGrant,
}

#[derive(Default)]
struct MemoryState {
    roles: HashMap<Uuid, Role>,
    objects: HashMap<Uuid, Object>,
    policies: HashMap<Uuid, Policy>,
    users: HashMap<Uuid, User>,
    grants: Vec<SecondaryRoleGrant>,
    sessions: HashMap<(Uuid, String), Session>,
    system_objects: HashMap<Uuid, String>,
    system_grants: HashSet<(RoleId, Uuid)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    faults: Mutex<HashSet<StoreOperation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding the standard objects, the admin role and its policies.
    pub fn seeded() -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap_or_else(|e| e.into_inner());
            let mut admin = Role::new(ADMIN_ROLE_NAME, Some("Full access".to_string()));
            admin.role_id = ADMIN_ROLE_ID;
            state.roles.insert(admin.role_id, admin);

            for name in STANDARD_OBJECTS {
                let mut object = Object::new(name, None, None);
                object.is_standard = true;
                for action in STANDARD_ACTIONS {
                    let mut policy = Policy::new(ADMIN_ROLE_ID, object.object_id, action, None);
                    policy.is_standard = true;
                    state.policies.insert(policy.policy_id, policy);
                }
                state.objects.insert(object.object_id, object);
            }

            for name in STANDARD_SYSTEM_OBJECTS {
                let id = Uuid::new_v4();
                state.system_objects.insert(id, name.to_string());
                state.system_grants.insert((ADMIN_ROLE_ID, id));
            }
        }
        store
    }

    /// Make every subsequent call of `operation` fail until cleared.
    pub fn fail_on(&self, operation: StoreOperation) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Grant a system feature to a role, creating the feature when needed.
    pub fn grant_system_object(&self, role_id: RoleId, name: &str) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let existing = state
            .system_objects
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                state.system_objects.insert(id, name.to_string());
                id
            }
        };
        state.system_grants.insert((role_id, id));
        Ok(())
    }

    /// Number of policy rows regardless of deletion state.
    pub fn policy_row_count(&self) -> usize {
        self.state().map(|s| s.policies.len()).unwrap_or(0)
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store mutex poisoned: {}", e)))
    }

    fn check(&self, operation: StoreOperation) -> Result<(), StoreError> {
        let failing = self
            .faults
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("fault set mutex poisoned: {}", e)))?
            .contains(&operation);
        if failing {
            return Err(StoreError::Unavailable(format!("{:?} failed", operation)));
        }
        Ok(())
    }
}

impl MemoryState {
    fn live_role(&self, role_id: &RoleId) -> Option<&Role> {
        self.roles.get(role_id).filter(|r| !r.is_deleted())
    }

    fn live_user(&self, user_id: &Uuid) -> Option<&User> {
        self.users.get(user_id).filter(|u| u.deleted_utc.is_none())
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.state().map(|_| ())
    }

    // ==================== Role Operations ====================

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let taken = state.roles.values().any(|r| {
            !r.is_deleted() && r.role_name.eq_ignore_ascii_case(&role.role_name)
        });
        if taken || state.roles.contains_key(&role.role_id) {
            return Err(StoreError::Conflict("roles_name_live_key".to_string()));
        }
        state.roles.insert(role.role_id, role.clone());
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.state()?.live_role(&role_id).cloned())
    }

    async fn find_roles(&self, role_ids: &[RoleId]) -> Result<Vec<Role>, StoreError> {
        let state = self.state()?;
        let mut roles: Vec<Role> = role_ids
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter_map(|id| state.live_role(id).cloned())
            .collect();
        roles.sort_by(|a, b| a.role_name.cmp(&b.role_name));
        Ok(roles)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let state = self.state()?;
        let mut roles: Vec<Role> = state.roles.values().filter(|r| !r.is_deleted()).cloned().collect();
        roles.sort_by(|a, b| a.role_name.cmp(&b.role_name));
        Ok(roles)
    }

    async fn update_role(&self, role: &Role) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        let taken = state.roles.values().any(|r| {
            !r.is_deleted()
                && r.role_id != role.role_id
                && r.role_name.eq_ignore_ascii_case(&role.role_name)
        });
        if taken {
            return Err(StoreError::Conflict("roles_name_live_key".to_string()));
        }
        match state.roles.get_mut(&role.role_id).filter(|r| !r.is_deleted()) {
            Some(stored) => {
                stored.role_name = role.role_name.clone();
                stored.description = role.description.clone();
                stored.updated_utc = role.updated_utc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete_role(&self, role_id: RoleId) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        match state.roles.get_mut(&role_id).filter(|r| !r.is_deleted()) {
            Some(role) => {
                let now = Utc::now();
                role.deleted_utc = Some(now);
                role.updated_utc = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================== Object Operations ====================

    async fn insert_object(&self, object: &Object) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let taken = state.objects.values().any(|o| {
            !o.is_deleted() && o.object_name.eq_ignore_ascii_case(&object.object_name)
        });
        if taken || state.objects.contains_key(&object.object_id) {
            return Err(StoreError::Conflict("objects_name_live_key".to_string()));
        }
        state.objects.insert(object.object_id, object.clone());
        Ok(())
    }

    async fn find_object(&self, object_id: Uuid) -> Result<Option<Object>, StoreError> {
        let state = self.state()?;
        Ok(state.objects.get(&object_id).filter(|o| !o.is_deleted()).cloned())
    }

    async fn list_objects(&self) -> Result<Vec<Object>, StoreError> {
        let state = self.state()?;
        let mut objects: Vec<Object> =
            state.objects.values().filter(|o| !o.is_deleted()).cloned().collect();
        objects.sort_by(|a, b| a.object_name.cmp(&b.object_name));
        Ok(objects)
    }

    async fn update_object(&self, object: &Object) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        let taken = state.objects.values().any(|o| {
            !o.is_deleted()
                && o.object_id != object.object_id
                && o.object_name.eq_ignore_ascii_case(&object.object_name)
        });
        if taken {
            return Err(StoreError::Conflict("objects_name_live_key".to_string()));
        }
        match state.objects.get_mut(&object.object_id).filter(|o| !o.is_deleted()) {
            Some(stored) => {
                stored.object_name = object.object_name.clone();
                stored.description = object.description.clone();
                stored.updated_utc = object.updated_utc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete_object(&self, object_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        match state.objects.get_mut(&object_id).filter(|o| !o.is_deleted()) {
            Some(object) => {
                let now = Utc::now();
                object.deleted_utc = Some(now);
                object.updated_utc = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ==================== Policy Operations ====================

    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.check(StoreOperation::InsertPolicy)?;
        let mut state = self.state()?;
        let duplicate = state.policies.values().any(|p| {
            !p.is_deleted()
                && p.role_id == policy.role_id
                && p.object_id == policy.object_id
                && p.action == policy.action
        });
        if duplicate {
            return Err(StoreError::Conflict("object_policies_live_key".to_string()));
        }
        state.policies.insert(policy.policy_id, policy.clone());
        Ok(())
    }

    async fn find_policy(&self, policy_id: Uuid) -> Result<Option<Policy>, StoreError> {
        let state = self.state()?;
        Ok(state.policies.get(&policy_id).filter(|p| !p.is_deleted()).cloned())
    }

    async fn list_policies(&self) -> Result<Vec<Policy>, StoreError> {
        let state = self.state()?;
        let mut policies: Vec<Policy> =
            state.policies.values().filter(|p| !p.is_deleted()).cloned().collect();
        policies.sort_by_key(|p| p.created_utc);
        Ok(policies)
    }

    async fn soft_delete_policy(&self, policy_id: Uuid) -> Result<bool, StoreError> {
        self.check(StoreOperation::SoftDeletePolicy)?;
        let mut state = self.state()?;
        match state.policies.get_mut(&policy_id).filter(|p| !p.is_deleted()) {
            Some(policy) => {
                let now = Utc::now();
                policy.deleted_utc = Some(now);
                policy.updated_utc = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn hard_delete_policy(&self, policy_id: Uuid) -> Result<bool, StoreError> {
        self.check(StoreOperation::HardDeletePolicy)?;
        Ok(self.state()?.policies.remove(&policy_id).is_some())
    }

    async fn list_active_rules(&self) -> Result<Vec<PolicyRule>, StoreError> {
        self.check(StoreOperation::ListActiveRules)?;
        let state = self.state()?;
        let rules = state
            .policies
            .values()
            .filter(|p| !p.is_deleted())
            .filter_map(|p| {
                state.live_role(&p.role_id)?;
                let object = state.objects.get(&p.object_id).filter(|o| !o.is_deleted())?;
                Some(PolicyRule::for_role(p.role_id, &object.object_name, &p.action))
            })
            .collect();
        Ok(rules)
    }

    async fn list_system_actions(&self, role_ids: &[RoleId]) -> Result<Vec<String>, StoreError> {
        let state = self.state()?;
        let mut actions: Vec<String> = state
            .system_grants
            .iter()
            .filter(|(role_id, _)| role_ids.contains(role_id) && state.live_role(role_id).is_some())
            .filter_map(|(_, object_id)| state.system_objects.get(object_id))
            .map(|name| name.to_uppercase())
            .collect();
        actions.sort();
        actions.dedup();
        Ok(actions)
    }

    // ==================== User Operations ====================

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let taken = state
            .users
            .values()
            .any(|u| u.deleted_utc.is_none() && u.email.eq_ignore_ascii_case(&user.email));
        if taken || state.users.contains_key(&user.user_id) {
            return Err(StoreError::Conflict("users_email_live_key".to_string()));
        }
        state.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.check(StoreOperation::FindUser)?;
        Ok(self.state()?.live_user(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check(StoreOperation::FindUser)?;
        let state = self.state()?;
        Ok(state
            .users
            .values()
            .find(|u| u.deleted_utc.is_none() && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    // ==================== Grant Operations ====================

    async fn insert_grant(&self, grant: &SecondaryRoleGrant) -> Result<(), StoreError> {
        self.check(StoreOperation::InsertGrant)?;
        let mut state = self.state()?;
        let duplicate = state.grants.iter().any(|g| {
            g.is_active() && g.user_id == grant.user_id && g.role_id == grant.role_id
        });
        if duplicate {
            return Err(StoreError::Conflict("users_roles_live_key".to_string()));
        }
        state.grants.push(grant.clone());
        Ok(())
    }

    async fn find_active_grant(
        &self,
        user_id: Uuid,
        role_id: RoleId,
    ) -> Result<Option<SecondaryRoleGrant>, StoreError> {
        let state = self.state()?;
        Ok(state
            .grants
            .iter()
            .find(|g| g.is_active() && g.user_id == user_id && g.role_id == role_id)
            .cloned())
    }

    async fn revoke_grant(&self, user_id: Uuid, role_id: RoleId) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        let now = Utc::now();
        let mut revoked = false;
        for grant in state
            .grants
            .iter_mut()
            .filter(|g| g.is_active() && g.user_id == user_id && g.role_id == role_id)
        {
            grant.revoked_utc = Some(now);
            revoked = true;
        }
        Ok(revoked)
    }

    async fn list_secondary_role_ids(&self, user_id: Uuid) -> Result<Vec<RoleId>, StoreError> {
        let state = self.state()?;
        Ok(state
            .grants
            .iter()
            .filter(|g| g.is_active() && g.user_id == user_id)
            .filter(|g| state.live_role(&g.role_id).is_some())
            .map(|g| g.role_id)
            .collect())
    }

    async fn list_role_holders(&self, role_id: RoleId) -> Result<Vec<User>, StoreError> {
        let state = self.state()?;
        let secondary: HashSet<Uuid> = state
            .grants
            .iter()
            .filter(|g| g.is_active() && g.role_id == role_id)
            .map(|g| g.user_id)
            .collect();
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| u.deleted_utc.is_none())
            .filter(|u| u.role_id == role_id || secondary.contains(&u.user_id))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    // ==================== Session Operations ====================

    async fn upsert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let key = (session.user_id, session.device_id.clone());
        let created_utc = state
            .sessions
            .get(&key)
            .map(|s| s.created_utc)
            .unwrap_or(session.created_utc);
        let mut stored = session.clone();
        stored.created_utc = created_utc;
        state.sessions.insert(key, stored);
        Ok(())
    }

    async fn rotate_session(&self, session: &Session, previous_hash: &str) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        let key = (session.user_id, session.device_id.clone());
        match state
            .sessions
            .get_mut(&key)
            .filter(|s| s.refresh_token_hash == previous_hash)
        {
            Some(stored) => {
                stored.refresh_token_hash = session.refresh_token_hash.clone();
                stored.expires_utc = session.expires_utc;
                stored.updated_utc = session.updated_utc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_session(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        let state = self.state()?;
        Ok(state.sessions.get(&(user_id, device_id.to_string())).cloned())
    }
}
