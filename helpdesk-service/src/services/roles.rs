use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;
use uuid::Uuid;

use super::enforcer::PolicyEvaluator;
use super::error::ServiceError;
use super::store::AccessStore;
use crate::models::principal::normalize_roles;
use crate::models::{RoleId, User};

/// Read-only permission summary attached to a user at login.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct PermissionSummary {
    /// `OBJECT_ACTION`, e.g. `TICKET_CREATE`.
    pub object_actions: Vec<String>,
    /// Upper-case system feature names.
    pub system_actions: Vec<String>,
}

/// Computes the effective role set of a user: the primary role plus every live
/// secondary grant.
///
/// Without a cache the set is recomputed from the store on every call. With a
/// cache, entries live for at most the TTL and are dropped synchronously by
/// [`RoleAggregator::invalidate`].
pub struct RoleAggregator {
    store: Arc<dyn AccessStore>,
    cache: Option<RoleCache>,
}

struct RoleCache {
    ttl: Duration,
    entries: DashMap<Uuid, CachedRoles>,
    /// Bumped on invalidation so that a lookup racing with a grant cannot
    /// reinsert the old set.
    generations: DashMap<Uuid, u64>,
}

#[derive(Clone)]
struct CachedRoles {
    roles: Vec<RoleId>,
    cached_at: Instant,
}

impl RoleAggregator {
    /// A zero `ttl` disables caching.
    pub fn new(store: Arc<dyn AccessStore>, ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| RoleCache {
            ttl,
            entries: DashMap::new(),
            generations: DashMap::new(),
        });
        Self { store, cache }
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Effective roles of an active user, sorted and deduplicated.
    pub async fn effective_roles(&self, user_id: Uuid) -> Result<Vec<RoleId>, ServiceError> {
        let generation = match &self.cache {
            Some(cache) => {
                if let Some(hit) = cache.fresh(&user_id) {
                    return Ok(hit);
                }
                cache.generation(&user_id)
            }
            None => 0,
        };

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        if !user.can_login() {
            return Err(ServiceError::Unauthenticated);
        }

        let roles = self.roles_for(&user).await?;

        if let Some(cache) = &self.cache {
            cache.store(user_id, generation, roles.clone());
        }
        Ok(roles)
    }

    /// Effective roles of an already loaded user. Bypasses the cache.
    pub async fn roles_for(&self, user: &User) -> Result<Vec<RoleId>, ServiceError> {
        let secondary = self.store.list_secondary_role_ids(user.user_id).await?;
        Ok(normalize_roles(std::iter::once(user.role_id).chain(secondary)))
    }

    /// Drop any cached role set of `user_id`. Call after grants, revocations and
    /// primary-role changes.
    pub fn invalidate(&self, user_id: Uuid) {
        if let Some(cache) = &self.cache {
            let mut generation = cache.generations.entry(user_id).or_insert(0);
            *generation += 1;
            cache.entries.remove(&user_id);
            drop(generation);
            tracing::debug!(user_id = %user_id, "Role cache entry invalidated");
        }
    }

    /// Object and system actions available to `roles`.
    pub async fn permission_summary(
        &self,
        evaluator: &dyn PolicyEvaluator,
        roles: &[RoleId],
    ) -> Result<PermissionSummary, ServiceError> {
        let object_actions = evaluator.permitted_object_actions(roles)?;
        let system_actions = self.store.list_system_actions(roles).await?;
        Ok(PermissionSummary {
            object_actions,
            system_actions,
        })
    }
}

impl RoleCache {
    fn fresh(&self, user_id: &Uuid) -> Option<Vec<RoleId>> {
        let entry = self.entries.get(user_id)?;
        if entry.cached_at.elapsed() < self.ttl {
            return Some(entry.roles.clone());
        }
        drop(entry);
        self.entries.remove(user_id);
        None
    }

    fn generation(&self, user_id: &Uuid) -> u64 {
        self.generations.get(user_id).map(|g| *g).unwrap_or(0)
    }

    /// Insert while holding the generation entry, so an invalidation either
    /// lands first and discards the set or lands after and removes it.
    fn store(&self, user_id: Uuid, generation: u64, roles: Vec<RoleId>) {
        let current = self.generations.entry(user_id).or_insert(0);
        if *current != generation {
            return;
        }
        self.entries.insert(
            user_id,
            CachedRoles {
                roles,
                cached_at: Instant::now(),
            },
        );
        drop(current);
        self.prune();
    }

    fn prune(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);
    }
}
