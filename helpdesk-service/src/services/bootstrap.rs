//! Seed data and first-run admin provisioning.
//!
//! The constants here match `migrations/20240101000002_seed_standard_policies.sql`.

use uuid::Uuid;

use super::error::ServiceError;
use super::store::AccessStore;
use crate::config::BootstrapConfig;
use crate::models::{RoleId, User, UserType};
use crate::utils::password::{hash_password, Password};

/// Fixed id of the seeded administrator role.
pub const ADMIN_ROLE_ID: RoleId = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
pub const ADMIN_ROLE_NAME: &str = "admin";

/// Resource classes every installation starts with.
pub const STANDARD_OBJECTS: [&str; 15] = [
    "ticket",
    "policy",
    "role",
    "object",
    "user",
    "ticket_category",
    "ticket_priority",
    "ticket_status",
    "ticket_source",
    "ticket_sla",
    "note",
    "ticket_cause",
    "closing_remark",
    "contact",
    "closed_ticket",
];

/// System features granted to the administrator role.
pub const STANDARD_SYSTEM_OBJECTS: [&str; 3] = ["dashboard", "reports", "settings"];

/// Create the configured administrator if no user owns that email yet.
///
/// Returns the id of the created user, or `None` when nothing was done.
pub async fn ensure_admin(
    store: &dyn AccessStore,
    config: &BootstrapConfig,
) -> Result<Option<Uuid>, ServiceError> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(None);
    };

    if store.find_user_by_email(email).await?.is_some() {
        tracing::debug!(email = %email, "Bootstrap admin already exists");
        return Ok(None);
    }

    if store.find_role(ADMIN_ROLE_ID).await?.is_none() {
        return Err(ServiceError::NotFound("Admin role"));
    }

    let password_hash = hash_password(&Password::new(password.as_str()))?;
    let user = User::new(
        "System",
        "Administrator",
        email.clone(),
        UserType::Admin,
        ADMIN_ROLE_ID,
        password_hash,
    );
    store.insert_user(&user).await?;

    tracing::info!(user_id = %user.user_id, email = %email, "Bootstrap admin created");
    Ok(Some(user.user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryStore;

    #[tokio::test]
    async fn test_admin_is_created_once() {
        let store = MemoryStore::seeded();
        let config = BootstrapConfig {
            admin_email: Some("root@helpdesk.test".to_string()),
            admin_password: Some("correct horse battery".to_string()),
        };

        let created = ensure_admin(&store, &config).await.unwrap();
        assert!(created.is_some());

        let user = store
            .find_user_by_email("ROOT@helpdesk.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role_id, ADMIN_ROLE_ID);
        assert_eq!(user.kind(), UserType::Admin);

        assert!(ensure_admin(&store, &config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_noop_without_credentials() {
        let store = MemoryStore::seeded();
        let created = ensure_admin(&store, &BootstrapConfig::default()).await.unwrap();
        assert!(created.is_none());
    }
}
