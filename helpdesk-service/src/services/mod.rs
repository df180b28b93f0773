//! Services layer for the helpdesk access-control core.
//!
//! Token issuance, role aggregation, policy enforcement and the protocol that
//! keeps the durable policy store and the enforcer mirror in agreement.

pub mod auth;
pub mod bootstrap;
pub mod catalog;
mod database;
pub mod enforcer;
pub mod error;
pub mod grants;
pub mod memory;
pub mod policy;
pub mod roles;
pub mod store;
pub mod token;

pub use auth::{AuthService, LoginOutcome};
pub use catalog::CatalogService;
pub use database::Database;
pub use enforcer::{Enforcer, EnforcerError, PolicyEvaluator};
pub use error::{ServiceError, StoreError};
pub use grants::GrantService;
pub use memory::MemoryStore;
pub use policy::{NewPolicy, PolicyService};
pub use roles::{PermissionSummary, RoleAggregator};
pub use store::AccessStore;
pub use token::{AuthToken, TokenError, TokenService};
