pub mod grant;
pub mod object;
pub mod policy;
pub mod principal;
pub mod role;
pub mod session;
pub mod user;

pub use grant::SecondaryRoleGrant;
pub use object::Object;
pub use policy::{Policy, PolicyRule, STANDARD_ACTIONS};
pub use principal::{Principal, RoleId, UserType};
pub use role::Role;
pub use session::Session;
pub use user::{SanitizedUser, User};
