pub mod auth;
pub mod authorize;

pub use auth::{authenticate, authentication_middleware, Authenticated, CurrentPrincipal, MaybePrincipal};
pub use authorize::{authorize_middleware, guard, Permission};
