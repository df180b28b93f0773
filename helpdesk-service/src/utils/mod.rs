pub mod password;
pub mod validation;

pub use password::{hash_password, verify_dummy, verify_password, Password};
pub use validation::{ValidPath, ValidatedJson};
