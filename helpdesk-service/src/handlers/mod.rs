//! HTTP handlers for the helpdesk access-control service.

pub mod auth;
pub mod object;
pub mod policy;
pub mod role;
pub mod user_role;
