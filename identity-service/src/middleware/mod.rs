pub mod admin;
pub mod auth;

pub use admin::require_capability;
pub use auth::{auth_middleware, AuthContext};
