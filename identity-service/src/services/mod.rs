//! Services layer for the identity service.
//!
//! Domain services (`AuthService`, `ProfileRegistry`, `AdminService`) sit on
//! top of the storage seam and the external collaborators (mail, blacklist).

pub mod admin;
pub mod audit;
pub mod auth;
pub mod email;
pub mod error;
pub mod jwt;
pub mod memory;
pub mod permissions;
pub mod policy;
pub mod postgres;
pub mod profiles;
pub mod redis;
pub mod sessions;
pub mod store;
pub mod tokens;

pub use admin::AdminService;
pub use audit::AuditRecorder;
pub use auth::AuthService;
pub use email::{EmailProvider, EmailService, MockEmailService};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims};
pub use memory::InMemoryStore;
pub use policy::PolicyService;
pub use postgres::PgStore;
pub use profiles::ProfileRegistry;
pub use redis::{MockBlacklist, RedisService, TokenBlacklist};
pub use sessions::{ClientInfo, SessionManager};
pub use store::{IdentityStore, StoreError};
pub use tokens::TokenLifecycle;
