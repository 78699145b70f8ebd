pub mod password;
pub mod registration;
pub mod session;

pub use password::{change_password, confirm_password_reset, delete_account, request_password_reset};
pub use registration::{register, resend_verification, verify_email};
pub use session::{list_sessions, login, logout, refresh, revoke, terminate_session};
