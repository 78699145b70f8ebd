pub mod password;
pub mod tokens;
pub mod validation;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use tokens::{generate_token_value, hash_token_value};
pub use validation::{FieldErrors, JsonBody, ValidationPipeline};
