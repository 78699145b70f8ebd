use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;

/// Newtype for plaintext passwords. `Debug` never prints the value.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for an encoded Argon2 hash (PHC string format).
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash of a random throwaway password, verified against when the account
/// does not exist so that unknown emails cost the same as wrong passwords.
static DUMMY_HASH: Lazy<Option<PasswordHashString>> = Lazy::new(|| {
    let throwaway = Password::new(hex::encode(rand::random::<[u8; 16]>()));
    hash_password(&throwaway).ok()
});

/// Hash a password using Argon2id with a fresh random salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// Returns Ok(()) if the password matches, Err otherwise.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

/// Run one full verification against the dummy hash and discard the result.
pub fn verify_against_dummy(password: &Password) {
    if let Some(hash) = DUMMY_HASH.as_ref() {
        let _ = verify_password(password, hash);
    }
}

/// Hash on the blocking pool; Argon2 is deliberately slow.
pub async fn hash_password_blocking(password: Password) -> Result<PasswordHashString, anyhow::Error> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))?
}

/// Verify on the blocking pool. Returns whether the password matched.
pub async fn verify_password_blocking(
    password: Password,
    password_hash: PasswordHashString,
) -> Result<bool, anyhow::Error> {
    tokio::task::spawn_blocking(move || verify_password(&password, &password_hash).is_ok())
        .await
        .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))
}

/// Burn a dummy verification on the blocking pool.
pub async fn verify_against_dummy_blocking(password: Password) {
    let _ = tokio::task::spawn_blocking(move || verify_against_dummy(&password)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let password = Password::new("correct-horse-battery");
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2"));
        assert!(!hash.as_str().contains("correct-horse-battery"));
    }

    #[test]
    fn test_verify_password() {
        let password = Password::new("correct-horse-battery");
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash).is_ok());
        assert!(verify_password(&Password::new("wrong-horse"), &hash).is_err());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("correct-horse-battery");
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(verify_password(&password, &hash1).is_ok());
        assert!(verify_password(&password, &hash2).is_ok());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("hunter2hunter2");
        assert_eq!(format!("{:?}", password), "Password(***)");
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        let password = Password::new("anything-at-all");
        let hash = PasswordHashString::new("not-a-phc-string".to_string());
        assert!(verify_password(&password, &hash).is_err());
    }

    #[tokio::test]
    async fn test_blocking_helpers() {
        let hash = hash_password_blocking(Password::new("correct-horse-battery"))
            .await
            .unwrap();
        assert!(verify_password_blocking(Password::new("correct-horse-battery"), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password_blocking(Password::new("nope-nope-nope"), hash)
            .await
            .unwrap());
        verify_against_dummy_blocking(Password::new("whatever")).await;
    }
}
