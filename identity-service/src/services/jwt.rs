use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Role, User};

const REFRESH_TOKEN_USE: &str = "refresh";

/// Signs and verifies the two halves of a grant with RS256.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
}

/// Claims for access tokens (short-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Session the grant belongs to
    pub sid: Uuid,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessTokenClaims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|e| JwtError::Invalid(e.to_string()))
    }
}

/// Claims for refresh tokens. Expiry equals the session expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub sid: Uuid,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub token_use: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        }
    }
}

impl JwtService {
    /// Create a new JWT service by loading RSA keys from files.
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let private_key_pem = fs::read_to_string(&config.private_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                config.private_key_path,
                e
            )
        })?;

        let public_key_pem = fs::read_to_string(&config.public_key_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                config.public_key_path,
                e
            )
        })?;

        let service = Self::from_pem(
            &private_key_pem,
            &public_key_pem,
            config.access_token_expiry_minutes,
            config.refresh_token_expiry_days,
        )?;

        tracing::info!("JWT service initialized with RS256 keys");
        Ok(service)
    }

    pub fn from_pem(
        private_key_pem: &str,
        public_key_pem: &str,
        access_token_expiry_minutes: i64,
        refresh_token_expiry_days: i64,
    ) -> Result<Self, anyhow::Error> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            access_token_expiry_minutes,
            refresh_token_expiry_days,
        })
    }

    pub fn access_lifetime(&self) -> Duration {
        Duration::minutes(self.access_token_expiry_minutes)
    }

    pub fn refresh_lifetime(&self) -> Duration {
        Duration::days(self.refresh_token_expiry_days)
    }

    /// Get access token expiry in seconds (for client info).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    /// Sign an access token for `user` bound to session `sid`.
    pub fn generate_access_token(&self, user: &User, sid: Uuid) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            role: user.role,
            sid,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.access_lifetime()).timestamp(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    /// Sign a refresh token for session `sid`, expiring at `expires_at`.
    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        sid: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            sid,
            jti: Uuid::new_v4().to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
            token_use: REFRESH_TOKEN_USE.to_string(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        self.decode_claims(token)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, JwtError> {
        let claims: RefreshTokenClaims = self.decode_claims(token)?;
        if claims.token_use != REFRESH_TOKEN_USE {
            return Err(JwtError::Invalid("not a refresh token".to_string()));
        }
        Ok(claims)
    }

    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T, JwtError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = decode::<T>(token, &self.decoding_key, &validation)?;
        Ok(token_data.claims)
    }
}
