use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub frontend_url: String,
    pub tokens: TokenConfig,
    pub accounts: AccountPolicyConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
    pub bootstrap_admin: Option<BootstrapAdminConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub email_verification_ttl_hours: i64,
    pub password_reset_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountPolicyConfig {
    /// Refuse login until the email address is verified.
    pub require_email_verification: bool,
    pub password_min_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Authenticated,
    Disabled,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimit {
    pub attempts: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login: RateLimit,
    pub register: RateLimit,
    pub password_reset: RateLimit,
    pub verification_resend: RateLimit,
    pub global_ip: RateLimit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdminConfig {
    pub email: String,
    pub password: String,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdminConfig { email, password }),
            _ => None,
        };

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost/identity"),
                    is_prod,
                )?,
                max_connections: get_parsed("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: get_parsed("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", Some("redis://127.0.0.1:6379"), is_prod)?,
            },
            jwt: JwtConfig {
                private_key_path: get_env("JWT_PRIVATE_KEY_PATH", None, is_prod)?,
                public_key_path: get_env("JWT_PUBLIC_KEY_PATH", None, is_prod)?,
                access_token_expiry_minutes: get_parsed(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: get_parsed(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    "1",
                    is_prod,
                )?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: get_parsed("SMTP_PORT", "587", is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("no-reply@localhost"), is_prod)?,
            },
            frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?
                .trim_end_matches('/')
                .to_string(),
            tokens: TokenConfig {
                email_verification_ttl_hours: get_parsed(
                    "EMAIL_VERIFICATION_TTL_HOURS",
                    "24",
                    is_prod,
                )?,
                password_reset_ttl_hours: get_parsed("PASSWORD_RESET_TTL_HOURS", "24", is_prod)?,
            },
            accounts: AccountPolicyConfig {
                require_email_verification: get_parsed(
                    "REQUIRE_EMAIL_VERIFICATION",
                    "true",
                    is_prod,
                )?,
                password_min_length: get_parsed("PASSWORD_MIN_LENGTH", "8", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                login: rate_limit("LOGIN", 5, 900, is_prod)?,
                register: rate_limit("REGISTER", 3, 3600, is_prod)?,
                password_reset: rate_limit("PASSWORD_RESET", 3, 3600, is_prod)?,
                verification_resend: rate_limit("VERIFICATION_RESEND", 3, 3600, is_prod)?,
                global_ip: rate_limit("GLOBAL_IP", 100, 60, is_prod)?,
            },
            bootstrap_admin,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.tokens.email_verification_ttl_hours <= 0 || self.tokens.password_reset_ttl_hours <= 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Token TTLs must be positive"
            )));
        }

        if self.accounts.password_min_length == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PASSWORD_MIN_LENGTH must be greater than 0"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.swagger.enabled == SwaggerMode::Public {
                tracing::error!("Swagger is publicly accessible in production - consider using 'authenticated' or 'disabled'");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_parsed<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

fn rate_limit(
    name: &str,
    attempts: u32,
    window_seconds: u64,
    is_prod: bool,
) -> Result<RateLimit, AppError> {
    Ok(RateLimit {
        attempts: get_parsed(
            &format!("RATE_LIMIT_{}_ATTEMPTS", name),
            &attempts.to_string(),
            is_prod,
        )?,
        window_seconds: get_parsed(
            &format!("RATE_LIMIT_{}_WINDOW_SECONDS", name),
            &window_seconds.to_string(),
            is_prod,
        )?,
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "authenticated" => Ok(SwaggerMode::Authenticated),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_and_swagger_parse() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
        assert_eq!(
            "Authenticated".parse::<SwaggerMode>(),
            Ok(SwaggerMode::Authenticated)
        );
    }

    #[test]
    fn test_get_parsed_uses_default_outside_prod() {
        let value: u32 = get_parsed("IDENTITY_TEST_UNSET_NUMBER", "42", false).unwrap();
        assert_eq!(value, 42);
        assert!(get_parsed::<u32>("IDENTITY_TEST_UNSET_NUMBER", "42", true).is_err());
    }

    #[test]
    fn test_email_verification_is_required_unless_opted_out() {
        env::set_var("JWT_PRIVATE_KEY_PATH", "keys/private.pem");
        env::set_var("JWT_PUBLIC_KEY_PATH", "keys/public.pem");
        env::remove_var("ENVIRONMENT");
        env::remove_var("REQUIRE_EMAIL_VERIFICATION");

        let config = IdentityConfig::from_env().unwrap();
        assert!(config.accounts.require_email_verification);

        env::set_var("REQUIRE_EMAIL_VERIFICATION", "false");
        let config = IdentityConfig::from_env().unwrap();
        env::remove_var("REQUIRE_EMAIL_VERIFICATION");
        assert!(!config.accounts.require_email_verification);
    }

    #[test]
    fn test_get_parsed_rejects_garbage() {
        assert!(get_parsed::<u32>("IDENTITY_TEST_UNSET_GARBAGE", "many", false).is_err());
    }
}
