//! Credential flows: registration, login, email verification, password
//! reset and change, account deletion, and the grant endpoints built on
//! [`SessionManager`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::policy::PasswordContext;
use super::sessions::ClientInfo;
use super::store::{IdentityStore, EMAIL_UNIQUE, LICENSE_UNIQUE};
use super::{AuditRecorder, PolicyService, ServiceError, SessionManager, TokenLifecycle};
use crate::dtos::{
    ChangePasswordRequest, DeleteAccountRequest, EmailRequest, LoginRequest, LoginResponse,
    MessageResponse, PasswordResetConfirmRequest, RefreshRequest, RegisterRequest,
    RegisterResponse, TokenResponse,
};
use crate::models::{
    normalize_email, AuditAction, DoctorProfile, PatientProfile, Role, RoleProfile, TokenEffect,
    TokenKind, User,
};
use crate::utils::password::{
    hash_password_blocking, verify_against_dummy_blocking, verify_password_blocking,
};
use crate::utils::{FieldErrors, Password, PasswordHashString, ValidationPipeline};

pub const EMAIL_TAKEN: &str = "User with this email already exists.";
pub const LICENSE_TAKEN: &str = "A doctor with this license number already exists.";
pub const PASSWORD_MISMATCH: &str = "Password fields didn't match.";
pub const RESET_SENT: &str = "If an account exists for this email, a reset link has been sent.";
pub const VERIFICATION_SENT: &str =
    "If an unverified account exists for this email, a verification link has been sent.";

/// Why a login was refused. Written to the `login_failed` audit detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginFailure {
    InvalidCredentials,
    AccountDisabled,
    UnverifiedEmail,
}

impl LoginFailure {
    fn reason(&self) -> &'static str {
        match self {
            LoginFailure::InvalidCredentials => "invalid_credentials",
            LoginFailure::AccountDisabled => "account_disabled",
            LoginFailure::UnverifiedEmail => "unverified_email",
        }
    }

    fn into_error(self) -> ServiceError {
        match self {
            LoginFailure::InvalidCredentials => ServiceError::InvalidCredentials,
            LoginFailure::AccountDisabled => ServiceError::AccountDisabled,
            LoginFailure::UnverifiedEmail => ServiceError::EmailUnverified,
        }
    }
}

/// Map storage uniqueness failures on account creation to field errors.
pub(crate) fn account_conflict(e: super::StoreError) -> ServiceError {
    if e.is_unique_violation_of(EMAIL_UNIQUE) {
        ServiceError::field("email", EMAIL_TAKEN)
    } else if e.is_unique_violation_of(LICENSE_UNIQUE) {
        ServiceError::field("license_number", LICENSE_TAKEN)
    } else {
        e.into()
    }
}

pub(crate) fn password_context(user: &User) -> PasswordContext<'_> {
    PasswordContext {
        email: &user.email,
        first_name: &user.first_name,
        last_name: &user.last_name,
    }
}

pub(crate) async fn check_password(user: &User, password: &str) -> Result<bool, ServiceError> {
    Ok(verify_password_blocking(
        Password::new(password),
        PasswordHashString::new(user.password_hash.clone()),
    )
    .await?)
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    sessions: SessionManager,
    tokens: TokenLifecycle,
    policy: PolicyService,
    audit: AuditRecorder,
    require_email_verification: bool,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        sessions: SessionManager,
        tokens: TokenLifecycle,
        policy: PolicyService,
        audit: AuditRecorder,
        require_email_verification: bool,
    ) -> Self {
        Self {
            store,
            sessions,
            tokens,
            policy,
            audit,
            require_email_verification,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    // ==================== Registration ====================

    /// Self-registration as a patient or doctor. The user and its role
    /// profile are created together; a verification email follows.
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, ServiceError> {
        let email = normalize_email(&req.email);

        ValidationPipeline::of(&req)
            .check(|r, errs| {
                if r.password != r.password_confirm {
                    errs.add("password_confirm", PASSWORD_MISMATCH);
                }
            })
            .check(|r, errs| match r.role.parse::<Role>() {
                Ok(role) if role.is_self_assignable() => {}
                _ => errs.add(
                    "role",
                    format!("\"{}\" is not a valid choice. Choose patient or doctor.", r.role),
                ),
            })
            .check(|r, errs| {
                let ctx = PasswordContext {
                    email: &email,
                    first_name: r.first_name.trim(),
                    last_name: r.last_name.trim(),
                };
                self.policy.validate_into("password", &r.password, &ctx, errs);
            })
            .finish()?;

        let role: Role = req
            .role
            .parse()
            .map_err(|e: String| ServiceError::field("role", e))?;

        let password_hash = hash_password_blocking(Password::new(req.password)).await?;
        let user = User::new(
            &email,
            password_hash.into_string(),
            req.first_name.trim().to_string(),
            req.last_name.trim().to_string(),
            role,
        );

        let profile = match role {
            Role::Doctor => RoleProfile::Doctor(DoctorProfile::new(
                user.user_id,
                req.license_number
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty()),
                req.specialty
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            )),
            _ => RoleProfile::Patient(PatientProfile::new(user.user_id)),
        };

        self.store
            .create_account(&user, Some(&profile))
            .await
            .map_err(account_conflict)?;

        tracing::info!(user_id = %user.user_id, role = %role, "User registered");
        self.audit.record(
            Some(user.user_id),
            AuditAction::UserRegistered,
            json!({ "email": user.email, "role": role.as_str() }),
        );

        if let Err(e) = self.tokens.send_verification(&user).await {
            tracing::error!(
                error = %e,
                user_id = %user.user_id,
                "Failed to issue verification token"
            );
        }

        Ok(RegisterResponse {
            user: user.sanitized(),
            message: "Registration successful. Please check your email to verify your account."
                .to_string(),
        })
    }

    // ==================== Login ====================

    fn login_failed(&self, actor: Option<Uuid>, email: &str, failure: LoginFailure) -> ServiceError {
        tracing::warn!(email = %email, reason = failure.reason(), "Login failed");
        metrics::counter!("identity_logins_total", "outcome" => failure.reason()).increment(1);
        self.audit.record(
            actor,
            AuditAction::LoginFailed,
            json!({ "email": email, "reason": failure.reason() }),
        );
        failure.into_error()
    }

    /// Check credentials and account state. Unknown emails cost one full
    /// hash verification, the same as a wrong password.
    pub async fn authenticate(&self, req: &LoginRequest) -> Result<User, ServiceError> {
        ValidationPipeline::of(req).finish()?;
        let email = normalize_email(&req.email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            verify_against_dummy_blocking(Password::new(req.password.as_str())).await;
            return Err(self.login_failed(None, &email, LoginFailure::InvalidCredentials));
        };

        if !check_password(&user, &req.password).await? {
            return Err(self.login_failed(
                Some(user.user_id),
                &email,
                LoginFailure::InvalidCredentials,
            ));
        }
        if !user.can_authenticate() {
            return Err(self.login_failed(Some(user.user_id), &email, LoginFailure::AccountDisabled));
        }
        if self.require_email_verification && !user.email_verified {
            return Err(self.login_failed(Some(user.user_id), &email, LoginFailure::UnverifiedEmail));
        }

        Ok(user)
    }

    pub async fn login(
        &self,
        req: LoginRequest,
        client: ClientInfo,
    ) -> Result<LoginResponse, ServiceError> {
        let user = self.authenticate(&req).await?;
        let tokens = self.sessions.issue_grant(&user, client).await?;

        metrics::counter!("identity_logins_total", "outcome" => "success").increment(1);
        tracing::info!(user_id = %user.user_id, session_id = %tokens.session_id, "User logged in");
        self.audit.record(
            Some(user.user_id),
            AuditAction::Login,
            json!({ "session_id": tokens.session_id }),
        );

        Ok(LoginResponse {
            user: user.sanitized(),
            tokens,
        })
    }

    /// End the caller's current session only.
    pub async fn logout(&self, user: &User, session_id: Uuid) -> Result<MessageResponse, ServiceError> {
        self.sessions.end(session_id).await?;
        self.audit.record(
            Some(user.user_id),
            AuditAction::Logout,
            json!({ "session_id": session_id }),
        );
        Ok(MessageResponse::new("Logged out successfully"))
    }

    // ==================== Grants ====================

    pub async fn refresh(&self, req: RefreshRequest) -> Result<TokenResponse, ServiceError> {
        ValidationPipeline::of(&req).finish()?;
        let (user, tokens) = self.sessions.refresh(&req.refresh_token).await?;
        self.audit.record(
            Some(user.user_id),
            AuditAction::TokenRefreshed,
            json!({ "session_id": tokens.session_id }),
        );
        Ok(tokens)
    }

    pub async fn revoke(&self, req: RefreshRequest) -> Result<MessageResponse, ServiceError> {
        ValidationPipeline::of(&req)
            .finish()
            .map_err(|_| ServiceError::TokenInvalid)?;
        let session = self.sessions.revoke(&req.refresh_token).await?;
        self.audit.record(
            Some(session.user_id),
            AuditAction::TokenRevoked,
            json!({ "session_id": session.session_id }),
        );
        Ok(MessageResponse::new("Token revoked"))
    }

    pub async fn terminate_session(
        &self,
        user: &User,
        session_id: Uuid,
    ) -> Result<MessageResponse, ServiceError> {
        self.sessions.terminate(user.user_id, session_id).await?;
        self.audit.record(
            Some(user.user_id),
            AuditAction::SessionTerminated,
            json!({ "session_id": session_id }),
        );
        Ok(MessageResponse::new("Session terminated"))
    }

    // ==================== Email verification ====================

    pub async fn verify_email(&self, token: &str) -> Result<MessageResponse, ServiceError> {
        let consumed = self
            .tokens
            .consume(token, TokenEffect::MarkEmailVerified)
            .await?;

        tracing::info!(user_id = %consumed.user_id, "Email verified");
        self.audit.record(
            Some(consumed.user_id),
            AuditAction::EmailVerified,
            json!({ "user_id": consumed.user_id }),
        );
        Ok(MessageResponse::new("Email verified successfully"))
    }

    /// Uniform answer whether or not the account exists.
    pub async fn resend_verification(
        &self,
        req: EmailRequest,
    ) -> Result<MessageResponse, ServiceError> {
        ValidationPipeline::of(&req).finish()?;
        let email = normalize_email(&req.email);

        match self.store.find_user_by_email(&email).await? {
            Some(user) if user.can_authenticate() && !user.email_verified => {
                self.tokens.send_verification(&user).await?;
                self.audit.record(
                    Some(user.user_id),
                    AuditAction::VerificationResent,
                    json!({ "email": email }),
                );
            }
            _ => tracing::debug!("Verification resend for ineligible or unknown account"),
        }

        Ok(MessageResponse::new(VERIFICATION_SENT))
    }

    // ==================== Password reset ====================

    /// Uniform answer whether or not the account exists.
    pub async fn request_password_reset(
        &self,
        req: EmailRequest,
    ) -> Result<MessageResponse, ServiceError> {
        ValidationPipeline::of(&req).finish()?;
        let email = normalize_email(&req.email);

        match self.store.find_user_by_email(&email).await? {
            Some(user) if user.can_authenticate() => {
                self.tokens.send_password_reset(&user).await?;
                self.audit.record(
                    Some(user.user_id),
                    AuditAction::PasswordResetRequested,
                    json!({ "email": email }),
                );
            }
            _ => tracing::debug!("Password reset requested for unknown or inactive account"),
        }

        Ok(MessageResponse::new(RESET_SENT))
    }

    /// Set a new password with a reset token. Every session of the user is
    /// revoked as part of the same step.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        req: PasswordResetConfirmRequest,
    ) -> Result<MessageResponse, ServiceError> {
        ValidationPipeline::of(&req)
            .check(|r, errs| {
                if r.new_password != r.new_password_confirm {
                    errs.add("new_password_confirm", PASSWORD_MISMATCH);
                }
            })
            .finish()?;

        let pending = self.tokens.find_valid(token, TokenKind::PasswordReset).await?;
        let user = self
            .store
            .find_user_by_id(pending.user_id)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;

        let mut errors = FieldErrors::new();
        self.policy
            .validate_into("new_password", &req.new_password, &password_context(&user), &mut errors);
        errors.into_result()?;

        let password_hash = hash_password_blocking(Password::new(req.new_password)).await?;
        let consumed = self
            .tokens
            .consume(token, TokenEffect::SetPasswordHash(password_hash.into_string()))
            .await?;
        self.sessions.blacklist_sessions(&consumed.revoked_sessions).await;

        tracing::info!(
            user_id = %consumed.user_id,
            revoked_sessions = consumed.revoked_sessions.len(),
            "Password reset completed"
        );
        self.audit.record(
            Some(consumed.user_id),
            AuditAction::PasswordResetCompleted,
            json!({ "revoked_sessions": consumed.revoked_sessions.len() }),
        );
        Ok(MessageResponse::new("Password reset successfully"))
    }

    // ==================== Authenticated account changes ====================

    /// Replace the password. Other sessions stay valid.
    pub async fn change_password(
        &self,
        user: &User,
        req: ChangePasswordRequest,
    ) -> Result<MessageResponse, ServiceError> {
        ValidationPipeline::of(&req)
            .check(|r, errs| {
                if r.new_password != r.new_password_confirm {
                    errs.add("new_password_confirm", PASSWORD_MISMATCH);
                }
                self.policy
                    .validate_into("new_password", &r.new_password, &password_context(user), errs);
            })
            .finish()?;

        if !check_password(user, &req.old_password).await? {
            tracing::warn!(user_id = %user.user_id, "Password change with wrong current password");
            return Err(ServiceError::InvalidCredentials);
        }

        let password_hash = hash_password_blocking(Password::new(req.new_password)).await?;
        self.store
            .update_password_hash(user.user_id, password_hash.as_str())
            .await?;

        tracing::info!(user_id = %user.user_id, "Password changed");
        self.audit.record(
            Some(user.user_id),
            AuditAction::PasswordChanged,
            json!({ "user_id": user.user_id }),
        );
        Ok(MessageResponse::new("Password changed successfully"))
    }

    /// Soft delete after re-checking the password. Ends every session,
    /// including the current one.
    pub async fn delete_account(
        &self,
        user: &User,
        req: DeleteAccountRequest,
    ) -> Result<MessageResponse, ServiceError> {
        ValidationPipeline::of(&req).finish()?;

        if !check_password(user, &req.password).await? {
            tracing::warn!(user_id = %user.user_id, "Account deletion with wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        let revoked = self.store.soft_delete_user(user.user_id, Utc::now()).await?;
        self.sessions.blacklist_sessions(&revoked).await;

        tracing::info!(user_id = %user.user_id, revoked_sessions = revoked.len(), "Account deleted");
        self.audit.record(
            Some(user.user_id),
            AuditAction::AccountDeleted,
            json!({ "email": user.email, "revoked_sessions": revoked.len() }),
        );
        Ok(MessageResponse::new("Account deleted successfully"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::services::email::EmailKind;
    use crate::services::{InMemoryStore, JwtService, MockBlacklist, MockEmailService};

    const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/jwt_private.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/jwt_public.pem");

    struct Harness {
        auth: AuthService,
        store: Arc<InMemoryStore>,
        email: Arc<MockEmailService>,
    }

    fn harness(require_email_verification: bool) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let email = Arc::new(MockEmailService::new());
        let jwt = JwtService::from_pem(PRIVATE_KEY, PUBLIC_KEY, 15, 1).unwrap();
        let sessions = SessionManager::new(store.clone(), jwt, Arc::new(MockBlacklist::new()));
        let tokens = TokenLifecycle::new(
            store.clone(),
            email.clone(),
            "http://localhost:3000",
            &TokenConfig {
                email_verification_ttl_hours: 24,
                password_reset_ttl_hours: 24,
            },
        );
        let auth = AuthService::new(
            store.clone(),
            sessions,
            tokens,
            PolicyService::default(),
            AuditRecorder::new(store.clone()),
            require_email_verification,
        );
        Harness { auth, store, email }
    }

    fn register_request(email: &str, role: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "Tr1cky-Lantern".to_string(),
            password_confirm: "Tr1cky-Lantern".to_string(),
            first_name: "Maya".to_string(),
            last_name: "Okafor".to_string(),
            role: role.to_string(),
            license_number: None,
            specialty: None,
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn field_errors(err: ServiceError) -> FieldErrors {
        match err {
            ServiceError::Validation(fields) => fields,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_creates_user_profile_and_token() {
        let h = harness(true);
        let resp = h
            .auth
            .register(register_request("Maya@Example.com", "patient"))
            .await
            .unwrap();

        assert_eq!(resp.user.email, "maya@example.com");
        assert!(!resp.user.email_verified);
        assert!(h
            .store
            .find_patient_profile(resp.user.user_id)
            .await
            .unwrap()
            .is_some());
        assert!(h
            .email
            .last_to("maya@example.com", EmailKind::Verification)
            .is_some());
    }

    #[tokio::test]
    async fn test_register_rejects_privileged_roles() {
        let h = harness(true);
        for role in ["admin", "staff", "superuser"] {
            let err = h
                .auth
                .register(register_request("x@example.com", role))
                .await
                .unwrap_err();
            assert!(field_errors(err).contains("role"));
        }
        assert!(h.store.find_user_by_email("x@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_collects_all_field_errors() {
        let h = harness(true);
        let mut req = register_request("not-an-email", "patient");
        req.password = "12345678".to_string();
        req.password_confirm = "different".to_string();

        let fields = field_errors(h.auth.register(req).await.unwrap_err());
        assert!(fields.contains("email"));
        assert!(fields.contains("password"));
        assert!(fields.contains("password_confirm"));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_field_error() {
        let h = harness(true);
        h.auth
            .register(register_request("dup@example.com", "patient"))
            .await
            .unwrap();

        let err = h
            .auth
            .register(register_request("DUP@example.com", "doctor"))
            .await
            .unwrap_err();
        let fields = field_errors(err);
        assert_eq!(fields.get("email").unwrap(), &vec![EMAIL_TAKEN.to_string()]);
    }

    #[tokio::test]
    async fn test_login_requires_verification_when_configured() {
        let h = harness(true);
        h.auth
            .register(register_request("v@example.com", "patient"))
            .await
            .unwrap();

        let err = h
            .auth
            .login(login_request("v@example.com", "Tr1cky-Lantern"), ClientInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmailUnverified));

        let mail = h.email.last_to("v@example.com", EmailKind::Verification).unwrap();
        h.auth.verify_email(mail.token()).await.unwrap();

        let resp = h
            .auth
            .login(login_request("v@example.com", "Tr1cky-Lantern"), ClientInfo::default())
            .await
            .unwrap();
        assert!(resp.user.email_verified);
        assert_eq!(resp.tokens.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_look_the_same() {
        let h = harness(false);
        h.auth
            .register(register_request("known@example.com", "patient"))
            .await
            .unwrap();

        let unknown = h
            .auth
            .login(login_request("ghost@example.com", "Tr1cky-Lantern"), ClientInfo::default())
            .await
            .unwrap_err();
        let wrong = h
            .auth
            .login(login_request("known@example.com", "wrong-password"), ClientInfo::default())
            .await
            .unwrap_err();

        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(unknown, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_password_reset_swaps_password_and_revokes_sessions() {
        let h = harness(false);
        let registered = h
            .auth
            .register(register_request("r@example.com", "patient"))
            .await
            .unwrap();
        let grant = h
            .auth
            .login(login_request("r@example.com", "Tr1cky-Lantern"), ClientInfo::default())
            .await
            .unwrap();

        let msg = h
            .auth
            .request_password_reset(EmailRequest {
                email: "r@example.com".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(msg.message, RESET_SENT);
        let mail = h.email.last_to("r@example.com", EmailKind::PasswordReset).unwrap();

        h.auth
            .confirm_password_reset(
                mail.token(),
                PasswordResetConfirmRequest {
                    new_password: "Brand-New-Kettle9".to_string(),
                    new_password_confirm: "Brand-New-Kettle9".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(h
            .store
            .list_live_sessions(registered.user.user_id, Utc::now())
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            h.auth.refresh(RefreshRequest {
                refresh_token: grant.tokens.refresh_token
            })
            .await,
            Err(ServiceError::TokenInvalid)
        ));
        assert!(h
            .auth
            .login(login_request("r@example.com", "Brand-New-Kettle9"), ClientInfo::default())
            .await
            .is_ok());
        assert!(matches!(
            h.auth
                .login(login_request("r@example.com", "Tr1cky-Lantern"), ClientInfo::default())
                .await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_reset_for_unknown_email_is_uniform() {
        let h = harness(false);
        let msg = h
            .auth
            .request_password_reset(EmailRequest {
                email: "nobody@example.com".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(msg.message, RESET_SENT);
        assert!(h.email.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reset_confirm_checks_policy_against_user() {
        let h = harness(false);
        h.auth
            .register(register_request("policy@example.com", "patient"))
            .await
            .unwrap();
        h.auth
            .request_password_reset(EmailRequest {
                email: "policy@example.com".to_string(),
            })
            .await
            .unwrap();
        let mail = h
            .email
            .last_to("policy@example.com", EmailKind::PasswordReset)
            .unwrap();

        let err = h
            .auth
            .confirm_password_reset(
                mail.token(),
                PasswordResetConfirmRequest {
                    new_password: "okafor-family".to_string(),
                    new_password_confirm: "okafor-family".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(field_errors(err).contains("new_password"));

        // The token was not consumed by the rejected attempt.
        assert!(h
            .auth
            .confirm_password_reset(
                mail.token(),
                PasswordResetConfirmRequest {
                    new_password: "Brand-New-Kettle9".to_string(),
                    new_password_confirm: "Brand-New-Kettle9".to_string(),
                },
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_change_password_keeps_sessions() {
        let h = harness(false);
        let registered = h
            .auth
            .register(register_request("c@example.com", "doctor"))
            .await
            .unwrap();
        let grant = h
            .auth
            .login(login_request("c@example.com", "Tr1cky-Lantern"), ClientInfo::default())
            .await
            .unwrap();
        let user = h
            .store
            .find_user_by_id(registered.user.user_id)
            .await
            .unwrap()
            .unwrap();

        let wrong = h
            .auth
            .change_password(
                &user,
                ChangePasswordRequest {
                    old_password: "nope".to_string(),
                    new_password: "Brand-New-Kettle9".to_string(),
                    new_password_confirm: "Brand-New-Kettle9".to_string(),
                },
            )
            .await;
        assert!(matches!(wrong, Err(ServiceError::InvalidCredentials)));

        h.auth
            .change_password(
                &user,
                ChangePasswordRequest {
                    old_password: "Tr1cky-Lantern".to_string(),
                    new_password: "Brand-New-Kettle9".to_string(),
                    new_password_confirm: "Brand-New-Kettle9".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(h
            .auth
            .refresh(RefreshRequest {
                refresh_token: grant.tokens.refresh_token
            })
            .await
            .is_ok());
        assert!(matches!(
            h.auth
                .login(login_request("c@example.com", "Tr1cky-Lantern"), ClientInfo::default())
                .await,
            Err(ServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_delete_account_disables_login() {
        let h = harness(false);
        let registered = h
            .auth
            .register(register_request("d@example.com", "patient"))
            .await
            .unwrap();
        h.auth
            .login(login_request("d@example.com", "Tr1cky-Lantern"), ClientInfo::default())
            .await
            .unwrap();
        let user = h
            .store
            .find_user_by_id(registered.user.user_id)
            .await
            .unwrap()
            .unwrap();

        h.auth
            .delete_account(
                &user,
                DeleteAccountRequest {
                    password: "Tr1cky-Lantern".to_string(),
                },
            )
            .await
            .unwrap();

        let deleted = h.store.find_user_by_id(user.user_id).await.unwrap().unwrap();
        assert!(deleted.is_deleted());
        assert!(!deleted.is_active);
        assert!(matches!(
            h.auth
                .login(login_request("d@example.com", "Tr1cky-Lantern"), ClientInfo::default())
                .await,
            Err(ServiceError::AccountDisabled)
        ));
    }
}
