use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use service_core::axum::async_trait;
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification_email(
        &self,
        to_email: &str,
        recipient_name: &str,
        verification_link: &str,
    ) -> Result<(), AppError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        recipient_name: &str,
        reset_link: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    /// STARTTLS with credentials when a user is configured, plain SMTP
    /// otherwise (local relays and mail catchers).
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mailer = if config.user.is_empty() {
            SmtpTransport::builder_dangerous(&config.host)
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)))
                .build()
        } else {
            let creds = Credentials::new(config.user.clone(), config.password.clone());
            SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| AppError::EmailError(e.to_string()))?
                .credentials(creds)
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)))
                .build()
        };

        tracing::info!(host = %config.host, port = config.port, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from_email.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, subject = %subject, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

fn verification_bodies(recipient_name: &str, link: &str) -> (String, String) {
    let html = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2>Hello {name},</h2>
    <p>Please confirm your email address to finish setting up your account.</p>
    <p><a href="{link}">Verify Email</a></p>
    <p style="color: #666; font-size: 12px;">If you did not create an account, you can ignore this email.</p>
  </body>
</html>"#,
        name = recipient_name,
        link = link
    );
    let plain = format!(
        "Hello {},\n\nPlease confirm your email address by visiting:\n\n{}\n\nIf you did not create an account, you can ignore this email.",
        recipient_name, link
    );
    (plain, html)
}

fn reset_bodies(recipient_name: &str, link: &str) -> (String, String) {
    let html = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2>Hello {name},</h2>
    <p>We received a request to reset your password.</p>
    <p><a href="{link}">Reset Password</a></p>
    <p style="color: #666; font-size: 12px;">If you did not request this, you can ignore this email. Your password will not change.</p>
  </body>
</html>"#,
        name = recipient_name,
        link = link
    );
    let plain = format!(
        "Hello {},\n\nWe received a request to reset your password. Set a new one here:\n\n{}\n\nIf you did not request this, you can ignore this email.",
        recipient_name, link
    );
    (plain, html)
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        recipient_name: &str,
        verification_link: &str,
    ) -> Result<(), AppError> {
        let (plain, html) = verification_bodies(recipient_name, verification_link);
        self.send_email(to_email, "Verify Your Email Address", plain, html)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        recipient_name: &str,
        reset_link: &str,
    ) -> Result<(), AppError> {
        let (plain, html) = reset_bodies(recipient_name, reset_link);
        self.send_email(to_email, "Reset Your Password", plain, html)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Verification,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub kind: EmailKind,
    pub link: String,
}

impl SentEmail {
    /// The token is the last path segment of the link.
    pub fn token(&self) -> &str {
        self.link.rsplit('/').next().unwrap_or_default()
    }
}

/// Records outbound mail instead of sending it. Can be switched to fail.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str, kind: EmailKind) -> Option<SentEmail> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to && m.kind == kind)
    }

    fn record(&self, to: &str, kind: EmailKind, link: &str) -> Result<(), AppError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::EmailError("mock transport failure".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Mock email mutex poisoned: {}", e)))?
            .push(SentEmail {
                to: to.to_string(),
                kind,
                link: link.to_string(),
            });
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        _recipient_name: &str,
        verification_link: &str,
    ) -> Result<(), AppError> {
        self.record(to_email, EmailKind::Verification, verification_link)
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        _recipient_name: &str,
        reset_link: &str,
    ) -> Result<(), AppError> {
        self.record(to_email, EmailKind::PasswordReset, reset_link)
    }
}
