//! Email channel. An `SmtpClient` (lettre, STARTTLS relay, HTML/text
//! multipart) wrapped by the `NotificationChannel` trait, returning
//! `SendOutcome`/`BeaconError` instead of a bare transport result.

use async_trait::async_trait;
use beacon_utils::{BeaconError, BeaconResult};
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::{transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::channel::{NotificationChannel, SendOutcome, SendPayload};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.example.com".to_string()),
            port: std::env::var("SMTP_PORT").unwrap_or_else(|_| "587".to_string()).parse().unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: std::env::var("SMTP_FROM_EMAIL").unwrap_or_else(|_| "alerts@beacon.io".to_string()),
            from_name: std::env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Beacon On-Call".to_string()),
        }
    }
}

pub struct EmailChannel {
    config: SmtpConfig,
}

impl EmailChannel {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

impl Default for EmailChannel {
    fn default() -> Self {
        Self::new(SmtpConfig::default())
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, payload: &SendPayload) -> BeaconResult<SendOutcome> {
        let from_mailbox: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| BeaconError::validation("from_email", format!("{e}")))?;
        let to_mailbox: Mailbox = payload
            .recipient
            .parse()
            .map_err(|e| BeaconError::validation("recipient", format!("invalid email address: {e}")))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&payload.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(payload.body.clone()))
                    .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(payload.body.clone())),
            )
            .map_err(|e| BeaconError::internal(format!("failed to build email: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer: AsyncSmtpTransport<Tokio1Executor> = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| BeaconError::transient(format!("failed to create SMTP transport: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        match mailer.send(email).await {
            Ok(response) => Ok(SendOutcome::ok(response.message().collect::<Vec<_>>().join("\n"))),
            Err(e) => Err(BeaconError::transient(format!("SMTP send failed: {e}"))),
        }
    }
}
