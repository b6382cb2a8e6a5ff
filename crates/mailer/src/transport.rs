//! Outbound mail transports.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::RwLock;

use crate::templates::RenderedEmail;
use crate::{MailError, Result};

/// Delivers a rendered message to one recipient.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, recipient: &str, email: &RenderedEmail) -> Result<()>;
}

/// Connection settings for an SMTP relay.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender: String,
}

/// SMTP transport holding a single pooled connection.
///
/// With credentials configured the connection is upgraded with STARTTLS;
/// without them it talks plain SMTP, which is only suitable for a local relay.
#[derive(Clone)]
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailTransport {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let sender: Mailbox = settings
            .sender
            .parse()
            .map_err(|_| MailError::Address(settings.sender.clone()))?;

        let builder = match (&settings.username, &settings.password) {
            (Some(username), Some(password)) => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|e| MailError::Smtp(e.to_string()))?
                    .credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host),
        };

        let transport = builder
            .port(settings.port)
            .pool_config(PoolConfig::new().max_size(1))
            .build();
        Ok(Self { transport, sender })
    }

    fn build_message(&self, recipient: &str, email: &RenderedEmail) -> Result<Message> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| MailError::Address(recipient.to_string()))?;

        Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.plain_body.clone(),
                email.html_body.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, recipient: &str, email: &RenderedEmail) -> Result<()> {
        let message = self.build_message(recipient, email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        Ok(())
    }
}

/// A message accepted by [`InMemoryMailTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub recipient: String,
    pub email: RenderedEmail,
}

#[derive(Default)]
struct InMemoryState {
    sent: RwLock<Vec<SentEmail>>,
    failing: RwLock<HashSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts: AtomicUsize,
}

/// In-memory transport for testing.
///
/// Clones share state, so one instance can back every worker of a pool and
/// observe how many deliveries overlap.
#[derive(Clone, Default)]
pub struct InMemoryMailTransport {
    state: Arc<InMemoryState>,
    delay: Option<Duration>,
}

impl InMemoryMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds each delivery open for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes deliveries to `recipient` fail.
    pub async fn fail_for(&self, recipient: &str) {
        self.state
            .failing
            .write()
            .await
            .insert(recipient.to_string());
    }

    /// Returns every successfully delivered message in delivery order.
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.state.sent.read().await.clone()
    }

    /// Returns the number of delivery attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Returns the highest number of deliveries that were in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailTransport for InMemoryMailTransport {
    async fn send(&self, recipient: &str, email: &RenderedEmail) -> Result<()> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.state.failing.read().await.contains(recipient) {
            Err(MailError::Smtp(format!("550 mailbox unavailable: {recipient}")))
        } else {
            self.state.sent.write().await.push(SentEmail {
                recipient: recipient.to_string(),
                email: email.clone(),
            });
            Ok(())
        };

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(username: Option<&str>) -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port: 2525,
            username: username.map(str::to_string),
            password: username.map(|_| "secret".to_string()),
            sender: "Rates <rates@example.com>".to_string(),
        }
    }

    fn rendered() -> RenderedEmail {
        RenderedEmail {
            subject: "Rate 27.5".to_string(),
            plain_body: "27.5".to_string(),
            html_body: "<b>27.5</b>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_smtp_transport_builds_with_and_without_credentials() {
        assert!(SmtpMailTransport::new(&settings(None)).is_ok());
        assert!(SmtpMailTransport::new(&settings(Some("user"))).is_ok());
    }

    #[tokio::test]
    async fn test_smtp_transport_rejects_bad_sender() {
        let mut bad = settings(None);
        bad.sender = "not an address".to_string();
        assert!(matches!(
            SmtpMailTransport::new(&bad),
            Err(MailError::Address(_))
        ));
    }

    #[tokio::test]
    async fn test_message_has_both_bodies() {
        let transport = SmtpMailTransport::new(&settings(None)).unwrap();
        let message = transport.build_message("a@x.com", &rendered()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: a@x.com"));
        assert!(raw.contains("Subject: Rate 27.5"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[tokio::test]
    async fn test_message_rejects_bad_recipient() {
        let transport = SmtpMailTransport::new(&settings(None)).unwrap();
        assert!(matches!(
            transport.build_message("nope", &rendered()),
            Err(MailError::Address(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_transport_records_and_fails() {
        let transport = InMemoryMailTransport::new();
        transport.fail_for("bad@x.com").await;

        transport.send("a@x.com", &rendered()).await.unwrap();
        assert!(transport.send("bad@x.com", &rendered()).await.is_err());

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "a@x.com");
        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.max_in_flight(), 1);
    }
}
