//! Mailer service internals.
//!
//! - [`Scheduler`] publishes an e-mail trigger on every tick of a [`PeriodicTrigger`]
//! - [`RateEmailsHandler`] renders each rate batch and feeds the [`WorkerPool`]
//! - each worker owns one [`MailTransport`] connection

pub mod dispatch;
pub mod error;
pub mod job;
pub mod pool;
pub mod scheduler;
pub mod templates;
pub mod transport;

pub use dispatch::RateEmailsHandler;
pub use error::{MailError, Result};
pub use job::EmailSendJob;
pub use pool::{DeliveryError, ERROR_CHANNEL_CAPACITY, MAX_CONCURRENT_SMTP_CONNECTIONS, WorkerPool};
pub use scheduler::{
    CronTrigger, DEFAULT_SCHEDULER_CRON, ManualTrigger, PeriodicTrigger, Scheduler, TriggerHandle,
};
pub use templates::RenderedEmail;
pub use transport::{
    InMemoryMailTransport, MailTransport, SentEmail, SmtpMailTransport, SmtpSettings,
};
