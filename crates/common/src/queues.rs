//! Names of the durable queues shared by the web, customers and mailer services.

/// Web → customers: a customer record should be created for an email.
pub const CREATE_CUSTOMER_REQUEST: &str = "create-customer-request";

/// Customers → web: outcome of a customer creation attempt.
pub const CREATE_CUSTOMER_RESPONSE: &str = "create-customer-response";

/// Mailer (scheduler) → web: start a rate email cycle.
pub const TRIGGER_EMAILS_SENDING: &str = "trigger-emails-sending";

/// Web → mailer: rate value plus the recipients to notify.
pub const RATE_EMAILS: &str = "rate-emails";
