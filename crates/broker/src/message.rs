//! The closed set of messages exchanged between the services.

use serde::{Deserialize, Serialize};

/// Asks the customers service to create a customer record for an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCustomerRequest {
    pub email: String,
}

/// Outcome of a customer creation attempt.
///
/// `reason` is present iff `success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCustomerResponse {
    pub email: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CreateCustomerResponse {
    /// Builds a successful response for `email`.
    pub fn succeeded(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            success: true,
            reason: None,
        }
    }

    /// Builds a failed response for `email` carrying the failure reason.
    pub fn failed(email: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            success: false,
            reason: Some(reason.into()),
        }
    }
}

/// Timer tick asking the web service to start a rate email cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartEmailSending {}

/// A batch of recipients that should receive the given rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateEmails {
    pub rate: f64,
    pub recipients: Vec<String>,
}

/// Field-less discriminant of [`Message`], used for handler lookup and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    CreateCustomerRequest,
    CreateCustomerResponse,
    StartEmailSending,
    RateEmails,
}

impl MessageKind {
    /// Every kind, in declaration order.
    pub const ALL: [MessageKind; 4] = [
        MessageKind::CreateCustomerRequest,
        MessageKind::CreateCustomerResponse,
        MessageKind::StartEmailSending,
        MessageKind::RateEmails,
    ];

    /// Returns the wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::CreateCustomerRequest => "create_customer_request",
            MessageKind::CreateCustomerResponse => "create_customer_response",
            MessageKind::StartEmailSending => "start_email_sending",
            MessageKind::RateEmails => "rate_emails",
        }
    }

    /// Parses a wire name, returning `None` for anything outside the closed set.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message body, one variant per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    CreateCustomerRequest(CreateCustomerRequest),
    CreateCustomerResponse(CreateCustomerResponse),
    StartEmailSending(StartEmailSending),
    RateEmails(RateEmails),
}

impl Message {
    /// Returns the kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::CreateCustomerRequest(_) => MessageKind::CreateCustomerRequest,
            Message::CreateCustomerResponse(_) => MessageKind::CreateCustomerResponse,
            Message::StartEmailSending(_) => MessageKind::StartEmailSending,
            Message::RateEmails(_) => MessageKind::RateEmails,
        }
    }
}

impl From<CreateCustomerRequest> for Message {
    fn from(payload: CreateCustomerRequest) -> Self {
        Message::CreateCustomerRequest(payload)
    }
}

impl From<CreateCustomerResponse> for Message {
    fn from(payload: CreateCustomerResponse) -> Self {
        Message::CreateCustomerResponse(payload)
    }
}

impl From<StartEmailSending> for Message {
    fn from(payload: StartEmailSending) -> Self {
        Message::StartEmailSending(payload)
    }
}

impl From<RateEmails> for Message {
    fn from(payload: RateEmails) -> Self {
        Message::RateEmails(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_parse_back() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_kind_name_is_rejected() {
        assert_eq!(MessageKind::parse("delete_everything"), None);
        assert_eq!(MessageKind::parse(""), None);
        assert_eq!(MessageKind::parse("RateEmails"), None);
    }

    #[test]
    fn message_reports_its_kind() {
        let msg: Message = CreateCustomerResponse::succeeded("a@x.com").into();
        assert_eq!(msg.kind(), MessageKind::CreateCustomerResponse);

        let msg: Message = StartEmailSending::default().into();
        assert_eq!(msg.kind(), MessageKind::StartEmailSending);
    }

    #[test]
    fn failed_response_carries_reason() {
        let response = CreateCustomerResponse::failed("c@x.com", "store unavailable");
        assert!(!response.success);
        assert_eq!(response.reason.as_deref(), Some("store unavailable"));

        let json = serde_json::to_value(CreateCustomerResponse::succeeded("a@x.com")).unwrap();
        assert!(json.get("reason").is_none());
    }
}
