//! Message envelope and its JSON wire codec.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::message::{Message, MessageKind, StartEmailSending};

/// A message together with the time it was produced.
///
/// Every message on every queue travels inside an envelope. On the wire it
/// is a JSON object `{ "type", "timestamp", "payload" }` where `type` is the
/// kind name and `timestamp` is RFC 3339.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    timestamp: DateTime<Utc>,
    message: Message,
}

#[derive(Serialize)]
struct WireEnvelope<'a, P: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: &'a DateTime<Utc>,
    payload: &'a P,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: serde_json::Value,
}

impl MessageEnvelope {
    /// Wraps a message, stamping it with the current time.
    pub fn new(message: impl Into<Message>) -> Self {
        Self::with_timestamp(message, Utc::now())
    }

    /// Wraps a message with an explicit timestamp.
    pub fn with_timestamp(message: impl Into<Message>, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    /// Returns the kind of the wrapped message.
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    /// Returns when the message was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the wrapped message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Consumes the envelope, returning the wrapped message.
    pub fn into_message(self) -> Message {
        self.message
    }

    /// Encodes the envelope as JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let kind = self.kind().as_str();
        match &self.message {
            Message::CreateCustomerRequest(p) => self.encode_payload(kind, p),
            Message::CreateCustomerResponse(p) => self.encode_payload(kind, p),
            Message::StartEmailSending(p) => self.encode_payload(kind, p),
            Message::RateEmails(p) => self.encode_payload(kind, p),
        }
    }

    fn encode_payload<P: Serialize>(
        &self,
        kind: &'static str,
        payload: &P,
    ) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WireEnvelope {
            kind,
            timestamp: &self.timestamp,
            payload,
        })
    }

    /// Decodes an envelope from JSON bytes.
    ///
    /// Kinds outside the closed set are rejected, as are payloads that do
    /// not match the shape of their kind. Never panics.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes).map_err(DecodeError::Malformed)?;
        let kind = MessageKind::parse(&raw.kind).ok_or(DecodeError::UnknownKind(raw.kind))?;

        let message = match kind {
            MessageKind::CreateCustomerRequest => {
                Message::CreateCustomerRequest(decode_payload(kind, raw.payload)?)
            }
            MessageKind::CreateCustomerResponse => {
                Message::CreateCustomerResponse(decode_payload(kind, raw.payload)?)
            }
            MessageKind::StartEmailSending => {
                // The trigger carries nothing, so an absent payload is fine.
                if raw.payload.is_null() {
                    Message::StartEmailSending(StartEmailSending::default())
                } else {
                    Message::StartEmailSending(decode_payload(kind, raw.payload)?)
                }
            }
            MessageKind::RateEmails => Message::RateEmails(decode_payload(kind, raw.payload)?),
        };

        Ok(Self {
            timestamp: raw.timestamp,
            message,
        })
    }
}

fn decode_payload<P: DeserializeOwned>(
    kind: MessageKind,
    payload: serde_json::Value,
) -> Result<P, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload {
        kind: kind.as_str(),
        source,
    })
}
