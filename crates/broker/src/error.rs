use thiserror::Error;

/// Errors raised while turning bytes back into a [`MessageEnvelope`](crate::MessageEnvelope).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not a JSON envelope at all.
    #[error("Malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The envelope names a kind outside the closed set.
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),

    /// The payload does not have the shape required by its kind.
    #[error("Invalid payload for {kind}: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur when talking to the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The AMQP client reported an error.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The broker refused a published message.
    #[error("Publish to {queue} was not confirmed by the broker")]
    PublishRejected { queue: String },

    /// A queue was used before being opened on this broker.
    #[error("Queue not open: {0}")]
    QueueNotOpen(String),

    /// The queue already has a subscriber on this broker.
    #[error("Queue {0} already has a subscriber")]
    AlreadySubscribed(String),

    /// The broker connection was closed.
    #[error("Broker connection is closed")]
    Closed,

    /// Acknowledging a delivery failed.
    #[error("Acknowledgement failed: {0}")]
    Acknowledgement(String),

    /// Encoding an envelope failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
