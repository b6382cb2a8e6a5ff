//! Messaging layer shared by the exchanger services.
//!
//! - [`MessageEnvelope`] and the closed [`Message`] set, with a JSON codec
//! - [`Broker`] binding with [`AmqpBroker`] (RabbitMQ) and [`InMemoryBroker`]
//! - [`Producer`] for publishing and [`Consumer`] for dispatching by kind

pub mod amqp;
pub mod broker;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod message;
pub mod producer;

pub use amqp::AmqpBroker;
pub use broker::{Acknowledger, Broker, Delivery, DeliveryStream, QueueHandle};
pub use consumer::{Consumer, ConsumerHandle, HandlerError, MessageHandler, Outcome};
pub use envelope::MessageEnvelope;
pub use error::{BrokerError, DecodeError, Result};
pub use memory::InMemoryBroker;
pub use message::{
    CreateCustomerRequest, CreateCustomerResponse, Message, MessageKind, RateEmails,
    StartEmailSending,
};
pub use producer::Producer;
