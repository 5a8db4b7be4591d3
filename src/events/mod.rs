//! Stock-reduction event pipeline: AMQP transport, the outbox dispatcher that
//! feeds it and the consumers that apply events to the local ledger.

pub mod amqp;
pub mod consumer;
pub mod outbox;

pub use amqp::AmqpBus;
pub use consumer::{Disposition, StockConsumer};
pub use outbox::OutboxDispatcher;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("subscribe error: {0}")]
    Subscribe(String),
}
