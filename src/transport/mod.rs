//! The queue backends message handlers are triggered by.
//!
//! A [`QueueTransport`] knows how to declare queues, stream deliveries out of them and put new
//! messages in. It knows nothing about handlers: settling a delivery (ack, requeue,
//! dead-letter) is decided by the consumer according to the outcome of processing.
//!
//! Two transports are provided:
//!
//! - [`InMemoryTransport`], in-process queues, ideal for tests and local runs;
//! - [`AmqpTransport`], RabbitMq via `lapin`.
use futures_util::stream::BoxStream;
use std::fmt;

mod amqp;
mod in_memory;

pub use amqp::AmqpTransport;
pub use in_memory::InMemoryTransport;

/// A message dequeued from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Identifier assigned by the producer or by the transport.
    pub id: String,
    /// The raw payload.
    pub body: Vec<u8>,
    /// How many times this message has been delivered, this delivery included.
    ///
    /// It is maintained by the transport. `1` on first delivery.
    pub delivery_count: u32,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            delivery_count: 1,
        }
    }

    #[must_use]
    pub fn with_delivery_count(mut self, delivery_count: u32) -> Self {
        self.delivery_count = delivery_count;
        self
    }

    /// Decode the payload as UTF-8 text.
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }
}

/// The names of the queues involved in consuming from a single queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub queue_name: String,
    /// Where messages go when they are dead-lettered.
    pub poison_queue_name: String,
}

/// What to do with a delivery once processing is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The message was processed - remove it from the queue.
    Ack,
    /// Processing failed - make the message available again for another delivery attempt.
    Requeue,
    /// Processing failed for good - move the message to the poison queue.
    DeadLetter,
    /// Processing failed - drop the message without dead-lettering it.
    Discard,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ack => "ack",
            Self::Requeue => "requeue",
            Self::DeadLetter => "dead-letter",
            Self::Discard => "discard",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("RabbitMq communication error.")]
    Amqp(#[from] lapin::Error),
    #[error("Failed to get a connection from the pool.")]
    Pool(#[from] crate::pool::Error),
    #[error("The delivery has already been settled.")]
    AlreadySettled,
    #[error("The queue `{0}` is closed.")]
    QueueClosed(String),
}

/// Settles a single delivery with the backend it came from.
///
/// The framework calls `settle` exactly once per delivery.
#[async_trait::async_trait]
pub trait Acknowledger: Send + Sync + 'static {
    async fn settle(&self, settlement: Settlement) -> Result<(), TransportError>;
}

/// A message together with the means to settle it.
pub struct Delivery {
    pub message: QueueMessage,
    // Hidden from the public interface: handlers must never settle the message themselves.
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(message: QueueMessage, acker: impl Acknowledger) -> Self {
        Self {
            message,
            acker: Box::new(acker),
        }
    }

    pub(crate) async fn settle(&self, settlement: Settlement) -> Result<(), TransportError> {
        self.acker.settle(settlement).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// A never-ending stream of deliveries out of a queue.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, TransportError>>;

#[async_trait::async_trait]
pub trait QueueTransport: Send + Sync + 'static {
    /// Make sure the queue and its poison queue exist.
    async fn declare_queue(&self, topology: &QueueTopology) -> Result<(), TransportError>;

    /// Start receiving messages from `topology.queue_name`.
    ///
    /// `prefetch` is a hint on how many unsettled deliveries the backend should push ahead of
    /// processing.
    async fn subscribe(
        &self,
        topology: &QueueTopology,
        prefetch: u16,
    ) -> Result<DeliveryStream, TransportError>;

    /// Put a new message on a queue, returning its id.
    async fn enqueue(&self, queue_name: &str, body: Vec<u8>) -> Result<String, TransportError>;
}

#[async_trait::async_trait]
impl<T: QueueTransport + ?Sized> QueueTransport for std::sync::Arc<T> {
    async fn declare_queue(&self, topology: &QueueTopology) -> Result<(), TransportError> {
        T::declare_queue(self, topology).await
    }

    async fn subscribe(
        &self,
        topology: &QueueTopology,
        prefetch: u16,
    ) -> Result<DeliveryStream, TransportError> {
        T::subscribe(self, topology, prefetch).await
    }

    async fn enqueue(&self, queue_name: &str, body: Vec<u8>) -> Result<String, TransportError> {
        T::enqueue(self, queue_name, body).await
    }
}
