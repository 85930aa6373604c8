//! `queue-trigger` runs message handlers that are triggered, one message at a time, by
//! entries arriving on named queues.
//!
//! The contract is small: a [`Handler`](crate::consumers::Handler) receives the decoded text of
//! exactly one queue message plus an [`InvocationContext`](crate::consumers::InvocationContext)
//! and returns `Ok(())` or a [`HandlerError`](crate::consumers::HandlerError).
//! Everything else - pulling messages, bounding concurrency, acknowledging, redelivering and
//! moving poison messages aside - is owned by the dispatch loop behind
//! [`ConsumerGroup`](crate::consumers::ConsumerGroup).
//!
//! Delivery is at-least-once: handlers must tolerate seeing the same content more than once.
//!
//! [`ConsumerGroup`](crate::consumers::ConsumerGroup) and
//! [`MessageHandler`](crate::consumers::MessageHandler) are the best starting points.
//! [`functions::log_queue_item`] is the canonical handler: it writes every message it
//! receives to the invocation's log sink.
//!
//! ## Examples
//!
//! Check the `demos` directory to see the library in action against the in-memory transport.

pub mod amqp;
pub mod configuration;
pub mod consumers;
pub mod functions;
pub mod logging;
pub mod pool;
pub mod transport;
