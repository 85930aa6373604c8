//! A collection of pre-start hooks.
//!
//! ```
//! use queue_trigger::consumers::{hooks::pre_start::DeclareQueue, MessageHandler};
//! # use queue_trigger::consumers::{HandlerError, InvocationContext};
//! # async fn handler(_message: &str, _context: &InvocationContext) -> Result<(), HandlerError> {
//! #     Ok(())
//! # }
//!
//! // make sure `myqueue-items` and `myqueue-items-poison` exist before consuming
//! let handler = MessageHandler::builder("myqueue-items")
//!     .with_pre_start_hook(DeclareQueue)
//!     .handler(handler);
//! # drop(handler);
//! ```
use crate::consumers::ConsumerPreStartHook;
use crate::transport::{QueueTopology, QueueTransport};

/// Declare the queue and its poison queue.
///
/// Declaring a queue that already exists with the same settings is a no-op.
#[derive(Clone, Copy, Debug)]
pub struct DeclareQueue;

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeclareQueue {
    async fn run(
        &self,
        transport: &dyn QueueTransport,
        topology: &QueueTopology,
    ) -> Result<(), anyhow::Error> {
        transport.declare_queue(topology).await?;
        tracing::debug!(
            queue_name = %topology.queue_name,
            poison_queue_name = %topology.poison_queue_name,
            "Declared queue."
        );
        Ok(())
    }
}
