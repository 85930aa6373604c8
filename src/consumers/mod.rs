//! Facilities to consume messages from a queue. Check out [`ConsumerGroup`] as a
//! starting point.
pub use builders::{
    ConsumerGroup, ConsumerGroupBuilder, ConsumerGroupConfigurationBuilder, MessageHandler,
    MessageHandlerBuilder,
};
pub use context::InvocationContext;
pub use error::{ErrorType, HandlerError, HandlerPanicked, InvocationTimedOut};
pub use extensions::{get_invocation_local_item, set_invocation_local_item};
pub use handler::{AsyncClosure, ClosureHandler, Handler};
pub use incoming_message::Incoming;
pub use pre_start_hook::ConsumerPreStartHook;
pub use processing_middleware::{Next, ProcessingMiddleware};
pub use telemetry_middleware::{
    MessageProcessing, ProcessingError, ProcessingOutcome, TelemetryMiddleware,
};
pub use transient_error_hook::{ConsumerTransientErrorHook, ShouldRequeue};
// Re-export for convenience
pub use crate::transport::QueueMessage;

mod builders;
mod consumer;
mod context;
mod error;
mod extensions;
mod handler;
pub mod hooks;
mod incoming_message;
mod pre_start_hook;
mod processing_middleware;
mod telemetry_middleware;
mod transient_error_hook;
