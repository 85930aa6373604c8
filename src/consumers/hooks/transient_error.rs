//! A collection of transient error hooks.

use crate::consumers::{ConsumerTransientErrorHook, ShouldRequeue};
use crate::transport::QueueMessage;

/// Never requeue a message that failed with a transient error: dead-letter it instead.
pub struct NeverRequeue;

#[async_trait::async_trait]
impl ConsumerTransientErrorHook for NeverRequeue {
    async fn on_transient_error(&self, _message: &QueueMessage) -> ShouldRequeue {
        ShouldRequeue::DeadLetter
    }
}

/// Requeue a message that failed with a transient error, as long as it has delivery attempts
/// left.
pub struct AlwaysRequeue;

#[async_trait::async_trait]
impl ConsumerTransientErrorHook for AlwaysRequeue {
    async fn on_transient_error(&self, _message: &QueueMessage) -> ShouldRequeue {
        ShouldRequeue::Requeue
    }
}
