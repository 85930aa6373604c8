use crate::transport::{QueueMessage, Settlement};

#[async_trait::async_trait]
/// A hook to determine if a message that failed due to a transient error should be requeued.
///
/// # Use case
///
/// If the error encountered during processing is marked as [`ErrorType::Transient`]
/// you can inject your own logic to determine what happens to the failed message using a
/// transient error hook.
///
/// Whatever the hook returns, a message that has already been delivered as many times as
/// the queue's maximum delivery count is dead-lettered instead of being requeued.
///
/// # On permanent errors
///
/// A transient error hook, as the name implies, is only invoked on transient errors.
/// Errors marked as [`ErrorType::Permanent`] are dead-lettered and never requeued.
///
/// # Plug and play implementations
///
/// You can find two ready-to-go hooks in the [`hooks::transient_error`] module -
/// [`AlwaysRequeue`] (the default) and [`NeverRequeue`].
///
/// [`ErrorType::Transient`]: crate::consumers::ErrorType::Transient
/// [`ErrorType::Permanent`]: crate::consumers::ErrorType::Permanent
/// [`hooks::transient_error`]: crate::consumers::hooks::transient_error
/// [`AlwaysRequeue`]: crate::consumers::hooks::transient_error::AlwaysRequeue
/// [`NeverRequeue`]: crate::consumers::hooks::transient_error::NeverRequeue
pub trait ConsumerTransientErrorHook: Send + Sync + 'static {
    /// If [`ShouldRequeue::Requeue`] is returned, the message becomes _immediately_ available
    /// again for consumption.
    /// If [`ShouldRequeue::Discard`] is returned, the message is dropped: it does not end up in
    /// the poison queue.
    /// If [`ShouldRequeue::DeadLetter`] is returned, the message is moved to the poison queue.
    async fn on_transient_error(&self, message: &QueueMessage) -> ShouldRequeue;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Determines if a failed message should be re-queued.
///
/// Check out [`ConsumerTransientErrorHook`]'s documentation for more details.
pub enum ShouldRequeue {
    Requeue,
    Discard,
    DeadLetter,
}

impl From<ShouldRequeue> for Settlement {
    fn from(should_requeue: ShouldRequeue) -> Self {
        match should_requeue {
            ShouldRequeue::Requeue => Settlement::Requeue,
            ShouldRequeue::Discard => Settlement::Discard,
            ShouldRequeue::DeadLetter => Settlement::DeadLetter,
        }
    }
}
