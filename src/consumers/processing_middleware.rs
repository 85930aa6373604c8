//! Middleware types are heavily inspired by `tide`'s approach to middleware.
use crate::consumers::{Handler, HandlerError, Incoming};
use std::future::Future;
use std::sync::Arc;

/// Middlewares to execute logic before and after the message handler function.
///
/// # Usecase
///
/// The main purpose of processing middlewares is to extract and centralise common non-business
/// logic that might impact the outcome of the processing.
///
/// Before the handler is executed, processing middlewares can:
///
/// - Extract information from the incoming message and [record it in the invocation extensions];
/// - Skip the execution of the handler entirely (e.g. reject a message that fails validation);
///
/// After the handler has been executed, middlewares can:
///
/// - Perform actions based on the handler's outcome (e.g. log errors);
/// - Modify the handler's outcome (e.g. turn a transient error into a permanent one).
///
/// # What middleware should I use?
///
/// Does the processing outcome (success/failure) change based on the logic executed in the
/// middleware?
///
/// If yes, use a `ProcessingMiddleware`.
/// If no, use a [`TelemetryMiddleware`].
///
/// [record it in the invocation extensions]: crate::consumers::set_invocation_local_item
/// [`TelemetryMiddleware`]: crate::consumers::TelemetryMiddleware
#[async_trait::async_trait]
pub trait ProcessingMiddleware: 'static + Send + Sync {
    /// Asynchronously handle the message, and return the processing outcome.
    async fn handle<'a>(
        &'a self,
        incoming: Incoming<'a>,
        next: Next<'a>,
    ) -> Result<(), HandlerError>;
}

#[async_trait::async_trait]
impl<F, Fut> ProcessingMiddleware for F
where
    F: Send + Sync + 'static + for<'a> Fn(Incoming<'a>, Next<'a>) -> Fut,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle<'b>(
        &'b self,
        incoming: Incoming<'b>,
        next: Next<'b>,
    ) -> Result<(), HandlerError> {
        (self)(incoming, next).await
    }
}

/// The remainder of the processing middleware chain, including the final message handler.
#[allow(missing_debug_implementations)]
pub struct Next<'a> {
    pub(super) handler: &'a dyn Handler,
    /// The remainder of the processing middleware chain.
    pub(super) next_middleware: &'a [Arc<dyn ProcessingMiddleware>],
}

impl<'a> Next<'a> {
    /// Asynchronously execute the remaining processing middleware chain.
    pub async fn run(mut self, incoming: Incoming<'_>) -> Result<(), HandlerError> {
        if let Some((current, next)) = self.next_middleware.split_first() {
            self.next_middleware = next;
            current.handle(incoming, self).await
        } else {
            // A payload that is not valid text will never be processed successfully.
            let message = incoming.payload().map_err(HandlerError::permanent)?;
            self.handler.handle(message, incoming.context).await
        }
    }
}
