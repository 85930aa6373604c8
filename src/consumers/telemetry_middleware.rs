//! Middleware types are heavily inspired by `tide`'s approach to middleware.
use crate::consumers::error::{HandlerPanicked, InvocationTimedOut};
use crate::consumers::processing_middleware::Next;
use crate::consumers::{ConsumerTransientErrorHook, ErrorType, HandlerError, Incoming};
use crate::transport::{Delivery, QueueMessage, Settlement, TransportError};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Middlewares to collect and emit telemetry data based on the outcome of message processing.
///
/// # Use case
///
/// `TelemetryMiddleware`s get **read-only** access to the input and outputs of message
/// processing.
///
/// `TelemetryMiddleware`s execute after **all** the message processing has taken place,
/// including settling the message with the queue. They are therefore the best place to emit
/// logs, collect metrics, etc.. - telemetry!
///
/// # What middleware should I use?
///
/// Does the processing outcome (success/failure) change based on the logic executed in the
/// middleware?
///
/// If yes, use a [`ProcessingMiddleware`].
/// If no, use a `TelemetryMiddleware`.
///
/// [`ProcessingMiddleware`]: crate::consumers::ProcessingMiddleware
#[async_trait::async_trait]
pub trait TelemetryMiddleware: 'static + Send + Sync {
    /// Asynchronously handle the message, and return the processing outcome.
    async fn handle<'a>(
        &'a self,
        incoming: Incoming<'a>,
        next: MessageProcessing<'a>,
    ) -> ProcessingOutcome;
}

/// The remainder of the middleware chain (telemetry + processing), including the final message
/// handler and the settlement of the message.
#[allow(missing_debug_implementations)]
pub struct MessageProcessing<'a> {
    pub(super) delivery: &'a Delivery,
    /// Logic to handle transient failures returned by the processing chain.
    pub(super) transient_error_hook: Arc<dyn ConsumerTransientErrorHook>,
    /// Deliveries past this count are never requeued.
    pub(super) max_delivery_count: u32,
    /// The chain of processing middlewares, including the final message handler.
    pub(super) processing_chain: Next<'a>,
    /// The remainder of the telemetry middleware chain.
    pub(super) next_telemetry_middleware: &'a [Arc<dyn TelemetryMiddleware>],
}

/// The outcome of message processing:
/// - processing middleware chain;
/// - message handler;
/// - settlement with the queue.
///
/// `ProcessingOutcome` does not expose any constructor: a [`TelemetryMiddleware`] has no way
/// to alter it, it can only propagate what [`MessageProcessing::run`] returned.
#[derive(Debug)]
pub struct ProcessingOutcome {
    outcome: Result<(), ProcessingError>,
    settlement: Settlement,
}

impl ProcessingOutcome {
    pub fn result(&self) -> &Result<(), ProcessingError> {
        &self.outcome
    }

    /// What we asked the queue to do with the message.
    ///
    /// It is reported even if the queue failed to carry it out - check [`Self::result`].
    pub fn settlement(&self) -> Settlement {
        self.settlement
    }

    /// Returns `true` if we asked the queue to make the message available for another
    /// delivery attempt.
    pub fn was_requeued(&self) -> bool {
        self.settlement == Settlement::Requeue
    }

    /// Returns `true` if we asked the queue to move the message to its poison queue.
    pub fn was_dead_lettered(&self) -> bool {
        self.settlement == Settlement::DeadLetter
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProcessingError {
    /// An error was encountered while processing the message.
    #[error("An error was encountered while processing the message.")]
    HandlerError(#[source] HandlerError),
    /// The queue could not settle the message.
    #[error("Failed to {settlement} the message.")]
    SettlementError {
        #[source]
        error: TransportError,
        settlement: Settlement,
        /// The processing error that led us to settle the message that way, if any.
        handler_error: Option<HandlerError>,
    },
}

impl<'a> MessageProcessing<'a> {
    /// Asynchronously execute the remaining middleware chain.
    pub async fn run(mut self, incoming: Incoming<'_>) -> ProcessingOutcome {
        if let Some((current, next)) = self.next_telemetry_middleware.split_first() {
            self.next_telemetry_middleware = next;
            current.handle(incoming, self).await
        } else {
            // All telemetry middlewares have run (or simply there were none).
            // Time to kick-off the processing chain: processing middlewares + handler.
            let Self {
                delivery,
                transient_error_hook,
                max_delivery_count,
                processing_chain,
                ..
            } = self;

            let outcome = guarded(processing_chain, incoming).await;
            let settlement = settlement_for(
                &outcome,
                &delivery.message,
                transient_error_hook.as_ref(),
                max_delivery_count,
            )
            .await;

            match delivery.settle(settlement).await {
                Ok(()) => ProcessingOutcome {
                    outcome: outcome.map_err(ProcessingError::HandlerError),
                    settlement,
                },
                Err(error) => ProcessingOutcome {
                    outcome: Err(ProcessingError::SettlementError {
                        error,
                        settlement,
                        handler_error: outcome.err(),
                    }),
                    settlement,
                },
            }
        }
    }
}

/// Run the processing chain, bounded by the invocation deadline.
///
/// Panics and timeouts are turned into transient errors: they are no reason to give up on the
/// message, and they must not take the consumer down.
async fn guarded(chain: Next<'_>, incoming: Incoming<'_>) -> Result<(), HandlerError> {
    let processing = AssertUnwindSafe(chain.run(incoming)).catch_unwind();
    let result = match incoming.context.deadline() {
        Some(deadline) => match tokio::time::timeout_at(deadline, processing).await {
            Ok(result) => result,
            Err(_) => return Err(HandlerError::transient(InvocationTimedOut)),
        },
        None => processing.await,
    };
    result.unwrap_or_else(|payload| Err(HandlerError::transient(panic_error(payload))))
}

fn panic_error(payload: Box<dyn Any + Send>) -> HandlerPanicked {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_owned());
    HandlerPanicked(message)
}

/// Decide how the message should be settled given the outcome of processing.
///
/// - success: ack;
/// - permanent failure: dead-letter;
/// - transient failure: ask the transient error hook, but never requeue a message that has
///   already been delivered `max_delivery_count` times.
async fn settlement_for(
    outcome: &Result<(), HandlerError>,
    message: &QueueMessage,
    transient_error_hook: &dyn ConsumerTransientErrorHook,
    max_delivery_count: u32,
) -> Settlement {
    let error = match outcome {
        Ok(()) => return Settlement::Ack,
        Err(e) => e,
    };
    match error.error_type {
        ErrorType::Permanent => Settlement::DeadLetter,
        ErrorType::Transient => {
            match Settlement::from(transient_error_hook.on_transient_error(message).await) {
                Settlement::Requeue if message.delivery_count >= max_delivery_count => {
                    tracing::warn!(
                        message_id = %message.id,
                        delivery_count = message.delivery_count,
                        "Message exceeded the maximum delivery count, dead-lettering it."
                    );
                    Settlement::DeadLetter
                }
                settlement => settlement,
            }
        }
    }
}
