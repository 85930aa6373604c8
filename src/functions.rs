//! The queue-triggered function: every message received is written to the invocation's log
//! sink, verbatim.
use crate::configuration::{ConfigurationError, TriggerBinding};
use crate::consumers::{Handler, HandlerError, InvocationContext, MessageHandler};

/// The template of the record emitted for each processed message.
pub const PROCESSED_TEMPLATE: &str = "Queue trigger function processed: {item}";

/// The queue the function is bound to out of the box.
pub const DEFAULT_QUEUE_NAME: &str = "myqueue-items";

/// The setting holding the connection string of the queue backend.
pub const DEFAULT_CONNECTION_SETTING: &str = "QUEUE_CONNECTION";

/// Log the content of a queue message.
///
/// Exactly one record at information severity is emitted per call, with the message as the
/// `item` argument - `order-42` is rendered as `Queue trigger function processed: order-42`.
/// Empty messages are logged too.
///
/// It never fails: a sink that cannot write the record does not make the invocation fail.
pub async fn log_queue_item(item: &str, context: &InvocationContext) -> Result<(), HandlerError> {
    context.log_information(PROCESSED_TEMPLATE, &[("item", &item)]);
    Ok(())
}

/// [`log_queue_item`] as a [`Handler`], for registration through
/// [`MessageHandlerBuilder::raw_handler`](crate::consumers::MessageHandlerBuilder::raw_handler).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueTriggerFunction;

#[async_trait::async_trait]
impl Handler for QueueTriggerFunction {
    async fn handle(&self, message: &str, context: &InvocationContext) -> Result<(), HandlerError> {
        log_queue_item(message, context).await
    }
}

/// The binding the function ships with: `myqueue-items`, connection string in
/// `QUEUE_CONNECTION`.
pub fn default_binding() -> TriggerBinding {
    TriggerBinding::new(DEFAULT_QUEUE_NAME, DEFAULT_CONNECTION_SETTING)
}

/// Register the function against the queue of `binding`.
pub fn queue_trigger(binding: &TriggerBinding) -> Result<MessageHandler, ConfigurationError> {
    Ok(MessageHandler::from_binding(binding)?.raw_handler(QueueTriggerFunction))
}
