use crate::consumers::InvocationContext;
use crate::transport::QueueMessage;

/// A dequeued message together with the context of the invocation processing it.
///
/// `Incoming` is what [`ProcessingMiddleware`]s and [`TelemetryMiddleware`]s work with.
/// Handlers only ever see the decoded payload and the [`InvocationContext`].
///
/// [`ProcessingMiddleware`]: crate::consumers::ProcessingMiddleware
/// [`TelemetryMiddleware`]: crate::consumers::TelemetryMiddleware
#[derive(Debug, Clone, Copy)]
pub struct Incoming<'a> {
    /// The message as it came out of the queue: raw payload, id and delivery count.
    pub message: &'a QueueMessage,
    pub context: &'a InvocationContext,
}

impl<'a> Incoming<'a> {
    /// The payload decoded as UTF-8 text.
    pub fn payload(&self) -> Result<&'a str, std::str::Utf8Error> {
        self.message.text()
    }
}
