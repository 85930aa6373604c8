use crate::logging::{render_template, LogRecord, LogSink, Severity};
use crate::transport::QueueMessage;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Everything a handler knows about the invocation it is running in.
///
/// # Ownership
///
/// An `InvocationContext` is created by the consumer for a single delivery attempt and
/// dropped as soon as that attempt is over. It is neither `Clone` nor shared across
/// invocations: two deliveries of the same message get two distinct contexts, with distinct
/// invocation ids.
pub struct InvocationContext {
    invocation_id: Uuid,
    queue_name: String,
    message_id: String,
    delivery_count: u32,
    deadline: Option<Instant>,
    sink: Arc<dyn LogSink>,
}

impl InvocationContext {
    pub fn new(queue_name: impl Into<String>, message: &QueueMessage, sink: Arc<dyn LogSink>) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            queue_name: queue_name.into(),
            message_id: message.id.clone(),
            delivery_count: message.delivery_count,
            deadline: None,
            sink,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    /// The queue that triggered this invocation.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// How many times the message has been delivered, this delivery included.
    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// The instant the invocation is cancelled at, if the queue has an invocation timeout.
    ///
    /// Handlers performing I/O should bound it by this deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` if the invocation is unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Emit a structured log record to the invocation's sink.
    ///
    /// `template` may reference `args` by name - e.g. `"processed: {item}"`.
    /// Sink failures are reported as warnings and otherwise ignored.
    pub fn log(&self, severity: Severity, template: &str, args: &[(&str, &dyn fmt::Display)]) {
        let fields: Vec<(String, String)> = args
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.to_string()))
            .collect();
        let record = LogRecord {
            severity,
            message: render_template(template, &fields),
            template: template.to_owned(),
            fields,
            queue_name: self.queue_name.clone(),
            message_id: self.message_id.clone(),
            invocation_id: self.invocation_id,
        };

        if let Err(e) = self.sink.write(&record) {
            tracing::warn!(
                error = %e,
                queue_name = %self.queue_name,
                message_id = %self.message_id,
                "Failed to write a log record to the invocation sink."
            );
        }
    }

    pub fn log_information(&self, template: &str, args: &[(&str, &dyn fmt::Display)]) {
        self.log(Severity::Information, template, args)
    }

    pub fn log_warning(&self, template: &str, args: &[(&str, &dyn fmt::Display)]) {
        self.log(Severity::Warning, template, args)
    }

    pub fn log_error(&self, template: &str, args: &[(&str, &dyn fmt::Display)]) {
        self.log(Severity::Error, template, args)
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("invocation_id", &self.invocation_id)
            .field("queue_name", &self.queue_name)
            .field("message_id", &self.message_id)
            .field("delivery_count", &self.delivery_count)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
