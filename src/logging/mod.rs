//! The logging capability handed to message handlers.
//!
//! Handlers never reach for a process-wide logger: every invocation receives the sink to write
//! to through its [`InvocationContext`](crate::consumers::InvocationContext).
//! A sink accepts `(severity, template, args)` and renders the template by substituting
//! `{name}` placeholders with the argument of the same name - `{{` and `}}` produce literal
//! braces.
//!
//! Failures of the sink itself never surface to business logic. The invocation context logs
//! them as warnings through `tracing` and carries on.
use std::fmt;
use uuid::Uuid;

mod memory_sink;
mod tracing_sink;

pub use memory_sink::MemorySink;
pub use tracing_sink::TracingSink;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A structured log record, as received by a [`LogSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    /// The message template, e.g. `Queue trigger function processed: {item}`.
    pub template: String,
    /// The template arguments, in the order they were supplied.
    pub fields: Vec<(String, String)>,
    /// The template with all known placeholders substituted.
    pub message: String,
    /// The queue the invocation was triggered by.
    pub queue_name: String,
    /// The id of the message being processed.
    pub message_id: String,
    /// The id of the invocation that emitted the record.
    pub invocation_id: Uuid,
}

impl LogRecord {
    /// Look up the value of a template argument by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("The log sink is unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Where log records emitted by message handlers end up.
///
/// # Thread-safety
///
/// A single sink instance is shared by all the invocations of a consumer group, possibly
/// running on different threads at the same time - hence the `Send + Sync` bounds.
/// Implementations must not rely on records of different invocations being serialised.
pub trait LogSink: Send + Sync + 'static {
    fn write(&self, record: &LogRecord) -> Result<(), SinkError>;
}

impl<S: LogSink + ?Sized> LogSink for std::sync::Arc<S> {
    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        S::write(self, record)
    }
}

/// Substitute `{name}` placeholders in `template` with the matching argument.
///
/// Placeholders without a matching argument are left untouched.
pub fn render_template(template: &str, fields: &[(String, String)]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                rendered.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                rendered.push('}');
            }
            '{' => {
                let rest = &template[start + 1..];
                match rest.find('}') {
                    Some(end) => {
                        let name = &rest[..end];
                        match fields.iter().find(|(key, _)| key == name) {
                            Some((_, value)) => rendered.push_str(value),
                            None => {
                                rendered.push('{');
                                rendered.push_str(name);
                                rendered.push('}');
                            }
                        }
                        // Skip the placeholder name and its closing brace.
                        for _ in 0..name.chars().count() + 1 {
                            chars.next();
                        }
                    }
                    None => rendered.push('{'),
                }
            }
            c => rendered.push(c),
        }
    }
    rendered
}
