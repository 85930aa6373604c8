use crate::logging::{LogRecord, LogSink, Severity, SinkError};

/// Forwards log records to `tracing`, with the invocation identifiers attached as fields.
///
/// `Critical` records are emitted at `ERROR` level - `tracing` has nothing above it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        // `tracing` requires the level to be known at compile time.
        macro_rules! emit {
            ($level:expr) => {
                tracing::event!(
                    $level,
                    queue_name = %record.queue_name,
                    message_id = %record.message_id,
                    invocation_id = %record.invocation_id,
                    template = %record.template,
                    "{}",
                    record.message
                )
            };
        }

        match record.severity {
            Severity::Trace => emit!(tracing::Level::TRACE),
            Severity::Debug => emit!(tracing::Level::DEBUG),
            Severity::Information => emit!(tracing::Level::INFO),
            Severity::Warning => emit!(tracing::Level::WARN),
            Severity::Error | Severity::Critical => emit!(tracing::Level::ERROR),
        }
        Ok(())
    }
}
