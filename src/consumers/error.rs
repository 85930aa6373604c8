use std::fmt;

/// The error type returned by message handlers.
///
/// Returning an error is the only way for a handler to report failure: there is no partial
/// success. The [`ErrorType`] tells the consumer whether redelivering the message might help.
#[derive(Debug)]
pub struct HandlerError {
    /// The underlying cause of the failure.
    pub inner_error: anyhow::Error,
    /// `error_type` distinguishes two classes of errors:
    /// - transient errors; message processing might succeed if retried after a short delay
    /// - permanent errors; no matter how many times you retry, processing will never succeed
    ///
    /// Check out [`ErrorType`]'s documentation for more details.
    pub error_type: ErrorType,
}

impl HandlerError {
    pub fn transient(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner_error: error.into(),
            error_type: ErrorType::Transient,
        }
    }

    pub fn permanent(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner_error: error.into(),
            error_type: ErrorType::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.error_type == ErrorType::Transient
    }
}

/// Untyped errors are assumed to be transient: the message will be retried until it runs out
/// of delivery attempts.
impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> Self {
        Self::transient(error)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner_error.as_ref())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handling of a message failed due to a {} issue: {}",
            self.error_type, self.inner_error
        )
    }
}

/// Types of failure when handling a message.
/// Used by the consumer to decide between redelivery and the poison queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorType {
    /// Message processing might succeed if retried after a short delay.
    ///
    /// E.g. the message handler encountered a time out when trying to call an API to fulfill
    /// the message processing requirements.
    ///
    /// The consumer executes the [transient error hook](crate::consumers::ConsumerTransientErrorHook)
    /// to decide whether the message should be requeued. A message is never requeued past the
    /// configured maximum delivery count.
    Transient,
    /// Message processing will never succeed, no matter how many times you retry or how long
    /// you wait.
    ///
    /// E.g. the message payload is not valid UTF-8.
    ///
    /// The message is moved to the poison queue straight away.
    Permanent,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// The invocation did not complete before its deadline.
#[derive(thiserror::Error, Debug)]
#[error("The invocation did not complete before its deadline.")]
pub struct InvocationTimedOut;

/// The handler panicked.
#[derive(thiserror::Error, Debug)]
#[error("The message handler panicked: {0}")]
pub struct HandlerPanicked(pub String);
