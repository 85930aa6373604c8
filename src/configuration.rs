//! Configuration types describing which queue a handler is bound to and how deliveries of that
//! queue are governed.
//!
//! Both types deserialize with `serde`, so they can be loaded from whatever source the
//! application already uses for its settings. Numeric fields accept strings as well, since they
//! usually arrive through environment variables.
use redact::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::{
    deserialize_number_from_string, deserialize_option_number_from_string,
};
use std::time::Duration;

/// AMQP short strings (and therefore queue names) cannot exceed 255 bytes.
const MAX_QUEUE_NAME_LENGTH: usize = 255;

/// The suffix appended to a queue name to derive its poison queue, unless overridden.
pub const POISON_QUEUE_SUFFIX: &str = "-poison";

#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("The queue name of a trigger binding cannot be empty.")]
    EmptyQueueName,
    #[error("The queue name `{0}` is longer than {MAX_QUEUE_NAME_LENGTH} bytes.")]
    QueueNameTooLong(String),
    #[error("The connection setting `{0}` is not set.")]
    MissingConnectionSetting(String),
    #[error("The connection string is not a valid AMQP uri: {0}")]
    InvalidConnectionString(String),
    #[error("Invalid delivery settings: {0}.")]
    InvalidDeliverySettings(&'static str),
}

/// Queue names must be non-blank and fit in an AMQP short string.
pub fn validate_queue_name(queue_name: &str) -> Result<(), ConfigurationError> {
    if queue_name.trim().is_empty() {
        return Err(ConfigurationError::EmptyQueueName);
    }
    if queue_name.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(ConfigurationError::QueueNameTooLong(queue_name.to_owned()));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Binds a handler to a queue.
///
/// This is the only configuration surface a queue-triggered function exposes:
///
/// ```json
/// { "queueName": "myqueue-items", "connection": "QUEUE_CONNECTION" }
/// ```
pub struct TriggerBinding {
    /// The queue the handler subscribes to.
    pub queue_name: String,
    /// The name of the setting (environment variable) holding the connection string of the
    /// queue backend. The connection string itself never lives in the binding.
    pub connection: String,
}

impl TriggerBinding {
    pub fn new(queue_name: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            connection: connection.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_queue_name(&self.queue_name)
    }

    /// Resolve the connection string from the process environment.
    pub fn connection_string(&self) -> Result<Secret<String>, ConfigurationError> {
        self.resolve_connection_with(|name| std::env::var(name).ok())
    }

    /// Resolve the connection string using a custom lookup for settings.
    pub fn resolve_connection_with<F>(&self, lookup: F) -> Result<Secret<String>, ConfigurationError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        lookup(&self.connection)
            .filter(|value| !value.trim().is_empty())
            .map(Secret::from)
            .ok_or_else(|| ConfigurationError::MissingConnectionSetting(self.connection.clone()))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
/// Delivery policy for a queue.
///
/// None of these values has a default: they belong to the deployment, not to the handler.
pub struct DeliverySettings {
    /// How many times a message is delivered before it is moved to the poison queue.
    /// Must be at least 1.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_delivery_count: u32,
    /// Upper bound on the duration of a single invocation, in seconds.
    /// Invocations are unbounded if left unspecified.
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub invocation_timeout_seconds: Option<u64>,
    /// How many messages of the same queue can be processed concurrently.
    /// Must be at least 1.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_concurrent_invocations: u16,
    /// Where poisoned messages end up. Defaults to `<queue name>-poison`.
    #[serde(default)]
    pub poison_queue_name: Option<String>,
}

impl DeliverySettings {
    pub fn new(max_delivery_count: u32, max_concurrent_invocations: u16) -> Self {
        Self {
            max_delivery_count,
            invocation_timeout_seconds: None,
            max_concurrent_invocations,
            poison_queue_name: None,
        }
    }

    /// Bound the duration of every invocation.
    ///
    /// The timeout is kept in whole seconds: fractions are rounded up, never down.
    #[must_use]
    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        let seconds = timeout
            .as_secs()
            .saturating_add(u64::from(timeout.subsec_nanos() > 0));
        self.invocation_timeout_seconds = Some(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_poison_queue_name(mut self, name: impl Into<String>) -> Self {
        self.poison_queue_name = Some(name.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_delivery_count == 0 {
            return Err(ConfigurationError::InvalidDeliverySettings(
                "max_delivery_count must be at least 1",
            ));
        }
        if self.max_concurrent_invocations == 0 {
            return Err(ConfigurationError::InvalidDeliverySettings(
                "max_concurrent_invocations must be at least 1",
            ));
        }
        if self.invocation_timeout_seconds == Some(0) {
            return Err(ConfigurationError::InvalidDeliverySettings(
                "invocation_timeout_seconds must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Retrieve the invocation timeout. It returns `None` if left unspecified.
    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout_seconds.map(Duration::from_secs)
    }

    /// The poison queue associated with `queue_name`.
    pub fn poison_queue_for(&self, queue_name: &str) -> String {
        self.poison_queue_name
            .clone()
            .unwrap_or_else(|| format!("{queue_name}{POISON_QUEUE_SUFFIX}"))
    }
}
