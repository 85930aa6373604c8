use crate::configuration::DeliverySettings;
use crate::consumers::builders::consumer_group::ConsumerGroupBuilder;
use crate::consumers::builders::message_handler::MessageHandler;
use crate::consumers::hooks::transient_error::AlwaysRequeue;
use crate::consumers::{
    ConsumerPreStartHook, ConsumerTransientErrorHook, ProcessingMiddleware, TelemetryMiddleware,
};
use crate::logging::{LogSink, TracingSink};
use crate::transport::QueueTransport;
use std::sync::Arc;

/// Group-level configuration values for a [`ConsumerGroup`](super::ConsumerGroup).
///
/// Use [`ConsumerGroupConfigurationBuilder`] to build an instance of `ConsumerGroupConfiguration`.
pub(super) struct ConsumerGroupConfiguration {
    pub(super) transport: Arc<dyn QueueTransport>,
    pub(super) delivery_settings: DeliverySettings,
    pub(super) queue_name_prefix: Option<String>,
    pub(super) sink: Arc<dyn LogSink>,
    pub(super) processing_middleware_chain: Vec<Arc<dyn ProcessingMiddleware>>,
    pub(super) telemetry_middleware_chain: Vec<Arc<dyn TelemetryMiddleware>>,
    pub(super) pre_start_hooks: Vec<Arc<dyn ConsumerPreStartHook>>,
    pub(super) exit_after: Option<usize>,
    pub(super) transient_error_hook: Arc<dyn ConsumerTransientErrorHook>,
}

/// A builder for group-level configuration of a [`ConsumerGroup`](super::ConsumerGroup).
///
/// Use [`ConsumerGroup::builder`](super::ConsumerGroup::builder) as entrypoint.
pub struct ConsumerGroupConfigurationBuilder(ConsumerGroupConfiguration);

impl ConsumerGroupConfigurationBuilder {
    pub(super) fn new(
        transport: Arc<dyn QueueTransport>,
        delivery_settings: DeliverySettings,
    ) -> Self {
        Self(ConsumerGroupConfiguration {
            transport,
            delivery_settings,
            queue_name_prefix: None,
            sink: Arc::new(TracingSink),
            processing_middleware_chain: vec![],
            telemetry_middleware_chain: vec![],
            pre_start_hooks: Vec::new(),
            // The maximum delivery count still applies: a message is never requeued forever.
            transient_error_hook: Arc::new(AlwaysRequeue),
            // By default, the consumer group will continue to consume message indefinitely.
            exit_after: None,
        })
    }

    /// Where invocations write their log records.
    ///
    /// Each invocation gets the sink through its [`InvocationContext`]. Defaults to
    /// [`TracingSink`].
    ///
    /// [`InvocationContext`]: crate::consumers::InvocationContext
    #[must_use]
    pub fn with_log_sink<S: LogSink>(self, sink: S) -> Self {
        self.with_dyn_log_sink(Arc::new(sink))
    }

    #[must_use]
    pub fn with_dyn_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.0.sink = sink;
        self
    }

    /// Add a prefix to the name of queues used by message handlers in the group.
    ///
    /// E.g. `test` as prefix will give you `test_X` queue names.
    #[must_use]
    pub fn queue_name_prefix<T: Into<String>>(mut self, prefix: T) -> Self {
        self.0.queue_name_prefix = Some(prefix.into());
        self
    }

    /// You can add a processing middleware to inject logic before and after the handler logic.
    ///
    /// Processing middlewares execute after all [`TelemetryMiddleware`]s have run.
    /// Processing middlewares are executed in the order they are registered: the first
    /// registered middleware executes first on the way in and last on the way out.
    #[must_use]
    pub fn with_processing_middleware<M: ProcessingMiddleware>(self, middleware: M) -> Self {
        self.with_dyn_processing_middleware(Arc::new(middleware))
    }

    #[must_use]
    pub fn with_dyn_processing_middleware(
        mut self,
        middleware: Arc<dyn ProcessingMiddleware>,
    ) -> Self {
        self.0.processing_middleware_chain.push(middleware);
        self
    }

    /// You can add a telemetry middleware to collect data on the outcome and performance of
    /// message processing.
    ///
    /// [`TelemetryMiddleware`]s execute before and after all processing has taken place
    /// (including settling the message with the queue).
    #[must_use]
    pub fn with_telemetry_middleware<M: TelemetryMiddleware>(self, middleware: M) -> Self {
        self.with_dyn_telemetry_middleware(Arc::new(middleware))
    }

    #[must_use]
    pub fn with_dyn_telemetry_middleware(
        mut self,
        middleware: Arc<dyn TelemetryMiddleware>,
    ) -> Self {
        self.0.telemetry_middleware_chain.push(middleware);
        self
    }

    /// By default, a [`ConsumerGroup`] keeps running indefinitely, consuming messages as soon as
    /// they are available in the queues bound by its [`MessageHandler`]s.
    ///
    /// With `exit_after` you can configure the [`MessageHandler`]s in a [`ConsumerGroup`] to
    /// stop consuming messages as soon as they have received `max_n_messages`.
    ///
    /// This is mostly useful for testing purposes: it allows you to know, when the group has
    /// exited, that a certain number of messages have been processed and you can start
    /// performing your assertions around the side-effects produced by said processing.
    ///
    /// [`ConsumerGroup`]: super::ConsumerGroup
    #[must_use]
    pub fn exit_after(mut self, max_n_messages: usize) -> Self {
        self.0.exit_after = Some(max_n_messages);
        self
    }

    /// Pre-start hooks are executed _before_ consumers start pulling messages from queues -
    /// e.g. to declare the queues.
    ///
    /// By default, no pre-start logic is executed.
    #[must_use]
    pub fn with_pre_start_hook<H: ConsumerPreStartHook>(mut self, hook: H) -> Self {
        self.0.pre_start_hooks.push(Arc::new(hook));
        self
    }

    /// A transient error hook decides what happens to a message whose processing failed with
    /// a transient error.
    ///
    /// By default, messages are requeued until they reach the maximum delivery count.
    #[must_use]
    pub fn transient_error_hook<H: ConsumerTransientErrorHook>(self, hook: H) -> Self {
        self.dyn_transient_error_hook(Arc::new(hook))
    }

    #[must_use]
    pub fn dyn_transient_error_hook(mut self, hook: Arc<dyn ConsumerTransientErrorHook>) -> Self {
        self.0.transient_error_hook = hook;
        self
    }

    /// Once you have specified all the group-level configuration you need,
    /// you can start adding [`MessageHandler`]s!
    ///
    /// # Implementation Notes
    ///
    /// After you start adding message handlers you are prevented from introducing new
    /// group-level configuration: a group-level middleware added after a handler would have
    /// an ambiguous scope. A phased builder rules that out.
    pub fn message_handler(self, message_handler: MessageHandler) -> ConsumerGroupBuilder {
        ConsumerGroupBuilder {
            group_configuration: self.0,
            message_handlers: vec![message_handler],
        }
    }
}
