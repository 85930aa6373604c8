use crate::configuration::{ConfigurationError, DeliverySettings, TriggerBinding};
use crate::consumers::{
    handler::{AsyncClosure, ClosureHandler},
    ConsumerPreStartHook, ConsumerTransientErrorHook, Handler, ProcessingMiddleware,
    TelemetryMiddleware,
};
use std::sync::Arc;

/// A handler processing messages from a queue: one entry of the registration table of a
/// [`ConsumerGroup`].
///
/// Use [`MessageHandler::builder`] (or [`MessageHandler::from_binding`]) to start composing a
/// `MessageHandler` using a fluent builder API.
///
/// # `MessageHandler` vs `ConsumerGroup`
///
/// A `MessageHandler` is always part of a [`ConsumerGroup`] - it shares its transport and log
/// sink and inherits its group-level configuration.
///
/// It is possible to:
///
/// - override some group-level configuration for a specific message handler (see
///   [`MessageHandlerBuilder::with_delivery_settings`], [`MessageHandlerBuilder::with_pre_start_hook`]
///   and [`MessageHandlerBuilder::transient_error_hook`])
/// - add on top of what the group-level configuration provides
///   (e.g. [`MessageHandlerBuilder::with_processing_middleware`] or
///   [`MessageHandlerBuilder::with_telemetry_middleware`]).
///
/// [`ConsumerGroup`]: super::ConsumerGroup
pub struct MessageHandler {
    pub(super) queue_name: String,
    pub(super) delivery_settings: Option<DeliverySettings>,
    pub(super) processing_middleware_chain: Vec<Arc<dyn ProcessingMiddleware>>,
    pub(super) telemetry_middleware_chain: Vec<Arc<dyn TelemetryMiddleware>>,
    pub(super) pre_start_hooks: Vec<Arc<dyn ConsumerPreStartHook>>,
    pub(super) transient_error_hook: Option<Arc<dyn ConsumerTransientErrorHook>>,
    pub(super) handler: Arc<dyn Handler>,
}

impl MessageHandler {
    /// Start building a [`MessageHandler`].
    ///
    /// You need to provide the name of the queue you want to consume messages from.
    pub fn builder<T: Into<String>>(queue_name: T) -> MessageHandlerBuilder {
        MessageHandlerBuilder::new(queue_name.into())
    }

    /// Start building a [`MessageHandler`] for the queue a [`TriggerBinding`] points at.
    ///
    /// It fails if the binding is invalid - e.g. an empty queue name.
    pub fn from_binding(binding: &TriggerBinding) -> Result<MessageHandlerBuilder, ConfigurationError> {
        binding.validate()?;
        Ok(Self::builder(binding.queue_name.clone()))
    }

    /// The queue this handler consumes from, before any group-level prefix is applied.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

/// A builder to compose a [`MessageHandler`] with a fluent API.
///
/// Use [`MessageHandler::builder`] as entrypoint.
pub struct MessageHandlerBuilder {
    queue_name: String,
    delivery_settings: Option<DeliverySettings>,
    processing_middleware_chain: Vec<Arc<dyn ProcessingMiddleware>>,
    telemetry_middleware_chain: Vec<Arc<dyn TelemetryMiddleware>>,
    pre_start_hooks: Vec<Arc<dyn ConsumerPreStartHook>>,
    transient_error_hook: Option<Arc<dyn ConsumerTransientErrorHook>>,
}

impl MessageHandlerBuilder {
    pub(super) fn new<T: Into<String>>(queue_name: T) -> Self {
        Self {
            queue_name: queue_name.into(),
            delivery_settings: None,
            processing_middleware_chain: vec![],
            telemetry_middleware_chain: vec![],
            pre_start_hooks: vec![],
            transient_error_hook: None,
        }
    }

    /// Override the group-level [`DeliverySettings`] for this queue.
    #[must_use]
    pub fn with_delivery_settings(mut self, delivery_settings: DeliverySettings) -> Self {
        self.delivery_settings = Some(delivery_settings);
        self
    }

    /// You can add processing middleware to inject logic before and after the handler logic.
    ///
    /// Middlewares are executed in the order they are registered: the first registered
    /// middleware executes first on the way in and last on the way out.
    ///
    /// Processing middlewares registered at the [`MessageHandler`] level are executed AFTER
    /// processing middlewares registered at the [`ConsumerGroup`] level.
    ///
    /// [`ConsumerGroup`]: super::ConsumerGroup
    #[must_use]
    pub fn with_processing_middleware<M: ProcessingMiddleware>(self, middleware: M) -> Self {
        self.with_dyn_processing_middleware(Arc::new(middleware))
    }

    #[must_use]
    pub fn with_dyn_processing_middleware(
        mut self,
        middleware: Arc<dyn ProcessingMiddleware>,
    ) -> Self {
        self.processing_middleware_chain.push(middleware);
        self
    }

    /// You can add telemetry middleware to inject logic before and after the message processing
    /// has taken place.
    ///
    /// Telemetry middlewares registered at the [`MessageHandler`] level are executed AFTER
    /// telemetry middlewares registered at the [`ConsumerGroup`] level, and BEFORE all
    /// processing middlewares.
    ///
    /// [`ConsumerGroup`]: super::ConsumerGroup
    #[must_use]
    pub fn with_telemetry_middleware<M: TelemetryMiddleware>(self, middleware: M) -> Self {
        self.with_dyn_telemetry_middleware(Arc::new(middleware))
    }

    #[must_use]
    pub fn with_dyn_telemetry_middleware(
        mut self,
        middleware: Arc<dyn TelemetryMiddleware>,
    ) -> Self {
        self.telemetry_middleware_chain.push(middleware);
        self
    }

    /// Pre-start hooks are executed _before_ the consumer starts pulling messages from the
    /// queue.
    ///
    /// If no pre-start hook is specified at the [`MessageHandler`] level, the hooks
    /// specified at the [`ConsumerGroup`] level are executed.
    ///
    /// [`ConsumerGroup`]: super::ConsumerGroup
    #[must_use]
    pub fn with_pre_start_hook<H: ConsumerPreStartHook>(mut self, hook: H) -> Self {
        self.pre_start_hooks.push(Arc::new(hook));
        self
    }

    /// If no transient error hook is specified at the [`MessageHandler`] level, the hook
    /// specified at the [`ConsumerGroup`] level is executed.
    ///
    /// [`ConsumerGroup`]: super::ConsumerGroup
    #[must_use]
    pub fn transient_error_hook<H: ConsumerTransientErrorHook>(self, hook: H) -> Self {
        self.dyn_transient_error_hook(Arc::new(hook))
    }

    /// A version of [`MessageHandlerBuilder::transient_error_hook`] for already Arc-ed hooks.
    #[must_use]
    pub fn dyn_transient_error_hook(mut self, hook: Arc<dyn ConsumerTransientErrorHook>) -> Self {
        self.transient_error_hook = Some(hook);
        self
    }

    /// The handler function used to process incoming messages.
    ///
    /// Passing in the handler function finalises the `MessageHandler` construction - you will
    /// not be able to register additional middlewares or hooks after having specified the handler.
    pub fn handler<H>(self, handler: H) -> MessageHandler
    where
        H: for<'a> AsyncClosure<'a>,
    {
        self.raw_handler(ClosureHandler(handler))
    }

    /// The raw handler used to process incoming messages. Prefer `handler` if you
    /// only want to register a function handler.
    pub fn raw_handler<H: Handler>(self, handler: H) -> MessageHandler {
        self.raw_arc_handler(Arc::new(handler))
    }

    /// Register an already Arc-ed handler, e.g. to share it across queues.
    pub fn raw_arc_handler(self, handler: Arc<dyn Handler>) -> MessageHandler {
        let Self {
            queue_name,
            delivery_settings,
            processing_middleware_chain,
            telemetry_middleware_chain,
            pre_start_hooks,
            transient_error_hook,
        } = self;
        MessageHandler {
            queue_name,
            delivery_settings,
            processing_middleware_chain,
            telemetry_middleware_chain,
            pre_start_hooks,
            transient_error_hook,
            handler,
        }
    }
}
