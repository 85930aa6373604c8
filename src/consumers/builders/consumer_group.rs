use crate::{
    configuration::{validate_queue_name, DeliverySettings},
    consumers::{
        builders::{
            consumer_group_configuration::ConsumerGroupConfiguration,
            message_handler::MessageHandler,
        },
        consumer::{Consumer, Pipeline},
        ConsumerGroupConfigurationBuilder,
    },
    transport::{QueueTopology, QueueTransport},
};
use futures_util::{future::try_join_all, stream::FuturesUnordered, StreamExt};
use shutdown_handler::ShutdownHandler;
use std::collections::HashSet;
use std::sync::Arc;

/// A collection of queue consumers sharing the same transport, log sink and group-level
/// configuration.
///
/// `ConsumerGroup` is the registration table of an application: it maps each queue name to
/// the [`MessageHandler`] processing its messages, and drives one dispatch loop per queue.
///
/// # How do I build a `ConsumerGroup`?
///
/// `ConsumerGroup` provides a fluent API to add configuration step-by-step, known as
/// "builder pattern" in Rust.
/// The starting point is [`ConsumerGroup::builder`].
///
/// Once you are done with group-level configuration, you can start adding message handlers using
/// [`ConsumerGroupConfigurationBuilder::message_handler`].
///
/// ```
/// use queue_trigger::configuration::DeliverySettings;
/// use queue_trigger::consumers::{ConsumerGroup, MessageHandler};
/// use queue_trigger::functions::log_queue_item;
/// use queue_trigger::transport::InMemoryTransport;
///
/// # async fn run() -> Result<(), anyhow::Error> {
/// let group = ConsumerGroup::builder(InMemoryTransport::new(), DeliverySettings::new(5, 16))
///     .message_handler(MessageHandler::builder("myqueue-items").handler(log_queue_item))
///     .build()
///     .await?;
/// group.run_until_sigterm().await
/// # }
/// ```
///
/// # Layered configuration
///
/// Certain configuration values can only be set at the group level (e.g. transport, log sink,
/// queue name prefix) while others can be set both at the group and at the message handler
/// level (e.g. delivery settings, hooks).
pub struct ConsumerGroup {
    consumers: Vec<Consumer>,
}

impl ConsumerGroup {
    /// Start building a [`ConsumerGroup`].
    ///
    /// You will need a transport, the queue backend messages are pulled from, and the delivery
    /// settings applied to every queue that does not override them.
    pub fn builder(
        transport: impl QueueTransport,
        delivery_settings: DeliverySettings,
    ) -> ConsumerGroupConfigurationBuilder {
        ConsumerGroupConfigurationBuilder::new(Arc::new(transport), delivery_settings)
    }

    /// The queues consumed by the group, group-level prefix included.
    pub fn queue_names(&self) -> Vec<&str> {
        self.consumers.iter().map(Consumer::queue_name).collect()
    }

    /// You can call `run_until_sigterm` to start consuming messages from the queues you bound.
    /// As the name implies, `run_until_sigterm` returns control to the caller only if:
    /// - one of the consumers crashes (e.g. disconnection);
    /// - the application is stopped via SIGTERM;
    /// - every consumer has reached its `exit_after` limit.
    pub async fn run_until_sigterm(self) -> Result<(), anyhow::Error> {
        self.run_until_shutdown(ShutdownHandler::sigterm()?).await
    }

    /// You can call `run_until_shutdown` to start consuming messages from the queues you bound.
    /// As the name implies, `run_until_shutdown` returns control to the caller only if:
    /// - one of the consumers crashes (e.g. disconnection), in which case the others are
    ///   shut down as well and the first error is returned;
    /// - the application is stopped via the shutdown handler;
    /// - every consumer has reached its `exit_after` limit.
    ///
    /// In-flight invocations always complete before this returns.
    #[tracing::instrument(skip_all, name = "consumer_group_run")]
    pub async fn run_until_shutdown(
        self,
        shutdown: Arc<ShutdownHandler>,
    ) -> Result<(), anyhow::Error> {
        let mut consumers = self
            .consumers
            .into_iter()
            .map(|c| {
                let shutdown = shutdown.clone();
                async move { c.run_until_shutdown(shutdown.wait_for_signal()).await }
            })
            .map(tokio::spawn)
            .collect::<FuturesUnordered<_>>();

        let mut first_error = None;
        while let Some(joined) = consumers.next().await {
            let outcome = joined.map_err(anyhow::Error::from).and_then(|r| r);
            if let Err(e) = outcome {
                tracing::error!(error = ?e, "Consumer failed.");
                shutdown.shutdown();
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// A builder to register message handlers once the group-level configuration of a
/// [`ConsumerGroup`](super::ConsumerGroup) has been finalised.
///
/// Use [`ConsumerGroup::builder`](super::ConsumerGroup::builder) as entrypoint.
pub struct ConsumerGroupBuilder {
    pub(super) group_configuration: ConsumerGroupConfiguration,
    pub(super) message_handlers: Vec<MessageHandler>,
}

impl ConsumerGroupBuilder {
    /// Add another [`MessageHandler`] to the [`ConsumerGroup`].
    ///
    /// Check out [`MessageHandler::builder`] to build out a handler.
    #[must_use]
    pub fn message_handler(mut self, message_handler: MessageHandler) -> Self {
        self.message_handlers.push(message_handler);
        self
    }

    fn queue_name(
        group_configuration: &ConsumerGroupConfiguration,
        message_handler: &MessageHandler,
    ) -> String {
        match group_configuration.queue_name_prefix.as_ref() {
            Some(prefix) => format!("{0}_{1}", prefix, message_handler.queue_name),
            None => message_handler.queue_name.clone(),
        }
    }

    /// Merge the message handler-level and the group-level configuration to build the
    /// underlying [`Consumer`](super::super::consumer::Consumer) instance.
    async fn build_consumer(
        group_configuration: &ConsumerGroupConfiguration,
        message_handler: MessageHandler,
    ) -> Result<Consumer, anyhow::Error> {
        let queue_name = Self::queue_name(group_configuration, &message_handler);

        let delivery_settings = message_handler
            .delivery_settings
            .unwrap_or_else(|| group_configuration.delivery_settings.clone());
        delivery_settings.validate()?;

        // Handler-level hooks replace the group-level ones.
        let pre_start_hooks = if !message_handler.pre_start_hooks.is_empty() {
            message_handler.pre_start_hooks
        } else {
            group_configuration.pre_start_hooks.clone()
        };

        let transient_error_hook = message_handler
            .transient_error_hook
            .unwrap_or_else(|| group_configuration.transient_error_hook.clone());

        // Group-level middlewares are executed first.
        let processing_middleware_chain = group_configuration
            .processing_middleware_chain
            .iter()
            .cloned()
            .chain(message_handler.processing_middleware_chain)
            .collect();
        let telemetry_middleware_chain = group_configuration
            .telemetry_middleware_chain
            .iter()
            .cloned()
            .chain(message_handler.telemetry_middleware_chain)
            .collect();

        let topology = QueueTopology {
            poison_queue_name: delivery_settings.poison_queue_for(&queue_name),
            queue_name: queue_name.clone(),
        };
        let pipeline = Pipeline {
            queue_name,
            handler: message_handler.handler,
            processing_middleware_chain,
            telemetry_middleware_chain,
            transient_error_hook,
            sink: group_configuration.sink.clone(),
            max_delivery_count: delivery_settings.max_delivery_count,
            invocation_timeout: delivery_settings.invocation_timeout(),
        };

        Consumer::new(
            group_configuration.transport.clone(),
            topology,
            group_configuration.exit_after,
            delivery_settings.max_concurrent_invocations,
            pre_start_hooks,
            pipeline,
        )
        .await
    }

    /// Once you have added all your [`MessageHandler`]s to the [`ConsumerGroup`], you can
    /// finalise the group by calling `build`.
    ///
    /// `build` validates the configuration - every queue name must be valid and bound to a
    /// single handler - and runs all pre-start hooks.
    ///
    /// `build` does NOT trigger consumption of messages!
    /// Check out [`ConsumerGroup::run_until_sigterm`].
    pub async fn build(self) -> Result<ConsumerGroup, anyhow::Error> {
        let Self {
            group_configuration,
            message_handlers,
        } = self;

        let mut queue_names = HashSet::new();
        for message_handler in &message_handlers {
            let queue_name = Self::queue_name(&group_configuration, message_handler);
            validate_queue_name(&queue_name)?;
            if !queue_names.insert(queue_name.clone()) {
                anyhow::bail!("More than one message handler is bound to the queue `{queue_name}`.");
            }
        }

        let consumers = message_handlers
            .into_iter()
            .map(|m| Self::build_consumer(&group_configuration, m));

        Ok(ConsumerGroup {
            consumers: try_join_all(consumers).await?,
        })
    }
}
