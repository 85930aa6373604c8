use crate::{
    consumers::{
        extensions::with_extensions,
        handler::Handler,
        pre_start_hook::ConsumerPreStartHook,
        processing_middleware::{Next, ProcessingMiddleware},
        telemetry_middleware::{MessageProcessing, ProcessingError},
        transient_error_hook::ConsumerTransientErrorHook,
        Incoming, InvocationContext, TelemetryMiddleware,
    },
    logging::LogSink,
    transport::{Delivery, QueueTopology, QueueTransport},
};
use futures_util::{stream::FuturesUnordered, Future, FutureExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use task_local_extensions::Extensions;
use tokio::time::Instant;

/// The dispatch loop driving a single [`MessageHandler`].
///
/// [`ConsumerGroup`] instantiates a `Consumer` for each [`MessageHandler`].
///
/// Users of the crate are never exposed to `Consumer` directly - it's an implementation detail
/// whose interface we are free to evolve over time (as long as it does not require changes to
/// the builder interface for [`ConsumerGroup`] and [`MessageHandler`]).
///
/// [`ConsumerGroup`]: super::ConsumerGroup
/// [`MessageHandler`]: super::MessageHandler
pub(super) struct Consumer {
    transport: Arc<dyn QueueTransport>,
    topology: QueueTopology,
    /// The maximum number of messages `Consumer` is going to process before exiting the
    /// processing loop.
    /// The consumer will process messages indefinitely if set to `None`.
    exit_after: Option<usize>,
    /// At most this many invocations run at the same time.
    max_concurrent_invocations: u16,
    /// Everything an invocation needs, shared by all the tasks spawned by the loop.
    pipeline: Arc<Pipeline>,
}

/// What happens to each delivery: telemetry middlewares, processing middlewares, handler,
/// settlement.
pub(super) struct Pipeline {
    pub(super) queue_name: String,
    pub(super) handler: Arc<dyn Handler>,
    /// Executed in order, before/after the `handler`.
    pub(super) processing_middleware_chain: Vec<Arc<dyn ProcessingMiddleware>>,
    /// Executed in order, before/after the processing middlewares and the settlement.
    pub(super) telemetry_middleware_chain: Vec<Arc<dyn TelemetryMiddleware>>,
    pub(super) transient_error_hook: Arc<dyn ConsumerTransientErrorHook>,
    pub(super) sink: Arc<dyn LogSink>,
    pub(super) max_delivery_count: u32,
    pub(super) invocation_timeout: Option<Duration>,
}

impl Consumer {
    /// Run the pre-start hooks and return a ready-to-run consumer.
    ///
    /// Use [`Consumer::run_until_shutdown`] to start consuming messages.
    #[tracing::instrument(
        skip(transport, pre_start_hooks, pipeline),
        fields(queue_name = %topology.queue_name),
        name = "consumer_new"
    )]
    pub(super) async fn new(
        transport: Arc<dyn QueueTransport>,
        topology: QueueTopology,
        exit_after: Option<usize>,
        max_concurrent_invocations: u16,
        pre_start_hooks: Vec<Arc<dyn ConsumerPreStartHook>>,
        pipeline: Pipeline,
    ) -> Result<Consumer, anyhow::Error> {
        for hook in pre_start_hooks {
            hook.run(transport.as_ref(), &topology).await?;
        }

        Ok(Consumer {
            transport,
            topology,
            exit_after,
            max_concurrent_invocations,
            pipeline: Arc::new(pipeline),
        })
    }

    pub(super) fn queue_name(&self) -> &str {
        &self.topology.queue_name
    }

    /// Subscribe to the queue and dispatch deliveries to the pipeline, one task per delivery.
    ///
    /// `run_until_shutdown` exits if the subscription fails with an error (e.g. the connection
    /// with the broker is lost), if the queue is closed or if a shutdown signal is received.
    /// It stops pulling messages first, then waits for the in-flight invocations to complete.
    #[tracing::instrument(skip_all, name = "consumer_run", fields(queue_name = %self.topology.queue_name))]
    pub(super) async fn run_until_shutdown(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), anyhow::Error> {
        let mut deliveries = self
            .transport
            .subscribe(&self.topology, self.max_concurrent_invocations)
            .await?;

        let mut in_flight = FuturesUnordered::new();
        let mut counter = 0;
        let max_in_flight = usize::from(self.max_concurrent_invocations);

        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);

        let result = 'event_loop: loop {
            // have we consumed all the messages we want?
            if self.exit_after == Some(counter) {
                break 'event_loop Ok(());
            }

            tokio::select! {
                // prefer handling shutdowns over processing more messages
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Consumer received shutdown event.");
                    break 'event_loop Ok(());
                }

                Some(joined) = in_flight.next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Message processing task failed.");
                    }
                }

                // back-pressure: stop pulling while all the invocation slots are taken
                delivery = deliveries.next(), if in_flight.len() < max_in_flight => {
                    match delivery {
                        None => {
                            tracing::info!("The queue subscription ended.");
                            break 'event_loop Ok(());
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Failed to receive a message.");
                            break 'event_loop Err(e.into());
                        }
                        Some(Ok(delivery)) => {
                            // One task per message: a failing, slow or panicking invocation
                            // does not hold up the others.
                            let pipeline = self.pipeline.clone();
                            in_flight.push(tokio::spawn(pipeline.process(delivery)));
                            counter += 1;
                        }
                    }
                }
            }
        };

        // Stop pulling messages before draining.
        drop(deliveries);
        while let Some(joined) = in_flight.next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Message processing task failed.");
            }
        }

        result
    }
}

impl Pipeline {
    /// Process an incoming message - middlewares, handler, settlement with the queue.
    #[tracing::instrument(
        name = "process_message",
        skip_all,
        fields(
            queue_name = %self.queue_name,
            message_id = %delivery.message.id,
            delivery_count = delivery.message.delivery_count,
        ),
        level = tracing::Level::DEBUG
    )]
    async fn process(self: Arc<Self>, delivery: Delivery) {
        let mut context =
            InvocationContext::new(&self.queue_name, &delivery.message, self.sink.clone());
        if let Some(timeout) = self.invocation_timeout {
            context = context.with_deadline(Instant::now() + timeout);
        }

        let next = Next {
            handler: self.handler.as_ref(),
            next_middleware: &self.processing_middleware_chain,
        };
        let message_processing_pipeline = MessageProcessing {
            delivery: &delivery,
            transient_error_hook: self.transient_error_hook.clone(),
            max_delivery_count: self.max_delivery_count,
            processing_chain: next,
            next_telemetry_middleware: &self.telemetry_middleware_chain,
        };
        let incoming = Incoming {
            message: &delivery.message,
            context: &context,
        };

        let task_future = message_processing_pipeline.run(incoming);
        let (_, outcome) = with_extensions(Extensions::default(), task_future).await;

        match outcome.result() {
            Ok(()) => tracing::debug!("Message processed."),
            Err(ProcessingError::HandlerError(e)) => tracing::warn!(
                error = %e,
                settlement = %outcome.settlement(),
                "Failed to process message."
            ),
            Err(e) => tracing::error!(error = ?e, "{}", e),
        }
    }
}
