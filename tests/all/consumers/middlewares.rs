use crate::helpers::{delivery_settings, enqueue, queue_name, run_to_completion};
use async_trait::async_trait;
use queue_trigger::configuration::DeliverySettings;
use queue_trigger::consumers::{
    get_invocation_local_item, set_invocation_local_item, ConsumerGroup, Handler, HandlerError,
    Incoming, InvocationContext, MessageHandler, MessageProcessing, Next, ProcessingMiddleware,
    ProcessingOutcome, TelemetryMiddleware,
};
use queue_trigger::transport::{InMemoryTransport, Settlement};
use std::sync::{Arc, Mutex};

/// Records the order in which the components of the processing chain are invoked.
#[derive(Clone, Default)]
struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct TracedTelemetry {
    name: &'static str,
    trace: Trace,
}

#[async_trait]
impl TelemetryMiddleware for TracedTelemetry {
    async fn handle<'a>(
        &'a self,
        incoming: Incoming<'a>,
        next: MessageProcessing<'a>,
    ) -> ProcessingOutcome {
        self.trace.push(format!("{} - in", self.name));
        let outcome = next.run(incoming).await;
        self.trace.push(format!("{} - out", self.name));
        outcome
    }
}

struct TracedProcessing {
    name: &'static str,
    trace: Trace,
}

#[async_trait]
impl ProcessingMiddleware for TracedProcessing {
    async fn handle<'a>(
        &'a self,
        incoming: Incoming<'a>,
        next: Next<'a>,
    ) -> Result<(), HandlerError> {
        self.trace.push(format!("{} - in", self.name));
        let outcome = next.run(incoming).await;
        self.trace.push(format!("{} - out", self.name));
        outcome
    }
}

struct TracedHandler(Trace);

#[async_trait]
impl Handler for TracedHandler {
    async fn handle(&self, _message: &str, _context: &InvocationContext) -> Result<(), HandlerError> {
        self.0.push("handler");
        Ok(())
    }
}

#[tokio::test]
async fn middlewares_are_executed_in_registration_order_group_level_first() {
    // Arrange
    let transport = InMemoryTransport::new();
    let queue_name = queue_name();
    let trace = Trace::default();
    let telemetry = |name| TracedTelemetry {
        name,
        trace: trace.clone(),
    };
    let processing = |name| TracedProcessing {
        name,
        trace: trace.clone(),
    };

    let consumer_group = ConsumerGroup::builder(transport.clone(), delivery_settings())
        .with_processing_middleware(processing("group processing"))
        .with_telemetry_middleware(telemetry("group telemetry 1"))
        .with_telemetry_middleware(telemetry("group telemetry 2"))
        .exit_after(1)
        .message_handler(
            MessageHandler::builder(&queue_name)
                .with_processing_middleware(processing("handler processing"))
                .with_telemetry_middleware(telemetry("handler telemetry"))
                .raw_handler(TracedHandler(trace.clone())),
        )
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["order-42"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    assert_eq!(
        trace.entries(),
        vec![
            "group telemetry 1 - in",
            "group telemetry 2 - in",
            "handler telemetry - in",
            "group processing - in",
            "handler processing - in",
            "handler",
            "handler processing - out",
            "group processing - out",
            "handler telemetry - out",
            "group telemetry 2 - out",
            "group telemetry 1 - out",
        ]
    );
}

#[tokio::test]
async fn telemetry_middlewares_observe_how_the_message_was_settled() {
    struct SettlementRecorder(Arc<Mutex<Vec<(u32, Settlement, bool)>>>);

    #[async_trait]
    impl TelemetryMiddleware for SettlementRecorder {
        async fn handle<'a>(
            &'a self,
            incoming: Incoming<'a>,
            next: MessageProcessing<'a>,
        ) -> ProcessingOutcome {
            let outcome = next.run(incoming).await;
            self.0.lock().unwrap().push((
                incoming.message.delivery_count,
                outcome.settlement(),
                outcome.result().is_ok(),
            ));
            outcome
        }
    }

    async fn handler(message: &str, context: &InvocationContext) -> Result<(), HandlerError> {
        match (message, context.delivery_count()) {
            ("order-42", 1) => Err(HandlerError::transient(anyhow::anyhow!("Try again."))),
            ("order-42", _) => Ok(()),
            _ => Err(HandlerError::permanent(anyhow::anyhow!("Unknown order."))),
        }
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let queue_name = queue_name();
    let settlements = Arc::new(Mutex::new(vec![]));

    let consumer_group = ConsumerGroup::builder(transport.clone(), DeliverySettings::new(3, 1))
        .with_telemetry_middleware(SettlementRecorder(settlements.clone()))
        .exit_after(3)
        .message_handler(MessageHandler::builder(&queue_name).handler(handler))
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["order-42", "order-0"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    // A single invocation at a time: the requeued message goes back behind `order-0`.
    assert_eq!(
        *settlements.lock().unwrap(),
        vec![
            (1, Settlement::Requeue, false),
            (1, Settlement::DeadLetter, false),
            (2, Settlement::Ack, true),
        ]
    );
}

#[tokio::test]
async fn invocation_local_items_flow_from_processing_to_telemetry_middlewares() {
    #[derive(Clone, Debug, PartialEq)]
    struct OrderId(String);

    struct Capture(Arc<Mutex<Vec<Option<OrderId>>>>);

    #[async_trait]
    impl TelemetryMiddleware for Capture {
        async fn handle<'a>(
            &'a self,
            incoming: Incoming<'a>,
            next: MessageProcessing<'a>,
        ) -> ProcessingOutcome {
            // Nothing leaks in from previous invocations.
            assert_eq!(get_invocation_local_item::<OrderId>(), None);
            let outcome = next.run(incoming).await;
            self.0
                .lock()
                .unwrap()
                .push(get_invocation_local_item::<OrderId>());
            outcome
        }
    }

    struct ExtractOrderId;

    #[async_trait]
    impl ProcessingMiddleware for ExtractOrderId {
        async fn handle<'a>(
            &'a self,
            incoming: Incoming<'a>,
            next: Next<'a>,
        ) -> Result<(), HandlerError> {
            if let Ok(payload) = incoming.payload() {
                set_invocation_local_item(OrderId(payload.to_owned()));
            }
            next.run(incoming).await
        }
    }

    async fn handler(message: &str, _context: &InvocationContext) -> Result<(), HandlerError> {
        assert_eq!(
            get_invocation_local_item::<OrderId>(),
            Some(OrderId(message.to_owned()))
        );
        Ok(())
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let queue_name = queue_name();
    let captured = Arc::new(Mutex::new(vec![]));

    let consumer_group = ConsumerGroup::builder(transport.clone(), DeliverySettings::new(3, 1))
        .with_telemetry_middleware(Capture(captured.clone()))
        .exit_after(2)
        .message_handler(
            MessageHandler::builder(&queue_name)
                .with_processing_middleware(ExtractOrderId)
                .handler(handler),
        )
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["order-42", "order-43"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    assert_eq!(
        *captured.lock().unwrap(),
        vec![
            Some(OrderId("order-42".into())),
            Some(OrderId("order-43".into())),
        ]
    );
}
