use crate::helpers::{delivery_settings, enqueue, poison_queue, queue_name, run_to_completion};
use async_trait::async_trait;
use queue_trigger::configuration::{DeliverySettings, TriggerBinding};
use queue_trigger::consumers::hooks::transient_error::NeverRequeue;
use queue_trigger::consumers::{ConsumerGroup, Handler, HandlerError, InvocationContext, MessageHandler};
use queue_trigger::functions::queue_trigger;
use queue_trigger::logging::{LogRecord, LogSink, MemorySink, SinkError};
use queue_trigger::transport::InMemoryTransport;
use shutdown_handler::ShutdownHandler;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

#[tokio::test]
async fn every_message_is_logged_by_the_queue_trigger_function() {
    // Arrange
    let transport = InMemoryTransport::new();
    let sink = MemorySink::new();
    let queue_name = queue_name();
    let binding = TriggerBinding::new(&queue_name, "QUEUE_CONNECTION");

    let consumer_group = ConsumerGroup::builder(transport.clone(), delivery_settings())
        .with_log_sink(sink.clone())
        .exit_after(3)
        .message_handler(queue_trigger(&binding).unwrap())
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["order-42", "", "order-43"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    let mut messages = sink.messages();
    messages.sort();
    assert_eq!(
        messages,
        vec![
            "Queue trigger function processed: ",
            "Queue trigger function processed: order-42",
            "Queue trigger function processed: order-43",
        ]
    );
    assert!(sink.records().iter().all(|r| r.queue_name == queue_name));
    assert_eq!(transport.len(&queue_name), 0);
    assert_eq!(transport.len(&poison_queue(&queue_name)), 0);
}

#[tokio::test]
async fn the_consumer_group_waits_for_completion_of_in_flight_processing_before_exiting() {
    struct SlowHandler {
        completed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Handler for SlowHandler {
        async fn handle(&self, _message: &str, _context: &InvocationContext) -> Result<(), HandlerError> {
            // Take a long-ish time to process the message.
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.completed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let queue_name = queue_name();
    let completed = Arc::new(AtomicBool::new(false));

    let consumer_group = ConsumerGroup::builder(transport.clone(), delivery_settings())
        .exit_after(1)
        .message_handler(MessageHandler::builder(&queue_name).raw_handler(SlowHandler {
            completed: completed.clone(),
        }))
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["Not relevant"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    assert!(completed.load(Ordering::SeqCst));
    assert_eq!(transport.len(&queue_name), 0);
}

#[tokio::test]
async fn a_panicking_handler_does_not_take_the_consumer_down() {
    async fn handler(message: &str, context: &InvocationContext) -> Result<(), HandlerError> {
        if message == "boom" {
            panic!("Kaboom.");
        }
        context.log_information("processed: {item}", &[("item", &message)]);
        Ok(())
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let sink = MemorySink::new();
    let queue_name = queue_name();

    let consumer_group = ConsumerGroup::builder(transport.clone(), delivery_settings())
        .with_log_sink(sink.clone())
        .transient_error_hook(NeverRequeue)
        .exit_after(3)
        .message_handler(MessageHandler::builder(&queue_name).handler(handler))
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["first", "boom", "second"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    let mut messages = sink.messages();
    messages.sort();
    assert_eq!(messages, vec!["processed: first", "processed: second"]);
    let poisoned = transport.try_dequeue(&poison_queue(&queue_name)).unwrap();
    assert_eq!(poisoned.body, b"boom");
}

#[tokio::test]
async fn concurrent_invocations_are_bounded_by_the_delivery_settings() {
    #[derive(Default)]
    struct Tracking {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        processed: Mutex<Vec<String>>,
    }

    struct TrackingHandler(Arc<Tracking>);

    #[async_trait]
    impl Handler for TrackingHandler {
        async fn handle(&self, message: &str, _context: &InvocationContext) -> Result<(), HandlerError> {
            let current = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.0.processed.lock().unwrap().push(message.to_owned());
            self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let queue_name = queue_name();
    let tracking = Arc::new(Tracking::default());
    let payloads: Vec<String> = (0..20).map(|i| format!("order-{i}")).collect();

    let consumer_group = ConsumerGroup::builder(transport.clone(), DeliverySettings::new(3, 4))
        .exit_after(payloads.len())
        .message_handler(MessageHandler::builder(&queue_name).raw_handler(TrackingHandler(tracking.clone())))
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, payloads.clone()).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    let max_in_flight = tracking.max_in_flight.load(Ordering::SeqCst);
    assert!(max_in_flight <= 4, "{max_in_flight} invocations ran concurrently");
    assert!(max_in_flight > 1, "Invocations were not run concurrently");
    let mut processed = tracking.processed.lock().unwrap().clone();
    processed.sort();
    let mut expected = payloads;
    expected.sort();
    assert_eq!(processed, expected);
}

#[tokio::test]
async fn each_queue_is_dispatched_to_its_own_handler() {
    async fn orders(message: &str, context: &InvocationContext) -> Result<(), HandlerError> {
        context.log_information("order: {item}", &[("item", &message)]);
        Ok(())
    }

    async fn refunds(message: &str, context: &InvocationContext) -> Result<(), HandlerError> {
        context.log_information("refund: {item}", &[("item", &message)]);
        Ok(())
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let sink = MemorySink::new();
    let orders_queue = queue_name();
    let refunds_queue = queue_name();

    let consumer_group = ConsumerGroup::builder(transport.clone(), delivery_settings())
        .with_log_sink(sink.clone())
        .exit_after(1)
        .message_handler(MessageHandler::builder(&orders_queue).handler(orders))
        .message_handler(MessageHandler::builder(&refunds_queue).handler(refunds))
        .build()
        .await
        .unwrap();
    enqueue(&transport, &orders_queue, ["42"]).await;
    enqueue(&transport, &refunds_queue, ["43"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    let records = sink.records();
    let logged_for = |queue: &str| -> Vec<String> {
        records
            .iter()
            .filter(|r| r.queue_name == queue)
            .map(|r| r.message.clone())
            .collect()
    };
    assert_eq!(logged_for(&orders_queue), vec!["order: 42"]);
    assert_eq!(logged_for(&refunds_queue), vec!["refund: 43"]);
}

#[tokio::test]
async fn a_failing_log_sink_does_not_fail_the_invocation() {
    struct FailingSink;

    impl LogSink for FailingSink {
        fn write(&self, _record: &LogRecord) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("disk full".into()))
        }
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let queue_name = queue_name();
    let binding = TriggerBinding::new(&queue_name, "QUEUE_CONNECTION");

    let consumer_group = ConsumerGroup::builder(transport.clone(), delivery_settings())
        .with_log_sink(FailingSink)
        .exit_after(1)
        .message_handler(queue_trigger(&binding).unwrap())
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["order-42"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert - the message was acknowledged
    assert_eq!(transport.len(&queue_name), 0);
    assert_eq!(transport.len(&poison_queue(&queue_name)), 0);
}

#[tokio::test]
async fn consumers_shut_down_on_signal() {
    struct BlockedHandler {
        gate: Arc<RwLock<()>>,
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for BlockedHandler {
        async fn handle(&self, _message: &str, _context: &InvocationContext) -> Result<(), HandlerError> {
            let _pass = self.gate.write().await;
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let queue_name = queue_name();
    let gate = Arc::new(RwLock::new(()));
    let count = Arc::new(AtomicUsize::new(0));

    let consumer_group = ConsumerGroup::builder(transport.clone(), DeliverySettings::new(3, 5))
        .message_handler(MessageHandler::builder(&queue_name).raw_handler(BlockedHandler {
            gate: gate.clone(),
            count: count.clone(),
        }))
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, vec!["Not relevant"; 20]).await;

    // this ensures that the handlers don't complete until we want them to
    let guard = gate.read().await;
    let shutdown = Arc::new(ShutdownHandler::new());

    // Act
    let handle = tokio::spawn(consumer_group.run_until_shutdown(shutdown.clone()));
    // wait for every invocation slot to be taken
    while transport.len(&queue_name) > 15 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.shutdown();
    // allow handlers to run. they should all drain out before the consumers exit gracefully
    drop(guard);

    handle.await.unwrap().unwrap();

    // Assert
    assert_eq!(count.load(Ordering::SeqCst), 5);
    assert_eq!(transport.len(&queue_name), 15);
}
