use crate::helpers::{delivery_settings, enqueue, poison_queue, queue_name, run_to_completion};
use async_trait::async_trait;
use queue_trigger::configuration::DeliverySettings;
use queue_trigger::consumers::{
    ConsumerGroup, ErrorType, HandlerError, Incoming, InvocationContext, MessageHandler, Next,
    ProcessingMiddleware,
};
use queue_trigger::functions::log_queue_item;
use queue_trigger::logging::MemorySink;
use queue_trigger::transport::InMemoryTransport;

/// Reject messages that do not look like an order before they reach the handler.
struct RejectNonOrders;

#[async_trait]
impl ProcessingMiddleware for RejectNonOrders {
    async fn handle<'a>(
        &'a self,
        incoming: Incoming<'a>,
        next: Next<'a>,
    ) -> Result<(), HandlerError> {
        match incoming.payload() {
            Ok(payload) if payload.starts_with("order-") => next.run(incoming).await,
            _ => Err(HandlerError::permanent(anyhow::anyhow!("Not an order."))),
        }
    }
}

/// Give up on the first failure, whatever the handler reported.
struct FailFast;

#[async_trait]
impl ProcessingMiddleware for FailFast {
    async fn handle<'a>(
        &'a self,
        incoming: Incoming<'a>,
        next: Next<'a>,
    ) -> Result<(), HandlerError> {
        next.run(incoming).await.map_err(|e| match e.error_type {
            ErrorType::Transient => HandlerError::permanent(e.inner_error),
            ErrorType::Permanent => e,
        })
    }
}

#[tokio::test]
async fn a_processing_middleware_can_short_circuit_the_handler() {
    // Arrange
    let transport = InMemoryTransport::new();
    let sink = MemorySink::new();
    let queue_name = queue_name();

    let consumer_group = ConsumerGroup::builder(transport.clone(), delivery_settings())
        .with_log_sink(sink.clone())
        .with_processing_middleware(RejectNonOrders)
        .exit_after(2)
        .message_handler(MessageHandler::builder(&queue_name).handler(log_queue_item))
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["order-42", "refund-7"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    assert_eq!(
        sink.messages(),
        vec!["Queue trigger function processed: order-42"]
    );
    let poisoned = transport.try_dequeue(&poison_queue(&queue_name)).unwrap();
    assert_eq!(poisoned.body, b"refund-7");
}

#[tokio::test]
async fn a_processing_middleware_can_change_the_outcome_of_the_handler() {
    async fn handler(_message: &str, _context: &InvocationContext) -> Result<(), HandlerError> {
        Err(HandlerError::transient(anyhow::anyhow!("Service unavailable.")))
    }

    // Arrange
    let transport = InMemoryTransport::new();
    let queue_name = queue_name();

    // Without the middleware the message would be delivered 5 times.
    let consumer_group = ConsumerGroup::builder(transport.clone(), DeliverySettings::new(5, 1))
        .exit_after(1)
        .message_handler(
            MessageHandler::builder(&queue_name)
                .with_processing_middleware(FailFast)
                .handler(handler),
        )
        .build()
        .await
        .unwrap();
    enqueue(&transport, &queue_name, ["order-42"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    assert_eq!(transport.len(&queue_name), 0);
    assert_eq!(transport.len(&poison_queue(&queue_name)), 1);
}
