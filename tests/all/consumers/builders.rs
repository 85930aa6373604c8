use crate::helpers::{delivery_settings, enqueue, poison_queue, queue_name, run_to_completion};
use queue_trigger::configuration::DeliverySettings;
use queue_trigger::consumers::{ConsumerGroup, HandlerError, InvocationContext, MessageHandler};
use queue_trigger::functions::log_queue_item;
use queue_trigger::logging::MemorySink;
use queue_trigger::transport::InMemoryTransport;

async fn always_fails(_message: &str, _context: &InvocationContext) -> Result<(), HandlerError> {
    Err(HandlerError::transient(anyhow::anyhow!("Service unavailable.")))
}

#[tokio::test]
async fn a_queue_cannot_be_bound_to_more_than_one_handler() {
    // Arrange
    let queue_name = queue_name();

    // Act
    let outcome = ConsumerGroup::builder(InMemoryTransport::new(), delivery_settings())
        .message_handler(MessageHandler::builder(&queue_name).handler(log_queue_item))
        .message_handler(MessageHandler::builder(&queue_name).handler(always_fails))
        .build()
        .await;

    // Assert
    let error = outcome.err().unwrap();
    assert!(error.to_string().contains(&queue_name));
}

#[tokio::test]
async fn queues_that_only_clash_once_prefixed_are_rejected() {
    // Act
    let outcome = ConsumerGroup::builder(InMemoryTransport::new(), delivery_settings())
        .queue_name_prefix("test")
        .message_handler(MessageHandler::builder("items").handler(log_queue_item))
        .message_handler(MessageHandler::builder("items").handler(log_queue_item))
        .build()
        .await;

    // Assert
    assert!(outcome.is_err());
}

#[tokio::test]
async fn empty_queue_names_are_rejected() {
    // Act
    let outcome = ConsumerGroup::builder(InMemoryTransport::new(), delivery_settings())
        .message_handler(MessageHandler::builder("  ").handler(log_queue_item))
        .build()
        .await;

    // Assert
    assert!(outcome.is_err());
}

#[tokio::test]
async fn invalid_delivery_settings_are_rejected() {
    // Act
    let no_delivery_attempts = ConsumerGroup::builder(InMemoryTransport::new(), DeliverySettings::new(0, 1))
        .message_handler(MessageHandler::builder(queue_name()).handler(log_queue_item))
        .build()
        .await;
    let no_concurrency = ConsumerGroup::builder(InMemoryTransport::new(), delivery_settings())
        .message_handler(
            MessageHandler::builder(queue_name())
                .with_delivery_settings(DeliverySettings::new(3, 0))
                .handler(log_queue_item),
        )
        .build()
        .await;

    // Assert
    assert!(no_delivery_attempts.is_err());
    assert!(no_concurrency.is_err());
}

#[tokio::test]
async fn the_queue_name_prefix_is_applied_to_every_handler() {
    // Arrange
    let transport = InMemoryTransport::new();
    let sink = MemorySink::new();
    let queue_name = queue_name();

    let consumer_group = ConsumerGroup::builder(transport.clone(), delivery_settings())
        .with_log_sink(sink.clone())
        .queue_name_prefix("staging")
        .exit_after(1)
        .message_handler(MessageHandler::builder(&queue_name).handler(log_queue_item))
        .build()
        .await
        .unwrap();
    let prefixed = format!("staging_{queue_name}");
    assert_eq!(consumer_group.queue_names(), vec![prefixed.as_str()]);
    enqueue(&transport, &prefixed, ["order-42"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    assert_eq!(
        sink.messages(),
        vec!["Queue trigger function processed: order-42"]
    );
    assert_eq!(sink.records()[0].queue_name, prefixed);
}

#[tokio::test]
async fn handler_level_delivery_settings_override_the_group_ones() {
    // Arrange
    let transport = InMemoryTransport::new();
    let patient = queue_name();
    let impatient = queue_name();

    let consumer_group = ConsumerGroup::builder(transport.clone(), DeliverySettings::new(2, 1))
        .exit_after(2)
        .message_handler(MessageHandler::builder(&patient).handler(always_fails))
        .message_handler(
            MessageHandler::builder(&impatient)
                .with_delivery_settings(DeliverySettings::new(1, 1))
                .handler(always_fails),
        )
        .build()
        .await
        .unwrap();
    // Two messages for the impatient queue: both are dead-lettered on their first delivery.
    enqueue(&transport, &patient, ["order-42"]).await;
    enqueue(&transport, &impatient, ["order-43", "order-44"]).await;

    // Act
    run_to_completion(consumer_group).await;

    // Assert
    assert_eq!(transport.len(&poison_queue(&patient)), 1);
    assert_eq!(transport.len(&poison_queue(&impatient)), 2);
}
