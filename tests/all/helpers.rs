use queue_trigger::configuration::DeliverySettings;
use queue_trigger::consumers::ConsumerGroup;
use queue_trigger::transport::{InMemoryTransport, QueueTransport};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Every test consumes from its own queue.
pub fn queue_name() -> String {
    Uuid::new_v4().to_string()
}

pub fn delivery_settings() -> DeliverySettings {
    DeliverySettings::new(3, 8)
}

pub fn poison_queue(queue_name: &str) -> String {
    format!("{queue_name}-poison")
}

pub async fn enqueue<I, P>(transport: &InMemoryTransport, queue_name: &str, payloads: I)
where
    I: IntoIterator<Item = P>,
    P: Into<Vec<u8>>,
{
    for payload in payloads {
        transport.enqueue(queue_name, payload.into()).await.unwrap();
    }
}

/// Run the group until it exits on its own - i.e. `exit_after` has been reached.
pub async fn run_to_completion(consumer_group: ConsumerGroup) {
    tokio::time::timeout(
        Duration::from_secs(20),
        consumer_group.run_until_shutdown(Arc::default()),
    )
    .await
    .expect("The consumer group did not exit in time.")
    .unwrap();
}
