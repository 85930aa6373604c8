use crate::transport::{
    Acknowledger, Delivery, DeliveryStream, QueueMessage, QueueTopology, QueueTransport,
    Settlement, TransportError,
};
use futures_util::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

/// In-process queues.
///
/// Queues are created on first use. Any number of subscribers can compete for the messages of
/// the same queue.
///
/// A delivery that is dropped without being settled is put back on its queue: it plays the role
/// of a visibility timeout expiring on a remote queue.
///
/// `InMemoryTransport` is cheap to clone - clones share the same queues.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    queues: Arc<Mutex<HashMap<String, Arc<Queue>>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<Queue> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Queue::new(name)))
            .clone()
    }

    /// The number of messages waiting in `queue_name`.
    pub fn len(&self, queue_name: &str) -> usize {
        self.queue(queue_name).depth.load(Ordering::SeqCst)
    }

    /// Take the next message out of `queue_name` without going through a subscription.
    ///
    /// It returns `None` if the queue is empty or a subscriber is currently waiting on it.
    pub fn try_dequeue(&self, queue_name: &str) -> Option<QueueMessage> {
        self.queue(queue_name).try_pop()
    }

    /// The names of all the queues that have been used so far, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = queues.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait::async_trait]
impl QueueTransport for InMemoryTransport {
    async fn declare_queue(&self, topology: &QueueTopology) -> Result<(), TransportError> {
        self.queue(&topology.queue_name);
        self.queue(&topology.poison_queue_name);
        Ok(())
    }

    async fn subscribe(
        &self,
        topology: &QueueTopology,
        _prefetch: u16,
    ) -> Result<DeliveryStream, TransportError> {
        let queue = self.queue(&topology.queue_name);
        let poison = self.queue(&topology.poison_queue_name);

        let deliveries = stream::unfold((queue, poison), |(queue, poison)| async move {
            let message = queue.pop().await?;
            let acker = InMemoryAcker {
                message: message.clone(),
                queue: queue.clone(),
                poison: poison.clone(),
                settled: AtomicBool::new(false),
            };
            Some((Ok(Delivery::new(message, acker)), (queue, poison)))
        });
        Ok(Box::pin(deliveries))
    }

    async fn enqueue(&self, queue_name: &str, body: Vec<u8>) -> Result<String, TransportError> {
        let id = Uuid::new_v4().to_string();
        self.queue(queue_name)
            .push(QueueMessage::new(id.clone(), body).with_delivery_count(0))?;
        Ok(id)
    }
}

struct Queue {
    name: String,
    sender: mpsc::UnboundedSender<QueueMessage>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueueMessage>>,
    depth: AtomicUsize,
}

impl Queue {
    fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.to_owned(),
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            depth: AtomicUsize::new(0),
        }
    }

    /// Stored messages carry the number of deliveries performed so far.
    fn push(&self, message: QueueMessage) -> Result<(), TransportError> {
        // Count first: a concurrent `pop` must never observe the message before the increment.
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.sender.send(message).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            TransportError::QueueClosed(self.name.clone())
        })
    }

    async fn pop(&self) -> Option<QueueMessage> {
        let message = self.receiver.lock().await.recv().await?;
        Some(self.delivered(message))
    }

    fn try_pop(&self) -> Option<QueueMessage> {
        let message = self.receiver.try_lock().ok()?.try_recv().ok()?;
        Some(self.delivered(message))
    }

    fn delivered(&self, mut message: QueueMessage) -> QueueMessage {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        message.delivery_count += 1;
        message
    }
}

struct InMemoryAcker {
    message: QueueMessage,
    queue: Arc<Queue>,
    poison: Arc<Queue>,
    settled: AtomicBool,
}

#[async_trait::async_trait]
impl Acknowledger for InMemoryAcker {
    async fn settle(&self, settlement: Settlement) -> Result<(), TransportError> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadySettled);
        }
        match settlement {
            Settlement::Ack | Settlement::Discard => Ok(()),
            Settlement::Requeue => self.queue.push(self.message.clone()),
            // The message starts afresh in the poison queue.
            Settlement::DeadLetter => self
                .poison
                .push(self.message.clone().with_delivery_count(0)),
        }
    }
}

impl Drop for InMemoryAcker {
    fn drop(&mut self) {
        if !*self.settled.get_mut() {
            tracing::debug!(
                queue_name = %self.queue.name,
                message_id = %self.message.id,
                "Delivery dropped without being settled, requeueing it."
            );
            let _ = self.queue.push(self.message.clone());
        }
    }
}
