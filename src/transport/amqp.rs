use crate::amqp::{
    configuration::RabbitMqSettings, convenience::delivery_count, ConnectionFactory,
};
use crate::pool::ConnectionPool;
use crate::transport::{
    Acknowledger, Delivery, DeliveryStream, QueueMessage, QueueTopology, QueueTransport,
    Settlement, TransportError,
};
use amq_protocol_types::{AMQPValue, FieldTable};
use futures_util::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    BasicProperties, Channel,
};
use uuid::Uuid;

/// Persistent delivery mode, as per the AMQP 0-9-1 specification.
const PERSISTENT: u8 = 2;

/// Queues hosted on a RabbitMq broker.
///
/// Connections are pooled; every subscription gets its own channel, so that prefetch limits
/// apply per queue.
///
/// # Dead-lettering
///
/// [`QueueTransport::declare_queue`] declares a quorum queue with the default exchange as its
/// dead letter exchange and the poison queue name as dead letter routing key: rejected messages
/// end up in the poison queue without any round-trip through the consumer.
///
/// Queues declared elsewhere should be quorum queues too. On a classic queue the delivery
/// count never goes past 2, so `max_delivery_count` values above 2 are never reached.
#[derive(Clone)]
pub struct AmqpTransport {
    pool: ConnectionPool,
}

impl AmqpTransport {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Build a transport with its own connection pool, holding at most `max_connections`.
    pub fn from_settings(
        settings: &RabbitMqSettings,
        max_connections: usize,
    ) -> Result<Self, anyhow::Error> {
        let pool = ConnectionPool::builder(ConnectionFactory::from_settings(settings)?)
            .max_size(max_connections)
            .build()?;
        Ok(Self::new(pool))
    }

    async fn channel(&self) -> Result<Channel, TransportError> {
        let connection = self.pool.get().await.map_err(crate::pool::Error::from)?;
        Ok(connection.create_channel().await?)
    }
}

#[async_trait::async_trait]
impl QueueTransport for AmqpTransport {
    #[tracing::instrument(name = "amqp_declare_queue", skip(self))]
    async fn declare_queue(&self, topology: &QueueTopology) -> Result<(), TransportError> {
        let channel = self.channel().await?;
        let durable = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };

        channel
            .queue_declare(
                &topology.poison_queue_name,
                durable,
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                &topology.queue_name,
                durable,
                queue_arguments(&topology.poison_queue_name),
            )
            .await?;

        let _ = channel.close(200, "OK").await;
        Ok(())
    }

    #[tracing::instrument(name = "amqp_subscribe", skip(self))]
    async fn subscribe(
        &self,
        topology: &QueueTopology,
        prefetch: u16,
    ) -> Result<DeliveryStream, TransportError> {
        let channel = self.channel().await?;
        channel
            .basic_qos(prefetch, BasicQosOptions { global: false })
            .await?;
        let consumer = channel
            .basic_consume(
                &topology.queue_name,
                &Uuid::new_v4().to_string(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let deliveries = consumer.map(move |delivery| {
            // The stream owns the channel: it is closed when the subscription is dropped.
            let _channel = &channel;

            let delivery = delivery?;
            let count = delivery_count(&delivery.properties, delivery.redelivered);
            let id = delivery
                .properties
                .message_id()
                .as_ref()
                .map(|id| id.as_str().to_owned())
                .unwrap_or_else(|| delivery.delivery_tag.to_string());
            let message = QueueMessage::new(id, delivery.data).with_delivery_count(count);
            Ok(Delivery::new(
                message,
                AmqpAcker {
                    acker: delivery.acker,
                },
            ))
        });
        Ok(deliveries.boxed())
    }

    #[tracing::instrument(name = "amqp_enqueue", skip(self, body))]
    async fn enqueue(&self, queue_name: &str, body: Vec<u8>) -> Result<String, TransportError> {
        let channel = self.channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions { nowait: false })
            .await?;

        let id = Uuid::new_v4().to_string();
        let properties = BasicProperties::default()
            .with_message_id(id.clone().into())
            .with_delivery_mode(PERSISTENT);
        channel
            .basic_publish(
                "",
                queue_name,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;

        let _ = channel.close(200, "OK").await;
        Ok(id)
    }
}

/// Arguments of the main queue.
///
/// It is a quorum queue: the broker counts deliveries in the `x-delivery-count` header, which
/// is how a message that keeps failing eventually reaches the poison queue. Rejected messages
/// are routed to the poison queue through the default exchange.
fn queue_arguments(poison_queue_name: &str) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        "x-queue-type".into(),
        AMQPValue::LongString("quorum".into()),
    );
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(String::new().into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(poison_queue_name.into()),
    );
    args
}

struct AmqpAcker {
    acker: Acker,
}

#[async_trait::async_trait]
impl Acknowledger for AmqpAcker {
    async fn settle(&self, settlement: Settlement) -> Result<(), TransportError> {
        match settlement {
            // Rejecting would route the message to the dead letter exchange.
            Settlement::Ack | Settlement::Discard => {
                self.acker
                    .ack(BasicAckOptions { multiple: false })
                    .await?;
            }
            Settlement::Requeue => {
                self.acker
                    .nack(BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    })
                    .await?;
            }
            Settlement::DeadLetter => {
                self.acker
                    .reject(BasicRejectOptions { requeue: false })
                    .await?;
            }
        }
        Ok(())
    }
}
