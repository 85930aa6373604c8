use lapin::types::AMQPValue;
use std::borrow::Borrow;

/// The header RabbitMq quorum queues use to track how many times a message was delivered.
pub const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// Convenience methods for [`lapin::BasicProperties`].
pub trait BasicPropertiesExt {
    /// Lookup header by key.
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized;

    /// Lookup a header integer value, whatever its width.
    ///
    /// Returns `None` if not an integer or negative.
    fn get_header_u64<Q>(&self, key: &Q) -> Option<u64>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        match self.get_header(key)? {
            AMQPValue::ShortShortUInt(v) => Some(u64::from(*v)),
            AMQPValue::ShortUInt(v) => Some(u64::from(*v)),
            AMQPValue::LongUInt(v) => Some(u64::from(*v)),
            AMQPValue::ShortShortInt(v) => u64::try_from(*v).ok(),
            AMQPValue::ShortInt(v) => u64::try_from(*v).ok(),
            AMQPValue::LongInt(v) => u64::try_from(*v).ok(),
            AMQPValue::LongLongInt(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl BasicPropertiesExt for lapin::BasicProperties {
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.headers().as_ref()?.inner().get(key)
    }
}

/// How many times a message has been delivered, this delivery included.
///
/// Quorum queues - the kind [`AmqpTransport`](crate::transport::AmqpTransport) declares - track
/// previous deliveries in the `x-delivery-count` header.
/// Classic queues only tell us whether the message was delivered before, so the count is
/// capped at 2 for them.
pub fn delivery_count(properties: &lapin::BasicProperties, redelivered: bool) -> u32 {
    match properties.get_header_u64(DELIVERY_COUNT_HEADER) {
        Some(previous) => u32::try_from(previous.saturating_add(1)).unwrap_or(u32::MAX),
        None if redelivered => 2,
        None => 1,
    }
}
