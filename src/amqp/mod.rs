//! RabbitMq plumbing behind [`AmqpTransport`](crate::transport::AmqpTransport): settings,
//! connection factory and header helpers.
pub mod configuration;
pub mod convenience;
mod factory;

pub use factory::ConnectionFactory;
