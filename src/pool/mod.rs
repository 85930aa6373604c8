//! Pooling of [`lapin::Connection`]s using [`deadpool`].
//!
//! Broken connections are disposed of and recreated on demand, while healthy ones are shared
//! by all the channels the [`AmqpTransport`](crate::transport::AmqpTransport) opens.
//!
//! ```rust
//! use queue_trigger::pool::ConnectionPool;
//! use queue_trigger::amqp::ConnectionFactory;
//! use queue_trigger::amqp::configuration::RabbitMqSettings;
//!
//! fn example() -> anyhow::Result<ConnectionPool> {
//!     let settings = RabbitMqSettings::default();
//!     let pool = ConnectionPool::builder(ConnectionFactory::from_settings(&settings)?)
//!         .max_size(4)
//!         .build()?;
//!     Ok(pool)
//! }
//! ```

mod connection;
mod error;

pub use connection::ConnectionPool;
pub use error::Error;
