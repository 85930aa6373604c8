use crate::amqp::ConnectionFactory;
use deadpool::managed::{Manager, RecycleError, RecycleResult};
use lapin::{Connection, ConnectionState};

/// A pool of [`lapin::Connection`]s, opened on demand by a [`ConnectionFactory`].
pub type ConnectionPool = deadpool::managed::Pool<ConnectionFactory>;

#[async_trait::async_trait]
impl Manager for ConnectionFactory {
    type Type = Connection;
    type Error = super::Error;

    async fn create(&self) -> Result<Connection, super::Error> {
        Ok(self.connect().await?)
    }

    /// Connections that are closing, closed or in error are dropped.
    async fn recycle(&self, connection: &mut Connection) -> RecycleResult<super::Error> {
        let state = connection.status().state();
        if let ConnectionState::Connected = state {
            return Ok(());
        }
        tracing::debug!(?state, "Discarding a pooled RabbitMq connection.");
        Err(RecycleError::Message(format!(
            "The connection is no longer usable ({state:?})."
        )))
    }
}
