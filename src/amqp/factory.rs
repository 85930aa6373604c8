use crate::amqp::configuration::RabbitMqSettings;
use lapin::tcp::{AMQPUriTcpExt, NativeTlsConnector};
use lapin::uri::{AMQPScheme, AMQPUri};
use lapin::{Connection, ConnectionProperties};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// How consumers show up in the broker's list of client connections.
const CONNECTION_NAME: &str = "queue-trigger";

/// Opens connections to the broker described by a [`RabbitMqSettings`].
///
/// It is the [`deadpool`] manager behind [`ConnectionPool`](crate::pool::ConnectionPool): you
/// rarely need to call [`ConnectionFactory::connect`] yourself.
#[derive(Clone)]
pub struct ConnectionFactory {
    uri: AMQPUri,
    connection_timeout: Duration,
    /// `None` for plain-text connections.
    tls: Option<Arc<TlsTarget>>,
}

struct TlsTarget {
    connector: NativeTlsConnector,
    /// Expected on the server certificate.
    domain: String,
}

impl TlsTarget {
    fn from_settings(settings: &RabbitMqSettings) -> Result<Option<Self>, anyhow::Error> {
        let Some(tls) = settings.tls.as_ref() else {
            return Ok(None);
        };
        let mut builder = NativeTlsConnector::builder();
        if let Some(root) = tls.ca_certificate_chain()? {
            builder.add_root_certificate(root);
        }
        Ok(Some(Self {
            connector: builder.build()?,
            domain: tls.domain.clone().unwrap_or_else(|| settings.uri.clone()),
        }))
    }
}

impl ConnectionFactory {
    /// Fails if the TLS settings hold an invalid certificate chain.
    ///
    /// Connection attempts give up after 10 seconds unless `settings` say otherwise.
    pub fn from_settings(settings: &RabbitMqSettings) -> Result<Self, anyhow::Error> {
        Ok(Self {
            uri: settings.amqp_uri(),
            connection_timeout: settings
                .connection_timeout()
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            tls: TlsTarget::from_settings(settings)?.map(Arc::new),
        })
    }

    /// Open a new connection, over TLS if the settings asked for it.
    #[tracing::instrument(
        name = "rabbitmq_connect",
        skip(self),
        fields(host = %self.uri.authority.host, tls = self.tls.is_some())
    )]
    pub async fn connect(&self) -> Result<Connection, anyhow::Error> {
        let properties = ConnectionProperties::default()
            .with_connection_name(CONNECTION_NAME.into())
            .with_executor(tokio_executor_trait::Tokio::current());

        let connection = tokio::time::timeout(self.connection_timeout, self.open(properties))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Gave up connecting to RabbitMq after {:?}.",
                    self.connection_timeout
                )
            })??;
        connection.on_error(|error| {
            tracing::error!(error = ?error, "The RabbitMq connection broke.");
        });
        Ok(connection)
    }

    async fn open(&self, properties: ConnectionProperties) -> Result<Connection, lapin::Error> {
        let Some(tls) = self.tls.clone() else {
            return Connection::connect_uri(self.uri.clone(), properties).await;
        };
        // The TLS handshake runs on top of a plain AMQP socket.
        let connect = move |uri: &AMQPUri| {
            let mut plain = uri.clone();
            plain.scheme = AMQPScheme::AMQP;
            plain
                .connect()
                .and_then(|stream| stream.into_native_tls(&tls.connector, &tls.domain))
        };
        Connection::connector(self.uri.clone(), Box::new(connect), properties).await
    }
}
