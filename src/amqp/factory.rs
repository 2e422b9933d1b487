use std::time::Duration;

use amq_protocol_types::LongString;
use lapin::{uri::AMQPUri, ConnectionProperties, ConnectionState};
use tokio::runtime::Handle;
use tokio::time::timeout;
use tracing::warn;

use crate::amqp::configuration::ConnectionSettings;
use crate::retry::Retryable;

/// Opens new connections to a RabbitMq broker.
///
/// [`LapinConnectionFactory`] is the implementation you want in production, but you can
/// plug your own (e.g. an in-memory fake in tests).
#[async_trait::async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: BrokerConnection;

    /// Open a new connection. `connection_name` is advertised to the broker, so it shows up
    /// in the management UI.
    async fn connect(&self, connection_name: &str) -> Result<Self::Connection, TransportError>;
}

/// A live connection whose health can be inspected.
pub trait BrokerConnection: Send + Sync + 'static {
    fn is_open(&self) -> bool;
}

impl BrokerConnection for lapin::Connection {
    fn is_open(&self) -> bool {
        matches!(self.status().state(), ConnectionState::Connected)
    }
}

/// Failure to open a connection.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The AMQP client reported a protocol or network failure.
    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),
    #[error("Timed out after {0:?} while connecting to the broker")]
    Timeout(Duration),
    /// Anything else, e.g. a misconfigured factory.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Broker(_) | TransportError::Timeout(_) => true,
            TransportError::Other(_) => false,
        }
    }
}

#[derive(Clone)]
/// All the information required to connect to a RabbitMq broker using [`lapin`].
pub struct LapinConnectionFactory {
    uri: AMQPUri,
    /// The timeout observed when trying to connect to RabbitMq.
    connection_timeout: Duration,
    /// The runtime driving lapin's background work.
    /// If `None`, the runtime of the caller is used.
    runtime: Option<Handle>,
}

impl LapinConnectionFactory {
    /// Create a new connection factory from settings.
    ///
    /// If the connection timeout is left unspecified, it will be defaulted to 10 seconds.
    pub fn new_from_config(settings: &ConnectionSettings) -> Result<Self, crate::Error> {
        Ok(Self {
            uri: settings.amqp_uri()?,
            connection_timeout: settings.connection_timeout(),
            runtime: None,
        })
    }

    /// Run connection I/O on a dedicated runtime instead of the caller's.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn executor(&self) -> tokio_executor_trait::Tokio {
        match &self.runtime {
            Some(handle) => tokio_executor_trait::Tokio::default().with_handle(handle.clone()),
            None => tokio_executor_trait::Tokio::current(),
        }
    }
}

#[async_trait::async_trait]
impl ConnectionFactory for LapinConnectionFactory {
    type Connection = lapin::Connection;

    #[tracing::instrument(name = "rabbitmq_connect", skip(self))]
    async fn connect(&self, connection_name: &str) -> Result<lapin::Connection, TransportError> {
        let properties = ConnectionProperties::default()
            .with_executor(self.executor())
            .with_connection_name(LongString::from(connection_name));
        let connection = timeout(
            self.connection_timeout,
            lapin::Connection::connect_uri(self.uri.clone(), properties),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.connection_timeout))??;
        // Register a callback to log connection errors.
        let name = connection_name.to_owned();
        connection.on_error(move |e| {
            warn!("RabbitMQ broken connection <{}>: {:?}", name, e);
        });
        Ok(connection)
    }
}
