use crate::amqp::TransportError;

/// Everything that can go wrong when building a [`ConnectionManager`](crate::ConnectionManager)
/// or asking it for a connection.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Every attempt to open the connection failed with a transient broker error.
    #[error("Failed to open connection <{id}> after {attempts} attempts")]
    RetriesExhausted {
        id: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    /// The connection was resolved, but the broker no longer considers it open.
    #[error("Connection <{id}> is not open")]
    ConnectionNotOpen { id: String },
    /// The connection could not be opened and retrying would not help.
    #[error("Failed to open connection <{id}>")]
    NonRetryable {
        id: String,
        #[source]
        source: TransportError,
    },
    /// The requested feature is not available.
    #[error("{0} is not yet implemented")]
    NotImplemented(&'static str),
    #[error("Invalid connection settings")]
    InvalidSettings(#[source] anyhow::Error),
}
