//! The entry point: named connections, opened on first use and cached afterwards.
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::amqp::configuration::ConnectionSettings;
use crate::amqp::{ConnectionFactory, LapinConnectionFactory};
use crate::registry::{ConnectionHandle, ConnectionRegistry, HealthStatus};
use crate::retry::{RetryError, RetryPolicy};
use crate::Error;

/// Hands out named connections to a RabbitMq broker.
///
/// The first call to [`ConnectionManager::get_connection`] for an identifier opens a new
/// connection, retrying transient broker failures according to
/// [`ConnectionSettings::connection_attempts`] and [`ConnectionSettings::attempt_delay_seconds`].
/// Later calls for the same identifier return the very same connection.
///
/// # Stale connections
///
/// Connections are checked on every call, cached or not. A connection that has been closed
/// (e.g. the broker went away) is reported as [`Error::ConnectionNotOpen`]: it is never
/// replaced behind your back.
///
/// # Example
///
/// ```rust,no_run
/// use warren::amqp::configuration::ConnectionSettings;
/// use warren::ConnectionManager;
///
/// async fn example() -> Result<(), warren::Error> {
///     let manager = ConnectionManager::lapin(ConnectionSettings::default())?;
///
///     let connection = manager.get_connection("producer-1").await?;
///     let channel = connection.connection().create_channel().await;
///     # drop(channel);
///     Ok(())
/// }
/// ```
pub struct ConnectionManager<F: ConnectionFactory> {
    settings: ConnectionSettings,
    retry_policy: RetryPolicy,
    factory: F,
    registry: ConnectionRegistry<F::Connection>,
}

impl ConnectionManager<LapinConnectionFactory> {
    /// Build a manager opening connections with [`lapin`].
    pub fn lapin(settings: ConnectionSettings) -> Result<Self, Error> {
        // `new` checks again, but TLS must be refused before the uri is parsed.
        ensure_tls_is_supported(&settings)?;
        let factory = LapinConnectionFactory::new_from_config(&settings)?;
        Self::new(settings, factory)
    }

    /// Same as [`ConnectionManager::lapin`], but connections are driven by `runtime` instead of
    /// the runtime of the caller.
    pub fn lapin_with_runtime(settings: ConnectionSettings, runtime: Handle) -> Result<Self, Error> {
        // Same as in `lapin`: refuse TLS before parsing the uri.
        ensure_tls_is_supported(&settings)?;
        let factory = LapinConnectionFactory::new_from_config(&settings)?.with_runtime(runtime);
        Self::new(settings, factory)
    }
}

impl<F: ConnectionFactory> ConnectionManager<F> {
    /// Build a manager on top of a custom [`ConnectionFactory`].
    ///
    /// It fails if TLS is enabled in `settings` or if the retry settings are invalid.
    /// No connection is opened until [`ConnectionManager::get_connection`] is called.
    pub fn new(settings: ConnectionSettings, factory: F) -> Result<Self, Error> {
        ensure_tls_is_supported(&settings)?;
        let retry_policy = settings.retry_policy()?;
        Ok(Self {
            settings,
            retry_policy,
            factory,
            registry: ConnectionRegistry::new(),
        })
    }

    /// Get the connection registered under `id`, opening it if necessary.
    ///
    /// The identifier is used as connection name on the broker side.
    #[tracing::instrument(skip(self))]
    pub async fn get_connection(
        &self,
        id: &str,
    ) -> Result<Arc<ConnectionHandle<F::Connection>>, Error> {
        let handle = self
            .registry
            .get_or_try_insert_with(id, || {
                self.retry_policy.execute(|| self.factory.connect(id))
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted {
                    attempts,
                    last_error,
                } => Error::RetriesExhausted {
                    id: id.to_owned(),
                    attempts,
                    source: last_error,
                },
                RetryError::Fatal(source) => Error::NonRetryable {
                    id: id.to_owned(),
                    source,
                },
            })?;

        if !handle.is_open() {
            return Err(Error::ConnectionNotOpen { id: id.to_owned() });
        }
        Ok(handle)
    }

    /// The health of every connection opened so far, sorted by identifier.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let mut report = Vec::new();
        for id in self.registry.ids().await {
            if let Some(status) = self.registry.status(&id).await {
                report.push((id, status));
            }
        }
        report
    }

    pub fn registry(&self) -> &ConnectionRegistry<F::Connection> {
        &self.registry
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }
}

fn ensure_tls_is_supported(settings: &ConnectionSettings) -> Result<(), Error> {
    if settings.tls.enabled {
        return Err(Error::NotImplemented("TLS"));
    }
    Ok(())
}
