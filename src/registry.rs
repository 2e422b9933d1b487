//! An in-memory table of named connections with get-or-create semantics.
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::amqp::BrokerConnection;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// A live connection, registered under the identifier it was opened with.
///
/// Handles are owned by the registry: you get a shared reference to them and you should not
/// close the underlying connection yourself.
#[derive(Debug)]
pub struct ConnectionHandle<C> {
    id: String,
    connection: C,
}

impl<C: BrokerConnection> ConnectionHandle<C> {
    pub(crate) fn new(id: String, connection: C) -> Self {
        Self { id, connection }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    pub fn status(&self) -> HealthStatus {
        if self.is_open() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl<C> AsRef<C> for ConnectionHandle<C> {
    fn as_ref(&self) -> &C {
        &self.connection
    }
}

type Slot<C> = Arc<OnceCell<Arc<ConnectionHandle<C>>>>;

/// `ConnectionRegistry` maps identifiers to connection handles.
///
/// # Locking
///
/// The table lock is only held to find or insert the slot for an identifier.
/// Each slot has its own guard: while a connection is being opened for `a`, other callers
/// asking for `a` wait for that attempt to complete, but callers asking for `b` are not
/// affected.
///
/// A slot is filled at most once. If opening the connection fails the slot is discarded, once
/// no other caller is waiting on it, and the next caller gets to try again.
pub struct ConnectionRegistry<C> {
    slots: Mutex<HashMap<String, Slot<C>>>,
}

impl<C: BrokerConnection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: BrokerConnection> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the handle registered under `id`, invoking `open` to create it if there is
    /// none yet.
    ///
    /// `open` is never invoked concurrently for the same `id`.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        id: &str,
        open: F,
    ) -> Result<Arc<ConnectionHandle<C>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, E>>,
    {
        let slot = self.slot(id).await;
        if let Some(handle) = slot.get() {
            debug!("Connection with id: <{id}> taken from cache.");
            return Ok(Arc::clone(handle));
        }
        let mut created = false;
        let outcome = slot
            .get_or_try_init(|| async {
                created = true;
                debug!("Creating new connection with id: <{id}>.");
                let connection = open().await?;
                Ok::<_, E>(Arc::new(ConnectionHandle::new(id.to_owned(), connection)))
            })
            .await
            .map(Arc::clone);
        match outcome {
            Ok(handle) => {
                if !created {
                    // Another caller opened it while we were waiting.
                    debug!("Connection with id: <{id}> taken from cache.");
                }
                Ok(handle)
            }
            Err(e) => {
                self.release(id, slot).await;
                Err(e)
            }
        }
    }

    /// The handle registered under `id`, if any.
    pub async fn get(&self, id: &str) -> Option<Arc<ConnectionHandle<C>>> {
        let slots = self.slots.lock().await;
        slots.get(id).and_then(|slot| slot.get()).cloned()
    }

    /// Report the health of the connection registered under `id`, without opening it.
    pub async fn status(&self, id: &str) -> Option<HealthStatus> {
        self.get(id).await.map(|handle| handle.status())
    }

    /// Identifiers with a live handle, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let slots = self.slots.lock().await;
        let mut ids: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.get(id).await.is_some()
    }

    /// The number of registered handles.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot(&self, id: &str) -> Slot<C> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(id.to_owned()).or_default())
    }

    /// Drop the slot for `id` after a failed construction, unless it got filled or someone
    /// else is still waiting on it.
    ///
    /// Slots are only cloned under the table lock, so with the lock held a strong count of 2
    /// (the table and `slot`) means nobody else can reach it.
    async fn release(&self, id: &str, slot: Slot<C>) {
        let mut slots = self.slots.lock().await;
        let unused = matches!(
            slots.get(id),
            Some(current) if Arc::ptr_eq(current, &slot)
                && !slot.initialized()
                && Arc::strong_count(&slot) == 2
        );
        // Let go of our copy while holding the lock, so the last waiter to fail sees a count of 2.
        drop(slot);
        if unused {
            slots.remove(id);
        }
    }
}
