//! `warren` hands out named, long-lived RabbitMQ connections, built on top of [`lapin`].
//!
//! Ask a [`ConnectionManager`](crate::manager::ConnectionManager) for a connection by
//! identifier (e.g. `"producer-1"`): the first request opens it, retrying transient broker
//! failures, and every later request for the same identifier gets the cached connection back.
//! Concurrent requests for the same identifier never open two connections.
//!
//! ## Examples
//!
//! Check the `demos` directory to see the library in action.

pub mod amqp;
pub mod manager;
pub mod registry;
pub mod retry;

mod error;

pub use error::Error;
pub use manager::ConnectionManager;
