//! Helpers for connecting to a rabbitmq broker

pub mod configuration;
mod factory;
pub use factory::{BrokerConnection, ConnectionFactory, LapinConnectionFactory, TransportError};
pub use lapin::Connection;
