use std::sync::Arc;
use std::time::Duration;

use fake::{Fake, Faker};
use tokio::time::Instant;
use warren::amqp::configuration::{ConnectionSettings, TlsSettings};
use warren::amqp::TransportError;
use warren::registry::HealthStatus;
use warren::{ConnectionManager, Error};

use crate::helpers::{get_manager, get_settings, FakeFactory, Failure};

#[tokio::test]
async fn a_cached_connection_does_not_hit_the_factory() {
    // Arrange
    let factory = FakeFactory::new();
    let manager = get_manager(&factory);
    let id: String = Faker.fake();

    // Act
    let first = manager.get_connection(&id).await.unwrap();
    let second = manager.get_connection(&id).await.unwrap();
    let third = manager.get_connection(&id).await.unwrap();

    // Assert
    assert_eq!(1, factory.calls());
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &third));
}

#[tokio::test]
async fn the_identifier_is_used_as_connection_name() {
    let factory = FakeFactory::new();
    let manager = get_manager(&factory);

    let handle = manager.get_connection("producer-1").await.unwrap();

    assert_eq!("producer-1", handle.id());
    assert_eq!("producer-1", handle.connection().name());
    assert_eq!(vec!["producer-1"], factory.connection_names());
}

#[tokio::test]
async fn distinct_identifiers_get_distinct_connections() {
    let factory = FakeFactory::new();
    let manager = get_manager(&factory);

    let a = manager.get_connection("a").await.unwrap();
    let b = manager.get_connection("b").await.unwrap();
    let a_again = manager.get_connection("a").await.unwrap();
    let b_again = manager.get_connection("b").await.unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&a, &a_again));
    assert!(Arc::ptr_eq(&b, &b_again));
    assert_eq!(2, factory.calls());
    assert_eq!(vec!["a", "b"], manager.registry().ids().await);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let factory = FakeFactory::failing_with([Failure::Transient, Failure::Transient]);
    let manager = get_manager(&factory);

    let handle = manager.get_connection("consumer-worker-3").await.unwrap();

    assert!(handle.is_open());
    assert_eq!(3, factory.calls());
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_the_configured_number_of_attempts() {
    // Arrange
    let factory = FakeFactory::always_failing(Failure::Transient);
    let manager = ConnectionManager::new(get_settings(3, 5), factory.clone()).unwrap();
    let start = Instant::now();

    // Act
    let outcome = manager.get_connection("a").await;

    // Assert
    match outcome {
        Err(Error::RetriesExhausted {
            id,
            attempts,
            source,
        }) => {
            assert_eq!("a", id);
            assert_eq!(3, attempts);
            assert!(matches!(source, TransportError::Broker(_)));
        }
        other => panic!("Expected retries to be exhausted, got {other:?}"),
    }
    assert_eq!(3, factory.calls());
    // Three connection attempts (10ms each) and two pauses in between, none after the last one.
    assert_eq!(
        Duration::from_millis(30) + Duration::from_secs(10),
        start.elapsed()
    );
}

#[tokio::test(start_paused = true)]
async fn non_retryable_failures_are_not_retried() {
    let factory = FakeFactory::always_failing(Failure::Fatal);
    let manager = get_manager(&factory);
    let start = Instant::now();

    let outcome = manager.get_connection("a").await;

    match outcome {
        Err(Error::NonRetryable { id, source }) => {
            assert_eq!("a", id);
            assert!(matches!(source, TransportError::Other(_)));
        }
        other => panic!("Expected a non-retryable error, got {other:?}"),
    }
    assert_eq!(1, factory.calls());
    assert_eq!(Duration::from_millis(10), start.elapsed());
}

#[tokio::test(start_paused = true)]
async fn a_fatal_failure_after_a_transient_one_stops_the_retries() {
    let factory = FakeFactory::failing_with([Failure::Transient, Failure::Fatal]);
    let manager = get_manager(&factory);

    let outcome = manager.get_connection("a").await;

    assert!(matches!(outcome, Err(Error::NonRetryable { .. })));
    assert_eq!(2, factory.calls());
}

#[tokio::test(start_paused = true)]
async fn failed_connections_are_not_cached() {
    let factory = FakeFactory::failing_with([Failure::Transient; 3]);
    let manager = get_manager(&factory);

    let first = manager.get_connection("a").await;
    assert!(matches!(first, Err(Error::RetriesExhausted { .. })));
    assert!(manager.registry().is_empty().await);

    let second = manager.get_connection("a").await.unwrap();
    assert!(second.is_open());
    assert_eq!(4, factory.calls());
}

#[tokio::test]
async fn a_closed_connection_is_never_served() {
    // Arrange
    let factory = FakeFactory::new();
    let manager = get_manager(&factory);
    let handle = manager.get_connection("a").await.unwrap();

    // Act
    handle.connection().close();

    // Assert
    for _ in 0..2 {
        match manager.get_connection("a").await {
            Err(Error::ConnectionNotOpen { id }) => assert_eq!("a", id),
            other => panic!("Expected a closed connection error, got {other:?}"),
        }
    }
    // The stale connection is not replaced.
    assert_eq!(1, factory.calls());
    assert_eq!(Some(HealthStatus::Unhealthy), manager.registry().status("a").await);
}

#[tokio::test]
async fn a_closed_connection_does_not_affect_other_identifiers() {
    let factory = FakeFactory::new();
    let manager = get_manager(&factory);
    manager.get_connection("a").await.unwrap().connection().close();

    let b = manager.get_connection("b").await.unwrap();

    assert!(b.is_open());
    assert_eq!(
        vec![
            ("a".to_owned(), HealthStatus::Unhealthy),
            ("b".to_owned(), HealthStatus::Healthy)
        ],
        manager.health().await
    );
}

#[tokio::test]
async fn enabling_tls_fails_construction() {
    let factory = FakeFactory::new();
    let settings = ConnectionSettings {
        tls: TlsSettings {
            enabled: true,
            keystore_path: Some("client.p12".into()),
            ..Default::default()
        },
        ..Default::default()
    };

    let outcome = ConnectionManager::new(settings, factory.clone());

    assert!(matches!(outcome, Err(Error::NotImplemented(_))));
    assert_eq!(0, factory.calls());
}

#[tokio::test]
async fn zero_connection_attempts_fail_construction() {
    let outcome = ConnectionManager::new(get_settings(0, 1), FakeFactory::new());

    assert!(matches!(outcome, Err(Error::InvalidSettings(_))));
}

#[tokio::test]
async fn managers_do_not_share_connections() {
    let factory = FakeFactory::new();
    let first_manager = get_manager(&factory);
    let second_manager = get_manager(&factory);

    let first = first_manager.get_connection("a").await.unwrap();
    let second = second_manager.get_connection("a").await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(2, factory.calls());
}

#[tokio::test]
async fn nothing_is_opened_until_asked() {
    let factory = FakeFactory::new();
    let manager = get_manager(&factory);

    assert!(manager.health().await.is_empty());
    assert!(manager.registry().get("a").await.is_none());
    assert_eq!(0, factory.calls());
    assert_eq!(3, manager.retry_policy().max_attempts().get());
}
