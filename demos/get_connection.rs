use warren::amqp::configuration::ConnectionSettings;
use warren::ConnectionManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // We are using the out-of-the-box parameters for the default RabbitMq Docker image.
    // If the broker is not up yet, each connection is attempted up to 5 times, one second apart.
    let settings = ConnectionSettings::default();
    let manager = ConnectionManager::lapin(settings)?;

    // The first request for an identifier opens a connection: the identifier is used as
    // connection name, so it shows up in the RabbitMq management UI.
    let producer = manager.get_connection("producer-1").await?;

    // Asking again returns the very same connection.
    let same_producer = manager.get_connection("producer-1").await?;
    assert!(std::sync::Arc::ptr_eq(&producer, &same_producer));

    // A different identifier gets its own connection.
    let consumer = manager.get_connection("consumer-worker-3").await?;
    let _channel = consumer.connection().create_channel().await?;

    for (id, status) in manager.health().await {
        println!("{id}: {status:?}");
    }

    Ok(())
}
