//! Basic example showing connection lifecycle tracing.
//!
//! Run with: cargo run --example basic

use sea_orm::ConnectOptions;
use sea_orm_lifecycle_tracing::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,sea_orm_lifecycle_tracing=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/test".into());

    // Option 1: defaults straight from connect options
    let factory = ConnectOptions::new(database_url)
        .with_lifecycle_tracing_config(TracingConfig::development().with_database_name("test"));

    // Option 2: explicit builder, more listeners can be chained
    // let factory = ProxyConnectionFactory::builder(SeaOrmConnectionFactory::new(url))
    //     .listener(LifecycleTracer::new(TracingBackend::new()))
    //     .build();

    let mut connection = factory.create().await?;
    tracing::info!(connection_id = %connection.connection_id(), "Connected");

    connection.begin_transaction().await?;
    connection.execute("SELECT 1").await?;
    connection.create_savepoint("before_batch").await?;
    let batch = connection
        .execute_batch(["CREATE TEMP TABLE demo (id INT)", "INSERT INTO demo VALUES (1)"])
        .await;
    if batch.is_err() {
        connection.rollback_transaction_to_savepoint("before_batch").await?;
    }
    connection.commit_transaction().await?;

    // Failures are recorded on the query span and still returned here
    if let Err(err) = connection.execute("SELECT * FROM missing_table").await {
        tracing::warn!(error = %err, "Query failed as expected");
    }

    connection.close().await?;
    Ok(())
}
