use plume_watch::engine::{self, Engine};
use plume_watch::feed::synthetic::SyntheticFeed;
use plume_watch::{api, config, feed};
use std::net::SocketAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        app = %config.app.name,
        config_path = config::DEFAULT_CONFIG_PATH,
        "plume-watch starting"
    );

    let engine = Arc::new(Engine::new(config.engine_settings()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (queue, queue_rx) = engine::ingest_queue(&engine, config.ingest_queue_capacity());
    let worker = engine::spawn_ingest_worker(Arc::clone(&engine), queue_rx);

    let feed_task = match config.synthetic_feed() {
        Some(feed_config) => {
            tracing::info!(
                vehicles = feed_config.vehicles,
                interval_ms = config.feed_poll_interval().as_millis(),
                "Starting synthetic feed"
            );
            Some(feed::spawn_feed_task(
                SyntheticFeed::new(feed_config),
                queue,
                config.feed_poll_interval(),
                shutdown_rx.clone(),
            ))
        }
        None => {
            tracing::warn!("No feed configured - engine will idle until readings arrive");
            drop(queue);
            None
        }
    };

    let scheduler = engine::spawn_scheduler(Arc::clone(&engine), shutdown_rx.clone());

    let app = api::router(Arc::clone(&engine));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the feed first so the worker can drain the closed queue; the final
    // snapshot then reflects every accepted reading.
    let _ = shutdown_tx.send(true);
    if let Some(feed_task) = feed_task {
        let _ = feed_task.await;
    }
    let _ = worker.await;
    let _ = scheduler.await;
    let final_snapshot = engine.tick(OffsetDateTime::now_utc());
    tracing::info!(cycle = final_snapshot.cycle, "Final snapshot emitted - shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
