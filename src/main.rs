use std::sync::Arc;

use ssepub::broker::Broker;
use ssepub::config::load_config;
use ssepub::idgen::IdGenerator;
use ssepub::persistence::{Recorder, RecorderError};
use ssepub::transport::build_router;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize the tracing subscriber for logging
    tracing_subscriber::fmt::init();

    // Load configuration with robust error handling
    let config = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("Failed to load configuration: {err}");
            return;
        }
    };

    let idgen = match IdGenerator::new(&config.idgen) {
        Ok(generator) => generator,
        Err(err) => {
            error!("Failed to initialize the id generator: {err}");
            return;
        }
    };

    // A disabled kv store is fine; pubsubs simply won't be persisted
    let recorder = match Recorder::open(&config.kv) {
        Ok(recorder) => Some(recorder),
        Err(RecorderError::NotEnabled) => {
            warn!("kv store is not enabled, pubsubs will not survive restarts");
            None
        }
        Err(err) => {
            error!("Failed to open the kv store: {err}");
            return;
        }
    };

    let broker = match Broker::new(&config.pubsub, idgen, recorder) {
        Ok(broker) => Arc::new(broker),
        Err(err) => {
            error!("Failed to initialize the broker: {err}");
            return;
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind {addr}: {err}");
            return;
        }
    };
    info!("listening on http://{addr}");

    let app = build_router(broker.clone());
    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received. Exiting gracefully.");
    });

    if let Err(err) = server.await {
        error!("HTTP server exited unexpectedly: {err}");
    }

    broker.close();
}
