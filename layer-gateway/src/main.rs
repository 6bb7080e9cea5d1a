//! layer-gateway: serve the JSON command surface over HTTP.
//!
//! Configure through the environment (or a `.env` file):
//!   TELEGRAM_API_ID=... TELEGRAM_API_HASH=... cargo run -p layer-gateway --features layer

use std::sync::Arc;

use layer_gateway::layer::LayerConnector;
use layer_gateway::{CommandDispatcher, ConnectionManager, GatewayConfig, http};

fn main() {
    dotenvy::dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: the runtime is built below, so no other thread exists yet
        unsafe { std::env::set_var("RUST_LOG", "layer_gateway=info,layer_client=info"); }
    }
    env_logger::init();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| -> Box<dyn std::error::Error> { e.into() })
        .and_then(|runtime| runtime.block_on(run()));
    if let Err(e) = result {
        eprintln!("\n✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::from_env()?;

    let connector = Arc::new(LayerConnector::new(config.session_dir.clone()));
    let manager   = ConnectionManager::new(connector, config.credentials.clone())
        .with_retry_policy(config.retry_policy());
    let dispatcher = Arc::new(CommandDispatcher::new(Arc::new(manager)));

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("[gateway] listening on http://{}{}", listener.local_addr()?, http::COMMAND_PATH);

    axum::serve(listener, http::router(dispatcher))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("[gateway] shutting down");
        })
        .await?;
    Ok(())
}
