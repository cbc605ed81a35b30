use anyhow::Context;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use stream_relay::api::ApiServer;
use stream_relay::{RelayConfig, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before logging so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    logging::init_logging()?;

    let config = RelayConfig::from_env_or_default();
    let server = ApiServer::new(config).context("Failed to initialize stream relay")?;

    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_token.cancel();
    });

    server.run().await?;

    info!("Stream relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
