use anyhow::Result;
use landau::config::Config;
use landau::coordinator::{CoordinatorCommand, RefreshCoordinator};
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    landau::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    // Host bindings push commands through this channel
    let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel::<CoordinatorCommand>();

    let mut coordinator = RefreshCoordinator::new(config, cmd_rx)
        .map_err(|e| anyhow::anyhow!("Failed to create coordinator: {}", e))?;

    info!("Landau caravan telematics driver starting up");

    // Forward Ctrl-C to the run loop as a shutdown request
    let shutdown = coordinator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.send(()).ok();
        }
    });

    match coordinator.run().await {
        Ok(()) => {
            info!("Coordinator shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Coordinator failed with error: {}", e);
            Err(anyhow::anyhow!("Coordinator error: {}", e))
        }
    }
}
