//! Process termination signals

use crate::lifecycle::shutdown::ShutdownTrigger;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Wait for SIGINT or SIGTERM
async fn termination_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}

/// Forward the first termination signal as a shutdown trigger, then exit
pub(crate) fn spawn_listener(tx: mpsc::UnboundedSender<ShutdownTrigger>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match termination_signal().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = tx.send(ShutdownTrigger::Signal);
            }
            Err(e) => warn!(error = %e, "Could not listen for termination signals"),
        }
    })
}
