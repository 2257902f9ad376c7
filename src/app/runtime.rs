use super::{CattrackOrchestrator, ShutdownReason, ShutdownTrigger};
use crate::error::{CattrackError, Result};
use tracing::{info, warn};

impl CattrackOrchestrator {
    /// Wait for a shutdown request, then shut down gracefully.
    ///
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Cattrack is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| CattrackError::system("Shutdown receiver already taken"))?;

        Self::setup_signal_handlers(self.shutdown_trigger.clone());

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| CattrackError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?.max(shutdown_reason.exit_code());

        info!("Cattrack shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(trigger: ShutdownTrigger) {
        // SIGTERM (systemd stop)
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let trigger = trigger.clone();
            tokio::spawn(async move {
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            trigger.fire(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                    Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                trigger.fire(ShutdownReason::Signal("SIGINT".to_string()));
            }
        });
    }
}
