use super::{CattrackOrchestrator, ComponentState};
use crate::error::Result;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info};

impl CattrackOrchestrator {
    /// Cancel all tasks and wait for them within the configured timeout.
    ///
    /// Returns 0 when every task stopped cleanly, 1 otherwise.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let deadline =
            Instant::now() + Duration::from_millis(self.config.pipeline.shutdown_timeout_ms);
        let mut exit_code = 0;

        // Stop in reverse start order
        let tasks = std::mem::take(&mut self.tasks);
        for (component, handle) in tasks.into_iter().rev() {
            if !self.stop_component(component, handle, deadline).await {
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(
        &self,
        component: &str,
        mut handle: JoinHandle<()>,
        deadline: Instant,
    ) -> bool {
        info!("Stopping {} component", component);
        if self.get_component_state(component).await != Some(ComponentState::Failed) {
            self.set_component_state(component, ComponentState::Stopping)
                .await;
        }

        match timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => {
                if self.get_component_state(component).await == Some(ComponentState::Failed) {
                    return false;
                }
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                true
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component task failed: {}", component, e);
                false
            }
            Err(_) => {
                handle.abort();
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                false
            }
        }
    }
}
