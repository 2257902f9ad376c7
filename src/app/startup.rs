use super::orchestrator::{DETECTION, STREAMING};
use super::state::set_state;
use super::{CattrackOrchestrator, ComponentState, ShutdownReason};
use crate::error::{CattrackError, Result};
use std::sync::Arc;
use tracing::{error, info};

impl CattrackOrchestrator {
    /// Register all components as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing cattrack components");

        let mut states = self.component_states.lock().await;
        states.insert(DETECTION.to_string(), ComponentState::Stopped);
        states.insert(STREAMING.to_string(), ComponentState::Stopped);
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Bind the HTTP server, then spawn it and the detection loop as
    /// independent tasks
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting cattrack");

        let server = self
            .stream_server
            .take()
            .ok_or_else(|| CattrackError::system("Stream server already started"))?;
        let detection_loop = self
            .detection_loop
            .take()
            .ok_or_else(|| CattrackError::system("Detection loop already started"))?;

        // Bind before spawning anything so an unusable address is fatal
        self.set_component_state(STREAMING, ComponentState::Starting)
            .await;
        let listener = match server.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to start streaming server: {}", e);
                self.set_component_state(STREAMING, ComponentState::Failed)
                    .await;
                return Err(e);
            }
        };
        self.local_addr = listener.local_addr().ok();

        let states = Arc::clone(&self.component_states);
        let trigger = self.shutdown_trigger.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!("Stream server error: {}", e);
                set_state(&states, STREAMING, ComponentState::Failed).await;
                trigger.fire(ShutdownReason::Error(e.to_string()));
            }
        });
        self.tasks.push((STREAMING, handle));
        self.set_component_state(STREAMING, ComponentState::Running)
            .await;
        if let Some(addr) = self.local_addr {
            info!("Streaming server started on {}", addr);
        }

        self.set_component_state(DETECTION, ComponentState::Starting)
            .await;
        let handle = tokio::spawn(detection_loop.run(self.cancellation_token.clone()));
        self.tasks.push((DETECTION, handle));
        self.set_component_state(DETECTION, ComponentState::Running)
            .await;
        info!("Detection loop started");

        info!("Cattrack started successfully");
        Ok(())
    }
}
