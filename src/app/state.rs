use super::{CattrackOrchestrator, ComponentState};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

pub(super) type ComponentStates = Mutex<HashMap<String, ComponentState>>;

pub(super) async fn set_state(states: &ComponentStates, component: &str, state: ComponentState) {
    debug!("Component {} -> {:?}", component, state);
    states.lock().await.insert(component.to_string(), state);
}

impl CattrackOrchestrator {
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        set_state(&self.component_states, component, state).await;
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).copied()
    }

    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }
}
