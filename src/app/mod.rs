mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::CattrackOrchestrator;
pub use types::{ComponentState, ShutdownReason, ShutdownTrigger};
