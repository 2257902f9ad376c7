mod api;
mod handlers;
mod server;
mod stats;
#[cfg(test)]
mod tests;

pub use api::{EventView, EventsResponse, StatsResponse};
pub use server::{ServerState, StreamServer, StreamServerBuilder, StreamSettings};
pub use stats::{StreamStats, StreamStatsSnapshot};
