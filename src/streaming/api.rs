use crate::event_log::{DeleteOutcome, DetectionEvent};
use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::server::ServerState;

/// Display format of event timestamps
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Event as exposed over HTTP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventView {
    pub id: u64,
    pub timestamp: String,
    pub filename: String,
    pub count: u32,
    pub url: String,
}

impl EventView {
    pub fn new(event: &DetectionEvent, timezone: &Tz) -> Self {
        Self {
            id: event.id,
            timestamp: event
                .timestamp
                .with_timezone(timezone)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            filename: event.filename.clone(),
            count: event.count,
            url: format!("/captures/{}", event.filename),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub cat_count: u64,
    pub last_event: Option<EventView>,
    pub events: Vec<EventView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub cat_count: u64,
    pub events: Vec<EventView>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSnapshotForm {
    pub filename: String,
}

fn views(events: &[DetectionEvent], timezone: &Tz) -> Vec<EventView> {
    events.iter().map(|e| EventView::new(e, timezone)).collect()
}

/// Lifetime count plus the most recent events
pub async fn stats_handler(State(state): State<ServerState>) -> Json<StatsResponse> {
    let snapshot = state.events.snapshot(Some(state.settings.recent_events));
    let events = views(&snapshot.events, &state.settings.timezone);

    Json(StatsResponse {
        cat_count: snapshot.lifetime_count,
        last_event: events.first().cloned(),
        events,
    })
}

/// Lifetime count plus every retained event
pub async fn events_handler(State(state): State<ServerState>) -> Json<EventsResponse> {
    let snapshot = state.events.snapshot(None);

    Json(EventsResponse {
        cat_count: snapshot.lifetime_count,
        events: views(&snapshot.events, &state.settings.timezone),
    })
}

pub async fn delete_event_handler(State(state): State<ServerState>, Path(id): Path<u64>) -> Response {
    match state.events.delete(id).await {
        DeleteOutcome::Deleted(_) => StatusCode::NO_CONTENT.into_response(),
        DeleteOutcome::NotFound => {
            debug!("Delete requested for unknown event {}", id);
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "event not found" })),
            )
                .into_response()
        }
    }
}

/// Gallery form delete, keyed by snapshot filename
pub async fn delete_snapshot_handler(
    State(state): State<ServerState>,
    Form(form): Form<DeleteSnapshotForm>,
) -> Redirect {
    match state.events.delete_by_filename(&form.filename).await {
        DeleteOutcome::Deleted(event) => info!("Snapshot {} deleted from the gallery", event.filename),
        DeleteOutcome::NotFound => debug!("No event owns snapshot {}", form.filename),
    }
    Redirect::to("/")
}
