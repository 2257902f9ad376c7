use crate::frame_state::FrameSnapshot;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::server::ServerState;
use super::stats::ViewerGuard;

pub(crate) const BOUNDARY: &str = "frame";

enum Wake {
    Newer(Option<Arc<FrameSnapshot>>),
    Keepalive,
    Shutdown,
}

/// Encode one multipart part carrying an annotated JPEG
pub(crate) fn encode_part(snapshot: &FrameSnapshot) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nX-Frame-Version: {}\r\n\r\n",
        BOUNDARY,
        snapshot.annotated.len(),
        snapshot.version
    );
    let mut part = BytesMut::with_capacity(header.len() + snapshot.annotated.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(&snapshot.annotated);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Per-viewer frame stream.
///
/// Sends each new snapshot once, no faster than the configured rate, and
/// resends the last one after the keepalive interval. Ends on shutdown or
/// when the producer is gone.
pub(crate) fn mjpeg_stream(state: ServerState) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        let mut viewer = ViewerGuard::new(Arc::clone(&state.stats));
        let mut watcher = state.frames.watcher();
        let mut last_version = 0u64;
        let mut last_sent: Option<Instant> = None;

        loop {
            if let Some(sent) = last_sent {
                tokio::select! {
                    _ = state.cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(sent + state.settings.frame_interval) => {}
                }
            }

            let wake = tokio::select! {
                _ = state.cancel.cancelled() => Wake::Shutdown,
                next = watcher.wait_newer(last_version) => Wake::Newer(next),
                _ = tokio::time::sleep(state.settings.keepalive) => Wake::Keepalive,
            };

            let snapshot = match wake {
                Wake::Shutdown => break,
                Wake::Newer(Some(snapshot)) => snapshot,
                Wake::Newer(None) => {
                    debug!("Frame producer gone, ending stream");
                    break;
                }
                Wake::Keepalive => match watcher.latest() {
                    Some(snapshot) => {
                        trace!("Keepalive resend of frame version {}", snapshot.version);
                        snapshot
                    }
                    None => continue,
                },
            };

            last_version = snapshot.version;
            let part = encode_part(&snapshot);
            state.stats.record_frame(part.len());
            viewer.frames_sent += 1;
            last_sent = Some(Instant::now());

            yield Ok(part);
        }
    }
}

/// Live annotated stream as `multipart/x-mixed-replace`
pub async fn video_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let stream = mjpeg_stream(state);

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache, private".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let frames = state.frames.stats();

    let health_info = serde_json::json!({
        "status": "healthy",
        "frames_available": frames.current_version > 0,
        "frame_state": {
            "version": frames.current_version,
            "frames_published": frames.frames_published,
            "frames_read": frames.frames_read,
            "readers": frames.readers,
        },
        "stream": state.stats.snapshot(),
        "pipeline": state.pipeline.as_ref().map(|metrics| metrics.snapshot()),
        "events": {
            "retained": state.events.len(),
            "capacity": state.events.capacity(),
            "lifetime_count": state.events.count(),
        },
    });

    (StatusCode::OK, Json(health_info))
}

/// Dashboard with the live stream and the event history
pub async fn page_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Cat Tracker</title>
    <style>
        :root { color-scheme: dark; }
        body { margin: 0; font-family: sans-serif; background: #111; color: #eee; }
        main { display: flex; flex-wrap: wrap; gap: 1rem; padding: 1rem; }
        img.stream { max-width: 100%; background: #000; }
        section.history { flex: 1; min-width: 320px; }
        .event { display: flex; gap: .75rem; align-items: center; margin-bottom: .5rem; }
        .event img { width: 120px; }
        button { background: #a33; color: #fff; border: 0; padding: .3rem .6rem; cursor: pointer; }
    </style>
</head>
<body>
<main>
    <section>
        <img class="stream" src="/video" alt="Live stream">
    </section>
    <section class="history">
        <h2>Cats seen: <span id="count">0</span></h2>
        <div id="events"></div>
    </section>
</main>
<script>
async function refresh() {
    const res = await fetch('/stats');
    if (!res.ok) return;
    const data = await res.json();
    document.getElementById('count').textContent = data.cat_count;
    const list = document.getElementById('events');
    list.innerHTML = '';
    for (const ev of data.events) {
        const row = document.createElement('div');
        row.className = 'event';
        const img = document.createElement('img');
        img.src = ev.url;
        img.alt = ev.filename;
        const label = document.createElement('span');
        label.textContent = `${ev.timestamp} (${ev.count})`;
        const del = document.createElement('button');
        del.textContent = 'Delete';
        del.onclick = async () => {
            await fetch(`/api/events/${ev.id}`, { method: 'DELETE' });
            refresh();
        };
        row.append(img, label, del);
        list.appendChild(row);
    }
}
refresh();
setInterval(refresh, 5000);
</script>
</body>
</html>
"#;
