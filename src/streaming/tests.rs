use super::handlers::{encode_part, mjpeg_stream};
use super::server::StreamServerBuilder;
use super::*;
use crate::config::CattrackConfig;
use crate::event_log::EventLog;
use crate::frame::{FrameData, FrameFormat};
use crate::frame_state::FrameState;
use crate::storage::{DiskSnapshotStore, SnapshotStore};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct Fixture {
    _dir: TempDir,
    store: Arc<DiskSnapshotStore>,
    frames: FrameState,
    events: Arc<EventLog>,
    server: StreamServer,
    cancel: CancellationToken,
}

fn fixture_with(recent_events: usize, keepalive_ms: u64) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(DiskSnapshotStore::new(dir.path(), "cat"));
    let frames = FrameState::new();
    let events = Arc::new(EventLog::new(10, store.clone()));
    let cancel = CancellationToken::new();

    let mut config = CattrackConfig::default().stream;
    config.ip = "127.0.0.1".to_string();
    config.port = 0;
    config.max_fps = 1000;
    config.keepalive_ms = keepalive_ms;
    config.recent_events = recent_events;

    let server = StreamServerBuilder::new()
        .config(config)
        .frames(frames.clone())
        .events(Arc::clone(&events))
        .captures_dir(dir.path())
        .timezone(chrono_tz::Europe::Berlin)
        .cancel_token(cancel.clone())
        .build()
        .unwrap();

    Fixture {
        _dir: dir,
        store,
        frames,
        events,
        server,
        cancel,
    }
}

fn fixture() -> Fixture {
    fixture_with(50, 60_000)
}

async fn record(fx: &Fixture, second: u32, count: u32) -> (u64, String) {
    let ts = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, second).unwrap();
    let filename = fx.store.persist(b"jpeg-bytes", ts).await.unwrap();
    let id = fx.events.append(ts, filename.clone(), count).await.unwrap();
    (id, filename)
}

fn publish(frames: &FrameState, id: u64) -> u64 {
    let raw = FrameData::new(id, SystemTime::now(), vec![0u8; 12], 2, 2, FrameFormat::Rgb24);
    frames.publish(raw, Arc::new(vec![0xFF, 0xD8, id as u8, 0xFF, 0xD9]), 0)
}

async fn get(fx: &Fixture, uri: &str) -> axum::response::Response {
    fx.server
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_stats_empty() {
    let fx = fixture();
    let response = get(&fx, "/stats").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["cat_count"], 0);
    assert!(json["last_event"].is_null());
    assert_eq!(json["events"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_stats_lists_recent_events_most_recent_first() {
    let fx = fixture_with(2, 60_000);
    record(&fx, 1, 1).await;
    let (_, second) = record(&fx, 2, 2).await;
    let (third_id, third) = record(&fx, 3, 3).await;

    let json = body_json(get(&fx, "/stats").await).await;
    assert_eq!(json["cat_count"], 6);

    let events = json["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["filename"], third.as_str());
    assert_eq!(events[1]["filename"], second.as_str());
    assert_eq!(json["last_event"]["id"], third_id);

    // Rendered in the configured zone (CEST = UTC+2)
    assert_eq!(events[0]["timestamp"], "2024-06-01 12:00:03");
    assert_eq!(events[0]["url"], format!("/captures/{}", third));
    assert_eq!(events[0]["count"], 3);
}

#[tokio::test]
async fn test_all_events_endpoint_returns_everything_retained() {
    let fx = fixture_with(1, 60_000);
    for second in 0..4 {
        record(&fx, second, 1).await;
    }

    let json = body_json(get(&fx, "/api/events").await).await;
    assert_eq!(json["cat_count"], 4);
    let ids: Vec<u64> = json["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 2, 1, 0]);
}

#[tokio::test]
async fn test_delete_event_then_not_found() {
    let fx = fixture();
    let (id, filename) = record(&fx, 0, 2).await;

    let request = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/events/{}", id))
            .body(Body::empty())
            .unwrap()
    };

    let response = fx.server.router().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!fx.store.path_of(&filename).exists());
    assert!(fx.events.is_empty());
    assert_eq!(fx.events.count(), 2);

    let response = fx.server.router().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "event not found");
}

#[tokio::test]
async fn test_delete_snapshot_form_redirects_home() {
    let fx = fixture();
    let (_, filename) = record(&fx, 0, 1).await;

    let response = fx
        .server
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/delete_snapshot")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(format!("filename={}", filename)))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");
    assert!(fx.events.is_empty());
    assert!(!fx.store.path_of(&filename).exists());
}

#[tokio::test]
async fn test_captures_are_served() {
    let fx = fixture();
    let (_, filename) = record(&fx, 0, 1).await;

    let response = get(&fx, &format!("/captures/{}", filename)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"jpeg-bytes");
}

#[tokio::test]
async fn test_health_and_page() {
    let fx = fixture();
    publish(&fx.frames, 1);

    let json = body_json(get(&fx, "/health").await).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["frame_state"]["version"], 1);
    assert_eq!(json["events"]["capacity"], 10);

    let response = get(&fx, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&html).contains("src=\"/video\""));
}

#[tokio::test]
async fn test_video_endpoint_streams_multipart_parts() {
    let fx = fixture();
    publish(&fx.frames, 7);

    let response = get(&fx, "/video").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = response.into_body().into_data_stream();
    let part = body.next().await.unwrap().unwrap();
    let text = String::from_utf8_lossy(&part);
    assert!(text.starts_with(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 5\r\nX-Frame-Version: 1\r\n\r\n"
    ));
    assert!(part.ends_with(&[0xFF, 0xD8, 7, 0xFF, 0xD9, b'\r', b'\n']));
}

#[test]
fn test_encode_part_layout() {
    let frames = FrameState::new();
    publish(&frames, 3);
    let snapshot = frames.read().unwrap();

    let part = encode_part(&snapshot);
    let header_len = "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 5\r\nX-Frame-Version: 1\r\n\r\n".len();
    assert_eq!(part.len(), header_len + 5 + 2);
}

#[tokio::test]
async fn test_one_viewer_leaving_does_not_affect_others() {
    let fx = fixture();
    let state = fx.server.state.clone();
    let stats = fx.server.stats();

    let mut viewers: Vec<_> = (0..5).map(|_| Box::pin(mjpeg_stream(state.clone()))).collect();

    publish(&fx.frames, 1);
    for viewer in viewers.iter_mut() {
        let part = viewer.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&part).contains("X-Frame-Version: 1"));
    }
    assert_eq!(stats.active_viewers(), 5);

    drop(viewers.remove(2));
    assert_eq!(stats.active_viewers(), 4);

    for version in 2..=3 {
        publish(&fx.frames, version);
        for viewer in viewers.iter_mut() {
            let part = tokio::time::timeout(Duration::from_secs(2), viewer.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert!(String::from_utf8_lossy(&part).contains(&format!("X-Frame-Version: {}", version)));
        }
    }

    assert_eq!(stats.snapshot().total_viewers, 5);
    assert_eq!(stats.snapshot().frames_streamed, 5 + 4 * 2);
}

#[tokio::test]
async fn test_keepalive_resends_last_frame() {
    let fx = fixture_with(50, 20);
    let mut viewer = Box::pin(mjpeg_stream(fx.server.state.clone()));

    publish(&fx.frames, 1);
    let first = viewer.next().await.unwrap().unwrap();
    let again = tokio::time::timeout(Duration::from_secs(2), viewer.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first, again);
}

#[tokio::test]
async fn test_viewers_end_on_shutdown() {
    let fx = fixture();
    let mut viewer = Box::pin(mjpeg_stream(fx.server.state.clone()));
    publish(&fx.frames, 1);
    viewer.next().await.unwrap().unwrap();

    fx.cancel.cancel();
    let end = tokio::time::timeout(Duration::from_secs(2), viewer.next())
        .await
        .unwrap();
    assert!(end.is_none());
    assert_eq!(fx.server.stats().active_viewers(), 0);
}

#[test]
fn test_builder_requires_collaborators() {
    let result = StreamServerBuilder::new()
        .config(CattrackConfig::default().stream)
        .frames(FrameState::new())
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_server_binds_and_stops_on_cancel() {
    let fx = fixture();
    let cancel = fx.cancel.clone();
    let listener = fx.server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let task = tokio::spawn(fx.server.serve(listener));
    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
