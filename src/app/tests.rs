use super::*;
use crate::error::CattrackError;
use crate::config::{CattrackConfig, DetectorBackendKind, SourceBackendKind};
use crate::pipeline::LoopState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn create_test_config(dir: &TempDir) -> CattrackConfig {
    let mut config = CattrackConfig::default();
    config.source.backend = SourceBackendKind::Synthetic;
    config.source.resolution = (64, 48);
    config.source.fps = 30;
    config.detector.backend = DetectorBackendKind::Passthrough;
    config.capture.path = dir.path().join("captures").to_string_lossy().into_owned();
    config.stream.ip = "127.0.0.1".to_string();
    config.stream.port = 0;
    config.pipeline.shutdown_timeout_ms = 2000;
    config
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_orchestrator_creation_prepares_captures_dir() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let orchestrator = CattrackOrchestrator::new(config).await.unwrap();

    assert!(dir.path().join("captures").is_dir());
    assert!(orchestrator.get_all_component_states().await.is_empty());
    assert!(orchestrator.local_addr().is_none());
    assert_eq!(orchestrator.frames().version(), 0);
}

#[tokio::test]
async fn test_unusable_captures_dir_is_fatal() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let mut config = create_test_config(&dir);
    config.capture.path = blocker.join("captures").to_string_lossy().into_owned();

    let result = CattrackOrchestrator::new(config).await;
    assert!(matches!(result, Err(CattrackError::Storage(_))));
}

#[cfg(not(feature = "onnx"))]
#[tokio::test]
async fn test_unavailable_detector_backend_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.detector.backend = DetectorBackendKind::Onnx;

    let result = CattrackOrchestrator::new(config).await;
    assert!(matches!(result, Err(CattrackError::Detector(_))));
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = CattrackOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();
    orchestrator.initialize().await.unwrap();

    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 2);
    assert_eq!(states.get("detection"), Some(&ComponentState::Stopped));
    assert_eq!(states.get("streaming"), Some(&ComponentState::Stopped));
}

#[tokio::test]
async fn test_start_serve_and_shutdown() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = CattrackOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    assert_eq!(
        orchestrator.get_component_state("detection").await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        orchestrator.get_component_state("streaming").await,
        Some(ComponentState::Running)
    );

    // Frames flow from the synthetic source through the passthrough detector
    let mut watcher = orchestrator.frames().watcher();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), watcher.wait_newer(0))
        .await
        .unwrap()
        .unwrap();
    assert!(snapshot.annotated.starts_with(&[0xFF, 0xD8]));

    let addr = orchestrator.local_addr().unwrap();
    let response = http_get(addr, "/stats").await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"cat_count\":0"));

    let exit_code = orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(
        orchestrator.get_component_state("detection").await,
        Some(ComponentState::Stopped)
    );
    assert_eq!(
        orchestrator.get_component_state("streaming").await,
        Some(ComponentState::Stopped)
    );
    assert_eq!(orchestrator.pipeline_metrics().state(), LoopState::Stopped);
    assert!(orchestrator.events().is_empty());
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_start_twice_fails() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = CattrackOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();
    orchestrator.start().await.unwrap();
    assert!(orchestrator.start().await.is_err());
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bind_conflict_is_fatal() {
    let dir = TempDir::new().unwrap();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();

    let mut config = create_test_config(&dir);
    config.stream.port = occupied.local_addr().unwrap().port();

    let mut orchestrator = CattrackOrchestrator::new(config).await.unwrap();
    let result = orchestrator.start().await;

    assert!(matches!(result, Err(CattrackError::Stream(_))));
    assert_eq!(
        orchestrator.get_component_state("streaming").await,
        Some(ComponentState::Failed)
    );
    // Nothing was spawned
    assert_eq!(orchestrator.shutdown().await.unwrap(), 0);
}

#[tokio::test]
async fn test_run_returns_after_user_request() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = CattrackOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    let trigger = orchestrator.shutdown_trigger();
    assert!(trigger.fire(ShutdownReason::UserRequest));
    assert!(!trigger.fire(ShutdownReason::UserRequest));

    let exit_code = tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
}

#[tokio::test]
async fn test_error_shutdown_reason_sets_exit_code() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = CattrackOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();
    orchestrator.start().await.unwrap();

    orchestrator
        .shutdown_trigger()
        .fire(ShutdownReason::Error("server failed".to_string()));

    let exit_code = orchestrator.run().await.unwrap();
    assert_eq!(exit_code, 1);
    assert!(orchestrator.run().await.is_err());
}

#[tokio::test]
async fn test_component_state_transitions() {
    let dir = TempDir::new().unwrap();
    let orchestrator = CattrackOrchestrator::new(create_test_config(&dir))
        .await
        .unwrap();

    let component = "test_component";
    assert_eq!(orchestrator.get_component_state(component).await, None);

    for state in [
        ComponentState::Starting,
        ComponentState::Running,
        ComponentState::Stopping,
        ComponentState::Stopped,
    ] {
        orchestrator.set_component_state(component, state).await;
        assert_eq!(orchestrator.get_component_state(component).await, Some(state));
    }
}

#[tokio::test]
async fn test_concurrent_component_state_access() {
    let states: Arc<state::ComponentStates> = Arc::new(tokio::sync::Mutex::new(HashMap::new()));

    let mut handles = Vec::new();
    for i in 0..10 {
        let states = Arc::clone(&states);
        handles.push(tokio::spawn(async move {
            let component_name = format!("component_{}", i);
            state::set_state(&states, &component_name, ComponentState::Running).await;
            states.lock().await.get(&component_name).copied()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some(ComponentState::Running));
    }
    let states = states.lock().await;
    assert_eq!(states.len(), 10);
    assert!(states.values().all(|s| *s == ComponentState::Running));
}

#[test]
fn test_shutdown_reason_exit_codes() {
    assert_eq!(ShutdownReason::Signal("SIGTERM".to_string()).exit_code(), 0);
    assert_eq!(ShutdownReason::UserRequest.exit_code(), 0);
    assert_eq!(ShutdownReason::Error("boom".to_string()).exit_code(), 1);
}
