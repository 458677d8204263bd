use super::*;
use crate::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tower::ServiceExt;


/// Router over default settings with a small worker pool
fn test_app(config: Config) -> Router {
    let state = AppState::new(Arc::new(config)).unwrap();
    create_router(state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let mut config = Config::default();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap(); // Port 0 = OS assigns a free port
    let config = Arc::new(config);

    let api_handle = tokio::spawn(async move { start_api_server(config).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be running");
    api_handle.abort();
}

#[tokio::test]
async fn test_api_server_stops_on_shutdown_signal() {
    let mut config = Config::default();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let api_handle = tokio::spawn(start_api_server_with_shutdown(Arc::new(config), async move {
        rx.await.ok();
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .expect("server should stop after the shutdown signal")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_api_server_rejects_invalid_config() {
    let mut config = Config::default();
    config.pipeline.worker_count = 0;

    let err = start_api_server(Arc::new(config)).await.unwrap_err();
    assert!(matches!(err, crate::Error::Config { .. }));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = test_app(Config::default())
        .oneshot(get("/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
