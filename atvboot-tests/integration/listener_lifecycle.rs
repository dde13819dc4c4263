//! Listener startup and shutdown.

use std::sync::Arc;
use std::time::Duration;

use atvboot_core::{BootstrapAsset, RecordingReceiver, StaticLookup};
use atvboot_web::{AppState, BootstrapServer, ServerError};
use tempfile::TempDir;

use crate::support::{TestServer, test_config};

#[tokio::test]
async fn test_shutdown_stops_listener() {
    let server = TestServer::start(
        test_config(),
        Arc::new(StaticLookup::new()),
        Arc::new(RecordingReceiver::new()),
    )
    .await;
    let url = server.url("/nothing");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    assert_eq!(client.get(&url).send().await.unwrap().status(), 404);

    tokio::time::timeout(Duration::from_secs(10), server.stop())
        .await
        .expect("shutdown should finish within the grace period")
        .unwrap();

    // Fresh client so no pooled connection is reused.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    assert!(client.get(&url).send().await.is_err());
}

#[tokio::test]
async fn test_missing_certificate_fails_bind() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config();
    config.server.tls_enabled = true;
    config.server.tls_port = 0;
    config.server.cert_path = Some(dir.path().join("kortv.pem"));
    config.server.key_path = Some(dir.path().join("kortv.key"));

    let state = AppState::new(
        Arc::new(config),
        BootstrapAsset::new("{{config.MainTemplate}}"),
        Arc::new(StaticLookup::new()),
        Arc::new(RecordingReceiver::new()),
    );
    let result = BootstrapServer::new(state).bind().await;

    match result {
        Err(ServerError::Tls { cert, .. }) => assert!(cert.ends_with("kortv.pem")),
        Err(other) => panic!("expected TLS error, got {other}"),
        Ok(_) => panic!("bind should fail without a certificate"),
    }
}

#[tokio::test]
async fn test_template_loaded_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.js");
    std::fs::write(&path, "load('{{config.MainTemplate}}');").unwrap();

    let asset = BootstrapAsset::load(&path).unwrap();
    assert!(asset.has_placeholder());

    assert!(BootstrapAsset::load(&dir.path().join("missing.js")).is_err());
}
