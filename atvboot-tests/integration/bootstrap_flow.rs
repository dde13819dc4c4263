//! Bootstrap script delivery over a live listener.

use std::sync::Arc;

use atvboot_core::{RecordingReceiver, StaticLookup};

use crate::support::{LOCALHOST, TestServer, UPSTREAM, test_config};

#[tokio::test]
async fn test_asset_follows_dns_between_requests() {
    let lookup = Arc::new(StaticLookup::new().with("kortv.com", LOCALHOST));
    let server = TestServer::start(
        test_config(),
        lookup.clone(),
        Arc::new(RecordingReceiver::new()),
    )
    .await;

    let response = server
        .client
        .get(server.url("/appletv/js/application.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.contains("javascript"));
    let body = response.text().await.unwrap();
    assert_eq!(
        body,
        "var App = { main: 'https://kortv.com/assets/templates/index.xml' };\n"
    );

    // The check runs per request, so a DNS change shows up immediately.
    lookup.set("kortv.com", vec![UPSTREAM]);
    let body = server
        .client
        .get(server.url("/appletv/js/application.js"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(
        body,
        "var App = { main: 'https://chichid-atv2.herokuapp.com/assets/templates/index.xml' };\n"
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_asset_unresolvable_host_is_bad_gateway() {
    let server = TestServer::start(
        test_config(),
        Arc::new(StaticLookup::new()),
        Arc::new(RecordingReceiver::new()),
    )
    .await;

    let response = server
        .client
        .get(server.url("/appletv/js/application.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_routes() {
    let server = TestServer::start(
        test_config(),
        Arc::new(StaticLookup::new()),
        Arc::new(RecordingReceiver::new()),
    )
    .await;

    let response = server
        .client
        .get(server.url("/appletv/us/nav.xml?lang=en"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body = response.text().await.unwrap();
    assert!(body.contains("/appletv/us/nav.xml?lang=en"));

    let response = server
        .client
        .post(server.url("/upload"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 501);

    server.stop().await.unwrap();
}
