//! Playback requests from the device through to the receiver.

use std::sync::Arc;
use std::time::Duration;

use atvboot_core::{HttpAirPlayReceiver, RecordingReceiver, StaticLookup, WrapPolicy};
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::support::{TestServer, test_config};

async fn post_play(server: &TestServer, body: &str) -> reqwest::Response {
    server
        .client
        .post(server.url("/play"))
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_wrapped_playback_round_trip() {
    let receiver = Arc::new(RecordingReceiver::new());
    let server =
        TestServer::start(test_config(), Arc::new(StaticLookup::new()), receiver.clone()).await;

    let media = "http://cdn.example/movie.mp4?token=a&b=c";
    let response = post_play(&server, &serde_json::json!({ "videoUrl": media }).to_string()).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), format!("Playing {media}"));

    let dispatched = receiver.last().expect("receiver should be asked to play");
    let wrap_start = dispatched
        .find("/wrapVideo?url=")
        .expect("non-playlist media should be wrapped");

    // Fetch the playlist the receiver would fetch, from our actual port.
    let response = server
        .client
        .get(server.url(&dispatched[wrap_start..]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/vnd.apple.mpegurl"
    );
    let playlist = response.text().await.unwrap();
    assert!(playlist.starts_with("#EXTM3U\n"));
    assert!(playlist.contains(&format!("#EXTINF:10.0,\n{media}\n")));
    assert!(!playlist.contains("#EXT-X-ENDLIST"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_native_playlist_played_directly() {
    let receiver = Arc::new(RecordingReceiver::new());
    let server =
        TestServer::start(test_config(), Arc::new(StaticLookup::new()), receiver.clone()).await;

    let media = "http://cdn.example/live/index.M3U8";
    let response = post_play(&server, &serde_json::json!({ "videoUrl": media }).to_string()).await;
    assert_eq!(response.status(), 200);
    assert_eq!(receiver.played(), vec![media.to_string()]);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_rejected_bodies_never_reach_receiver() {
    let receiver = Arc::new(RecordingReceiver::new());
    let server =
        TestServer::start(test_config(), Arc::new(StaticLookup::new()), receiver.clone()).await;

    for body in ["not json", "{}", r#"{"videoUrl": ""}"#, r#"{"videoUrl": null}"#] {
        let response = post_play(&server, body).await;
        assert_eq!(response.status(), 400, "body {body:?}");
    }
    assert!(receiver.played().is_empty());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_on_request_policy_uses_query_flag() {
    let mut config = test_config();
    config.playback.wrap_policy = WrapPolicy::OnRequest;
    let receiver = Arc::new(RecordingReceiver::new());
    let server = TestServer::start(config, Arc::new(StaticLookup::new()), receiver.clone()).await;

    let body = serde_json::json!({ "videoUrl": "http://cdn.example/a.mp4" }).to_string();
    post_play(&server, &body).await;
    let response = server
        .client
        .post(server.url("/play?wrap=true"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let played = receiver.played();
    assert_eq!(played.len(), 2);
    assert_eq!(played[0], "http://cdn.example/a.mp4");
    assert!(played[1].contains("/wrapVideo?url=http%3A%2F%2Fcdn.example%2Fa.mp4"));

    server.stop().await.unwrap();
}

#[derive(Debug)]
struct ReceivedPlay {
    content_type: String,
    body: String,
}

async fn record_play(
    State(tx): State<mpsc::UnboundedSender<ReceivedPlay>>,
    headers: HeaderMap,
    body: String,
) {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let _ = tx.send(ReceivedPlay { content_type, body });
}

#[tokio::test]
async fn test_http_receiver_gets_play_command() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let receiver_addr = listener.local_addr().unwrap();
    let fake_receiver = Router::new().route("/play", post(record_play)).with_state(tx);
    tokio::spawn(async move {
        let _ = axum::serve(listener, fake_receiver).await;
    });

    let mut config = test_config();
    config.airplay.receiver_host = receiver_addr.ip().to_string();
    config.airplay.receiver_port = receiver_addr.port();
    let receiver = HttpAirPlayReceiver::new(&config.airplay).unwrap();
    let server =
        TestServer::start_with(config, Arc::new(StaticLookup::new()), Arc::new(receiver)).await;

    let media = "http://cdn.example/live.m3u8";
    let response = post_play(&server, &serde_json::json!({ "videoUrl": media }).to_string()).await;
    assert_eq!(response.status(), 200);

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("receiver should be contacted")
        .unwrap();
    assert_eq!(received.content_type, "text/parameters");
    assert!(received.body.contains(&format!("Content-Location: {media}\n")));
    assert!(received.body.contains("Start-Position: 0"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_receiver_does_not_fail_request() {
    // Bind then drop to get a port nobody listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = test_config();
    config.airplay.receiver_host = "127.0.0.1".to_string();
    config.airplay.receiver_port = port;
    let receiver = HttpAirPlayReceiver::new(&config.airplay).unwrap();
    let server =
        TestServer::start_with(config, Arc::new(StaticLookup::new()), Arc::new(receiver)).await;

    let response = post_play(
        &server,
        &serde_json::json!({ "videoUrl": "http://cdn.example/live.m3u8" }).to_string(),
    )
    .await;
    assert_eq!(response.status(), 200);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let mut config = test_config();
    config.server.body_read_timeout = Duration::from_millis(100);
    let receiver = Arc::new(RecordingReceiver::new());
    let server = TestServer::start(config, Arc::new(StaticLookup::new()), receiver.clone()).await;

    // Promise a body and send only part of it.
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(
            b"POST /play HTTP/1.1\r\nHost: atvboot\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"videoUrl\":",
        )
        .await
        .unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 1024];
    tokio::time::timeout(Duration::from_secs(5), async {
        while !response.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .expect("server should answer a stalled body");

    let response = String::from_utf8_lossy(&response);
    assert!(
        response.starts_with("HTTP/1.1 400"),
        "unexpected response: {response}"
    );
    assert!(receiver.played().is_empty());

    drop(stream);
    server.stop().await.unwrap();
}
