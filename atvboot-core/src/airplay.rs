//! AirPlay playback capability.
//!
//! The rest of the system only needs to tell a receiver "play this URL".
//! [`AirPlayReceiver`] is that capability; [`HttpAirPlayReceiver`] is the
//! production adapter speaking the minimal AirPlay video request.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AirPlayConfig;

const PLAY_CONTENT_TYPE: &str = "text/parameters";
const USER_AGENT: &str = "MediaControl/1.0";

/// Errors from the HTTP AirPlay adapter.
///
/// These never reach the dispatcher; they are only logged.
#[derive(Debug, Error)]
pub enum AirPlayError {
    #[error("AirPlay request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("AirPlay receiver rejected playback with status {status}")]
    Rejected { status: u16 },
}

/// Something that can be told to start playing a URL.
///
/// Fire-and-forget: implementations must return promptly and never report
/// playback failures to the caller.
pub trait AirPlayReceiver: Send + Sync {
    fn play(&self, url: &str);
}

/// AirPlay receiver reached over HTTP (`POST /play`).
#[derive(Debug, Clone)]
pub struct HttpAirPlayReceiver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAirPlayReceiver {
    /// Creates an adapter for the receiver in `config`.
    ///
    /// # Errors
    ///
    /// - `AirPlayError::Request` - The HTTP client could not be built
    pub fn new(config: &AirPlayConfig) -> Result<Self, AirPlayError> {
        Self::with_timeout(
            &config.receiver_host,
            config.receiver_port,
            config.request_timeout,
        )
    }

    /// Creates an adapter for an explicit host and port.
    ///
    /// # Errors
    ///
    /// - `AirPlayError::Request` - The HTTP client could not be built
    pub fn with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self, AirPlayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("http://{host}:{port}/play"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends the play request and waits for the receiver's answer.
    ///
    /// # Errors
    ///
    /// - `AirPlayError::Request` - Connection or timeout failure
    /// - `AirPlayError::Rejected` - Receiver answered with a non-success status
    pub async fn send_play(&self, url: &str) -> Result<(), AirPlayError> {
        let body = format!("Content-Location: {url}\nStart-Position: 0\n");
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, PLAY_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AirPlayError::Rejected {
                status: status.as_u16(),
            });
        }
        debug!(endpoint = %self.endpoint, url = %url, "AirPlay receiver accepted playback");
        Ok(())
    }
}

impl AirPlayReceiver for HttpAirPlayReceiver {
    fn play(&self, url: &str) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(url = %url, "No async runtime available, AirPlay request dropped");
                return;
            }
        };

        info!(endpoint = %self.endpoint, url = %url, "Sending AirPlay play request");
        let receiver = self.clone();
        let url = url.to_string();
        handle.spawn(async move {
            if let Err(e) = receiver.send_play(&url).await {
                warn!(endpoint = %receiver.endpoint, url = %url, error = %e, "AirPlay play request failed");
            }
        });
    }
}

/// Receiver double that records every URL it is asked to play.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingReceiver {
    played: parking_lot::Mutex<Vec<String>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every URL played so far, oldest first.
    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.played.lock().last().cloned()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl AirPlayReceiver for RecordingReceiver {
    fn play(&self, url: &str) {
        self.played.lock().push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Accepts one connection, answers with `status`, returns the raw request.
    async fn one_shot_receiver(status_line: &'static str) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !String::from_utf8_lossy(&request).contains("Start-Position: 0\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });
        (port, task)
    }

    #[tokio::test]
    async fn test_send_play_request_format() {
        let (port, task) = one_shot_receiver("HTTP/1.1 200 OK").await;
        let receiver =
            HttpAirPlayReceiver::with_timeout("127.0.0.1", port, Duration::from_secs(5)).unwrap();

        receiver.send_play("http://x/stream.m3u8").await.unwrap();

        let request = task.await.unwrap();
        assert!(request.starts_with("POST /play HTTP/1.1"));
        assert!(request.to_lowercase().contains("content-type: text/parameters"));
        assert!(request.contains("Content-Location: http://x/stream.m3u8\nStart-Position: 0\n"));
    }

    #[tokio::test]
    async fn test_send_play_rejected_status() {
        let (port, task) = one_shot_receiver("HTTP/1.1 403 Forbidden").await;
        let receiver =
            HttpAirPlayReceiver::with_timeout("127.0.0.1", port, Duration::from_secs(5)).unwrap();

        let err = receiver.send_play("http://x/a.mp4").await.unwrap_err();
        assert!(matches!(err, AirPlayError::Rejected { status: 403 }));
        task.await.unwrap();
    }

    #[test]
    fn test_endpoint_from_config() {
        let receiver = HttpAirPlayReceiver::new(&AirPlayConfig {
            receiver_host: "192.168.2.39".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(receiver.endpoint(), "http://192.168.2.39:7000/play");
    }

    #[test]
    fn test_play_without_runtime_does_not_panic() {
        let receiver = HttpAirPlayReceiver::new(&AirPlayConfig::default()).unwrap();
        receiver.play("http://x/a.mp4");
    }

    #[test]
    fn test_recording_receiver() {
        let receiver = RecordingReceiver::new();
        receiver.play("a");
        receiver.play("b");
        assert_eq!(receiver.played(), vec!["a", "b"]);
        assert_eq!(receiver.last().as_deref(), Some("b"));
    }
}
