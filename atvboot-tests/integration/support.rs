//! Shared harness: a real server on an ephemeral port with fake collaborators.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use atvboot_core::{
    AirPlayReceiver, BootstrapAsset, BootstrapConfig, HostLookup, RecordingReceiver, StaticLookup,
};
use atvboot_web::{AppState, BootstrapServer, ServerError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const TEMPLATE: &str = "var App = { main: '{{config.MainTemplate}}' };\n";

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const UPSTREAM: IpAddr = IpAddr::V4(Ipv4Addr::new(52, 4, 100, 7));

/// Configuration for a plaintext-only server on an ephemeral port.
pub fn test_config() -> BootstrapConfig {
    let mut config = BootstrapConfig::for_testing();
    config.server.http_port = 0;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Starts a server backed by an in-memory lookup and a recording receiver.
    pub async fn start(
        config: BootstrapConfig,
        lookup: Arc<StaticLookup>,
        receiver: Arc<RecordingReceiver>,
    ) -> Self {
        Self::start_with(config, lookup, receiver).await
    }

    pub async fn start_with(
        config: BootstrapConfig,
        lookup: Arc<dyn HostLookup>,
        receiver: Arc<dyn AirPlayReceiver>,
    ) -> Self {
        let state = AppState::new(
            Arc::new(config),
            BootstrapAsset::new(TEMPLATE),
            lookup,
            receiver,
        );
        let bound = BootstrapServer::new(state)
            .bind()
            .await
            .expect("Plaintext listener should bind an ephemeral port");
        let addr = bound.http_addr().expect("Bound listener has an address");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(bound.serve(async {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            client: reqwest::Client::new(),
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Requests shutdown and returns the listener outcome.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.task)
            .await
            .expect("Server task should not panic")
    }
}
