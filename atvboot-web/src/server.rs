//! Request router and the plaintext/TLS listener pair
//!
//! Both listeners serve the same [`Router`]. Each runs as its own task; when
//! one exits or a shutdown signal arrives, the other is drained and stopped.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use atvboot_core::dispatcher::WRAP_PATH;
use atvboot_core::{
    AirPlayReceiver, BootstrapAsset, BootstrapConfig, EnvironmentResolver, HostLookup,
    PlaybackDispatcher, PlaylistSynthesizer,
};
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::handlers::{
    ASSET_PATH, PLAY_PATH, bootstrap_asset, play_video, unmatched, wrap_video,
};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Startup configuration
    pub config: Arc<BootstrapConfig>,
    /// Bootstrap script template
    pub asset: Arc<BootstrapAsset>,
    /// Interception check, run per asset request
    pub resolver: EnvironmentResolver,
    /// Playlist builder for `/wrapVideo`
    pub playlist: PlaylistSynthesizer,
    /// Direct/wrapped decision and AirPlay hand-off
    pub dispatcher: PlaybackDispatcher,
}

impl AppState {
    /// Wires the core components from one configuration.
    pub fn new(
        config: Arc<BootstrapConfig>,
        asset: BootstrapAsset,
        lookup: Arc<dyn HostLookup>,
        receiver: Arc<dyn AirPlayReceiver>,
    ) -> Self {
        Self {
            resolver: EnvironmentResolver::new(&config.intercept, lookup),
            playlist: PlaylistSynthesizer::new(config.playback.end_list),
            dispatcher: PlaybackDispatcher::new(&config, receiver),
            asset: Arc::new(asset),
            config,
        }
    }
}

/// Listener lifecycle failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A listener could not bind its address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// The TLS certificate pair could not be loaded.
    #[error("Failed to load TLS certificate {cert} / key {key}: {source}")]
    Tls {
        /// Certificate path
        cert: PathBuf,
        /// Private key path
        key: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A running listener stopped with an error.
    #[error("{listener} listener failed: {source}")]
    Listener {
        /// "http" or "https"
        listener: &'static str,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A listener task panicked or was cancelled.
    #[error("{listener} listener task aborted: {reason}")]
    Aborted {
        /// "http" or "https", when known
        listener: &'static str,
        /// Join error description
        reason: String,
    },
}

/// Builds the router shared by both listeners.
pub fn build_router(state: AppState) -> Router {
    let play = post(play_video).fallback(unmatched);
    let play = if state.config.playback.allow_cross_origin {
        play.layer(CorsLayer::permissive())
    } else {
        play
    };

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(RequestBodyTimeoutLayer::new(
            state.config.server.body_read_timeout,
        ));

    Router::new()
        .route(ASSET_PATH, get(bootstrap_asset).fallback(unmatched))
        .route(WRAP_PATH, get(wrap_video).fallback(unmatched))
        .route(PLAY_PATH, play)
        .fallback(unmatched)
        .layer(middleware)
        .with_state(state)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail = %detail, "Handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Unbound server: configuration plus router.
pub struct BootstrapServer {
    config: Arc<BootstrapConfig>,
    router: Router,
}

impl BootstrapServer {
    /// Creates a server for `state`.
    pub fn new(state: AppState) -> Self {
        Self {
            config: state.config.clone(),
            router: build_router(state),
        }
    }

    /// Router served by both listeners.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Binds the plaintext socket and loads the TLS certificate pair.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` - Plaintext port unavailable
    /// - `ServerError::Tls` - Certificate or key unreadable or invalid
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let server = &self.config.server;
        let http_addr = SocketAddr::new(server.bind_address, server.http_port);
        let http_listener = TcpListener::bind(http_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: http_addr,
                source,
            })?;

        let tls = if server.tls_enabled {
            let cert = self.config.cert_path();
            let key = self.config.key_path();
            let tls_config = RustlsConfig::from_pem_file(&cert, &key)
                .await
                .map_err(|source| ServerError::Tls {
                    cert: cert.clone(),
                    key: key.clone(),
                    source,
                })?;
            Some((SocketAddr::new(server.bind_address, server.tls_port), tls_config))
        } else {
            None
        };

        Ok(BoundServer {
            config: self.config,
            router: self.router,
            http_listener,
            tls,
        })
    }

    /// Binds and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// - `ServerError` - Binding failed or a listener stopped with an error
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.serve(shutdown_signal()).await
    }
}

/// Server with its plaintext socket bound, ready to serve.
pub struct BoundServer {
    config: Arc<BootstrapConfig>,
    router: Router,
    http_listener: TcpListener,
    tls: Option<(SocketAddr, RustlsConfig)>,
}

impl BoundServer {
    /// Local address of the plaintext listener.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - Socket has no local address
    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http_listener.local_addr()
    }

    /// Serves both listeners until `shutdown` resolves or one of them exits.
    ///
    /// # Errors
    ///
    /// - `ServerError::Listener` - A listener stopped with an I/O error
    /// - `ServerError::Aborted` - A listener task panicked
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) -> Result<(), ServerError> {
        let grace = self.config.server.shutdown_grace;
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut listeners: JoinSet<(&'static str, std::io::Result<()>)> = JoinSet::new();

        let http_addr = self.http_addr().ok();
        info!(addr = ?http_addr, "HTTP listener starting");
        let mut http_shutdown = shutdown_tx.subscribe();
        let http_router = self.router.clone();
        let http_listener = self.http_listener;
        listeners.spawn(async move {
            let result = axum::serve(http_listener, http_router)
                .with_graceful_shutdown(async move {
                    let _ = http_shutdown.recv().await;
                })
                .await;
            ("http", result)
        });

        if let Some((tls_addr, tls_config)) = self.tls {
            info!(addr = %tls_addr, "HTTPS listener starting");
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            let mut tls_shutdown = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let _ = tls_shutdown.recv().await;
                shutdown_handle.graceful_shutdown(Some(grace));
            });

            let tls_router = self.router.clone();
            listeners.spawn(async move {
                let result = axum_server::bind_rustls(tls_addr, tls_config)
                    .handle(handle)
                    .serve(tls_router.into_make_service())
                    .await;
                ("https", result)
            });
        }

        let mut first_error = None;
        tokio::select! {
            _ = shutdown => info!("Shutdown requested"),
            Some(joined) = listeners.join_next() => {
                record_exit(joined, &mut first_error);
            }
        }

        let _ = shutdown_tx.send(());
        let drain = async {
            while let Some(joined) = listeners.join_next().await {
                record_exit(joined, &mut first_error);
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(grace_secs = grace.as_secs(), "Listeners did not stop in time, aborting");
            listeners.abort_all();
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn record_exit(
    joined: Result<(&'static str, std::io::Result<()>), tokio::task::JoinError>,
    first_error: &mut Option<ServerError>,
) {
    let err = match joined {
        Ok((listener, Ok(()))) => {
            info!(listener, "Listener stopped");
            return;
        }
        Ok((listener, Err(source))) => ServerError::Listener { listener, source },
        Err(join_error) => ServerError::Aborted {
            listener: "unknown",
            reason: join_error.to_string(),
        },
    };
    error!(error = %err, "Listener exited with error");
    first_error.get_or_insert(err);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}
