//! CLI command implementations

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use atvboot_core::{
    BootstrapAsset, BootstrapConfig, BootstrapError, EntryPointUrl, EnvironmentResolver, HttpAirPlayReceiver,
    PlaylistSynthesizer, SystemLookup, WrapPolicy,
};
use atvboot_web::{AppState, BootstrapServer};
use clap::{Args, Subcommand};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the plaintext and TLS listeners
    Serve(ServeArgs),
    /// Show whether the intercepted domain currently points at this host
    Resolve {
        /// Intercepted host to check (defaults to configuration)
        #[arg(long)]
        host: Option<String>,
    },
    /// Print the playlist `/wrapVideo` would serve for a media URL
    Playlist {
        /// Media URL to wrap
        url: String,
        /// Terminate the playlist with #EXT-X-ENDLIST
        #[arg(long)]
        end_list: bool,
    },
}

/// Overrides applied on top of `BootstrapConfig::from_env()`.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address both listeners bind to
    #[arg(long)]
    pub bind: Option<IpAddr>,
    /// Plaintext HTTP port
    #[arg(long)]
    pub http_port: Option<u16>,
    /// TLS port
    #[arg(long)]
    pub tls_port: Option<u16>,
    /// Run without the TLS listener
    #[arg(long)]
    pub no_tls: bool,
    /// Bootstrap script template
    #[arg(long)]
    pub template: Option<PathBuf>,
    /// TLS certificate (PEM)
    #[arg(long)]
    pub cert: Option<PathBuf>,
    /// TLS private key (PEM)
    #[arg(long)]
    pub key: Option<PathBuf>,
    /// AirPlay receiver host
    #[arg(long)]
    pub receiver: Option<String>,
    /// Direct vs. wrapped playback policy
    #[arg(long, value_enum)]
    pub wrap_policy: Option<WrapPolicy>,
    /// Host the receiver uses to reach this server
    #[arg(long)]
    pub self_host: Option<String>,
    /// Terminate synthesized playlists with #EXT-X-ENDLIST
    #[arg(long)]
    pub end_list: bool,
}

impl ServeArgs {
    /// Applies every flag that was given to `config`.
    pub fn apply(&self, config: &mut BootstrapConfig) {
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(port) = self.http_port {
            config.server.http_port = port;
        }
        if let Some(port) = self.tls_port {
            config.server.tls_port = port;
        }
        if self.no_tls {
            config.server.tls_enabled = false;
        }
        if let Some(template) = &self.template {
            config.intercept.template_path = template.clone();
        }
        if let Some(cert) = &self.cert {
            config.server.cert_path = Some(cert.clone());
        }
        if let Some(key) = &self.key {
            config.server.key_path = Some(key.clone());
        }
        if let Some(receiver) = &self.receiver {
            config.airplay.receiver_host = receiver.clone();
        }
        if let Some(policy) = self.wrap_policy {
            config.playback.wrap_policy = policy;
        }
        if let Some(host) = &self.self_host {
            config.playback.self_host = host.clone();
        }
        if self.end_list {
            config.playback.end_list = true;
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of whichever command fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve(args) => serve(args).await,
        Commands::Resolve { host } => resolve(host).await,
        Commands::Playlist { url, end_list } => {
            print!("{}", PlaylistSynthesizer::new(end_list).wrap(&url));
            Ok(())
        }
    }
}

/// Start both listeners and run until Ctrl-C
///
/// # Errors
/// - Invalid configuration
/// - Template, certificate or socket setup failure
/// - A listener stopping with an error
pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = BootstrapConfig::from_env();
    args.apply(&mut config);
    config
        .validate()
        .map_err(|e| operator_error(e.into()))?;

    let asset = BootstrapAsset::load(&config.intercept.template_path).map_err(operator_error)?;
    let receiver = HttpAirPlayReceiver::new(&config.airplay)
        .context("failed to create AirPlay client")?;

    info!(
        intercepted = %config.intercept.intercepted_host,
        http_port = config.server.http_port,
        tls_port = config.server.tls_enabled.then_some(config.server.tls_port),
        receiver = %receiver.endpoint(),
        wrap_policy = %config.playback.wrap_policy,
        "Starting atvboot"
    );

    let state = AppState::new(
        Arc::new(config),
        asset,
        Arc::new(SystemLookup),
        Arc::new(receiver),
    );
    BootstrapServer::new(state).run().await?;

    info!("atvboot stopped");
    Ok(())
}

/// Print the interception state and the entry point it selects
///
/// # Errors
/// - Name resolution failure
pub async fn resolve(host: Option<String>) -> anyhow::Result<()> {
    let mut config = BootstrapConfig::from_env();
    if let Some(host) = host {
        config.intercept.intercepted_host = host;
    }

    let resolver = EnvironmentResolver::system(&config.intercept);
    let state = resolver
        .resolve()
        .await
        .map_err(|e| operator_error(e.into()))?;
    let entry_point = EntryPointUrl::for_state(state, &config.intercept);

    println!("Host:        {}", resolver.host());
    println!("State:       {state}");
    println!("Entry point: {entry_point}");
    Ok(())
}

/// Puts the operator-facing message on top of the full error chain.
fn operator_error(err: BootstrapError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
