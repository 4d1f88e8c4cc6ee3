// ABOUTME: Shared CLI argument parsing and player builder utilities
// ABOUTME: Keeps binary startup code consistent with the library defaults

use crate::audio::chunk_buffer::DEFAULT_CAPACITY;
use crate::player::config::PlayerConfig;
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Common player arguments for binaries.
///
/// Use with `#[command(flatten)]` in your binary's Args struct.
#[derive(Args, Debug, Clone)]
pub struct PlayerArgs {
    /// Address to bind the session listener to
    #[arg(short, long, default_value = "0.0.0.0:8927")]
    pub bind: SocketAddr,

    /// Player name (shown to controllers and in discovery)
    #[arg(short, long, default_value = "Sendspin Rust Player")]
    pub name: String,

    /// WebSocket endpoint path
    #[arg(long, default_value = "/sendspin")]
    pub path: String,

    /// Audio chunk buffer capacity in bytes
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub buffer_bytes: usize,

    /// Where to store the persistent client identity
    #[arg(long, default_value = "sendspin-player.id")]
    pub identity_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl PlayerArgs {
    /// Initialize tracing based on verbosity flag
    pub fn init_tracing(&self) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let filter = if self.verbose {
            "sendspin_player=debug,tower_http=debug"
        } else {
            "sendspin_player=info"
        };

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| filter.into()),
            )
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    /// Log startup information
    pub fn log_startup_info(&self) {
        tracing::info!("Sendspin Player v{}", env!("CARGO_PKG_VERSION"));
        tracing::info!("Bind: {}", self.bind);
        tracing::info!("Endpoint: ws://{}{}", self.bind, self.path);
        tracing::info!("Buffer: {} bytes", self.buffer_bytes);
    }

    /// Build a [`PlayerConfig`] from these args
    pub fn build_config(&self) -> PlayerConfig {
        PlayerConfig::new(&self.name)
            .bind_addr(self.bind)
            .ws_path(self.path.clone())
            .buffer_capacity(self.buffer_bytes)
            .identity_file(self.identity_file.clone())
    }
}
