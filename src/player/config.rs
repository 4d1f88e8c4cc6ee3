// ABOUTME: Player configuration
// ABOUTME: Defines configurable parameters for the Sendspin player

use crate::audio::chunk_buffer::DEFAULT_CAPACITY;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Player configuration
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Address to bind the session listener to
    pub bind_addr: SocketAddr,
    /// WebSocket endpoint path
    pub ws_path: String,
    /// Player name announced to controllers and over mDNS
    pub name: String,
    /// Product name reported in client/hello device info
    pub product_name: String,
    /// Manufacturer reported in client/hello device info
    pub manufacturer: String,
    /// Chunk buffer capacity in bytes
    pub buffer_capacity: usize,
    /// Where the persistent client identity is stored
    pub identity_file: PathBuf,
    /// Bounded wait for audio before playback starts
    pub prebuffer_timeout: Duration,
}

impl PlayerConfig {
    /// Create a configuration with the given player name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the WebSocket path
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Set the chunk buffer capacity in bytes
    pub fn buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    /// Set the identity file location
    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = path.into();
        self
    }

    /// Set the pre-buffer timeout
    pub fn prebuffer_timeout(mut self, timeout: Duration) -> Self {
        self.prebuffer_timeout = timeout;
        self
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8927".parse().unwrap(),
            ws_path: "/sendspin".to_string(),
            name: "Sendspin Rust Player".to_string(),
            product_name: "Sendspin-RS Player".to_string(),
            manufacturer: "Sendspin".to_string(),
            buffer_capacity: DEFAULT_CAPACITY,
            identity_file: PathBuf::from("sendspin-player.id"),
            prebuffer_timeout: Duration::from_secs(5),
        }
    }
}
