// ABOUTME: Connection state and observable player status snapshots
// ABOUTME: Immutable snapshots broadcast through a watch channel

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Connection lifecycle of the single active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session
    Disconnected,
    /// Socket accepted, hello not yet sent
    Connecting,
    /// client/hello sent, waiting for server/hello
    Handshaking,
    /// Handshake complete, gathering clock samples
    SyncingClock,
    /// Clock synced, no active stream
    Connected,
    /// Stream format negotiated, audio flowing
    Streaming,
    /// Unrecoverable transport failure being torn down
    Error,
}

impl ConnectionState {
    /// Whether server/time replies are expected and consumed in this state.
    pub fn accepts_time_sync(&self) -> bool {
        matches!(
            self,
            ConnectionState::SyncingClock | ConnectionState::Connected | ConnectionState::Streaming
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::SyncingClock => "syncing-clock",
            ConnectionState::Connected => "connected",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of everything a host application can observe about the player.
///
/// Written by the session and the playback engine, read by whoever
/// subscribes. Snapshots are swapped whole through the watch channel, so a
/// reader never sees a half-updated state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    /// Current session state
    pub connection: ConnectionState,
    /// Volume on the protocol's 0-100 scale
    pub volume: u8,
    /// Whether output is muted
    pub muted: bool,
    /// Ring buffer fill level, percent of capacity
    pub buffer_usage: f32,
    /// Whether a stream is currently active
    pub stream_active: bool,
    /// Last error message, if any
    pub error: Option<String>,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            volume: 100,
            muted: false,
            buffer_usage: 0.0,
            stream_active: false,
            error: None,
        }
    }
}

/// Shared handle for publishing and subscribing to [`PlayerStatus`].
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: Arc<watch::Sender<PlayerStatus>>,
}

impl StatusHandle {
    /// Create a handle starting from the default status.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PlayerStatus::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot.
    pub fn current(&self) -> PlayerStatus {
        self.tx.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.tx.subscribe()
    }

    /// Mutate the status and broadcast the new snapshot if it changed.
    pub fn update(&self, f: impl FnOnce(&mut PlayerStatus)) {
        self.tx.send_if_modified(|status| {
            let before = status.clone();
            f(status);
            *status != before
        });
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}
