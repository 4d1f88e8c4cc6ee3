// ABOUTME: Connection state machine for one controller session
// ABOUTME: Applies protocol messages and drives buffer, clock sync, and events

use crate::audio::chunk_buffer::ChunkBuffer;
use crate::audio::StreamFormat;
use crate::player::config::PlayerConfig;
use crate::player::events::{EventSender, PlayerEvent};
use crate::player::state::{ConnectionState, StatusHandle};
use crate::protocol::frames::decode_audio_frame;
use crate::protocol::messages::{
    AudioFormatSpec, ClientHello, ClientState, ClientTime, DeviceInfo, FormatRequest, Message,
    PlayerStateReport, PlayerSupport, ServerCommand, ServerTime, StreamClear, StreamEnd,
    StreamRequestFormat, StreamStart,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Minimum interval between buffer-overflow log lines
const OVERFLOW_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Identity of the controller captured from server/hello.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Unique server identifier
    pub id: String,
    /// Human-readable server name
    pub name: String,
}

/// State machine for one controller session.
///
/// Owns the connection state and applies inbound protocol messages:
/// clock-sync replies feed the synchronizer, audio frames feed the chunk
/// buffer, stream and command messages mutate state and surface as
/// [`PlayerEvent`]s. Outbound JSON goes through an unbounded channel so
/// message handling never blocks on the socket.
///
/// Message handling is synchronous; the surrounding task pumps the
/// WebSocket and reports transport failures via [`Session::fail`].
pub struct Session {
    state: ConnectionState,
    config: Arc<PlayerConfig>,
    client_id: String,
    buffer: Arc<ChunkBuffer>,
    sync: Arc<crate::sync::ClockSync>,
    clock: Arc<crate::sync::LocalClock>,
    status: StatusHandle,
    outbound: mpsc::UnboundedSender<String>,
    events: EventSender,
    stream: Option<StreamFormat>,
    server: Option<ServerInfo>,
    overflow_drops: u64,
    overflow_logged_at: Option<Instant>,
}

impl Session {
    /// Create a session over a freshly accepted socket.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<PlayerConfig>,
        client_id: String,
        buffer: Arc<ChunkBuffer>,
        sync: Arc<crate::sync::ClockSync>,
        clock: Arc<crate::sync::LocalClock>,
        status: StatusHandle,
        outbound: mpsc::UnboundedSender<String>,
        events: EventSender,
    ) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            client_id,
            buffer,
            sync,
            clock,
            status,
            outbound,
            events,
            stream: None,
            server: None,
            overflow_drops: 0,
            overflow_logged_at: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Controller identity, once server/hello has arrived.
    pub fn server(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// Format of the active stream, if any.
    pub fn stream_format(&self) -> Option<&StreamFormat> {
        self.stream.as_ref()
    }

    /// Open the session: send client/hello and await the handshake reply.
    pub fn begin(&mut self) {
        self.status.update(|s| s.error = None);
        self.set_state(ConnectionState::Connecting);
        let hello = self.build_hello();
        self.send(&Message::ClientHello(hello));
        self.set_state(ConnectionState::Handshaking);
    }

    /// Apply one inbound JSON text frame.
    pub fn handle_text(&mut self, text: &str) {
        let msg = match Message::parse(text) {
            Some(msg) => msg,
            None => {
                log::warn!("Dropping unparseable message ({} bytes)", text.len());
                return;
            }
        };

        match msg {
            Message::ServerHello(hello) => {
                if self.state != ConnectionState::Handshaking {
                    log::debug!("Ignoring server/hello in state {}", self.state);
                    return;
                }
                log::info!("Controller connected: {} ({})", hello.name, hello.server_id);
                self.server = Some(ServerInfo {
                    id: hello.server_id,
                    name: hello.name,
                });
                self.set_state(ConnectionState::SyncingClock);
            }
            Message::ServerTime(time) => self.handle_server_time(time),
            Message::StreamStart(start) => self.handle_stream_start(start),
            Message::StreamClear(clear) => self.handle_stream_clear(clear),
            Message::StreamEnd(end) => self.handle_stream_end(end),
            Message::ServerCommand(cmd) => self.handle_server_command(cmd),
            Message::ServerState(_) => {
                // Metadata and controller roles are not negotiated; nothing
                // to apply.
            }
            other => {
                log::debug!("Ignoring unexpected message: {:?}", other);
            }
        }
    }

    /// Apply one inbound binary frame.
    pub fn handle_binary(&mut self, data: &[u8]) {
        let chunk = match decode_audio_frame(data) {
            Some(chunk) => chunk,
            None => {
                // Artwork and visualizer frames land here too; only audio
                // is consumed.
                log::debug!("Ignoring binary frame ({} bytes)", data.len());
                return;
            }
        };

        if !self.buffer.write(chunk) {
            self.note_overflow_drop();
        }
    }

    /// Ask the controller for a different stream format.
    pub fn request_format(&self, request: FormatRequest) {
        self.send(&Message::StreamRequestFormat(StreamRequestFormat {
            player: Some(request),
        }));
    }

    /// Tear down after an unrecoverable transport failure.
    ///
    /// Captures the message, releases session resources, and settles in
    /// the disconnected state so a new inbound session can be admitted.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("Session failed: {}", message);
        self.set_state(ConnectionState::Error);
        self.status.update(|s| s.error = Some(message));
        self.cleanup();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Tear down after an orderly close.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        log::info!("Session closed");
        self.cleanup();
        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_server_time(&mut self, time: ServerTime) {
        if !self.state.accepts_time_sync() {
            log::debug!("Ignoring server/time in state {}", self.state);
            return;
        }
        let received = self.clock.now_micros();
        self.sync.add_sample(
            time.client_transmitted,
            time.server_received,
            time.server_transmitted,
            received,
        );

        if self.state == ConnectionState::SyncingClock && self.sync.is_synced() {
            log::info!(
                "Clock synced: offset {} us over {} samples",
                self.sync.offset_micros(),
                self.sync.sample_count()
            );
            self.set_state(ConnectionState::Connected);
            self.send_state_report();
        }
    }

    fn handle_stream_start(&mut self, start: StreamStart) {
        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Streaming
        ) {
            log::debug!("Ignoring stream/start in state {}", self.state);
            return;
        }

        let format = match start.player.decode_format() {
            Some(format) => format,
            None => {
                log::warn!("Dropping stream/start with invalid codec header");
                return;
            }
        };

        log::info!(
            "Stream start: {} {} Hz, {} ch, {} bit",
            format.codec,
            format.sample_rate,
            format.channels,
            format.bit_depth
        );

        self.buffer.clear();
        self.stream = Some(format.clone());
        self.set_state(ConnectionState::Streaming);
        let _ = self.events.send(PlayerEvent::StreamStart(format));
    }

    fn handle_stream_clear(&mut self, clear: StreamClear) {
        if !roles_include_player(clear.roles.as_deref()) {
            return;
        }
        log::debug!("Stream clear: flushing {} buffered bytes", self.buffer.bytes());
        self.buffer.clear();
    }

    fn handle_stream_end(&mut self, end: StreamEnd) {
        if !roles_include_player(end.roles.as_deref()) {
            return;
        }
        log::info!("Stream end");
        self.buffer.clear();
        self.stream = None;
        if self.state == ConnectionState::Streaming {
            self.set_state(ConnectionState::Connected);
        }
        let _ = self.events.send(PlayerEvent::StreamEnd);
    }

    fn handle_server_command(&mut self, cmd: ServerCommand) {
        let Some(player) = cmd.player else {
            return;
        };

        match player.command.as_str() {
            "volume" => {
                let Some(volume) = player.volume else {
                    log::debug!("volume command without a volume value");
                    return;
                };
                let volume = volume.min(100);
                self.status.update(|s| s.volume = volume);
                let _ = self.events.send(PlayerEvent::VolumeChange(volume));
                self.send_state_report();
            }
            "mute" => {
                let Some(muted) = player.mute else {
                    log::debug!("mute command without a mute value");
                    return;
                };
                self.status.update(|s| s.muted = muted);
                let _ = self.events.send(PlayerEvent::MuteChange(muted));
                self.send_state_report();
            }
            other => {
                log::debug!("Ignoring unsupported player command: {}", other);
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        log::debug!("Connection state: {} -> {}", self.state, state);
        self.state = state;
        self.status.update(|s| s.connection = state);
    }

    fn cleanup(&mut self) {
        self.buffer.clear();
        self.sync.reset();
        self.server = None;
        if self.stream.take().is_some() {
            // The playback engine is driven by events; make sure it stops
            // when the session dies mid-stream.
            let _ = self.events.send(PlayerEvent::StreamEnd);
        }
    }

    fn build_hello(&self) -> ClientHello {
        ClientHello {
            client_id: self.client_id.clone(),
            name: self.config.name.clone(),
            version: 1,
            supported_roles: vec!["player@v1".to_string()],
            device_info: DeviceInfo {
                product_name: self.config.product_name.clone(),
                manufacturer: self.config.manufacturer.clone(),
                software_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            player_support: Some(PlayerSupport {
                supported_formats: supported_formats(),
                buffer_capacity: self.buffer.capacity() as u64,
                supported_commands: vec!["volume".to_string(), "mute".to_string()],
            }),
        }
    }

    fn send_state_report(&self) {
        let status = self.status.current();
        let state = if self.state == ConnectionState::Error {
            "error"
        } else {
            "synchronized"
        };
        self.send(&Message::ClientState(ClientState {
            player: Some(PlayerStateReport {
                state: state.to_string(),
                volume: status.volume,
                muted: status.muted,
            }),
        }));
    }

    fn send(&self, msg: &Message) {
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to serialize message: {}", e);
                return;
            }
        };
        if self.outbound.send(json).is_err() {
            log::debug!("Outbound channel closed, message dropped");
        }
    }

    fn note_overflow_drop(&mut self) {
        self.overflow_drops += 1;
        let due = match self.overflow_logged_at {
            Some(at) => at.elapsed() >= OVERFLOW_LOG_INTERVAL,
            None => true,
        };
        if due {
            log::warn!(
                "Buffer full: dropped {} chunks ({}% used)",
                self.overflow_drops,
                self.buffer.usage_percent() as u32
            );
            self.overflow_logged_at = Some(Instant::now());
            self.overflow_drops = 0;
        }
    }
}

/// Compose a client/time probe carrying the current local time.
pub fn time_probe(clock: &crate::sync::LocalClock) -> Option<String> {
    serde_json::to_string(&Message::ClientTime(ClientTime {
        client_transmitted: clock.now_micros(),
    }))
    .ok()
}

fn roles_include_player(roles: Option<&[String]>) -> bool {
    roles
        .map(|roles| roles.iter().any(|r| r == "player"))
        .unwrap_or(false)
}

fn supported_formats() -> Vec<AudioFormatSpec> {
    [48_000, 44_100]
        .into_iter()
        .map(|sample_rate| AudioFormatSpec {
            codec: "pcm".to_string(),
            channels: 2,
            sample_rate,
            bit_depth: 16,
        })
        .collect()
}
