// ABOUTME: Main Sendspin player service
// ABOUTME: Binds discovery, the session listener, and playback into one instance

use crate::audio::chunk_buffer::ChunkBuffer;
use crate::audio::PlaybackEngine;
use crate::player::config::PlayerConfig;
use crate::player::discovery::Advertiser;
use crate::player::events::{self, EventReceiver, EventSender, PlayerEvent};
use crate::player::session::{time_probe, Session};
use crate::player::state::{PlayerStatus, StatusHandle};
use crate::sync::{ClockSync, LocalClock};
use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::any,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Clock samples requested immediately after the handshake
const SYNC_BURST_COUNT: usize = 5;

/// Spacing between burst samples
const SYNC_BURST_INTERVAL: Duration = Duration::from_millis(50);

/// Steady-state re-sync cadence
const SYNC_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

struct ActiveSession {
    cancel: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

/// Shared state behind the running player.
struct PlayerCore {
    config: Arc<PlayerConfig>,
    client_id: String,
    buffer: Arc<ChunkBuffer>,
    sync: Arc<ClockSync>,
    clock: Arc<LocalClock>,
    status: StatusHandle,
    engine: parking_lot::Mutex<PlaybackEngine>,
    events: EventSender,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

/// Shared application state for the WebSocket route
#[derive(Clone)]
struct AppState {
    core: Arc<PlayerCore>,
}

/// Sendspin player service.
///
/// Advertises the player over mDNS, listens for controller sessions on a
/// WebSocket endpoint, and wires the session, clock sync, chunk buffer,
/// and playback engine together. Exactly one controller session is active
/// at a time; a new inbound connection replaces the previous one.
pub struct SendspinPlayer {
    core: Arc<PlayerCore>,
    events_rx: EventReceiver,
}

impl SendspinPlayer {
    /// Create a player with default configuration.
    pub fn new() -> crate::Result<Self> {
        Self::with_config(PlayerConfig::default())
    }

    /// Create a player with custom configuration.
    ///
    /// Loads the persistent client identity, generating and storing a new
    /// UUID on first run.
    pub fn with_config(config: PlayerConfig) -> crate::Result<Self> {
        let client_id = load_or_create_client_id(&config.identity_file)?;
        let config = Arc::new(config);
        let buffer = Arc::new(ChunkBuffer::with_capacity(config.buffer_capacity));
        let sync = Arc::new(ClockSync::new());
        let clock = Arc::new(LocalClock::new());
        let status = StatusHandle::new();
        let engine = PlaybackEngine::new(
            Arc::clone(&buffer),
            Arc::clone(&sync),
            Arc::clone(&clock),
            status.clone(),
        )
        .with_prebuffer_timeout(config.prebuffer_timeout);
        let (events, events_rx) = events::channel();

        Ok(Self {
            core: Arc::new(PlayerCore {
                config,
                client_id,
                buffer,
                sync,
                clock,
                status,
                engine: parking_lot::Mutex::new(engine),
                events,
                active: tokio::sync::Mutex::new(None),
            }),
            events_rx,
        })
    }

    /// Persistent client identity.
    pub fn client_id(&self) -> &str {
        &self.core.client_id
    }

    /// Player configuration.
    pub fn config(&self) -> &PlayerConfig {
        &self.core.config
    }

    /// Current player status snapshot.
    pub fn status(&self) -> PlayerStatus {
        self.core.status.current()
    }

    /// Subscribe to player status snapshots.
    pub fn subscribe_status(&self) -> watch::Receiver<PlayerStatus> {
        self.core.status.subscribe()
    }

    /// Set the output volume from the host application (0-100).
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        self.core.engine.lock().set_volume(volume);
        self.core.status.update(|s| s.volume = volume);
    }

    /// Set the mute state from the host application.
    pub fn set_mute(&self, muted: bool) {
        self.core.engine.lock().set_mute(muted);
        self.core.status.update(|s| s.muted = muted);
    }

    /// Run the player until ctrl-c.
    pub async fn run(self) -> crate::Result<()> {
        let SendspinPlayer { core, mut events_rx } = self;

        // Controllers with a configured address can connect without mDNS.
        let advertiser = match Advertiser::advertise(&core.config) {
            Ok(advertiser) => Some(advertiser),
            Err(e) => {
                log::warn!("mDNS advertisement failed: {}", e);
                None
            }
        };

        let event_core = Arc::clone(&core);
        let event_task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                apply_event(&event_core, event);
            }
        });

        let app = Router::new()
            .route(&core.config.ws_path, any(ws_handler))
            .with_state(AppState {
                core: Arc::clone(&core),
            });

        let listener = tokio::net::TcpListener::bind(core.config.bind_addr).await?;
        log::info!(
            "Sendspin player listening on {} (endpoint: {})",
            core.config.bind_addr,
            core.config.ws_path
        );

        let shutdown_signal = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for Ctrl-C");
            log::info!("Received shutdown signal");
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        if let Some(active) = core.active.lock().await.take() {
            let _ = active.cancel.send(true);
            let _ = active.handle.await;
        }
        event_task.abort();
        core.engine.lock().stop();
        if let Some(advertiser) = advertiser {
            advertiser.shutdown();
        }

        log::info!("Player shutdown complete");
        Ok(())
    }
}

/// Translate session events into playback engine actions.
fn apply_event(core: &PlayerCore, event: PlayerEvent) {
    match event {
        PlayerEvent::StreamStart(format) => {
            core.engine.lock().start(&format);
        }
        PlayerEvent::StreamEnd => {
            core.engine.lock().stop();
        }
        PlayerEvent::VolumeChange(volume) => {
            core.engine.lock().set_volume(volume);
        }
        PlayerEvent::MuteChange(muted) => {
            core.engine.lock().set_mute(muted);
        }
    }
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| admit_session(state.core, socket))
}

/// Admit a new controller session, tearing down any previous one first.
async fn admit_session(core: Arc<PlayerCore>, socket: WebSocket) {
    let mut active = core.active.lock().await;
    if let Some(previous) = active.take() {
        log::info!("New inbound session, closing the previous one");
        let _ = previous.cancel.send(true);
        let _ = previous.handle.await;
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let session_core = Arc::clone(&core);
    let handle = tokio::spawn(run_session(session_core, socket, cancel_rx));
    *active = Some(ActiveSession {
        cancel: cancel_tx,
        handle,
    });
}

/// Pump one controller session until close, error, or cancellation.
async fn run_session(core: Arc<PlayerCore>, socket: WebSocket, mut cancel: watch::Receiver<bool>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(json) = out_rx.recv().await {
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                log::debug!("Session send failed, stopping outbound pump");
                break;
            }
        }
    });

    let mut session = Session::new(
        Arc::clone(&core.config),
        core.client_id.clone(),
        Arc::clone(&core.buffer),
        Arc::clone(&core.sync),
        Arc::clone(&core.clock),
        core.status.clone(),
        out_tx.clone(),
        core.events.clone(),
    );
    session.begin();

    let sync_task = tokio::spawn(run_sync_scheduler(
        core.status.subscribe(),
        out_tx,
        Arc::clone(&core.clock),
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => session.handle_text(&text),
                Some(Ok(WsMessage::Binary(data))) => session.handle_binary(&data),
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {
                    // Liveness is the socket's ping/pong; axum answers pings
                    // for us.
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    session.close();
                    break;
                }
                Some(Err(e)) => {
                    session.fail(e.to_string());
                    break;
                }
            },
            _ = cancel.changed() => {
                session.close();
                break;
            }
        }
    }

    sync_task.abort();
    send_task.abort();
}

/// Request clock samples: a burst after the handshake, then every 30s.
async fn run_sync_scheduler(
    mut status: watch::Receiver<PlayerStatus>,
    out: mpsc::UnboundedSender<String>,
    clock: Arc<LocalClock>,
    mut cancel: watch::Receiver<bool>,
) {
    // Hold off until the handshake completes.
    tokio::select! {
        changed = status.wait_for(|s| s.connection.accepts_time_sync()) => {
            if changed.is_err() {
                return;
            }
        }
        _ = cancel.changed() => return,
    }

    for _ in 0..SYNC_BURST_COUNT {
        if send_probe(&out, &clock).is_err() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(SYNC_BURST_INTERVAL) => {}
            _ = cancel.changed() => return,
        }
    }

    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + SYNC_RESYNC_INTERVAL,
        SYNC_RESYNC_INTERVAL,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if send_probe(&out, &clock).is_err() {
                    return;
                }
            }
            _ = cancel.changed() => return,
        }
    }
}

fn send_probe(out: &mpsc::UnboundedSender<String>, clock: &LocalClock) -> Result<(), ()> {
    let json = time_probe(clock).ok_or(())?;
    out.send(json).map_err(|_| ())
}

/// Load the persistent client identity, creating it on first run.
fn load_or_create_client_id(path: &Path) -> io::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let id = contents.trim();
            if Uuid::parse_str(id).is_ok() {
                return Ok(id.to_string());
            }
            log::warn!("Identity file {} is corrupt, regenerating", path.display());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let id = Uuid::new_v4().to_string();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, &id)?;
    log::info!("Created client identity {}", id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_identity_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "sendspin-player-test-{}-{}.id",
            tag,
            std::process::id()
        ))
    }

    #[test]
    fn test_identity_created_then_reused() {
        let path = temp_identity_path("reuse");
        let _ = std::fs::remove_file(&path);

        let first = load_or_create_client_id(&path).unwrap();
        assert!(Uuid::parse_str(&first).is_ok());

        let second = load_or_create_client_id(&path).unwrap();
        assert_eq!(first, second, "identity persists across restarts");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_identity_regenerated() {
        let path = temp_identity_path("corrupt");
        std::fs::write(&path, "not a uuid").unwrap();

        let id = load_or_create_client_id(&path).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());
        let stored = std::fs::read_to_string(&path).unwrap();
        assert_eq!(stored.trim(), id);

        let _ = std::fs::remove_file(&path);
    }
}
