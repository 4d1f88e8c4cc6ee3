// ABOUTME: Player events emitted by the session
// ABOUTME: Replaces ad-hoc callbacks with explicit variants over a channel

use crate::audio::StreamFormat;
use tokio::sync::mpsc;

/// Events the session emits for the orchestrator (and host application).
///
/// Delivered through an unbounded channel so the session's receive path
/// never blocks on a slow consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A stream started with the given negotiated format
    StreamStart(StreamFormat),
    /// The active stream ended
    StreamEnd,
    /// Controller changed the volume (0-100)
    VolumeChange(u8),
    /// Controller changed the mute state
    MuteChange(bool),
}

/// Sending half of the event channel.
pub type EventSender = mpsc::UnboundedSender<PlayerEvent>;

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<PlayerEvent>;

/// Create a connected event channel pair.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
