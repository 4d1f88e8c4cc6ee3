// ABOUTME: Main library entry point for sendspin-player
// ABOUTME: Exports public API for the Sendspin Protocol player

//! # sendspin-player
//!
//! Rust implementation of the Sendspin Protocol player for synchronized
//! multi-room audio playback.
//!
//! The player advertises itself over mDNS, accepts one controller session
//! at a time over WebSocket, synchronizes its clock to the controller with
//! microsecond precision, buffers timestamped PCM chunks, and paces writes
//! to the audio output device so every room plays in lockstep.
//!
//! ## Example: Running a Player
//!
//! ```no_run
//! use sendspin_player::player::{PlayerConfig, SendspinPlayer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PlayerConfig::new("Living Room")
//!         .bind_addr("0.0.0.0:8927".parse().unwrap());
//!
//!     let player = SendspinPlayer::with_config(config).unwrap();
//!     player.run().await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

/// Audio types, buffering, output, and playback
pub mod audio;
/// Player service: sessions, discovery, orchestration
pub mod player;
/// Protocol implementation for WebSocket communication
pub mod protocol;
/// Clock synchronization utilities
pub mod sync;

pub use audio::{AudioChunk, ChunkBuffer, PlaybackEngine, StreamFormat};
pub use player::{PlayerConfig, PlayerStatus, SendspinPlayer};
pub use protocol::messages::{ClientHello, ServerHello};
pub use sync::{ClockSync, LocalClock};

/// Result type for sendspin-player operations
pub type Result<T> = std::result::Result<T, error::Error>;

/// Error types for sendspin-player
pub mod error {
    use thiserror::Error;

    /// Error types for player operations
    #[derive(Error, Debug)]
    pub enum Error {
        /// Protocol violation or parsing error
        #[error("Protocol error: {0}")]
        Protocol(String),

        /// Connection-related error
        #[error("Connection error: {0}")]
        Connection(String),

        /// Audio output error
        #[error("Audio output error: {0}")]
        Output(String),

        /// Discovery (mDNS) error
        #[error("Discovery error: {0}")]
        Discovery(String),

        /// I/O error
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),
    }
}
