// ABOUTME: Audio types and playback for sendspin-player
// ABOUTME: Chunk buffer, output device abstraction, and the playback engine

/// Bounded chunk buffer between network receive and playback
pub mod chunk_buffer;
/// Audio output trait and cpal implementation
pub mod output;
/// Timestamp-aware playback engine
pub mod player;
/// Core audio type definitions (AudioChunk, StreamFormat)
pub mod types;

pub use chunk_buffer::ChunkBuffer;
pub use output::{AudioOutput, CpalOutput};
pub use player::{GainControl, PlaybackEngine};
pub use types::{AudioChunk, StreamFormat};
