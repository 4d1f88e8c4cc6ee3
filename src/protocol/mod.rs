// ABOUTME: Sendspin Protocol wire codec
// ABOUTME: JSON control envelopes and binary audio frames

/// Binary audio frame encoding and decoding
pub mod frames;
/// JSON control message definitions
pub mod messages;

pub use frames::{decode_audio_frame, encode_audio_frame, FRAME_TYPE_AUDIO};
pub use messages::Message;
