// ABOUTME: Binary audio frame codec
// ABOUTME: Decodes [type][timestamp BE i64][payload] frames from the wire

use crate::audio::AudioChunk;

/// Binary frame type tag for player audio chunks
pub const FRAME_TYPE_AUDIO: u8 = 0x04;

/// First binary frame type tag carrying artwork data (tags 8-11)
pub const FRAME_TYPE_ARTWORK_FIRST: u8 = 0x08;

/// Last binary frame type tag carrying artwork data (tags 8-11)
pub const FRAME_TYPE_ARTWORK_LAST: u8 = 0x0b;

/// Binary frame type tag for visualizer data
pub const FRAME_TYPE_VISUALIZER: u8 = 0x10;

/// Header length: one type byte plus a big-endian i64 timestamp
pub const FRAME_HEADER_LEN: usize = 9;

/// Decode a binary audio frame into an [`AudioChunk`].
///
/// Layout: byte 0 is the type tag, bytes 1-8 are a big-endian 64-bit
/// microsecond timestamp, the remainder is raw PCM payload. Only
/// [`FRAME_TYPE_AUDIO`] frames are consumed here; artwork and visualizer
/// frames, unknown tags, and frames shorter than the header all decode to
/// `None` without error.
pub fn decode_audio_frame(data: &[u8]) -> Option<AudioChunk> {
    if data.len() < FRAME_HEADER_LEN || data[0] != FRAME_TYPE_AUDIO {
        return None;
    }
    let timestamp = i64::from_be_bytes(data[1..FRAME_HEADER_LEN].try_into().ok()?);
    Some(AudioChunk::new(timestamp, &data[FRAME_HEADER_LEN..]))
}

/// Encode an audio frame in the wire layout decoded by
/// [`decode_audio_frame`]. Used by tests and tooling.
pub fn encode_audio_frame(timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.push(FRAME_TYPE_AUDIO);
    frame.extend_from_slice(&timestamp.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_frame() {
        let frame = encode_audio_frame(1_234_567, &[10, 20, 30, 40]);
        let chunk = decode_audio_frame(&frame).expect("valid frame");
        assert_eq!(chunk.timestamp, 1_234_567);
        assert_eq!(chunk.payload.as_ref(), &[10, 20, 30, 40]);
    }

    #[test]
    fn test_decode_negative_timestamp() {
        let frame = encode_audio_frame(-42, &[0, 0]);
        let chunk = decode_audio_frame(&frame).expect("valid frame");
        assert_eq!(chunk.timestamp, -42);
    }

    #[test]
    fn test_decode_short_buffer_returns_none() {
        assert!(decode_audio_frame(&[]).is_none());
        assert!(decode_audio_frame(&[FRAME_TYPE_AUDIO]).is_none());
        assert!(decode_audio_frame(&[FRAME_TYPE_AUDIO, 0, 0, 0, 0, 0, 0, 0]).is_none());
    }

    #[test]
    fn test_decode_wrong_tag_returns_none() {
        let mut frame = encode_audio_frame(99, &[1, 2, 3]);
        for tag in [
            FRAME_TYPE_ARTWORK_FIRST,
            FRAME_TYPE_ARTWORK_LAST,
            FRAME_TYPE_VISUALIZER,
            0x00,
            0xff,
        ] {
            frame[0] = tag;
            assert!(decode_audio_frame(&frame).is_none(), "tag {tag} accepted");
        }
    }

    #[test]
    fn test_decode_header_only_frame_is_empty_chunk() {
        let frame = encode_audio_frame(555, &[]);
        assert_eq!(frame.len(), FRAME_HEADER_LEN);
        let chunk = decode_audio_frame(&frame).expect("header-only frame");
        assert_eq!(chunk.timestamp, 555);
        assert!(chunk.payload.is_empty());
    }
}
