// ABOUTME: Core audio type definitions
// ABOUTME: Timestamped PCM chunks and negotiated stream formats

use std::sync::Arc;

/// One timestamped unit of raw PCM payload.
///
/// The timestamp is in controller-clock microseconds; conversion to local
/// time goes through [`crate::sync::ClockSync`]. Chunks are immutable and
/// consumed exactly once by the playback engine. The payload is reference
/// counted so peeking at a buffered chunk never copies audio data.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Target play time in controller-clock microseconds
    pub timestamp: i64,
    /// Raw PCM bytes as sent on the wire
    pub payload: Arc<[u8]>,
}

impl AudioChunk {
    /// Create a chunk from a wire payload.
    pub fn new(timestamp: i64, payload: &[u8]) -> Self {
        Self {
            timestamp,
            payload: Arc::from(payload),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the chunk carries no audio data.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Negotiated stream format, valid from stream/start until stream/end.
///
/// Replaced wholesale on every stream/start; the codec header (if any)
/// arrives base64 encoded on the wire and is decoded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    /// Codec name ("pcm" is the only codec consumed by this crate)
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u8,
    /// Bit depth per sample
    pub bit_depth: u8,
    /// Decoded codec-specific header bytes
    pub codec_header: Option<Vec<u8>>,
}

impl StreamFormat {
    /// Bytes per interleaved sample frame (all channels).
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * (self.bit_depth as usize / 8)
    }

    /// Bytes of PCM per second at this format.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_len() {
        let chunk = AudioChunk::new(0, &[1, 2, 3, 4, 5]);
        assert_eq!(chunk.len(), 5);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn test_format_byte_math() {
        let format = StreamFormat {
            codec: "pcm".to_string(),
            sample_rate: 48_000,
            channels: 2,
            bit_depth: 16,
            codec_header: None,
        };
        assert_eq!(format.frame_bytes(), 4);
        assert_eq!(format.bytes_per_second(), 192_000);
    }
}
