// ABOUTME: Protocol message type definitions and serialization
// ABOUTME: Supports client/hello, server/hello, stream/start, etc.

use crate::audio::StreamFormat;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Top-level protocol message envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    /// Client hello handshake message
    #[serde(rename = "client/hello")]
    ClientHello(ClientHello),

    /// Server hello handshake response
    #[serde(rename = "server/hello")]
    ServerHello(ServerHello),

    /// Client time synchronization request
    #[serde(rename = "client/time")]
    ClientTime(ClientTime),

    /// Server time synchronization response
    #[serde(rename = "server/time")]
    ServerTime(ServerTime),

    /// Stream start notification
    #[serde(rename = "stream/start")]
    StreamStart(StreamStart),

    /// Stream clear notification (for seek)
    #[serde(rename = "stream/clear")]
    StreamClear(StreamClear),

    /// Stream end notification
    #[serde(rename = "stream/end")]
    StreamEnd(StreamEnd),

    /// Stream format change request (client -> server)
    #[serde(rename = "stream/request-format")]
    StreamRequestFormat(StreamRequestFormat),

    /// Server command to client
    #[serde(rename = "server/command")]
    ServerCommand(ServerCommand),

    /// Server state update to client
    #[serde(rename = "server/state")]
    ServerState(ServerState),

    /// Client state update to server
    #[serde(rename = "client/state")]
    ClientState(ClientState),
}

impl Message {
    /// Decode a JSON envelope.
    ///
    /// Returns `None` for malformed JSON, unknown message types, or
    /// payloads that do not match their declared type. Callers treat
    /// `None` as a dropped frame, never as a fatal error.
    pub fn parse(text: &str) -> Option<Message> {
        serde_json::from_str(text).ok()
    }
}

/// Client hello message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHello {
    /// Unique client identifier (persistent across restarts)
    pub client_id: String,
    /// Human-readable client name
    pub name: String,
    /// Protocol version number
    pub version: u32,
    /// List of supported roles (e.g., "player@v1")
    pub supported_roles: Vec<String>,
    /// Device information
    pub device_info: DeviceInfo,
    /// Player capabilities (if client supports player role)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_support: Option<PlayerSupport>,
}

/// Device information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Product name (e.g., "Sendspin-RS Player")
    pub product_name: String,
    /// Manufacturer name
    pub manufacturer: String,
    /// Software version string
    pub software_version: String,
}

/// Player capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSupport {
    /// List of supported audio formats
    pub supported_formats: Vec<AudioFormatSpec>,
    /// Buffer capacity in bytes
    pub buffer_capacity: u64,
    /// List of supported playback commands
    pub supported_commands: Vec<String>,
}

/// Audio format specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormatSpec {
    /// Codec name (e.g., "pcm")
    pub codec: String,
    /// Number of audio channels
    pub channels: u8,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bit depth per sample
    pub bit_depth: u8,
}

/// Server hello message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerHello {
    /// Unique server identifier
    pub server_id: String,
    /// Human-readable server name
    pub name: String,
    /// Protocol version number
    pub version: u32,
    /// Active roles for this client
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_roles: Vec<String>,
}

/// Client time sync message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientTime {
    /// Client transmission timestamp (microseconds)
    pub client_transmitted: i64,
}

/// Server time sync response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerTime {
    /// Original client transmission timestamp
    pub client_transmitted: i64,
    /// Server reception timestamp (server clock microseconds)
    pub server_received: i64,
    /// Server transmission timestamp (server clock microseconds)
    pub server_transmitted: i64,
}

/// Stream start message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStart {
    /// Player stream configuration
    pub player: StreamPlayerConfig,
}

/// Stream player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPlayerConfig {
    /// Audio codec name
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of audio channels
    pub channels: u8,
    /// Bit depth per sample
    pub bit_depth: u8,
    /// Optional codec-specific header (base64 encoded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_header: Option<String>,
}

impl StreamPlayerConfig {
    /// Decode into a [`StreamFormat`], expanding the base64 codec header.
    ///
    /// Returns `None` if the header is present but not valid base64; the
    /// caller drops the message like any other malformed payload.
    pub fn decode_format(&self) -> Option<StreamFormat> {
        let codec_header = match &self.codec_header {
            Some(encoded) => Some(
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .ok()?,
            ),
            None => None,
        };
        Some(StreamFormat {
            codec: self.codec.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            bit_depth: self.bit_depth,
            codec_header,
        })
    }
}

/// Stream clear message (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamClear {
    /// Roles to clear buffers for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// Stream end message (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEnd {
    /// Roles to end streams for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// Stream format change request (client -> server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequestFormat {
    /// Requested player format parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<FormatRequest>,
}

/// Requested format parameters in stream/request-format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatRequest {
    /// Requested codec name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Requested sample rate in Hz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Requested channel count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Requested bit depth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u8>,
}

/// Server command message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCommand {
    /// Player command (if client has player role)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerCommand>,
}

/// Player command in server/command message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCommand {
    /// Command name ("volume" or "mute")
    pub command: String,
    /// Volume level (0-100), present for "volume"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    /// Mute state, present for "mute"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
}

/// Client state message (client -> server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientState {
    /// Player state (if client has player role)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerStateReport>,
}

/// Player state in client/state message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStateReport {
    /// Current state: "synchronized" or "error"
    pub state: String,
    /// Current volume (0-100)
    pub volume: u8,
    /// Mute state
    pub muted: bool,
}

/// Server state message (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerState {
    /// Metadata state (if client has metadata role)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataState>,
    /// Controller state (if client has controller role)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerState>,
}

/// Metadata state in server/state message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataState {
    /// Server timestamp for this metadata
    pub timestamp: i64,
    /// Track title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Artist name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    /// Album name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
}

/// Controller state in server/state message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    /// Supported commands
    pub supported_commands: Vec<String>,
    /// Group volume (0-100)
    pub volume: u8,
    /// Group mute state
    pub muted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_hello_round_trip() {
        let hello = Message::ClientHello(ClientHello {
            client_id: "abc-123".to_string(),
            name: "Living Room".to_string(),
            version: 1,
            supported_roles: vec!["player@v1".to_string()],
            device_info: DeviceInfo {
                product_name: "Sendspin-RS Player".to_string(),
                manufacturer: "Sendspin".to_string(),
                software_version: "0.1.0".to_string(),
            },
            player_support: Some(PlayerSupport {
                supported_formats: vec![AudioFormatSpec {
                    codec: "pcm".to_string(),
                    channels: 2,
                    sample_rate: 48_000,
                    bit_depth: 16,
                }],
                buffer_capacity: 4 * 1024 * 1024,
                supported_commands: vec!["volume".to_string(), "mute".to_string()],
            }),
        });

        let json = serde_json::to_string(&hello).unwrap();
        assert!(json.contains("\"type\":\"client/hello\""));
        assert!(json.contains("\"payload\""));

        let parsed = Message::parse(&json).expect("round trip should parse");
        match parsed {
            Message::ClientHello(h) => {
                assert_eq!(h.client_id, "abc-123");
                assert_eq!(h.supported_roles, vec!["player@v1"]);
                let support = h.player_support.unwrap();
                assert_eq!(support.buffer_capacity, 4 * 1024 * 1024);
                assert_eq!(support.supported_formats[0].codec, "pcm");
            }
            other => panic!("expected client/hello, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_server_time() {
        let json = r#"{"type":"server/time","payload":{"client_transmitted":100,"server_received":250,"server_transmitted":260}}"#;
        match Message::parse(json) {
            Some(Message::ServerTime(t)) => {
                assert_eq!(t.client_transmitted, 100);
                assert_eq!(t.server_received, 250);
                assert_eq!(t.server_transmitted, 260);
            }
            other => panic!("expected server/time, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_server_command() {
        let json =
            r#"{"type":"server/command","payload":{"player":{"command":"volume","volume":40}}}"#;
        match Message::parse(json) {
            Some(Message::ServerCommand(cmd)) => {
                let player = cmd.player.unwrap();
                assert_eq!(player.command, "volume");
                assert_eq!(player.volume, Some(40));
                assert_eq!(player.mute, None);
            }
            other => panic!("expected server/command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed_returns_none() {
        assert!(Message::parse("not json at all").is_none());
        assert!(Message::parse("{\"type\":\"client/hello\"}").is_none());
        assert!(Message::parse("{}").is_none());
    }

    #[test]
    fn test_parse_unknown_type_returns_none() {
        let json = r#"{"type":"group/teleport","payload":{}}"#;
        assert!(Message::parse(json).is_none());
    }

    #[test]
    fn test_stream_start_decode_format() {
        let json = r#"{"type":"stream/start","payload":{"player":{"codec":"pcm","sample_rate":48000,"channels":2,"bit_depth":16,"codec_header":"AQID"}}}"#;
        let msg = Message::parse(json).unwrap();
        let config = match msg {
            Message::StreamStart(start) => start.player,
            other => panic!("expected stream/start, got {:?}", other),
        };

        let format = config.decode_format().expect("valid base64 header");
        assert_eq!(format.codec, "pcm");
        assert_eq!(format.sample_rate, 48_000);
        assert_eq!(format.channels, 2);
        assert_eq!(format.bit_depth, 16);
        assert_eq!(format.codec_header, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_stream_start_invalid_header_yields_none() {
        let config = StreamPlayerConfig {
            codec: "pcm".to_string(),
            sample_rate: 44_100,
            channels: 2,
            bit_depth: 16,
            codec_header: Some("!!not base64!!".to_string()),
        };
        assert!(config.decode_format().is_none());
    }

    #[test]
    fn test_client_state_serialization() {
        let state = Message::ClientState(ClientState {
            player: Some(PlayerStateReport {
                state: "synchronized".to_string(),
                volume: 40,
                muted: false,
            }),
        });
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"type\":\"client/state\""));
        assert!(json.contains("\"volume\":40"));
        assert!(json.contains("\"state\":\"synchronized\""));
    }

    #[test]
    fn test_stream_end_roles() {
        let json = r#"{"type":"stream/end","payload":{"roles":["player"]}}"#;
        match Message::parse(json) {
            Some(Message::StreamEnd(end)) => {
                assert_eq!(end.roles, Some(vec!["player".to_string()]));
            }
            other => panic!("expected stream/end, got {:?}", other),
        }
    }
}
