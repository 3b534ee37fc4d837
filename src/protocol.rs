//! Wire messages exchanged with the voice-chat server.
//!
//! All audio travels as base64-wrapped WAV inside JSON events, both on the
//! WebSocket streaming path and on the HTTP record-mode upload.

use serde::{Deserialize, Serialize};

/// Audio format parameters declared in the hello handshake.
#[derive(Serialize)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub chunk_duration: u32,
}

/// First message after connecting, telling the server what we will stream.
#[derive(Serialize)]
pub struct HelloMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub version: u8,
    pub transport: String,
    pub audio_params: AudioParams,
}

impl HelloMessage {
    pub fn new(format: &str, sample_rate: u32, channels: u8, chunk_duration: u32) -> Self {
        Self {
            msg_type: "hello".to_string(),
            version: 1,
            transport: "websocket".to_string(),
            audio_params: AudioParams {
                format: format.to_string(),
                sample_rate,
                channels,
                chunk_duration,
            },
        }
    }
}

/// One chunk of captured audio, streamed while the user is speaking.
#[derive(Serialize)]
pub struct StreamAudioEvent {
    #[serde(rename = "type")]
    pub msg_type: String,
    /// base64-encoded WAV chunk
    pub audio: String,
}

impl StreamAudioEvent {
    pub fn new(audio_base64: String) -> Self {
        Self {
            msg_type: "stream-audio".to_string(),
            audio: audio_base64,
        }
    }
}

/// Any message from the server. Unknown types are logged and dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Transcript of what the user said (stream-response)
    pub transcript: Option<String>,
    /// Assistant response text (stream-response)
    pub text: Option<String>,
    /// base64 response audio (stream-response)
    pub audio_base64: Option<String>,
    /// Error description (stream-error)
    pub error: Option<String>,
    pub session_id: Option<String>,
}

/// Body of the record-mode HTTP upload.
#[derive(Serialize)]
pub struct UploadRequest {
    pub client_id: String,
    pub format: String,
    /// base64-encoded WAV of the whole utterance
    pub audio_base64: String,
}

/// Response to the record-mode HTTP upload; same shape as stream-response.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub transcript: Option<String>,
    pub text: Option<String>,
    pub audio_base64: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_serializes_with_type_tag() {
        let hello = HelloMessage::new("wav", 16000, 1, 250);
        let json = serde_json::to_string(&hello).unwrap();
        assert!(json.contains(r#""type":"hello""#));
        assert!(json.contains(r#""sample_rate":16000"#));
        assert!(json.contains(r#""format":"wav""#));
    }

    #[test]
    fn stream_response_parses() {
        let json = r#"{
            "type": "stream-response",
            "transcript": "hello there",
            "text": "Hi! How can I help?",
            "audio_base64": "AAAA"
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.msg_type, "stream-response");
        assert_eq!(msg.transcript.as_deref(), Some("hello there"));
        assert_eq!(msg.audio_base64.as_deref(), Some("AAAA"));
        assert!(msg.error.is_none());
    }

    #[test]
    fn stream_error_parses_without_optional_fields() {
        let json = r#"{"type": "stream-error", "error": "transcription failed"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.msg_type, "stream-error");
        assert_eq!(msg.error.as_deref(), Some("transcription failed"));
        assert!(msg.transcript.is_none());
    }
}
