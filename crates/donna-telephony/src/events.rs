use base64::Engine;
use serde::Deserialize;
use serde_json::json;

/// Twilio media-stream message, inbound over the WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
#[serde(rename_all = "lowercase")]
pub enum TwilioEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        start: StartMetadata,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        #[serde(default)]
        mark: Option<MarkPayload>,
    },
    Stop {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    pub call_sid: String,
    /// `<Parameter>` values from the TwiML `<Stream>`: senior id, call type.
    #[serde(default)]
    pub custom_parameters: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded μ-law 8 kHz mono.
    pub payload: String,
}

impl MediaPayload {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.payload)
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkPayload {
    #[serde(default)]
    pub name: String,
}

/// Outbound message to the Twilio socket, built by the transport processors
/// and serialized by the socket task.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// One μ-law packet to play.
    Media(Vec<u8>),
    /// Playback checkpoint; Twilio echoes it back when audio has played out.
    Mark(String),
    /// Drop everything Twilio has buffered (barge-in).
    Clear,
}

impl OutboundMessage {
    /// Render as the provider's JSON for the given stream.
    pub fn to_json(&self, stream_sid: &str) -> String {
        match self {
            OutboundMessage::Media(mulaw) => {
                let b64 = base64::engine::general_purpose::STANDARD.encode(mulaw);
                json!({
                    "event": "media",
                    "streamSid": stream_sid,
                    "media": { "payload": b64 }
                })
                .to_string()
            }
            OutboundMessage::Mark(name) => json!({
                "event": "mark",
                "streamSid": stream_sid,
                "mark": { "name": name }
            })
            .to_string(),
            OutboundMessage::Clear => json!({
                "event": "clear",
                "streamSid": stream_sid,
            })
            .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_event_with_custom_parameters() {
        let raw = r#"{
            "event": "start",
            "streamSid": "MZ123",
            "start": {
                "callSid": "CA456",
                "customParameters": { "senior_id": "s-1", "call_type": "reminder" }
            }
        }"#;
        let ev: TwilioEvent = serde_json::from_str(raw).unwrap();
        match ev {
            TwilioEvent::Start { stream_sid, start } => {
                assert_eq!(stream_sid, "MZ123");
                assert_eq!(start.call_sid, "CA456");
                assert_eq!(start.custom_parameters["call_type"], "reminder");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_media_and_decodes_payload() {
        let raw = r#"{"event":"media","media":{"payload":"//8A"}}"#;
        let ev: TwilioEvent = serde_json::from_str(raw).unwrap();
        match ev {
            TwilioEvent::Media { media } => {
                assert_eq!(media.decode().unwrap(), vec![0xFF, 0xFF, 0x00]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn outbound_media_wire_shape() {
        let msg = OutboundMessage::Media(vec![0xFF, 0x7F]);
        let json: serde_json::Value =
            serde_json::from_str(&msg.to_json("MZ9")).unwrap();
        assert_eq!(json["event"], "media");
        assert_eq!(json["streamSid"], "MZ9");
        assert_eq!(json["media"]["payload"], "/38=");
    }

    #[test]
    fn outbound_clear_wire_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&OutboundMessage::Clear.to_json("MZ9")).unwrap();
        assert_eq!(json["event"], "clear");
    }
}
