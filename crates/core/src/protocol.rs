//! Relay wire protocol.
//!
//! Both directions are JSON text frames. Control messages carry a `type` tag;
//! outbound audio is the bare `{"user_audio_chunk": "..."}` object.

use serde::{Deserialize, Serialize};

/// Control messages sent from the client to the relay.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Sent once, immediately after the socket opens.
    ConversationInitiationClientData {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_config_override: Option<ConfigOverride>,
    },
    /// Periodic no-op preventing idle-timeout disconnection.
    KeepAlive,
    /// Reply to a relay `ping`.
    Pong { event_id: serde_json::Value },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConfigOverride {
    pub agent: AgentOverride,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AgentOverride {
    pub language: String,
}

/// One outbound microphone frame.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserAudioChunk {
    pub user_audio_chunk: String,
}

impl ControlMessage {
    pub fn initiation(language: Option<&str>) -> Self {
        Self::ConversationInitiationClientData {
            conversation_config_override: language.map(|language| ConfigOverride {
                agent: AgentOverride {
                    language: language.to_string(),
                },
            }),
        }
    }
}

/// Events pushed by the relay.
///
/// Unknown `type` tags deserialize to [`RelayEvent::Unknown`] so the relay can
/// add event kinds without breaking the session.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadata,
    },
    UserTranscript {
        user_transcription_event: UserTranscription,
    },
    AgentResponse {
        agent_response_event: AgentResponse,
    },
    AgentResponseCorrection {
        agent_response_correction_event: AgentResponseCorrection,
    },
    Audio {
        audio_event: AudioEvent,
    },
    Interruption,
    /// Voice-activity probability for the user's current speech.
    VadScore {
        vad_score_event: VadScoreEvent,
    },
    Ping {
        ping_event: PingEvent,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InitiationMetadata {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserTranscription {
    pub user_transcript: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub agent_response: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AgentResponseCorrection {
    pub corrected_agent_response: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AudioEvent {
    pub audio_base_64: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct VadScoreEvent {
    pub vad_score: f32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PingEvent {
    #[serde(default)]
    pub event_id: serde_json::Value,
}

impl RelayEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayEvent::ConversationInitiationMetadata { .. } => "conversation_initiation_metadata",
            RelayEvent::UserTranscript { .. } => "user_transcript",
            RelayEvent::AgentResponse { .. } => "agent_response",
            RelayEvent::AgentResponseCorrection { .. } => "agent_response_correction",
            RelayEvent::Audio { .. } => "audio",
            RelayEvent::Interruption => "interruption",
            RelayEvent::VadScore { .. } => "vad_score",
            RelayEvent::Ping { .. } => "ping",
            RelayEvent::Error { .. } => "error",
            RelayEvent::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initiation_serialization() {
        let plain = serde_json::to_value(ControlMessage::initiation(None)).unwrap();
        assert_eq!(plain, json!({ "type": "conversation_initiation_client_data" }));

        let with_language = serde_json::to_value(ControlMessage::initiation(Some("en"))).unwrap();
        assert_eq!(
            with_language,
            json!({
                "type": "conversation_initiation_client_data",
                "conversation_config_override": { "agent": { "language": "en" } }
            })
        );
    }

    #[test]
    fn test_keep_alive_and_pong_serialization() {
        assert_eq!(
            serde_json::to_value(ControlMessage::KeepAlive).unwrap(),
            json!({ "type": "keep_alive" })
        );
        assert_eq!(
            serde_json::to_value(ControlMessage::Pong { event_id: json!(7) }).unwrap(),
            json!({ "type": "pong", "event_id": 7 })
        );
    }

    #[test]
    fn test_audio_chunk_serialization() {
        let chunk = UserAudioChunk {
            user_audio_chunk: "AAA=".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&chunk).unwrap(),
            r#"{"user_audio_chunk":"AAA="}"#
        );
    }

    #[test]
    fn test_parse_known_events() {
        let init = RelayEvent::parse(
            r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"conv_1","agent_output_audio_format":"pcm_16000"}}"#,
        )
        .unwrap();
        assert_eq!(
            init,
            RelayEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: InitiationMetadata {
                    conversation_id: "conv_1".to_string(),
                    agent_output_audio_format: Some("pcm_16000".to_string()),
                }
            }
        );

        let audio =
            RelayEvent::parse(r#"{"type":"audio","audio_event":{"audio_base_64":"AAA=","event_id":3}}"#)
                .unwrap();
        assert_eq!(audio.kind(), "audio");

        let interruption =
            RelayEvent::parse(r#"{"type":"interruption","interruption_event":{"event_id":4}}"#)
                .unwrap();
        assert_eq!(interruption, RelayEvent::Interruption);

        let error = RelayEvent::parse(r#"{"type":"error"}"#).unwrap();
        assert_eq!(error, RelayEvent::Error { message: None });
    }

    #[test]
    fn test_parse_vad_score() {
        let event = RelayEvent::parse(r#"{"type":"vad_score","vad_score_event":{"vad_score":0.5}}"#)
            .unwrap();
        assert_eq!(
            event,
            RelayEvent::VadScore {
                vad_score_event: VadScoreEvent { vad_score: 0.5 }
            }
        );
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let event = RelayEvent::parse(r#"{"type":"internal_tentative_agent_response","tentative_agent_response_internal_event":{}}"#)
            .unwrap();
        assert_eq!(event, RelayEvent::Unknown);
    }

    #[test]
    fn test_malformed_messages_fail_to_parse() {
        assert!(RelayEvent::parse("not json").is_err());
        assert!(RelayEvent::parse(r#"{"no_type":true}"#).is_err());
        assert!(RelayEvent::parse(r#"{"type":"agent_response"}"#).is_err());
    }
}
