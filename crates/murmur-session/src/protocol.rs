//! Wire messages of the live bidirectional generation protocol.
//!
//! Every frame on the socket is one JSON object. Client frames carry exactly
//! one of `setup`, `realtimeInput`, or `toolResponse`. Server frames may carry
//! several parts at once (audio plus a transcript plus turn completion), so
//! they are decoded into a flat struct and then expanded into an ordered
//! list of [`InboundEvent`]s.

use murmur_types::{Speaker, ToolDeclaration, ToolInvocation, ToolResult, PLAYBACK_SAMPLE_RATE_HZ};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// MIME type of outbound microphone audio.
pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

// ── Client → server ──

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// Setup frame for `model` speaking with `voice`.
    pub fn setup(
        model: &str,
        voice: &str,
        system_instruction: &str,
        tools: &[ToolDeclaration],
    ) -> Self {
        ClientMessage::Setup(Setup {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: system_instruction.to_string(),
                }],
            },
            tools: if tools.is_empty() {
                Vec::new()
            } else {
                vec![Tool {
                    function_declarations: tools.to_vec(),
                }]
            },
            input_audio_transcription: TranscriptionConfig {},
            output_audio_transcription: TranscriptionConfig {},
        })
    }

    /// One chunk of microphone audio, already base64 encoded.
    pub fn audio(data: String) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            audio: Blob {
                mime_type: INPUT_AUDIO_MIME.to_string(),
                data,
            },
        })
    }

    /// A tool result. The payload is wrapped as `{"result": ...}`.
    pub fn tool_result(result: ToolResult) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: result.id,
                name: result.name,
                response: json!({ "result": result.response }),
            }],
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    pub input_audio_transcription: TranscriptionConfig,
    pub output_audio_transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<ToolDeclaration>,
}

/// Requests transcription; the server takes an empty object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeInput {
    pub audio: Blob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

// ── Server → client ──

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub inline_data: Option<Blob>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<ToolInvocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

/// One routable piece of a server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SetupComplete,
    /// Base64 PCM speech at `sample_rate`.
    Audio { data: String, sample_rate: u32 },
    /// The model was interrupted; queued speech is stale.
    Interrupted,
    Transcript { speaker: Speaker, text: String },
    TurnComplete,
    ToolCall(ToolInvocation),
    ToolCallCancellation(Vec<String>),
    GoAway { time_left: Option<String> },
}

/// Sample rate from a MIME type such as `audio/pcm;rate=24000`.
pub fn mime_sample_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse().ok())
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Expands the frame into events in routing order: setup, audio,
    /// interruption, user then model transcript, turn completion, tool
    /// traffic, and finally `goAway`.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(InboundEvent::SetupComplete);
        }

        if let Some(content) = self.server_content {
            let parts = content.model_turn.map(|t| t.parts).unwrap_or_default();
            for blob in parts.into_iter().filter_map(|p| p.inline_data) {
                if !blob.mime_type.starts_with("audio/") {
                    continue;
                }
                let sample_rate = mime_sample_rate(&blob.mime_type).unwrap_or(PLAYBACK_SAMPLE_RATE_HZ);
                events.push(InboundEvent::Audio {
                    data: blob.data,
                    sample_rate,
                });
            }
            if content.interrupted {
                events.push(InboundEvent::Interrupted);
            }
            let transcripts = [
                (Speaker::User, content.input_transcription),
                (Speaker::Model, content.output_transcription),
            ];
            for (speaker, transcription) in transcripts {
                if let Some(text) = transcription.and_then(|t| t.text) {
                    events.push(InboundEvent::Transcript { speaker, text });
                }
            }
            if content.turn_complete {
                events.push(InboundEvent::TurnComplete);
            }
        }

        if let Some(call) = self.tool_call {
            events.extend(call.function_calls.into_iter().map(InboundEvent::ToolCall));
        }
        if let Some(cancel) = self.tool_call_cancellation {
            events.push(InboundEvent::ToolCallCancellation(cancel.ids));
        }
        if let Some(go_away) = self.go_away {
            events.push(InboundEvent::GoAway {
                time_left: go_away.time_left,
            });
        }
        events
    }
}
