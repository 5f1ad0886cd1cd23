//! Live API（双方向ストリーミング）の JSON メッセージ定義
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::FunctionDeclaration;

/// クライアント→サーバ
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Instruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Instruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Turn>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "inline_data")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

/// base64 文字列で運ぶバイナリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default, alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

impl Blob {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: BASE64.encode(bytes),
        }
    }
}

impl ClientMessage {
    pub fn setup(
        model: String,
        voice_name: &str,
        instruction: &str,
        declarations: Vec<FunctionDeclaration>,
    ) -> Self {
        let tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: declarations,
            }]
        };

        ClientMessage::Setup(Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice_name.to_string(),
                        },
                    },
                },
            },
            system_instruction: if instruction.trim().is_empty() {
                None
            } else {
                Some(Instruction {
                    parts: vec![Part::text(instruction)],
                })
            },
            tools,
        })
    }

    pub fn user_text(text: &str, turn_complete: bool) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Turn {
                role: "user".to_string(),
                parts: vec![Part::text(text)],
            }],
            turn_complete,
        })
    }

    pub fn audio(mime_type: &str, bytes: &[u8]) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob::from_bytes(mime_type, bytes)],
        })
    }

    pub fn tool_response(responses: Vec<FunctionResponse>) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: responses,
        })
    }
}

/// サーバ→クライアント（未知フィールドは無視）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, alias = "setup_complete")]
    pub setup_complete: Option<Value>,
    #[serde(default, alias = "server_content")]
    pub server_content: Option<ServerContent>,
    #[serde(default, alias = "tool_call")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, alias = "tool_call_cancellation")]
    pub tool_call_cancellation: Option<ToolCallCancellation>,
    #[serde(default, alias = "go_away")]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, alias = "model_turn")]
    pub model_turn: Option<ModelTurn>,
    #[serde(default, alias = "turn_complete")]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default, alias = "function_calls")]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default, alias = "time_left")]
    pub time_left: Option<String>,
}

/// 受信メッセージを分解したイベント
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    SetupComplete,
    Audio { mime_type: String, data: Vec<u8> },
    Text(String),
    Interrupted,
    TurnComplete,
    ToolCall(Vec<FunctionCall>),
    ToolCallCancellation(Vec<String>),
    GoAway { time_left: Option<String> },
}

impl ServerMessage {
    /// 1 メッセージに複数要素が含まれる場合は出現順に並べる
    pub fn into_events(self) -> Vec<LiveEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(LiveEvent::SetupComplete);
        }

        if let Some(content) = self.server_content {
            if content.interrupted {
                events.push(LiveEvent::Interrupted);
            }
            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    if let Some(blob) = part.inline_data {
                        match BASE64.decode(blob.data.as_bytes()) {
                            Ok(data) => events.push(LiveEvent::Audio {
                                mime_type: blob.mime_type,
                                data,
                            }),
                            Err(e) => {
                                tracing::warn!(error = %e, "discarding undecodable inline data")
                            }
                        }
                    }
                    if let Some(text) = part.text {
                        events.push(LiveEvent::Text(text));
                    }
                }
            }
            if content.turn_complete {
                events.push(LiveEvent::TurnComplete);
            }
        }

        if let Some(call) = self.tool_call {
            if !call.function_calls.is_empty() {
                events.push(LiveEvent::ToolCall(call.function_calls));
            }
        }

        if let Some(cancellation) = self.tool_call_cancellation {
            events.push(LiveEvent::ToolCallCancellation(cancellation.ids));
        }

        if let Some(go_away) = self.go_away {
            events.push(LiveEvent::GoAway {
                time_left: go_away.time_left,
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_wire_format() {
        let decl = FunctionDeclaration {
            name: "get_active_ipos".to_string(),
            description: "list".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        };
        let message = ClientMessage::setup("models/m".to_string(), "Alnilam", "be nice", vec![decl]);
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["setup"]["model"], "models/m");
        assert_eq!(json["setup"]["generationConfig"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Alnilam"
        );
        assert_eq!(json["setup"]["systemInstruction"]["parts"][0]["text"], "be nice");
        assert_eq!(
            json["setup"]["tools"][0]["functionDeclarations"][0]["name"],
            "get_active_ipos"
        );
    }

    #[test]
    fn test_realtime_audio_is_base64() {
        let json = serde_json::to_value(ClientMessage::audio("audio/pcm;rate=16000", &[1, 2, 3])).unwrap();
        assert_eq!(json["realtimeInput"]["mediaChunks"][0]["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["realtimeInput"]["mediaChunks"][0]["data"], "AQID");
    }

    #[test]
    fn test_greeting_turn() {
        let json = serde_json::to_value(ClientMessage::user_text("Hello", true)).unwrap();
        assert_eq!(json["clientContent"]["turnComplete"], true);
        assert_eq!(json["clientContent"]["turns"][0]["role"], "user");
    }

    #[test]
    fn test_server_content_events_in_order() {
        let message: ServerMessage = serde_json::from_value(json!({
            "serverContent": {
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQID"}}
                ]},
                "turnComplete": true
            }
        }))
        .unwrap();
        assert_eq!(
            message.into_events(),
            vec![
                LiveEvent::Audio {
                    mime_type: "audio/pcm;rate=24000".to_string(),
                    data: vec![1, 2, 3]
                },
                LiveEvent::TurnComplete
            ]
        );
    }

    #[test]
    fn test_tool_call_and_unknown_fields() {
        let message: ServerMessage = serde_json::from_value(json!({
            "usageMetadata": {"totalTokenCount": 10},
            "toolCall": {"functionCalls": [
                {"id": "call-1", "name": "get_ipo_specific_details", "args": {"symbol": "INTERARCH"}}
            ]}
        }))
        .unwrap();
        let events = message.into_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            LiveEvent::ToolCall(calls) => {
                assert_eq!(calls[0].id.as_deref(), Some("call-1"));
                assert_eq!(calls[0].args["symbol"], "INTERARCH");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_snake_case_setup_complete() {
        let message: ServerMessage = serde_json::from_str(r#"{"setup_complete": {}}"#).unwrap();
        assert_eq!(message.into_events(), vec![LiveEvent::SetupComplete]);
    }
}
