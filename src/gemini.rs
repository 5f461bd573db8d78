//! Gemini Live API wire types
//!
//! Messages exchanged with the BidiGenerateContent WebSocket endpoint. Outgoing
//! messages serialize as `{"<kind>": {...}}`; incoming messages are decoded once
//! into a [`ServerMessage`] so the relay can match on them explicitly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_serialization() {
        let setup = BidiGenerateContentSetup {
            model: "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: None,
            }),
            system_instruction: Some(Content::text(None, "You are Cheesecake.")),
            tools: vec![],
        };

        let json = ClientMessage::Setup(setup).to_json().unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(
            parsed["setup"]["model"],
            "models/gemini-2.5-flash-native-audio-preview-12-2025"
        );
        assert_eq!(parsed["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert!(parsed["setup"]["generationConfig"].get("speechConfig").is_none());
        assert_eq!(
            parsed["setup"]["systemInstruction"]["parts"][0]["text"],
            "You are Cheesecake."
        );
        assert!(parsed["setup"]["systemInstruction"].get("role").is_none());
        assert!(parsed["setup"].get("tools").is_none());
    }

    #[test]
    fn test_client_content_serialization() {
        let json = ClientMessage::user_turn("Hello").to_json().unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["clientContent"]["turns"][0]["role"], "user");
        assert_eq!(parsed["clientContent"]["turns"][0]["parts"][0]["text"], "Hello");
        assert_eq!(parsed["clientContent"]["turnComplete"], true);
    }

    #[test]
    fn test_realtime_input_serialization() {
        let msg = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: "audio/pcm;rate=16000".to_string(),
                data: "AAA=".to_string(),
            }],
        });
        let parsed: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(
            parsed["realtimeInput"]["mediaChunks"][0]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert_eq!(parsed["realtimeInput"]["mediaChunks"][0]["data"], "AAA=");
    }

    #[test]
    fn test_tool_response_serialization() {
        let msg = ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse::success("1", "log_task2_data")],
        });
        let parsed: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(
            parsed,
            serde_json::json!({
                "toolResponse": {
                    "functionResponses": [
                        {"id": "1", "name": "log_task2_data", "response": {"result": "success"}}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_decode_setup_complete() {
        let msg = ServerMessage::decode(r#"{"setupComplete": {}}"#).unwrap();
        assert!(matches!(msg, ServerMessage::SetupComplete));
    }

    #[test]
    fn test_decode_tool_call() {
        let text = r#"{"toolCall":{"functionCalls":[{"id":"1","name":"log_task2_data","args":{"status":"TAKEN"}}]}}"#;
        match ServerMessage::decode(text).unwrap() {
            ServerMessage::ToolCall(call) => match call.function_calls.as_slice() {
                [CallEntry::Call(call)] => {
                    assert_eq!(call.id, "1");
                    assert_eq!(call.name, "log_task2_data");
                    assert_eq!(call.args["status"], "TAKEN");
                }
                other => panic!("Unexpected calls: {:?}", other),
            },
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_model_output() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[{"text":"hi"},{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAA="}}]}}}"#;
        match ServerMessage::decode(text).unwrap() {
            ServerMessage::ModelOutput(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0].text.as_deref(), Some("hi"));
                assert_eq!(parts[1].inline_data.as_ref().unwrap().data, "AAA=");
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_shapes() {
        let turn_complete = r#"{"serverContent":{"turnComplete":true}}"#;
        assert!(matches!(
            ServerMessage::decode(turn_complete).unwrap(),
            ServerMessage::Unknown
        ));
        assert!(matches!(
            ServerMessage::decode(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap(),
            ServerMessage::Unknown
        ));
        assert!(ServerMessage::decode("not json").is_err());
    }

    #[test]
    fn test_decode_malformed_tool_call_entries() {
        let text = r#"{"toolCall":{"functionCalls":[
            {"id":"1","name":"log_task2_data","args":"{\"status\":\"TAKEN\"}"},
            {"id":"2","args":{}},
            {"id":"3","name":"log_task2_data","args":{"status":"TAKEN"}}
        ]}}"#;
        match ServerMessage::decode(text).unwrap() {
            ServerMessage::ToolCall(call) => {
                let entries = &call.function_calls;
                assert_eq!(entries.len(), 3);
                assert!(matches!(&entries[0], CallEntry::Malformed(_)));
                assert_eq!((entries[0].id(), entries[0].name()), ("1", "log_task2_data"));
                assert!(matches!(&entries[1], CallEntry::Malformed(_)));
                assert_eq!((entries[1].id(), entries[1].name()), ("2", ""));
                assert!(matches!(&entries[2], CallEntry::Call(_)));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_unreadable_tool_call_is_still_a_tool_call() {
        for text in [
            r#"{"toolCall":"oops"}"#,
            r#"{"toolCall":{"functionCalls":{"id":"1"}}}"#,
            r#"{"toolCall":null}"#,
        ] {
            match ServerMessage::decode(text).unwrap() {
                ServerMessage::ToolCall(call) => assert!(call.function_calls.is_empty(), "{text}"),
                other => panic!("Unexpected message for {text}: {:?}", other),
            }
        }
    }

    #[test]
    fn test_decode_tool_call_wins_over_content() {
        let text = r#"{"toolCall":{"functionCalls":[]},"serverContent":{"modelTurn":{"parts":[{"text":"x"}]}}}"#;
        assert!(matches!(
            ServerMessage::decode(text).unwrap(),
            ServerMessage::ToolCall(_)
        ));
    }
}

/// Generation configuration for setup.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<Value>,
}

impl GenerationConfig {
    /// Audio output, optionally with a prebuilt voice.
    pub fn audio(voice_name: Option<&str>) -> Self {
        Self {
            response_modalities: vec!["AUDIO".to_string()],
            speech_config: voice_name.map(|voice| {
                serde_json::json!({
                    "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": voice}}
                })
            }),
        }
    }
}

/// Inline binary payload, base64 encoded.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

/// One part of a content turn: text or inline data.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

/// Parameter schema of one property in a function declaration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertySchema>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// Session setup message.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BidiGenerateContentSetup {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// A batch of realtime media chunks.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl FunctionResponse {
    pub fn success(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            response: serde_json::json!({"result": "success"}),
        }
    }

    pub fn error(id: impl Into<String>, name: impl Into<String>, reason: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            response: serde_json::json!({"result": "error", "error": reason}),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Message sent from client to server.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(BidiGenerateContentSetup),
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// A complete user turn carrying a single text part.
    pub fn user_turn(text: &str) -> Self {
        Self::ClientContent(ClientContent {
            turns: vec![Content::text(Some("user"), text)],
            turn_complete: true,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A function call requested by the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// One entry of a tool call. Entries that don't decode as a [`FunctionCall`]
/// are kept raw so they can still be acknowledged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum CallEntry {
    Call(FunctionCall),
    Malformed(Value),
}

impl CallEntry {
    pub fn id(&self) -> &str {
        match self {
            Self::Call(call) => &call.id,
            Self::Malformed(raw) => raw.get("id").and_then(Value::as_str).unwrap_or_default(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Call(call) => &call.name,
            Self::Malformed(raw) => raw.get("name").and_then(Value::as_str).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<CallEntry>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<Content>,
}


/// Server -> client messages, decoded once per frame.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// Setup acknowledgment.
    SetupComplete,
    /// The model wants one or more functions executed.
    ToolCall(ToolCall),
    /// Audio and/or text parts of a model turn.
    ModelOutput(Vec<Part>),
    /// Anything else (turnComplete, goAway, transcriptions, ...).
    Unknown,
}

impl ServerMessage {
    /// Decode a server frame. Fails only when the frame is not JSON.
    ///
    /// The variant is chosen by which top-level keys are present, so a
    /// `toolCall` is always a [`ServerMessage::ToolCall`] however malformed its
    /// body is. An unreadable call list decodes as an empty one.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Some(message) = value.as_object() else {
            return Ok(Self::Unknown);
        };

        if message.contains_key("setupComplete") {
            return Ok(Self::SetupComplete);
        }
        if let Some(raw) = message.get("toolCall") {
            return Ok(Self::ToolCall(ToolCall::deserialize(raw).unwrap_or_default()));
        }
        let turn = message
            .get("serverContent")
            .and_then(|content| ServerContent::deserialize(content).ok())
            .and_then(|content| content.model_turn);
        match turn {
            Some(turn) if !turn.parts.is_empty() => Ok(Self::ModelOutput(turn.parts)),
            _ => Ok(Self::Unknown),
        }
    }
}
