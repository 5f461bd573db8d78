//! Tool-call mediation
//!
//! The model reports collected data by calling the session's registered
//! function. Each recognized call is formatted as an uppercase `FIELD: value`
//! block, logged to the terminal and republished to the client as a log frame.
//! Every call in a message is acknowledged, and all acknowledgments for one
//! message go back upstream as a single tool response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;
use crate::gemini::{CallEntry, ClientMessage, FunctionCall, FunctionResponse, ToolCall, ToolResponse};
use crate::tools::ToolSchema;

/// Tracing target for collected data, so it can be filtered separately.
pub const COLLECTED_DATA_TARGET: &str = "collected_data";

const UNRECOGNIZED: &str = "unrecognized function";

const MALFORMED: &str = "malformed function call";

const LOG_DATA_OPEN: &str = "[LOG_DATA:";

/// Frames the relay synthesizes for the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEvent {
    Log { data: String },
}

impl RelayEvent {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What one tool-call message turns into.
#[derive(Debug, Default)]
pub struct Mediation {
    /// Log frames for the client, one per recognized call.
    pub log_frames: Vec<String>,
    /// The batched acknowledgment, if the message contained any calls.
    pub acknowledgment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolCallMediator {
    schema: Option<ToolSchema>,
}

impl ToolCallMediator {
    pub fn new(schema: Option<ToolSchema>) -> Self {
        Self { schema }
    }

    fn recognizes(&self, name: &str) -> bool {
        self.schema.is_some_and(|schema| schema.name == name)
    }

    pub fn mediate(&self, tool_call: &ToolCall) -> Result<Mediation> {
        let mut mediation = Mediation::default();
        let mut responses = Vec::with_capacity(tool_call.function_calls.len());

        for entry in &tool_call.function_calls {
            let call = match entry {
                CallEntry::Call(call) => call,
                CallEntry::Malformed(raw) => {
                    warn!(call_id = %entry.id(), "Rejecting malformed function call: {}", raw);
                    responses.push(FunctionResponse::error(entry.id(), entry.name(), MALFORMED));
                    continue;
                }
            };
            if !self.recognizes(&call.name) {
                warn!(
                    call_id = %call.id,
                    "Rejecting call to unrecognized function {:?}", call.name
                );
                responses.push(FunctionResponse::error(&call.id, &call.name, UNRECOGNIZED));
                continue;
            }

            let block = format_args_block(call, self.schema.as_ref());
            info!(target: COLLECTED_DATA_TARGET, function = %call.name, "\n=== COLLECTED INFORMATION ===\n{}", block);

            mediation
                .log_frames
                .push(RelayEvent::Log { data: block }.to_json()?);
            responses.push(FunctionResponse::success(&call.id, &call.name));
        }

        if !responses.is_empty() {
            let ack = ClientMessage::ToolResponse(ToolResponse {
                function_responses: responses,
            });
            mediation.acknowledgment = Some(ack.to_json()?);
        }

        Ok(mediation)
    }
}

/// `FIELD: value` lines, schema fields first in declaration order, then any
/// extra arguments in key order.
pub fn format_args_block(call: &FunctionCall, schema: Option<&ToolSchema>) -> String {
    let mut lines = Vec::with_capacity(call.args.len());

    let declared: Vec<&str> = schema.map(|s| s.field_names().collect()).unwrap_or_default();
    for name in &declared {
        if let Some(value) = call.args.get(*name) {
            lines.push(format_line(name, value));
        }
    }
    for (name, value) in &call.args {
        if !declared.contains(&name.as_str()) {
            lines.push(format_line(name, value));
        }
    }

    lines.join("\n")
}

/// The body of an inline `[LOG_DATA: ...]` block in model text, if present.
pub fn inline_data_block(text: &str) -> Option<&str> {
    let start = text.find(LOG_DATA_OPEN)? + LOG_DATA_OPEN.len();
    let len = text[start..].find(']')?;
    let block = text[start..start + len].trim();
    (!block.is_empty()).then_some(block)
}

fn format_line(name: &str, value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!("{}: {}", name.to_uppercase(), rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CHECK_IN_SCHEMA, INTAKE_SCHEMA};
    use serde_json::json;

    fn tool_call(value: Value) -> ToolCall {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_single_call() {
        let mediator = ToolCallMediator::new(Some(CHECK_IN_SCHEMA));
        let call = tool_call(json!({
            "functionCalls": [{"id": "1", "name": "log_task2_data", "args": {"status": "TAKEN"}}]
        }));

        let mediation = mediator.mediate(&call).unwrap();
        assert_eq!(mediation.log_frames, vec![r#"{"type":"log","data":"STATUS: TAKEN"}"#]);

        let ack: Value = serde_json::from_str(mediation.acknowledgment.as_deref().unwrap()).unwrap();
        assert_eq!(
            ack,
            json!({"toolResponse": {"functionResponses": [
                {"id": "1", "name": "log_task2_data", "response": {"result": "success"}}
            ]}})
        );
    }

    #[test]
    fn test_two_calls_batch_into_one_ack() {
        let mediator = ToolCallMediator::new(Some(CHECK_IN_SCHEMA));
        let call = tool_call(json!({
            "functionCalls": [
                {"id": "a", "name": "log_task2_data", "args": {"status": "SNOOZED"}},
                {"id": "b", "name": "log_task2_data", "args": {"reminder_time": "9pm"}}
            ]
        }));

        let mediation = mediator.mediate(&call).unwrap();
        assert_eq!(mediation.log_frames.len(), 2);
        assert_ne!(mediation.log_frames[0], mediation.log_frames[1]);

        let ack: Value = serde_json::from_str(mediation.acknowledgment.as_deref().unwrap()).unwrap();
        let responses = ack["toolResponse"]["functionResponses"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], "a");
        assert_eq!(responses[1]["id"], "b");
    }

    #[test]
    fn test_unrecognized_call_is_acknowledged_but_not_logged() {
        let mediator = ToolCallMediator::new(Some(CHECK_IN_SCHEMA));
        let call = tool_call(json!({
            "functionCalls": [{"id": "9", "name": "delete_everything", "args": {}}]
        }));

        let mediation = mediator.mediate(&call).unwrap();
        assert!(mediation.log_frames.is_empty());

        let ack: Value = serde_json::from_str(mediation.acknowledgment.as_deref().unwrap()).unwrap();
        assert_eq!(
            ack["toolResponse"]["functionResponses"][0]["response"],
            json!({"result": "error", "error": "unrecognized function"})
        );
    }

    #[test]
    fn test_malformed_call_is_rejected_in_the_same_batch() {
        let mediator = ToolCallMediator::new(Some(CHECK_IN_SCHEMA));
        let call = tool_call(json!({
            "functionCalls": [
                {"id": "1", "name": "log_task2_data", "args": "{\"status\":\"TAKEN\"}"},
                {"id": "2", "name": "log_task2_data", "args": {"status": "SKIPPED"}}
            ]
        }));

        let mediation = mediator.mediate(&call).unwrap();
        assert_eq!(mediation.log_frames, vec![r#"{"type":"log","data":"STATUS: SKIPPED"}"#]);

        let ack: Value = serde_json::from_str(mediation.acknowledgment.as_deref().unwrap()).unwrap();
        assert_eq!(
            ack,
            json!({"toolResponse": {"functionResponses": [
                {"id": "1", "name": "log_task2_data",
                 "response": {"result": "error", "error": "malformed function call"}},
                {"id": "2", "name": "log_task2_data", "response": {"result": "success"}}
            ]}})
        );
    }

    #[test]
    fn test_no_schema_recognizes_nothing() {
        let mediator = ToolCallMediator::new(None);
        let call = tool_call(json!({
            "functionCalls": [{"id": "1", "name": "log_task2_data", "args": {"status": "TAKEN"}}]
        }));
        assert!(mediator.mediate(&call).unwrap().log_frames.is_empty());
    }

    #[test]
    fn test_empty_call_list_sends_nothing() {
        let mediator = ToolCallMediator::new(Some(CHECK_IN_SCHEMA));
        let mediation = mediator.mediate(&ToolCall::default()).unwrap();
        assert!(mediation.log_frames.is_empty());
        assert!(mediation.acknowledgment.is_none());
    }

    #[test]
    fn test_inline_data_block() {
        assert_eq!(
            inline_data_block("Got it. [LOG_DATA: STATUS=TAKEN, TIME=8am] Thanks!"),
            Some("STATUS=TAKEN, TIME=8am")
        );
        assert_eq!(inline_data_block("[LOG_DATA: ]"), None);
        assert_eq!(inline_data_block("[LOG_DATA: unterminated"), None);
        assert_eq!(inline_data_block("plain speech"), None);
    }

    #[test]
    fn test_block_ordering_and_values() {
        let call: FunctionCall = serde_json::from_value(json!({
            "id": "1",
            "name": "log_task1_data",
            "args": {"time": "8am", "zz_note": "extra", "name": "Ann", "dosage": 2}
        }))
        .unwrap();

        assert_eq!(
            format_args_block(&call, Some(&INTAKE_SCHEMA)),
            "NAME: Ann\nDOSAGE: 2\nTIME: 8am\nZZ_NOTE: extra"
        );
    }
}
