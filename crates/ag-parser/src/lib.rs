//! Turns the assistant CLI's line-delimited stream-json output into
//! [`ag_types::Event`]s.
//!
//! The wire format nests two shapes: the CLI's own top-level envelopes
//! (`system`, `assistant`, `user`, `tool_use`, `tool_result`, `result`,
//! `error`) and, when an envelope is a raw `stream_event` passthrough, the
//! underlying Anthropic Messages-API streaming shape (`message_start`,
//! `content_block_start`, `content_block_delta`, `content_block_stop`,
//! `message_delta`, `message_stop`). A tool call's input arrives as a run of
//! `input_json_delta` fragments and is only a complete JSON value once its
//! `content_block_stop` arrives, so the parser buffers it across lines.

use ag_types::{Event, EventKind, Payload};
use serde_json::{json, Value};
use uuid::Uuid;

/// Maps the CLI's top-level envelope `type` to the event kind it produces
/// when no further nested dispatch applies.
fn top_level_kind(kind: &str) -> Option<EventKind> {
    Some(match kind {
        "system" => EventKind::StreamSystem,
        "assistant" => EventKind::StreamAssistant,
        "user" => EventKind::StreamUser,
        "tool_use" => EventKind::StreamToolUse,
        "tool_result" => EventKind::StreamToolResult,
        "result" => EventKind::StreamResult,
        "error" => EventKind::StreamError,
        _ => return None,
    })
}

/// Stateful decoder for one run's stdout. Not `Send`-shared; owned by the
/// task reading that run's child process.
pub struct StreamParser {
    session_id: Uuid,
    run_id: Uuid,
    current_tool_id: Option<String>,
    current_tool_name: Option<String>,
    current_tool_input_json: String,
}

impl StreamParser {
    pub fn new(session_id: Uuid, run_id: Uuid) -> Self {
        Self {
            session_id,
            run_id,
            current_tool_id: None,
            current_tool_name: None,
            current_tool_input_json: String::new(),
        }
    }

    /// Parse one line of stdout. Returns `None` when the line carries no
    /// emittable event on its own (e.g. a partial tool-input fragment).
    pub fn parse_line(&mut self, line: &str) -> Option<Event> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => self.parse_json_event(&value),
            Err(_) => Some(self.raw_line_event(line)),
        }
    }

    /// Build a `stream.tool_result` event directly, for callers that feed a
    /// tool's output back into the log outside the line-by-line path (e.g.
    /// a pattern executor relaying a sub-agent's result).
    pub fn tool_result_event(&self, tool_id: &str, output: &str, is_error: bool) -> Event {
        let mut event = Event::new(
            self.session_id,
            self.run_id,
            EventKind::StreamToolResult,
            Payload::Generic(json!({"tool_id": tool_id, "output": output})),
        );
        event.tool_id = Some(tool_id.to_string());
        event.tool_output = Some(output.to_string());
        event.is_error = is_error;
        event
    }

    fn raw_line_event(&self, line: &str) -> Event {
        let mut event = Event::new(
            self.session_id,
            self.run_id,
            EventKind::StreamAssistant,
            Payload::Generic(json!({"raw": line})),
        );
        event.content = Some(line.to_string());
        event.content_type = Some("raw".to_string());
        event
    }

    fn new_event(&self, kind: EventKind, payload: Value) -> Event {
        Event::new(self.session_id, self.run_id, kind, Payload::Generic(payload))
    }

    fn parse_json_event(&mut self, data: &Value) -> Option<Event> {
        let outer_type = data.get("type").and_then(Value::as_str)?;
        if outer_type == "stream_event" {
            let inner = data.get("event")?;
            return self.parse_inner_event(inner, inner);
        }
        if let Some(kind) = top_level_kind(outer_type) {
            return self.parse_generic(data, kind);
        }
        self.parse_inner_event(data, data)
    }

    fn parse_generic(&self, data: &Value, kind: EventKind) -> Option<Event> {
        let mut event = self.new_event(kind, data.clone());
        event.role = data.get("role").and_then(Value::as_str).map(String::from);
        if let Some(items) = data.get("content").and_then(Value::as_array) {
            event.content = Some(extract_content(items));
        }
        // Flattened top-level envelopes (as opposed to the partial-message
        // content-block path) carry tool fields directly on the envelope.
        event.tool_name = data.get("tool_name").and_then(Value::as_str).map(String::from);
        event.tool_id = data.get("tool_id").and_then(Value::as_str).map(String::from);
        event.tool_input = data.get("tool_input").cloned();
        event.tool_output = data
            .get("tool_output")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| data.get("output").and_then(Value::as_str).map(String::from));
        if kind == EventKind::StreamError {
            event.is_error = true;
            event.content = data
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
                .or_else(|| data.get("error").map(|e| e.to_string()));
        }
        Some(event)
    }

    fn parse_inner_event(&mut self, inner: &Value, wrapper: &Value) -> Option<Event> {
        match inner.get("type").and_then(Value::as_str) {
            Some("message") => self.parse_message(inner),
            Some("content_block_start") => self.parse_content_block_start(inner),
            Some("content_block_delta") => self.parse_content_block_delta(inner),
            Some("content_block_stop") => self.parse_content_block_stop(),
            Some("message_start") => self.parse_message_start(inner),
            Some("message_delta") => self.parse_message_delta(inner),
            Some("message_stop") => Some(self.parse_message_stop()),
            Some("error") => self.parse_error(inner),
            _ => {
                let mut event =
                    self.new_event(EventKind::StreamAssistant, wrapper.clone());
                event.content_type = Some("unknown".to_string());
                Some(event)
            }
        }
    }

    fn parse_message(&self, inner: &Value) -> Option<Event> {
        let message = inner.get("message").unwrap_or(inner);
        let mut event = self.new_event(EventKind::StreamAssistant, inner.clone());
        event.role = message.get("role").and_then(Value::as_str).map(String::from);
        if let Some(items) = message.get("content").and_then(Value::as_array) {
            event.content = Some(extract_content(items));
        }
        Some(event)
    }

    fn parse_content_block_start(&mut self, inner: &Value) -> Option<Event> {
        let block = inner.get("content_block")?;
        match block.get("type").and_then(Value::as_str) {
            Some("tool_use") => {
                self.current_tool_id = block.get("id").and_then(Value::as_str).map(String::from);
                self.current_tool_name =
                    block.get("name").and_then(Value::as_str).map(String::from);
                self.current_tool_input_json.clear();
                None
            }
            Some("text") => {
                let mut event = self.new_event(EventKind::StreamAssistant, inner.clone());
                event.role = Some("assistant".to_string());
                event.content_type = Some("text".to_string());
                event.content = block
                    .get("text")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .or(Some(String::new()));
                Some(event)
            }
            _ => None,
        }
    }

    fn parse_content_block_delta(&mut self, inner: &Value) -> Option<Event> {
        let delta = inner.get("delta")?;
        match delta.get("type").and_then(Value::as_str) {
            Some("text_delta") => {
                let mut event = self.new_event(EventKind::StreamAssistant, inner.clone());
                event.role = Some("assistant".to_string());
                event.content_type = Some("text_delta".to_string());
                event.content = delta.get("text").and_then(Value::as_str).map(String::from);
                Some(event)
            }
            Some("input_json_delta") => {
                if let Some(fragment) = delta.get("partial_json").and_then(Value::as_str) {
                    self.current_tool_input_json.push_str(fragment);
                }
                None
            }
            _ => None,
        }
    }

    fn parse_content_block_stop(&mut self) -> Option<Event> {
        let tool_id = self.current_tool_id.take()?;
        let tool_name = self.current_tool_name.take().unwrap_or_default();
        let raw_json = std::mem::take(&mut self.current_tool_input_json);
        let tool_input = serde_json::from_str::<Value>(&raw_json)
            .unwrap_or_else(|_| json!({"raw": raw_json}));

        let mut event = self.new_event(
            EventKind::StreamToolUse,
            json!({"tool_name": tool_name, "tool_id": tool_id, "tool_input": tool_input}),
        );
        event.tool_name = Some(tool_name);
        event.tool_id = Some(tool_id);
        event.tool_input = Some(tool_input);
        Some(event)
    }

    fn parse_message_start(&self, inner: &Value) -> Option<Event> {
        let message = inner.get("message");
        let payload = json!({
            "model": message.and_then(|m| m.get("model")),
            "id": message.and_then(|m| m.get("id")),
        });
        Some(self.new_event(EventKind::StreamInit, payload))
    }

    fn parse_message_delta(&self, inner: &Value) -> Option<Event> {
        let usage = inner.get("usage")?;
        if !usage.is_object() || usage.as_object().is_some_and(|m| m.is_empty()) {
            return None;
        }
        let stop_reason = inner.get("delta").and_then(|d| d.get("stop_reason"));
        Some(self.new_event(
            EventKind::StreamResult,
            json!({"stop_reason": stop_reason, "usage": usage}),
        ))
    }

    fn parse_message_stop(&self) -> Event {
        self.new_event(EventKind::StreamResult, json!({"completed": true}))
    }

    fn parse_error(&self, inner: &Value) -> Option<Event> {
        let error = inner.get("error").unwrap_or(inner);
        let mut event = self.new_event(EventKind::StreamError, inner.clone());
        event.is_error = true;
        event.content = error
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| Some(error.to_string()));
        Some(event)
    }
}

/// Joins `text` and `tool_result` content-block items with newlines, the way
/// a transcript renderer would flatten a message's content array.
fn extract_content(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|item| match item.get("type").and_then(Value::as_str) {
            Some("text") => item.get("text").and_then(Value::as_str).map(String::from),
            Some("tool_result") => item.get("content").map(|c| match c.as_str() {
                Some(s) => s.to_string(),
                None => c.to_string(),
            }),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> StreamParser {
        StreamParser::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn blank_line_yields_no_event() {
        assert!(parser().parse_line("   ").is_none());
    }

    #[test]
    fn non_json_line_becomes_raw_assistant_event() {
        let event = parser().parse_line("not json at all").unwrap();
        assert_eq!(event.kind, EventKind::StreamAssistant);
        assert_eq!(event.content.as_deref(), Some("not json at all"));
    }

    #[test]
    fn top_level_result_envelope_carries_usage_through() {
        let line = r#"{"type":"result","usage":{"input_tokens":10,"output_tokens":4}}"#;
        let event = parser().parse_line(line).unwrap();
        assert_eq!(event.kind, EventKind::StreamResult);
        assert_eq!(event.result_usage(), (10, 4));
    }

    #[test]
    fn message_delta_usage_is_not_mistaken_for_final_result() {
        // message_delta events never carry a nested `type: "result"`, so
        // they must not feed the run's token accounting on their own.
        let line = r#"{"type":"stream_event","event":{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"input_tokens":10,"output_tokens":4}}}"#;
        let event = parser().parse_line(line).unwrap();
        assert_eq!(event.kind, EventKind::StreamResult);
        assert_eq!(event.result_usage(), (0, 0));
    }

    #[test]
    fn tool_use_assembles_fragmented_json_input() {
        let mut p = parser();
        let start = r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"tool_use","id":"tool_1","name":"Read"}}}"#;
        assert!(p.parse_line(start).is_none());

        let delta1 = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{\"file_path\""}}}"#;
        assert!(p.parse_line(delta1).is_none());

        let delta2 = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":":\"a.txt\"}"}}}"#;
        assert!(p.parse_line(delta2).is_none());

        let stop = r#"{"type":"stream_event","event":{"type":"content_block_stop"}}"#;
        let event = p.parse_line(stop).unwrap();
        assert_eq!(event.kind, EventKind::StreamToolUse);
        assert_eq!(event.tool_name.as_deref(), Some("Read"));
        assert_eq!(event.tool_id.as_deref(), Some("tool_1"));
        assert_eq!(
            event.tool_input,
            Some(json!({"file_path": "a.txt"}))
        );
    }

    #[test]
    fn tool_use_falls_back_to_raw_on_unparseable_input_json() {
        let mut p = parser();
        let start = r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"tool_use","id":"tool_2","name":"Bash"}}}"#;
        p.parse_line(start);
        let delta = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{not valid"}}}"#;
        p.parse_line(delta);
        let stop = r#"{"type":"stream_event","event":{"type":"content_block_stop"}}"#;
        let event = p.parse_line(stop).unwrap();
        assert_eq!(event.tool_input, Some(json!({"raw": "{not valid"})));
    }

    #[test]
    fn content_block_stop_without_open_tool_emits_nothing() {
        let mut p = parser();
        let stop = r#"{"type":"stream_event","event":{"type":"content_block_stop"}}"#;
        assert!(p.parse_line(stop).is_none());
    }

    #[test]
    fn error_envelope_marks_is_error_and_extracts_message() {
        let line = r#"{"type":"error","error":{"message":"boom"}}"#;
        let event = parser().parse_line(line).unwrap();
        assert!(event.is_error);
        assert_eq!(event.kind, EventKind::StreamError);
    }
}
