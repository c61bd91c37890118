//! Canned stream-json transcripts shared across crates' integration tests.

/// A text response plus one tool call, ending with the CLI's final
/// `result` envelope carrying token usage, the shape `ag-parser` and the
/// token-accounting path in `ag-session` both depend on.
pub fn one_shot_transcript(input_tokens: u64, output_tokens: u64) -> Vec<String> {
    vec![
        r#"{"type":"stream_event","event":{"type":"message_start","message":{"id":"msg_1","model":"sonnet"}}}"#.to_string(),
        r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"text","text":""}}}"#.to_string(),
        r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"Looking at the file"}}}"#.to_string(),
        r#"{"type":"stream_event","event":{"type":"content_block_stop"}}"#.to_string(),
        r#"{"type":"stream_event","event":{"type":"content_block_start","content_block":{"type":"tool_use","id":"tool_1","name":"Read"}}}"#.to_string(),
        r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"input_json_delta","partial_json":"{\"file_path\":\"a.txt\"}"}}}"#.to_string(),
        r#"{"type":"stream_event","event":{"type":"content_block_stop"}}"#.to_string(),
        format!(
            r#"{{"type":"result","usage":{{"input_tokens":{input_tokens},"output_tokens":{output_tokens}}}}}"#
        ),
    ]
}

/// A single Bash tool call line, for runaway-loop-detection tests.
pub fn bash_tool_use_line(tool_id: &str, command: &str) -> String {
    format!(
        r#"{{"type":"tool_use","tool_name":"Bash","tool_id":"{tool_id}","tool_input":{{"command":"{command}"}}}}"#
    )
}
