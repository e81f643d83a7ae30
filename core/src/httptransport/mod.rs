//! HTTP streaming transport with embedded tool loop.
//!
//! Talks to an OpenAI-compatible proxy over SSE, accumulating streamed
//! `tool_calls` deltas by index and executing them locally through the
//! tool registry until the model stops requesting tools or the
//! round cap is hit.

use std::pin::Pin;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agentdefs::AgentKind;
use crate::error::{CommanderError, Result};
use crate::tools::ToolRegistry;

const MAX_TOOL_ROUNDS: u32 = 25;

#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Assistant text delta, already attributed to the chat bubble.
    Chunk(String),
    /// A tool invocation/result notice (rendered as its own bubble).
    ToolChunk(String),
    Done,
}

#[derive(Default, Debug, Clone)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": { "name": self.name, "arguments": self.arguments },
        })
    }
}

#[derive(Default)]
struct RequestResult {
    text_parts: Vec<String>,
    tool_calls: Vec<ToolCallAccumulator>,
    finish_reason: String,
}

pub struct ProxyTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    endpoint: String,
    model_claude: String,
    model_gemini: String,
    model_codex: String,
    tools: ToolRegistry,
}

impl ProxyTransport {
    pub fn new(
        base_url: String,
        api_key: String,
        model_claude: String,
        model_gemini: String,
        model_codex: String,
        request_timeout_secs: u64,
        tools: ToolRegistry,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout_secs.max(10)))
            .build()
            .map_err(CommanderError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            endpoint: "/v1/chat/completions".to_string(),
            model_claude,
            model_gemini,
            model_codex,
            tools,
        })
    }

    fn select_model(&self, agent: AgentKind) -> Result<String> {
        let model = match agent {
            AgentKind::Claude => &self.model_claude,
            AgentKind::Gemini => &self.model_gemini,
            AgentKind::Codex => &self.model_codex,
        };
        if model.trim().is_empty() {
            return Err(CommanderError::Other(anyhow::anyhow!(
                "no proxy model configured for agent '{agent}'"
            )));
        }
        Ok(model.clone())
    }

    /// Run the full multi-round tool loop for one user turn, yielding
    /// streamed events as they occur.
    pub fn send_and_receive<'a>(
        &'a self,
        message: String,
        agent: AgentKind,
        cwd: Option<String>,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'a>> {
        Box::pin(try_stream! {
            let model = self.select_model(agent)?;
            let mut messages = vec![json!({"role": "user", "content": message})];

            for round_num in 0..MAX_TOOL_ROUNDS {
                let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Result<StreamEvent>>();

                let mut result: Option<Result<RequestResult>> = None;
                {
                    let request_fut = self.single_request(&model, &messages, tx);
                    futures::pin_mut!(request_fut);

                    loop {
                        tokio::select! {
                            r = &mut request_fut, if result.is_none() => {
                                result = Some(r);
                            }
                            event = rx.recv() => {
                                match event {
                                    Some(event) => yield event?,
                                    None => break,
                                }
                            }
                        }
                    }
                }
                let result = result.unwrap_or_else(|| Ok(RequestResult::default()))?;

                if result.tool_calls.is_empty() || result.finish_reason != "tool_calls" {
                    break;
                }

                let assistant_tool_calls: Vec<Value> =
                    result.tool_calls.iter().map(ToolCallAccumulator::to_json).collect();
                let text = result.text_parts.join("");
                let mut assistant_msg = json!({
                    "role": "assistant",
                    "tool_calls": assistant_tool_calls,
                });
                if !text.is_empty() {
                    assistant_msg["content"] = json!(text);
                }
                messages.push(assistant_msg);

                for tc in &result.tool_calls {
                    let short_args: String = if tc.arguments.chars().count() > 120 {
                        format!("{}...", tc.arguments.chars().take(120).collect::<String>())
                    } else {
                        tc.arguments.clone()
                    };
                    yield StreamEvent::ToolChunk(format!("`{}({})`\n", tc.name, short_args));

                    let tool_result = self
                        .tools
                        .dispatch(&tc.name, &tc.arguments, cwd.as_deref())
                        .await
                        .unwrap_or_else(|e| format!("Error: {e}"));

                    let preview: String = if tool_result.chars().count() > 500 {
                        format!("{}...", tool_result.chars().take(500).collect::<String>())
                    } else {
                        tool_result.clone()
                    };
                    yield StreamEvent::ToolChunk(format!("```\n{preview}\n```\n\n"));

                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": tc.id,
                        "content": tool_result,
                    }));
                }

                debug!(round = round_num + 1, tools = result.tool_calls.len(), "tool round complete");
            }

            yield StreamEvent::Done;
        })
    }

    /// Send one HTTP request, pushing text chunks onto `tx` as they
    /// stream in. Resolves once the SSE stream ends, with the
    /// accumulated tool calls and finish reason.
    async fn single_request(
        &self,
        model: &str,
        messages: &[Value],
        tx: tokio::sync::mpsc::UnboundedSender<Result<StreamEvent>>,
    ) -> Result<RequestResult> {
        let url = format!("{}{}", self.base_url, self.endpoint);
        let body = json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "temperature": 0,
            "tools": self.tools.definitions(),
        });

        let mut req = self.http.post(&url).json(&body).header("Accept", "text/event-stream");
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let response = req.send().await.map_err(CommanderError::Http)?;
        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(CommanderError::Other(anyhow::anyhow!(
                "proxy request failed with status {status}: {body_text}"
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut data_lines: Vec<String> = Vec::new();
        let mut finish_reason = "stop".to_string();
        let mut tool_accumulators: Vec<ToolCallAccumulator> = Vec::new();
        let mut text_parts = Vec::new();

        'outer: while let Some(chunk_res) = stream.next().await {
            let chunk = chunk_res.map_err(CommanderError::Http)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            loop {
                let Some(newline_pos) = buffer.find('\n') else { break };
                let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
                buffer.drain(..=newline_pos);

                if line.is_empty() {
                    if !data_lines.is_empty() {
                        let payload = data_lines.join("\n");
                        data_lines.clear();
                        if payload == "[DONE]" {
                            break 'outer;
                        }
                        if let Some(err) = extract_error(&payload) {
                            return Err(CommanderError::Other(anyhow::anyhow!(
                                "proxy stream error: {err}"
                            )));
                        }
                        if let Some(text) =
                            process_sse_payload(&payload, &mut finish_reason, &mut tool_accumulators)
                        {
                            text_parts.push(text.clone());
                            if tx.send(Ok(StreamEvent::Chunk(text))).is_err() {
                                warn!("proxy transport receiver dropped mid-stream");
                            }
                        }
                    }
                    continue;
                }
                if let Some(rest) = line.strip_prefix("data:") {
                    data_lines.push(rest.trim_start().to_string());
                }
            }
        }

        let tool_calls: Vec<ToolCallAccumulator> =
            tool_accumulators.into_iter().filter(|tc| !tc.name.is_empty()).collect();
        Ok(RequestResult {
            text_parts,
            tool_calls,
            finish_reason,
        })
    }
}

fn normalize_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("text").and_then(|v| v.as_str()).map(String::from),
                _ => None,
            })
            .collect(),
        _ => String::new(),
    }
}

fn extract_error(payload: &str) -> Option<String> {
    let data: Value = serde_json::from_str(payload).ok()?;
    let err = data.get("error")?;
    if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
        if !msg.trim().is_empty() {
            return Some(msg.trim().to_string());
        }
    }
    if let Some(t) = err.get("type").and_then(|v| v.as_str()) {
        if !t.trim().is_empty() {
            return Some(t.trim().to_string());
        }
    }
    if let Some(s) = err.as_str() {
        if !s.trim().is_empty() {
            return Some(s.trim().to_string());
        }
    }
    Some(err.to_string())
}

/// Process one SSE data payload: extract text, tool_call deltas,
/// finish_reason. Returns assistant text to emit, if any.
fn process_sse_payload(
    payload: &str,
    finish_reason: &mut String,
    tool_accumulators: &mut Vec<ToolCallAccumulator>,
) -> Option<String> {
    let data: Value = serde_json::from_str(payload).ok()?;
    let choices = data.get("choices")?.as_array()?;
    let Some(choice) = choices.first() else {
        return extract_fallback_text(&data);
    };

    if let Some(fr) = choice.get("finish_reason").and_then(|v| v.as_str()) {
        if !fr.is_empty() {
            *finish_reason = fr.to_string();
        }
    }

    if let Some(delta) = choice.get("delta").and_then(|v| v.as_object()) {
        let mut text = None;
        if let Some(content) = delta.get("content") {
            let t = normalize_content(content);
            if !t.is_empty() {
                text = Some(t);
            }
        }
        if let Some(tc_deltas) = delta.get("tool_calls").and_then(|v| v.as_array()) {
            for tc_delta in tc_deltas {
                let index = tc_delta.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                while tool_accumulators.len() <= index {
                    tool_accumulators.push(ToolCallAccumulator::default());
                }
                let acc = &mut tool_accumulators[index];
                if let Some(id) = tc_delta.get("id").and_then(|v| v.as_str()) {
                    acc.id = id.to_string();
                }
                if let Some(func) = tc_delta.get("function").and_then(|v| v.as_object()) {
                    if let Some(name) = func.get("name").and_then(|v| v.as_str()) {
                        acc.name = name.to_string();
                    }
                    if let Some(args) = func.get("arguments").and_then(|v| v.as_str()) {
                        acc.arguments.push_str(args);
                    }
                }
            }
        }
        return text;
    }

    if let Some(message) = choice.get("message").and_then(|v| v.as_object()) {
        let mut text = None;
        if let Some(content) = message.get("content") {
            let t = normalize_content(content);
            if !t.is_empty() {
                text = Some(t);
            }
        }
        if let Some(tc_list) = message.get("tool_calls").and_then(|v| v.as_array()) {
            for tc in tc_list {
                let Some(func) = tc.get("function").and_then(|v| v.as_object()) else {
                    continue;
                };
                tool_accumulators.push(ToolCallAccumulator {
                    id: tc.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    name: func.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    arguments: func
                        .get("arguments")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }
        return text;
    }

    None
}

fn extract_fallback_text(data: &Value) -> Option<String> {
    if let Some(event_type) = data.get("type").and_then(|v| v.as_str()) {
        if matches!(event_type, "response.output_text.delta" | "output_text.delta") {
            return data.get("delta").and_then(|v| v.as_str()).map(String::from);
        }
        if matches!(event_type, "content_block_delta" | "message_delta") {
            return data
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|v| v.as_str())
                .map(String::from);
        }
    }
    if let Some(output_text) = data.get("output_text") {
        let text = normalize_content(output_text);
        if !text.is_empty() {
            return Some(text);
        }
    }
    if let Some(content) = data.get("content").and_then(|v| v.as_array()) {
        let text: String = content
            .iter()
            .filter_map(|item| item.get("text").and_then(|v| v.as_str()))
            .collect();
        if !text.is_empty() {
            return Some(text);
        }
    }
    if let Some(output) = data.get("output").and_then(|v| v.as_array()) {
        let mut parts = String::new();
        for item in output {
            if let Some(content) = item.get("content").and_then(|v| v.as_array()) {
                for block in content {
                    if let Some(t) = block.get("text").and_then(|v| v.as_str()) {
                        parts.push_str(t);
                    }
                }
            }
        }
        if !parts.is_empty() {
            return Some(parts);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_content_handles_string_and_array() {
        assert_eq!(normalize_content(&json!("hi")), "hi");
        assert_eq!(
            normalize_content(&json!([{"text": "a"}, {"text": "b"}])),
            "ab"
        );
    }

    #[test]
    fn process_sse_payload_extracts_delta_text() {
        let mut finish = "stop".to_string();
        let mut accs = Vec::new();
        let payload = json!({
            "choices": [{"delta": {"content": "hello"}}]
        })
        .to_string();
        let text = process_sse_payload(&payload, &mut finish, &mut accs);
        assert_eq!(text.as_deref(), Some("hello"));
    }

    #[test]
    fn process_sse_payload_accumulates_tool_call_args_by_index() {
        let mut finish = "stop".to_string();
        let mut accs = Vec::new();
        let p1 = json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "shell"}}]}}]}).to_string();
        let p2 = json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"command\":"}}]}}]}).to_string();
        let p3 = json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "\"ls\"}"}}]}}], "finish_reason": "tool_calls"}).to_string();
        process_sse_payload(&p1, &mut finish, &mut accs);
        process_sse_payload(&p2, &mut finish, &mut accs);
        process_sse_payload(&p3, &mut finish, &mut accs);
        assert_eq!(accs[0].name, "shell");
        assert_eq!(accs[0].arguments, "{\"command\":\"ls\"}");
    }

    #[test]
    fn extract_error_reads_message_field() {
        let payload = json!({"error": {"message": "bad request"}}).to_string();
        assert_eq!(extract_error(&payload).as_deref(), Some("bad request"));
    }
}
