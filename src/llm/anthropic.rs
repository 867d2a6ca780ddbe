use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::llm::provider::{
    estimate_tokens, AssistantTurn, Completion, CompletionClient, Message, MessageRole, TokenUsage,
};
use crate::tools::definition::{ToolCall, ToolDefinition};

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    debug: bool,
}

impl AnthropicClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout_secs: u64,
        debug: bool,
    ) -> Result<Self, AppError> {
        let base_url = base_url
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key).map_err(|e| AppError::Config(e.to_string()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("gramps-chat/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        Ok(Self {
            client,
            model,
            base_url,
            debug,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        _seed: u64,
    ) -> Result<Completion, AppError> {
        let body = build_request_body(&self.model, messages, tools, DEFAULT_MAX_TOKENS);
        if self.debug {
            tracing::info!(target: "gramps_chat::llm", request = %body, "request to model");
        }

        let resp = self.client.post(self.endpoint()).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "".to_string());
            return Err(AppError::Completion(format!("Anthropic error: {status} {text}")));
        }

        let raw: Value = resp.json().await?;
        if self.debug {
            tracing::info!(target: "gramps_chat::llm", response = %raw, "response from model");
        }
        parse_message_response(raw, &self.model, &body.to_string())
    }
}

/// The Messages API rejects histories containing tool blocks unless tools are
/// declared, so a forced-final call (`tools == None`) still declares every tool
/// from the history but pins `tool_choice` to `none`.
pub fn build_request_body(
    model: &str,
    messages: &[Message],
    tools: Option<&[ToolDefinition]>,
    max_tokens: u32,
) -> Value {
    let (system, converted) = convert_messages(messages);

    let mut body = serde_json::json!({
        "model": model,
        "messages": converted,
        "max_tokens": max_tokens,
    });
    if let Some(system) = system {
        body["system"] = Value::String(system);
    }

    match tools {
        Some(tools) if !tools.is_empty() => {
            body["tools"] = Value::Array(tools.iter().map(to_anthropic_tool).collect());
        }
        Some(_) => {}
        None => {
            let used = history_tool_names(messages);
            if !used.is_empty() {
                body["tools"] = Value::Array(
                    used.into_iter()
                        .map(|name| {
                            serde_json::json!({
                                "name": name,
                                "description": "",
                                "input_schema": { "type": "object", "properties": {} }
                            })
                        })
                        .collect(),
                );
                body["tool_choice"] = serde_json::json!({ "type": "none" });
            }
        }
    }

    body
}

fn to_anthropic_tool(t: &ToolDefinition) -> Value {
    let schema = t
        .parameters
        .clone()
        .unwrap_or_else(|| serde_json::json!({ "type": "object", "properties": {} }));
    serde_json::json!({
        "name": t.name,
        "description": t.description,
        "input_schema": schema
    })
}

fn history_tool_names(messages: &[Message]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for call in messages.iter().flat_map(|m| m.requested_tool_calls()) {
        if !names.contains(&call.name) {
            names.push(call.name.clone());
        }
    }
    names
}

fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut out: Vec<Value> = Vec::new();

    // Only the leading system messages form the `system` field. Later ones
    // (the forced-final instruction) keep their place in the conversation.
    let leading = messages
        .iter()
        .take_while(|m| m.role == MessageRole::System)
        .count();

    for (idx, msg) in messages.iter().enumerate() {
        match msg.role {
            MessageRole::System if msg.content.trim().is_empty() => {}
            MessageRole::System if idx < leading => {
                system_parts.push(msg.content.clone());
            }
            MessageRole::System => {
                push_user_block(&mut out, serde_json::json!({ "type": "text", "text": msg.content }));
            }
            MessageRole::User => {
                push_user_block(&mut out, serde_json::json!({ "type": "text", "text": msg.content }));
            }
            MessageRole::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.trim().is_empty() {
                    blocks.push(serde_json::json!({ "type": "text", "text": msg.content }));
                }
                for tc in msg.requested_tool_calls() {
                    let input = match &tc.arguments {
                        Value::Object(_) => tc.arguments.clone(),
                        _ => serde_json::json!({}),
                    };
                    blocks.push(serde_json::json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": input
                    }));
                }
                // The API rejects empty text blocks; an empty turn carries nothing.
                if blocks.is_empty() {
                    continue;
                }
                out.push(serde_json::json!({ "role": "assistant", "content": blocks }));
            }
            MessageRole::Tool => {
                push_user_block(
                    &mut out,
                    serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content
                    }),
                );
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, out)
}

// Consecutive user-side blocks (several tool results, or a result followed by
// a question) must share one user message.
fn push_user_block(out: &mut Vec<Value>, block: Value) {
    if let Some(last) = out.last_mut() {
        if last["role"] == "user" {
            if let Some(content) = last["content"].as_array_mut() {
                content.push(block);
                return;
            }
        }
    }
    out.push(serde_json::json!({ "role": "user", "content": [block] }));
}

pub fn parse_message_response(raw: Value, model: &str, request_text: &str) -> Result<Completion, AppError> {
    let parsed: AnthropicMessageResponse = serde_json::from_value(raw)
        .map_err(|e| AppError::Completion(format!("Unexpected response shape: {e}")))?;

    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    for block in parsed.content.iter() {
        match block.r#type.as_str() {
            "text" => {
                if let Some(text) = &block.text {
                    content.push_str(text);
                }
            }
            "tool_use" => {
                if let (Some(id), Some(name)) = (&block.id, &block.name) {
                    tool_calls.push(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: block.input.clone().unwrap_or(Value::Null),
                    });
                }
            }
            _ => {}
        }
    }

    let prompt_tokens = parsed.usage.as_ref().and_then(|u| u.input_tokens);
    let completion_tokens = parsed.usage.as_ref().and_then(|u| u.output_tokens);
    let estimated = prompt_tokens.is_none() || completion_tokens.is_none();
    let output_estimate_text = if tool_calls.is_empty() {
        content.clone()
    } else {
        format!("{content}\n{}", serde_json::to_string(&tool_calls).unwrap_or_default())
    };

    // The Messages API always returns a single message; an empty content
    // list is the closest thing it has to "no choices".
    let choices = if parsed.content.is_empty() {
        Vec::new()
    } else {
        vec![AssistantTurn {
            content,
            tool_calls,
            finish_reason: parsed.stop_reason,
        }]
    };

    Ok(Completion {
        choices,
        model: parsed.model.unwrap_or_else(|| model.to_string()),
        usage: TokenUsage {
            input_tokens: prompt_tokens.unwrap_or_else(|| estimate_tokens(request_text)),
            output_tokens: completion_tokens.unwrap_or_else(|| estimate_tokens(&output_estimate_text)),
            estimated,
        },
    })
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageResponse {
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    pub r#type: String,
    pub text: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}
