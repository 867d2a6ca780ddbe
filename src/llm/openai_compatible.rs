use crate::error::AppError;
use crate::llm::provider::{
    estimate_tokens, AssistantTurn, Completion, CompletionClient, Message, MessageRole, TokenUsage,
};
use crate::tools::definition::{ToolCall, ToolDefinition};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAICompatibleClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    debug: bool,
}

impl OpenAICompatibleClient {
    pub fn new(
        api_key: Option<String>,
        model: String,
        base_url: Option<String>,
        timeout_secs: u64,
        debug: bool,
    ) -> Result<Self, AppError> {
        let base_url = normalize_openai_compatible_base_url(base_url);
        let mut headers = HeaderMap::new();
        if let Some(api_key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", api_key))
                    .map_err(|e| AppError::Config(e.to_string()))?,
            );
        }
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
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    fn provider_name(&self) -> &'static str {
        "openai_compatible"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        seed: u64,
    ) -> Result<Completion, AppError> {
        let body = build_request_body(&self.model, messages, tools, seed);
        if self.debug {
            tracing::info!(target: "gramps_chat::llm", request = %body, "request to model");
        }

        let resp = self.client.post(self.endpoint()).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "".to_string());
            return Err(AppError::Completion(format!(
                "OpenAI-compatible error: {status} {text}"
            )));
        }

        let raw: Value = resp.json().await?;
        if self.debug {
            tracing::info!(target: "gramps_chat::llm", response = %raw, "response from model");
        }
        parse_chat_response(raw, &self.model, &body.to_string())
    }
}

/// Request payload. Without `tools` neither `tools` nor `tool_choice` is sent,
/// so the model cannot pick a tool on that call.
pub fn build_request_body(
    model: &str,
    messages: &[Message],
    tools: Option<&[ToolDefinition]>,
    seed: u64,
) -> Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages.iter().map(to_openai_message).collect::<Vec<_>>(),
        "seed": seed,
    });

    if let Some(tools) = tools {
        let tool_defs = tools
            .iter()
            .map(|t| {
                let mut function = serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                });
                if let Some(parameters) = &t.parameters {
                    function["parameters"] = parameters.clone();
                }
                serde_json::json!({ "type": "function", "function": function })
            })
            .collect::<Vec<_>>();
        body["tools"] = Value::Array(tool_defs);
        body["tool_choice"] = Value::String("auto".to_string());
    }

    body
}

pub fn parse_chat_response(raw: Value, model: &str, request_text: &str) -> Result<Completion, AppError> {
    let parsed: ChatResponse = serde_json::from_value(raw)
        .map_err(|e| AppError::Completion(format!("Unexpected response shape: {e}")))?;

    let choices = parsed
        .choices
        .into_iter()
        .map(|choice| AssistantTurn {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(into_tool_call)
                .collect(),
            finish_reason: choice.finish_reason,
        })
        .collect::<Vec<_>>();

    let prompt_tokens = parsed.usage.as_ref().and_then(|u| u.prompt_tokens);
    let completion_tokens = parsed.usage.as_ref().and_then(|u| u.completion_tokens);
    let estimated = prompt_tokens.is_none() || completion_tokens.is_none();
    let output_estimate_text = choices
        .first()
        .map(|c| {
            if c.tool_calls.is_empty() {
                c.content.clone()
            } else {
                format!("{}\n{}", c.content, serde_json::to_string(&c.tool_calls).unwrap_or_default())
            }
        })
        .unwrap_or_default();

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

fn into_tool_call(tc: OpenAIToolCall) -> ToolCall {
    let arguments = match tc.function.arguments {
        Some(Value::String(raw)) if raw.trim().is_empty() => Value::Object(serde_json::Map::new()),
        Some(Value::String(raw)) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        Some(other) => other,
        None => Value::Null,
    };
    ToolCall {
        id: tc
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
        name: tc.function.name,
        arguments,
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub model: Option<String>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIToolCall {
    pub id: Option<String>,
    pub function: OpenAIFunctionCall,
}

// Some OpenAI-compatible servers (Ollama among them) send `arguments` as an
// object instead of a JSON-encoded string.
#[derive(Debug, Clone, Deserialize)]
struct OpenAIFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

fn to_openai_message(msg: &Message) -> Value {
    let role = match msg.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };

    let mut out = serde_json::Map::new();
    out.insert("role".to_string(), Value::String(role.to_string()));

    let tool_calls = msg.requested_tool_calls();
    let content = if msg.content.is_empty() && !tool_calls.is_empty() {
        Value::Null
    } else {
        Value::String(msg.content.clone())
    };
    out.insert("content".to_string(), content);

    if let Some(tool_call_id) = &msg.tool_call_id {
        out.insert("tool_call_id".to_string(), Value::String(tool_call_id.clone()));
    }

    if !tool_calls.is_empty() {
        let mapped = tool_calls
            .iter()
            .map(|tc| {
                let args = match &tc.arguments {
                    Value::String(raw) => raw.clone(),
                    Value::Null => "{}".to_string(),
                    other => other.to_string(),
                };
                serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": { "name": tc.name, "arguments": args }
                })
            })
            .collect::<Vec<_>>();
        out.insert("tool_calls".to_string(), Value::Array(mapped));
    }

    Value::Object(out)
}

pub fn normalize_openai_compatible_base_url(base_url: Option<String>) -> String {
    let default_url = DEFAULT_OPENAI_BASE_URL.to_string();
    let Some(mut base) = base_url else {
        return default_url;
    };
    base = base.trim().to_string();
    if base.is_empty() {
        return default_url;
    }

    // Users sometimes paste the full endpoint.
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        base = trimmed
            .strip_suffix("/chat/completions")
            .unwrap_or(trimmed)
            .to_string();
    }

    // Only append /v1 when no path provided.
    match url::Url::parse(&base) {
        Ok(url) => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return format!("{}/v1", base.trim_end_matches('/'));
            }
            base.trim_end_matches('/').to_string()
        }
        Err(_) => base.trim_end_matches('/').to_string(),
    }
}
