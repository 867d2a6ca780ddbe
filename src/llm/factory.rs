use std::sync::Arc;

use crate::error::AppError;
use crate::llm::anthropic::AnthropicClient;
use crate::llm::openai_compatible::OpenAICompatibleClient;
use crate::llm::provider::CompletionClient;
use crate::models::llm::{LLMRuntimeConfig, ProviderKind};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Builds the client for `cfg`, or `None` when no model is configured.
pub fn client_from_config(cfg: &LLMRuntimeConfig) -> Result<Option<Arc<dyn CompletionClient>>, AppError> {
    let Some(model_id) = cfg.model_id.as_deref().map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(None);
    };

    let client: Arc<dyn CompletionClient> = match cfg.provider {
        ProviderKind::OpenaiCompatible => Arc::new(OpenAICompatibleClient::new(
            cfg.api_key.clone(),
            model_id.to_string(),
            cfg.base_url.clone(),
            cfg.timeout_secs,
            cfg.debug,
        )?),
        ProviderKind::Anthropic => {
            let api_key = cfg
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| AppError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;
            Arc::new(AnthropicClient::new(
                api_key,
                model_id.to_string(),
                cfg.base_url.clone(),
                cfg.timeout_secs,
                cfg.debug,
            )?)
        }
    };

    tracing::debug!(provider = client.provider_name(), model = client.model_id(), "completion client ready");
    Ok(Some(client))
}

/// Resolves a `provider/model` name into a runtime config. API keys are read
/// through `env` so callers decide where they come from.
pub fn resolve_runtime_config(
    model_name: Option<&str>,
    model_url: Option<&str>,
    debug: bool,
    env: impl Fn(&str) -> Option<String>,
) -> LLMRuntimeConfig {
    let mut cfg = LLMRuntimeConfig {
        debug,
        ..Default::default()
    };

    let Some(name) = model_name.map(str::trim).filter(|n| !n.is_empty()) else {
        return cfg;
    };

    let (prefix, model) = match name.split_once('/') {
        Some((prefix, rest)) if !rest.is_empty() => (prefix.to_ascii_lowercase(), rest.to_string()),
        _ => (String::new(), name.to_string()),
    };

    let default_url = match prefix.as_str() {
        "openai" => {
            cfg.api_key = env("OPENAI_API_KEY");
            None
        }
        "anthropic" => {
            cfg.provider = ProviderKind::Anthropic;
            cfg.api_key = env("ANTHROPIC_API_KEY");
            None
        }
        "ollama" | "ollama_chat" => Some(OLLAMA_BASE_URL.to_string()),
        "gemini" => {
            cfg.api_key = env("GEMINI_API_KEY");
            Some(GEMINI_BASE_URL.to_string())
        }
        _ => {
            cfg.api_key = env("OPENAI_API_KEY");
            None
        }
    };

    // Unknown prefixes are part of the model id (e.g. "meta-llama/Llama-3").
    cfg.model_id = Some(if prefix.is_empty() || !is_known_prefix(&prefix) {
        name.to_string()
    } else {
        model
    });
    cfg.base_url = model_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .or(default_url);
    cfg
}

fn is_known_prefix(prefix: &str) -> bool {
    matches!(prefix, "openai" | "anthropic" | "ollama" | "ollama_chat" | "gemini")
}
