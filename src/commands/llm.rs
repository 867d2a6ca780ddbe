use serde::Serialize;

use crate::error::AppError;
use crate::llm::factory::client_from_config;
use crate::llm::openai_compatible::normalize_openai_compatible_base_url;
use crate::llm::provider::Message;
use crate::models::llm::{LLMRuntimeConfig, ProviderKind};

const CHECK_MESSAGE: &str = "Reply with the single word: ready";

#[derive(Debug, Clone, Serialize)]
pub struct ModelCheck {
    pub message: String,
    pub response_preview: String,
    pub tokens_used: u32,
    pub resolved_base_url: Option<String>,
}

/// Sends one tool-less message to the configured model.
pub async fn check_model(config: &LLMRuntimeConfig, seed: u64) -> Result<ModelCheck, AppError> {
    let resolved_base_url = match config.provider {
        ProviderKind::OpenaiCompatible => Some(normalize_openai_compatible_base_url(config.base_url.clone())),
        ProviderKind::Anthropic => config.base_url.clone(),
    };

    let client = client_from_config(config)?
        .ok_or_else(|| AppError::Config("No model configured (set GRAMPS_AI_MODEL_NAME or --model)".to_string()))?;

    let completion = client.complete(&[Message::user(CHECK_MESSAGE)], None, seed).await?;
    let content = completion
        .first_choice()
        .map(|turn| turn.content.trim().to_string())
        .unwrap_or_default();

    Ok(ModelCheck {
        message: format!("Model {} ({}) answered", client.model_id(), client.provider_name()),
        response_preview: preview(&content, 100),
        tokens_used: completion.usage.input_tokens.saturating_add(completion.usage.output_tokens),
        resolved_base_url,
    })
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let head: String = content.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}
