use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompatible,
    Anthropic,
}

/// Everything needed to build a completion client, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRuntimeConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    /// Absent when no model was configured; queries then answer with an error.
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub debug: bool,
}

impl Default for LLMRuntimeConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: None,
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            debug: false,
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenaiCompatible
}

fn default_timeout_secs() -> u64 {
    120
}
