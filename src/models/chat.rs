use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful genealogist and an expert in the Gramps open source \
genealogy program. Never mention to the user what an item's handle is. Never give a handle as an answer, \
always look up the details of a handle (like the person's name, or a family parents' names).

You can get the start point of the genealogy tree using the `start_point` tool. This tool does not take any \
parameters (no \"arguments\" are to be provided) and returns the default person data.";

/// Per-session knobs for the tool-calling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Delay before every completion call. Zero disables it.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl ChatConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            seed: default_seed(),
            pacing_ms: default_pacing_ms(),
            debug: false,
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_max_rounds() -> usize {
    6
}

fn default_seed() -> u64 {
    42
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: ChatConfig = serde_json::from_str(r#"{ "pacing_ms": 0 }"#).unwrap();
        assert_eq!(cfg.max_rounds, 6);
        assert_eq!(cfg.seed, 42);
        assert!(cfg.pacing().is_zero());
        assert!(cfg.system_prompt.contains("start_point"));
    }
}
