use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::AppError;
use crate::llm::provider::{AssistantTurn, Completion, CompletionClient, Message, TokenUsage};
use crate::tools::definition::{ToolCall, ToolDefinition};

/// What the client saw on one `complete` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools_offered: bool,
    pub seed: u64,
}

/// Replays queued completions in order and records every request. Cloning
/// shares the queue and the record, so a test can keep a handle after moving
/// the client into a session.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<VecDeque<Result<Completion, AppError>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, completion: Completion) -> &Self {
        self.lock_script().push_back(Ok(completion));
        self
    }

    pub fn push_text(&self, content: &str) -> &Self {
        self.push(Self::completion(AssistantTurn::text(content)))
    }

    pub fn push_tool_calls(&self, content: &str, calls: Vec<ToolCall>) -> &Self {
        self.push(Self::completion(AssistantTurn::with_tool_calls(content, calls)))
    }

    pub fn push_empty(&self) -> &Self {
        self.push(Completion {
            model: "scripted".to_string(),
            ..Default::default()
        })
    }

    pub fn push_error(&self, message: &str) -> &Self {
        self.lock_script().push_back(Err(AppError::Completion(message.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    pub fn completion(turn: AssistantTurn) -> Completion {
        Completion {
            choices: vec![turn],
            model: "scripted".to_string(),
            usage: TokenUsage::default(),
        }
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Completion, AppError>>> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        seed: u64,
    ) -> Result<Completion, AppError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tools_offered: tools.is_some(),
                seed,
            });
        }
        self.lock_script()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Completion("scripted client has no more responses".to_string())))
    }
}
