use serde::Serialize;

use crate::error::AppError;
use crate::llm::provider::{AssistantTurn, Message, MessageRole};

/// Ordered conversation log shared by the loop and the completion client.
///
/// Entries are only ever appended while a loop runs. The one exception is
/// [`ConversationState::truncate`], used by the session to drop a query that
/// failed on the remote side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: &str) -> Self {
        let mut state = Self::new();
        if !prompt.trim().is_empty() {
            state.messages.push(Message::system(prompt));
        }
        state
    }

    /// Seeds a state from an earlier history.
    pub fn from_history(messages: Vec<Message>) -> Result<Self, AppError> {
        let state = Self { messages };
        state.check_tool_links()?;
        Ok(state)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_system(&mut self, content: &str) {
        self.messages.push(Message::system(content));
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, turn: &AssistantTurn) {
        self.messages.push(Message::assistant_turn(turn));
    }

    /// Appends a tool result. The id must answer a call of the most recent
    /// assistant turn, with only tool results in between.
    pub fn push_tool_result(&mut self, tool_call_id: &str, content: String) -> Result<(), AppError> {
        let requested = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role != MessageRole::Tool)
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.requested_tool_calls().iter().any(|c| c.id == tool_call_id))
            .unwrap_or(false);
        if !requested {
            return Err(AppError::Message(format!(
                "tool result '{tool_call_id}' does not answer the preceding assistant turn"
            )));
        }
        self.messages.push(Message::tool(tool_call_id, content));
        Ok(())
    }

    /// Latest non-empty assistant text among the messages from index `start` on.
    pub fn last_assistant_content_since(&self, start: usize) -> Option<&str> {
        self.messages
            .get(start..)
            .unwrap_or_default()
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.as_str())
            .find(|c| !c.trim().is_empty())
    }

    pub fn count_role(&self, role: MessageRole) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.messages).unwrap_or_else(|_| "[]".to_string())
    }

    fn check_tool_links(&self) -> Result<(), AppError> {
        let mut open: Vec<&str> = Vec::new();
        for msg in &self.messages {
            match msg.role {
                MessageRole::Assistant => {
                    open = msg.requested_tool_calls().iter().map(|c| c.id.as_str()).collect();
                }
                MessageRole::Tool => {
                    let id = msg.tool_call_id.as_deref().unwrap_or_default();
                    if !open.contains(&id) {
                        return Err(AppError::Message(format!(
                            "tool result '{id}' does not answer the preceding assistant turn"
                        )));
                    }
                }
                _ => open.clear(),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::definition::ToolCall;
    use serde_json::Value;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "start_point".to_string(),
            arguments: Value::Null,
        }
    }

    #[test]
    fn tool_results_must_follow_their_request() {
        let mut state = ConversationState::with_system_prompt("sys");
        state.push_user("who?");
        assert!(state.push_tool_result("call_1", "x".to_string()).is_err());

        state.push_assistant(&AssistantTurn::with_tool_calls("", vec![call("call_1"), call("call_2")]));
        state.push_tool_result("call_1", "a".to_string()).unwrap();
        state.push_tool_result("call_2", "b".to_string()).unwrap();
        assert!(state.push_tool_result("call_3", "c".to_string()).is_err());
        assert_eq!(state.count_role(MessageRole::Tool), 2);
    }

    #[test]
    fn seeded_history_is_validated() {
        let good = vec![
            Message::user("q"),
            Message::assistant_turn(&AssistantTurn::with_tool_calls("", vec![call("c1")])),
            Message::tool("c1", "r"),
        ];
        assert_eq!(ConversationState::from_history(good).unwrap().len(), 3);

        let bad = vec![Message::user("q"), Message::tool("c1", "r")];
        assert!(ConversationState::from_history(bad).is_err());
    }

    #[test]
    fn last_assistant_content_skips_empty_turns() {
        let mut state = ConversationState::new();
        assert!(state.last_assistant_content_since(0).is_none());
        state.push_assistant(&AssistantTurn::text("Looking it up."));
        state.push_assistant(&AssistantTurn::with_tool_calls("", vec![call("c1")]));
        assert_eq!(state.last_assistant_content_since(0), Some("Looking it up."));
        assert!(state.last_assistant_content_since(1).is_none());
        assert!(state.last_assistant_content_since(10).is_none());
    }

    #[test]
    fn pretty_dump_lists_every_message() {
        let mut state = ConversationState::with_system_prompt("sys");
        state.push_user("hello");
        let dump: Vec<Value> = serde_json::from_str(&state.to_pretty_json()).unwrap();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump[1]["role"], "user");
    }
}
