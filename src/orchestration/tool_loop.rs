use std::time::Duration;

use crate::error::AppError;
use crate::llm::provider::{AssistantTurn, Completion, CompletionClient, TokenUsage};
use crate::models::chat::ChatConfig;
use crate::orchestration::event::ReplyEvent;
use crate::orchestration::state::ConversationState;
use crate::tools::definition::ToolDefinition;
use crate::tools::registry::ToolRegistry;

pub const FALLBACK_ANSWER: &str = "I was unable to find the desired information.";

pub const FORCED_FINAL_PROMPT: &str = "You have used all available tool calls for this question. \
Do not call any more tools. Answer the user's question now, using only the information gathered so far, \
and say plainly if something could not be found.";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_rounds: usize,
    pub seed: u64,
    pub pacing: Duration,
    pub debug: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig::from(&ChatConfig::default())
    }
}

impl From<&ChatConfig> for LoopConfig {
    fn from(cfg: &ChatConfig) -> Self {
        Self {
            max_rounds: cfg.max_rounds,
            seed: cfg.seed,
            pacing: cfg.pacing(),
            debug: cfg.debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Running(usize),
    AwaitingForcedFinal,
    Done(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Termination {
    /// The model answered without requesting tools.
    #[default]
    Answered,
    /// The model returned no choices at all.
    EmptyChoices,
    /// Every round requested tools and the answer came from the tool-less call.
    ForcedFinal,
}

#[derive(Debug, Clone, Default)]
pub struct LoopResult {
    pub answer: String,
    pub termination: Termination,
    /// Rounds that ended in tool execution.
    pub rounds: usize,
    pub completion_calls: usize,
    pub tool_calls: usize,
    pub usage: TokenUsage,
}

/// Drives completion and tool rounds for one query.
///
/// The state must already end with the user's message. Every model turn is
/// appended verbatim, followed by one tool message per requested call.
/// Exactly one [`ReplyEvent::Final`] is emitted when the run succeeds; on a
/// completion error nothing final is emitted and the error is returned.
pub struct ToolCallLoop<'a, Ctx> {
    client: &'a dyn CompletionClient,
    registry: &'a ToolRegistry<Ctx>,
    ctx: &'a Ctx,
    config: LoopConfig,
}

impl<'a, Ctx> ToolCallLoop<'a, Ctx> {
    pub fn new(
        client: &'a dyn CompletionClient,
        registry: &'a ToolRegistry<Ctx>,
        ctx: &'a Ctx,
        config: LoopConfig,
    ) -> Self {
        Self {
            client,
            registry,
            ctx,
            config,
        }
    }

    pub async fn run(
        &self,
        state: &mut ConversationState,
        emit: &mut impl FnMut(ReplyEvent),
    ) -> Result<LoopResult, AppError> {
        let definitions = self.registry.definitions();
        // Fallback answers may only come from this query's own turns.
        let query_start = state.len();
        let mut result = LoopResult::default();
        let mut current = LoopState::Running(0);

        loop {
            current = match current {
                LoopState::Running(round) if round >= self.config.max_rounds => {
                    tracing::debug!(rounds = round, "round budget exhausted, forcing a final answer");
                    LoopState::AwaitingForcedFinal
                }
                LoopState::Running(round) => {
                    self.round(round, &definitions, state, &mut result, emit).await?
                }
                LoopState::AwaitingForcedFinal => self.forced_final(query_start, state, &mut result).await?,
                LoopState::Done(answer) => {
                    result.answer = answer;
                    break;
                }
            };
        }

        tracing::info!(
            rounds = result.rounds,
            completion_calls = result.completion_calls,
            tool_calls = result.tool_calls,
            termination = ?result.termination,
            "reply ready"
        );
        emit(ReplyEvent::Final(result.answer.clone()));
        Ok(result)
    }

    async fn round(
        &self,
        round: usize,
        definitions: &[ToolDefinition],
        state: &mut ConversationState,
        result: &mut LoopResult,
        emit: &mut impl FnMut(ReplyEvent),
    ) -> Result<LoopState, AppError> {
        let completion = self.complete(state, Some(definitions), result).await?;

        let Some(turn) = completion.choices.into_iter().next() else {
            tracing::warn!(round, "model returned no choices");
            result.termination = Termination::EmptyChoices;
            return Ok(LoopState::Done(FALLBACK_ANSWER.to_string()));
        };

        state.push_assistant(&turn);

        if turn.tool_calls.is_empty() {
            result.termination = Termination::Answered;
            return Ok(LoopState::Done(turn.content));
        }

        if !turn.content.trim().is_empty() {
            emit(ReplyEvent::Partial(turn.content.clone()));
        }

        for call in &turn.tool_calls {
            emit(ReplyEvent::ToolCall(call.name.clone()));
            let outcome = self.registry.execute(self.ctx, call);
            result.tool_calls += 1;

            if outcome.ok {
                tracing::debug!(round, tool = %call.name, duration_ms = ?outcome.duration_ms, "tool call ok");
            } else {
                tracing::warn!(round, tool = %call.name, error = %outcome.content, "tool call failed");
            }
            if self.config.debug {
                tracing::info!(target: "gramps_chat::tools", tool = %call.name, result = %outcome.content, "tool call result");
            }

            state.push_tool_result(&call.id, outcome.content)?;
        }

        result.rounds = round + 1;
        Ok(LoopState::Running(round + 1))
    }

    async fn forced_final(
        &self,
        query_start: usize,
        state: &mut ConversationState,
        result: &mut LoopResult,
    ) -> Result<LoopState, AppError> {
        state.push_system(FORCED_FINAL_PROMPT);
        let completion = self.complete(state, None, result).await?;
        result.termination = Termination::ForcedFinal;

        // A turn that still carries tool calls is kept as text only, so the
        // history never holds unanswered calls.
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|turn| turn.content)
            .filter(|c| !c.trim().is_empty());

        let answer = match content {
            Some(content) => {
                state.push_assistant(&AssistantTurn::text(content.clone()));
                content
            }
            None => state
                .last_assistant_content_since(query_start)
                .map(str::to_string)
                .unwrap_or_else(|| FALLBACK_ANSWER.to_string()),
        };
        Ok(LoopState::Done(answer))
    }

    async fn complete(
        &self,
        state: &ConversationState,
        tools: Option<&[ToolDefinition]>,
        result: &mut LoopResult,
    ) -> Result<Completion, AppError> {
        if !self.config.pacing.is_zero() {
            tokio::time::sleep(self.config.pacing).await;
        }

        result.completion_calls += 1;
        tracing::debug!(
            call = result.completion_calls,
            tools_offered = tools.is_some(),
            messages = state.len(),
            "requesting completion"
        );

        let completion = self
            .client
            .complete(state.messages(), tools, self.config.seed)
            .await?;
        result.usage.add(&completion.usage);
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedClient;
    use crate::llm::provider::MessageRole;
    use crate::tools::definition::{JsonType, ToolCall, ToolDescriptor};
    use serde_json::{json, Value};

    fn registry() -> ToolRegistry<()> {
        let mut r = ToolRegistry::new();
        r.register(ToolDescriptor::new("start_point", "default person"), |_, _| {
            Ok(json!({ "handle": "H1", "first_name": "Lewis" }))
        })
        .unwrap();
        r.register(
            ToolDescriptor::new("get_person", "person by handle").param("person_handle", JsonType::String, ""),
            |_, args| Ok(json!({ "handle": args["person_handle"] })),
        )
        .unwrap();
        r.register(
            ToolDescriptor::new("get_family", "family by handle").param("family_handle", JsonType::String, ""),
            |_, _| Err(AppError::NotFound("Family handle 'F9'".to_string())),
        )
        .unwrap();
        r
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn config() -> LoopConfig {
        LoopConfig {
            pacing: Duration::ZERO,
            ..LoopConfig::default()
        }
    }

    fn state(query: &str) -> ConversationState {
        let mut state = ConversationState::with_system_prompt("You are a genealogist.");
        state.push_user(query);
        state
    }

    async fn run(client: &ScriptedClient, state: &mut ConversationState) -> (Result<LoopResult, AppError>, Vec<ReplyEvent>) {
        let registry = registry();
        let mut events = Vec::new();
        let result = ToolCallLoop::new(client, &registry, &(), config())
            .run(state, &mut |e| events.push(e))
            .await;
        (result, events)
    }

    #[tokio::test]
    async fn plain_answer_finishes_in_one_call() {
        let client = ScriptedClient::new();
        client.push_text("Lewis Anderson Garner.");
        let mut state = state("Who is the start person?");

        let (result, events) = run(&client, &mut state).await;
        let result = result.unwrap();

        assert_eq!(result.answer, "Lewis Anderson Garner.");
        assert_eq!(result.termination, Termination::Answered);
        assert_eq!(client.call_count(), 1);
        assert!(client.calls()[0].tools_offered);
        assert_eq!(events, vec![ReplyEvent::Final("Lewis Anderson Garner.".to_string())]);
        assert_eq!(state.len(), 3);
    }

    #[tokio::test]
    async fn tool_rounds_stream_partial_and_tool_call_events() {
        let client = ScriptedClient::new();
        client
            .push_tool_calls("Let me find the start person.", vec![call("c1", "start_point", Value::Null)])
            .push_tool_calls("", vec![call("c2", "get_person", json!({ "person_handle": "H1" }))])
            .push_text("The start person is Lewis.");
        let mut state = state("Who is the start person?");

        let (result, events) = run(&client, &mut state).await;
        let result = result.unwrap();

        assert_eq!(
            events,
            vec![
                ReplyEvent::Partial("Let me find the start person.".to_string()),
                ReplyEvent::ToolCall("start_point".to_string()),
                ReplyEvent::ToolCall("get_person".to_string()),
                ReplyEvent::Final("The start person is Lewis.".to_string()),
            ]
        );
        assert_eq!(result.rounds, 2);
        assert_eq!(result.tool_calls, 2);
        assert_eq!(state.count_role(MessageRole::Tool), 2);
        assert_eq!(state.messages()[3].content, r#"{"handle":"H1","first_name":"Lewis"}"#);
        assert_eq!(state.messages()[3].tool_call_id.as_deref(), Some("c1"));

        // The second request already carries the first tool result.
        let second = &client.calls()[1].messages;
        assert_eq!(second.last().unwrap().role, MessageRole::Tool);
    }

    #[tokio::test]
    async fn exhausted_budget_makes_one_tool_less_call() {
        let client = ScriptedClient::new();
        for i in 0..6 {
            client.push_tool_calls("", vec![call(&format!("c{i}"), "start_point", json!({}))]);
        }
        client.push_text("Best effort summary.");
        let mut state = state("Loop forever");

        let (result, events) = run(&client, &mut state).await;
        let result = result.unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 7);
        assert!(calls[..6].iter().all(|c| c.tools_offered));
        assert!(!calls[6].tools_offered);
        assert_eq!(calls[6].messages.last().unwrap().content, FORCED_FINAL_PROMPT);

        assert_eq!(result.answer, "Best effort summary.");
        assert_eq!(result.termination, Termination::ForcedFinal);
        assert_eq!(result.rounds, 6);
        assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);
        assert_eq!(events.iter().filter(|e| matches!(e, ReplyEvent::ToolCall(_))).count(), 6);
    }

    #[tokio::test]
    async fn forced_final_without_choices_falls_back_to_last_commentary() {
        let client = ScriptedClient::new();
        client.push_tool_calls("Still checking the records.", vec![call("c0", "start_point", json!({}))]);
        client.push_empty();
        let mut state = state("q");

        let registry = registry();
        let cfg = LoopConfig { max_rounds: 1, ..config() };
        let result = ToolCallLoop::new(&client, &registry, &(), cfg)
            .run(&mut state, &mut |_| {})
            .await
            .unwrap();

        assert_eq!(client.call_count(), 2);
        assert_eq!(result.answer, "Still checking the records.");
    }

    #[tokio::test]
    async fn forced_final_fallback_ignores_earlier_answers() {
        let client = ScriptedClient::new();
        client.push_tool_calls("", vec![call("c0", "start_point", json!({}))]);
        client.push_empty();

        let mut state = state("Who is the start person?");
        state.push_assistant(&AssistantTurn::text("Lewis Anderson Garner."));
        state.push_user("When did his mother die?");

        let registry = registry();
        let cfg = LoopConfig { max_rounds: 1, ..config() };
        let mut events = Vec::new();
        let result = ToolCallLoop::new(&client, &registry, &(), cfg)
            .run(&mut state, &mut |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(result.answer, FALLBACK_ANSWER);
        assert_eq!(events.last(), Some(&ReplyEvent::Final(FALLBACK_ANSWER.to_string())));
    }

    #[tokio::test]
    async fn failing_tool_result_names_the_tool_and_the_loop_continues() {
        let client = ScriptedClient::new();
        client
            .push_tool_calls("", vec![call("c1", "get_family", json!({ "family_handle": "F9" }))])
            .push_text("That family is not in the tree.");
        let mut state = state("Tell me about family F9");

        let (result, _) = run(&client, &mut state).await;

        assert_eq!(result.unwrap().answer, "That family is not in the tree.");
        let tool_msg = state.messages().iter().find(|m| m.role == MessageRole::Tool).unwrap();
        assert!(tool_msg.content.contains("`get_family`"));
        assert!(tool_msg.content.contains("Family handle 'F9' not found"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let client = ScriptedClient::new();
        client
            .push_tool_calls("", vec![call("c1", "get_weather", json!({}))])
            .push_text("I cannot do that.");
        let mut state = state("weather?");

        let (result, _) = run(&client, &mut state).await;

        assert!(result.is_ok());
        let tool_msg = state.messages().iter().find(|m| m.role == MessageRole::Tool).unwrap();
        assert!(tool_msg.content.starts_with("Unknown tool `get_weather`"));
    }

    #[tokio::test]
    async fn zero_argument_tool_ignores_whatever_arguments_arrive() {
        let client = ScriptedClient::new();
        client
            .push_tool_calls(
                "",
                vec![
                    call("c1", "start_point", Value::Null),
                    call("c2", "start_point", json!({})),
                    call("c3", "start_point", json!("not even json")),
                ],
            )
            .push_text("done");
        let mut state = state("q");

        run(&client, &mut state).await.0.unwrap();

        let results: Vec<&str> = state
            .messages()
            .iter()
            .filter(|m| m.role == MessageRole::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| *r == results[0]));
    }

    #[tokio::test]
    async fn empty_choices_end_with_the_fallback() {
        let client = ScriptedClient::new();
        client.push_empty();
        let mut state = state("q");

        let (result, events) = run(&client, &mut state).await;
        let result = result.unwrap();

        assert_eq!(result.answer, FALLBACK_ANSWER);
        assert_eq!(result.termination, Termination::EmptyChoices);
        assert_eq!(client.call_count(), 1);
        assert_eq!(events, vec![ReplyEvent::Final(FALLBACK_ANSWER.to_string())]);
        assert_eq!(state.len(), 2);
    }

    #[tokio::test]
    async fn completion_error_propagates_without_a_final_event() {
        let client = ScriptedClient::new();
        client.push_error("connection refused");
        let mut state = state("q");

        let (result, events) = run(&client, &mut state).await;

        assert!(result.unwrap_err().is_completion());
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn seed_is_forwarded_on_every_call() {
        let client = ScriptedClient::new();
        client.push_tool_calls("", vec![call("c1", "start_point", json!({}))]).push_text("ok");
        let mut state = state("q");

        let registry = registry();
        let cfg = LoopConfig { seed: 7, ..config() };
        ToolCallLoop::new(&client, &registry, &(), cfg)
            .run(&mut state, &mut |_| {})
            .await
            .unwrap();

        assert!(client.calls().iter().all(|c| c.seed == 7));
    }
}
