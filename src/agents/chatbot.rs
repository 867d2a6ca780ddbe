use std::sync::Arc;

use crate::error::AppError;
use crate::llm::provider::CompletionClient;
use crate::models::chat::ChatConfig;
use crate::orchestration::event::ReplyEvent;
use crate::orchestration::state::ConversationState;
use crate::orchestration::tool_loop::{LoopConfig, ToolCallLoop};
use crate::store::sqlite::GrampsDb;
use crate::tools::builtin;
use crate::tools::registry::ToolRegistry;

pub const HELP_TEXT: &str = "\
Ask any question about the people, families, events and places in the open family tree.

Commands:
  help     show this text
  history  print the conversation so far as JSON
  exit     end the session (an empty line does the same)

Configuration (environment variable, or the matching command-line flag):
  GRAMPS_AI_MODEL_NAME  model to use, always required (--model).
                        Examples: \"ollama/deepseek-r1:1.5b\", \"openai/gpt-4o-mini\",
                        \"gemini/gemini-2.5-flash\", \"anthropic/claude-3-5-haiku-latest\"
  GRAMPS_AI_MODEL_URL   endpoint of a self-hosted model server (--model-url).
                        Example: \"http://127.0.0.1:8000\"
  GRAMPS_DB_LOCATION    directory holding the family trees (--db-location)
  GRAMPS_DB_NAME        family tree to open (--db-name)

Commercial providers also need their API key:
  OPENAI_API_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY";

pub const NO_MODEL_ANSWER: &str = "No model is configured, so this question cannot be answered. \
Set GRAMPS_AI_MODEL_NAME (or pass --model) and start again. Type `help` for details.";

pub const GOODBYE: &str = "Goodbye.";

/// Words handled by the session itself, never sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWord {
    Exit,
    Help,
    History,
}

impl ControlWord {
    /// Exact, case-sensitive match on the trimmed input.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "exit" => Some(ControlWord::Exit),
            "help" => Some(ControlWord::Help),
            "history" => Some(ControlWord::History),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    Continue,
    Exit,
}

/// One user session: the open tree, its tools, the model and the history.
pub struct ChatBot {
    db: GrampsDb,
    registry: ToolRegistry<GrampsDb>,
    client: Option<Arc<dyn CompletionClient>>,
    state: ConversationState,
    config: ChatConfig,
}

impl ChatBot {
    pub fn new(
        db: GrampsDb,
        client: Option<Arc<dyn CompletionClient>>,
        config: ChatConfig,
    ) -> Result<Self, AppError> {
        let registry = builtin::registry()?;
        let state = ConversationState::with_system_prompt(&config.system_prompt);
        if client.is_none() {
            tracing::warn!("no model configured, questions will be answered with an error");
        }
        Ok(Self {
            db,
            registry,
            client,
            state,
            config,
        })
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn database(&self) -> &GrampsDb {
        &self.db
    }

    /// Answers one query, emitting its events. Always emits exactly one
    /// FINAL event.
    pub async fn reply(&mut self, query: &str, emit: &mut impl FnMut(ReplyEvent)) -> ReplyOutcome {
        if let Some(word) = ControlWord::parse(query) {
            tracing::debug!(?word, "control word");
            return match word {
                ControlWord::Exit => {
                    emit(ReplyEvent::Final(GOODBYE.to_string()));
                    ReplyOutcome::Exit
                }
                ControlWord::Help => {
                    emit(ReplyEvent::Final(HELP_TEXT.to_string()));
                    ReplyOutcome::Continue
                }
                ControlWord::History => {
                    emit(ReplyEvent::Final(self.state.to_pretty_json()));
                    ReplyOutcome::Continue
                }
            };
        }

        let Some(client) = self.client.clone() else {
            emit(ReplyEvent::Final(NO_MODEL_ANSWER.to_string()));
            return ReplyOutcome::Continue;
        };

        let checkpoint = self.state.len();
        self.state.push_user(query);

        let tool_loop = ToolCallLoop::new(
            client.as_ref(),
            &self.registry,
            &self.db,
            LoopConfig::from(&self.config),
        );
        if let Err(e) = tool_loop.run(&mut self.state, emit).await {
            tracing::error!(error = %e, "query failed");
            self.state.truncate(checkpoint);
            emit(ReplyEvent::Final(failure_answer(&e)));
        }
        ReplyOutcome::Continue
    }
}

fn failure_answer(err: &AppError) -> String {
    if err.is_completion() {
        format!("Sorry, the model could not be reached ({err}). Please try again.")
    } else {
        format!("Sorry, something went wrong while answering: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::ScriptedClient;
    use crate::llm::provider::MessageRole;
    use crate::seed::{sample_database, SAMPLE_DEFAULT_PERSON};
    use crate::tools::definition::ToolCall;
    use serde_json::json;

    fn config() -> ChatConfig {
        ChatConfig {
            pacing_ms: 0,
            ..ChatConfig::default()
        }
    }

    fn bot(client: Option<&ScriptedClient>) -> ChatBot {
        let client = client.map(|c| Arc::new(c.clone()) as Arc<dyn CompletionClient>);
        ChatBot::new(sample_database().unwrap(), client, config()).unwrap()
    }

    async fn ask(bot: &mut ChatBot, query: &str) -> (ReplyOutcome, Vec<ReplyEvent>) {
        let mut events = Vec::new();
        let outcome = bot.reply(query, &mut |e| events.push(e)).await;
        (outcome, events)
    }

    #[test]
    fn control_words_match_trimmed_and_case_sensitive() {
        assert_eq!(ControlWord::parse("  help \n"), Some(ControlWord::Help));
        assert_eq!(ControlWord::parse("history"), Some(ControlWord::History));
        assert_eq!(ControlWord::parse("exit"), Some(ControlWord::Exit));
        assert_eq!(ControlWord::parse("Help"), None);
        assert_eq!(ControlWord::parse("help me"), None);
    }

    #[tokio::test]
    async fn help_never_reaches_the_model() {
        let client = ScriptedClient::new();
        let mut bot = bot(Some(&client));

        let (outcome, events) = ask(&mut bot, "help").await;

        assert_eq!(outcome, ReplyOutcome::Continue);
        assert_eq!(events, vec![ReplyEvent::Final(HELP_TEXT.to_string())]);
        assert_eq!(client.call_count(), 0);
        assert_eq!(bot.state().len(), 1);
    }

    #[tokio::test]
    async fn exit_ends_the_session() {
        let mut bot = bot(None);
        let (outcome, events) = ask(&mut bot, "exit").await;
        assert_eq!(outcome, ReplyOutcome::Exit);
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn history_dumps_the_conversation() {
        let client = ScriptedClient::new();
        client.push_text("Hello!");
        let mut bot = bot(Some(&client));
        ask(&mut bot, "Hi").await;

        let (_, events) = ask(&mut bot, "history").await;
        let dump: Vec<serde_json::Value> = serde_json::from_str(events[0].payload()).unwrap();
        assert_eq!(dump.len(), 3);
        assert_eq!(dump[1]["content"], "Hi");
        assert_eq!(dump[2]["content"], "Hello!");
    }

    #[tokio::test]
    async fn missing_model_answers_with_an_error() {
        let mut bot = bot(None);
        let (_, events) = ask(&mut bot, "Who is the start person?").await;
        assert_eq!(events, vec![ReplyEvent::Final(NO_MODEL_ANSWER.to_string())]);
        assert_eq!(bot.state().len(), 1);
    }

    #[tokio::test]
    async fn tools_run_against_the_open_tree() {
        let client = ScriptedClient::new();
        client
            .push_tool_calls(
                "",
                vec![ToolCall {
                    id: "c1".to_string(),
                    name: "get_person_birth_place".to_string(),
                    arguments: json!({ "person_handle": SAMPLE_DEFAULT_PERSON }),
                }],
            )
            .push_text("He was born in Wheeling, West Virginia.");
        let mut bot = bot(Some(&client));

        let (_, events) = ask(&mut bot, "Where was the start person born?").await;

        assert_eq!(events.last().unwrap().payload(), "He was born in Wheeling, West Virginia.");
        let tool_msg = bot
            .state()
            .messages()
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert_eq!(tool_msg.content, "Wheeling, WV, USA");
    }

    #[tokio::test]
    async fn failed_query_is_rolled_back_and_the_session_recovers() {
        let client = ScriptedClient::new();
        client.push_error("503 Service Unavailable").push_text("Lewis Anderson Garner.");
        let mut bot = bot(Some(&client));

        let (_, events) = ask(&mut bot, "Who is the start person?").await;
        assert_eq!(events.len(), 1);
        assert!(events[0].payload().contains("503 Service Unavailable"));
        assert_eq!(bot.state().len(), 1);

        let (_, events) = ask(&mut bot, "Who is the start person?").await;
        assert_eq!(events, vec![ReplyEvent::Final("Lewis Anderson Garner.".to_string())]);
        assert_eq!(bot.state().count_role(MessageRole::User), 1);

        // The retry went out with a clean history.
        let retry = &client.calls()[1].messages;
        assert_eq!(retry.len(), 2);
    }
}
