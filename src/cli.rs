use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use crate::commands::{console, llm};
use crate::llm::factory::{client_from_config, resolve_runtime_config};
use crate::models::chat::ChatConfig;
use crate::seed::sample_database;
use crate::service::ChatService;
use crate::store::sqlite::{default_database_location, expand_tilde, list_database_names, tree_db_path, GrampsDb};

/// Ask questions about a Gramps family tree through a tool-calling LLM.
#[derive(Debug, Parser)]
#[command(name = "gramps-chat", version, about)]
pub struct App {
    /// Model name, e.g. "openai/gpt-4o-mini" or "ollama/llama3"
    #[arg(long, env = "GRAMPS_AI_MODEL_NAME")]
    pub model: Option<String>,

    /// Endpoint of a self-hosted model server
    #[arg(long, env = "GRAMPS_AI_MODEL_URL")]
    pub model_url: Option<String>,

    /// Directory holding the family trees
    #[arg(long, env = "GRAMPS_DB_LOCATION")]
    pub db_location: Option<PathBuf>,

    /// Family tree to open
    #[arg(long, env = "GRAMPS_DB_NAME")]
    pub db_name: Option<String>,

    /// Tool rounds before the model is forced to answer
    #[arg(long, default_value_t = 6)]
    pub max_rounds: usize,

    /// Seed passed to the model on every call
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Delay before every model call, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub pacing_ms: u64,

    /// Log every model request, response and tool result
    #[arg(long)]
    pub debug: bool,

    /// Use the bundled sample tree instead of a database on disk
    #[arg(long)]
    pub demo: bool,

    /// Print the family trees found in the database location and exit
    #[arg(long)]
    pub list_databases: bool,

    /// Send one message to the configured model and exit
    #[arg(long)]
    pub check_model: bool,

    /// Verbosity level (use -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl App {
    /// Logs go to stderr so they never interleave with streamed answers.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base = match self.verbose {
                0 => "warn",
                1 => "gramps_chat=info",
                2 => "gramps_chat=debug",
                _ => "debug",
            };
            if self.debug {
                EnvFilter::new(format!("{base},gramps_chat::llm=info,gramps_chat::tools=info"))
            } else {
                EnvFilter::new(base)
            }
        });

        fmt()
            .without_time()
            .with_env_filter(filter)
            .with_target(self.verbose != 0 || self.debug)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            max_rounds: self.max_rounds,
            seed: self.seed,
            pacing_ms: self.pacing_ms,
            debug: self.debug,
            ..ChatConfig::default()
        }
    }

    fn db_location(&self) -> PathBuf {
        self.db_location
            .clone()
            .map(expand_tilde)
            .unwrap_or_else(default_database_location)
    }

    pub async fn run(self) -> Result<()> {
        let location = self.db_location();

        if self.list_databases {
            for name in list_database_names(&location)? {
                println!("{name}");
            }
            return Ok(());
        }

        let llm_config = resolve_runtime_config(
            self.model.as_deref(),
            self.model_url.as_deref(),
            self.debug,
            |key| std::env::var(key).ok(),
        );

        if self.check_model {
            let check = llm::check_model(&llm_config, self.seed).await?;
            println!("{}", serde_json::to_string_pretty(&check)?);
            return Ok(());
        }

        let client = client_from_config(&llm_config)?;
        let config = self.chat_config();

        let mut service = if self.demo {
            tracing::info!("using the bundled sample tree");
            ChatService::start(sample_database, client, config).await?
        } else {
            let Some(name) = self.db_name.clone() else {
                let available = list_database_names(&location).unwrap_or_default();
                bail!(
                    "No family tree selected (set GRAMPS_DB_NAME or --db-name, or use --demo). Available in {}: {}",
                    location.display(),
                    if available.is_empty() { "none".to_string() } else { available.join(", ") }
                );
            };
            let path = tree_db_path(&location, &name);
            tracing::info!(tree = %name, path = %path.display(), "opening family tree");
            ChatService::start(move || GrampsDb::open(&path), client, config).await?
        };

        console::run(&mut service).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_the_chat_config() {
        let app = App::parse_from([
            "gramps-chat",
            "--max-rounds",
            "3",
            "--pacing-ms",
            "0",
            "--seed",
            "7",
            "--debug",
            "--demo",
        ]);
        let cfg = app.chat_config();
        assert_eq!(cfg.max_rounds, 3);
        assert_eq!(cfg.seed, 7);
        assert!(cfg.pacing().is_zero());
        assert!(cfg.debug);
        assert!(app.demo);
    }

    #[test]
    fn defaults_match_the_session_defaults() {
        let app = App::parse_from(["gramps-chat"]);
        let cfg = app.chat_config();
        let defaults = ChatConfig::default();
        assert_eq!(cfg.max_rounds, defaults.max_rounds);
        assert_eq!(cfg.seed, defaults.seed);
        assert_eq!(cfg.pacing_ms, defaults.pacing_ms);
    }
}
