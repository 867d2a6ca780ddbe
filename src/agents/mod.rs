pub mod chatbot;

pub use chatbot::{ChatBot, ControlWord, ReplyOutcome};
