pub mod agents;
pub mod cli;
pub mod commands;
pub mod error;
pub mod llm;
pub mod models;
pub mod orchestration;
pub mod seed;
pub mod service;
pub mod store;
pub mod tools;

pub use agents::chatbot::ChatBot;
pub use error::AppError;
pub use orchestration::{ReplyEvent, ReplyStream};
pub use service::ChatService;
