pub mod console;
pub mod llm;
