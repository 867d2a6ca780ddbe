use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;

use crate::agents::chatbot::ControlWord;
use crate::error::AppError;
use crate::orchestration::event::ReplyEvent;
use crate::service::ChatService;

const PROMPT: &str = "\n\nEnter your question: ";

/// Reads questions from stdin until an empty line, `exit` or end of input,
/// printing each reply as it streams in. Stops the worker on the way out.
pub async fn run(service: &mut ChatService) -> Result<(), AppError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = std::io::stdout();

    let result = loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(AppError::from(e)),
        };
        let query = line.trim();
        if query.is_empty() || ControlWord::parse(query) == Some(ControlWord::Exit) {
            break Ok(());
        }

        if let Err(e) = print_reply(service, query, &mut out).await {
            break Err(e);
        }
    };

    service.stop_worker();
    result
}

async fn print_reply(service: &ChatService, query: &str, out: &mut impl Write) -> Result<(), AppError> {
    let mut stream = service.get_reply_stream(query);
    while let Some(event) = stream.next().await {
        write!(out, "{}", render_event(&event))?;
        out.flush()?;
    }
    Ok(())
}

pub fn render_event(event: &ReplyEvent) -> String {
    match event {
        ReplyEvent::Partial(text) => text.clone(),
        ReplyEvent::ToolCall(name) => format!(" - toolcall: {name}\n"),
        ReplyEvent::Final(answer) => format!("\n>>> {answer}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_render_like_the_console_expects() {
        assert_eq!(render_event(&ReplyEvent::Partial("Checking.".to_string())), "Checking.");
        assert_eq!(
            render_event(&ReplyEvent::ToolCall("start_point".to_string())),
            " - toolcall: start_point\n"
        );
        assert_eq!(render_event(&ReplyEvent::Final("Lewis".to_string())), "\n>>> Lewis\n");
    }
}
