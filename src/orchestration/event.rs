use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Partial,
    ToolCall,
    Final,
}

/// One step of a reply, in the order the loop produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyEvent {
    /// Model commentary written alongside a batch of tool calls.
    Partial(String),
    /// Name of the tool about to run.
    ToolCall(String),
    Final(String),
}

impl ReplyEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ReplyEvent::Partial(_) => EventKind::Partial,
            ReplyEvent::ToolCall(_) => EventKind::ToolCall,
            ReplyEvent::Final(_) => EventKind::Final,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            ReplyEvent::Partial(s) | ReplyEvent::ToolCall(s) | ReplyEvent::Final(s) => s,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ReplyEvent::Final(_))
    }
}

/// What travels over the worker channel. `Closed` marks the end of one
/// query's events and never carries a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Event(ReplyEvent),
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_as_kind_and_payload() {
        let wire = serde_json::to_value(ReplyEvent::ToolCall("start_point".to_string())).unwrap();
        assert_eq!(wire, serde_json::json!({ "kind": "TOOL_CALL", "payload": "start_point" }));
        assert_eq!(ReplyEvent::Final("x".to_string()).kind(), EventKind::Final);
    }
}
