pub mod event;
pub mod state;
pub mod stream;
pub mod tool_loop;

pub use event::{EventKind, ReplyEvent, StreamMessage};
pub use state::ConversationState;
pub use stream::{reply_channel, ReplySink, ReplyStream};
pub use tool_loop::{LoopConfig, LoopResult, ToolCallLoop, FALLBACK_ANSWER};
