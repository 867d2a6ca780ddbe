use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::orchestration::event::{ReplyEvent, StreamMessage};

pub const INTERRUPTED_ANSWER: &str =
    "The reply was interrupted before an answer was produced. Please try again.";

/// Producer half, owned by the worker for the duration of one query.
/// Dropping it closes the stream.
pub struct ReplySink {
    tx: mpsc::UnboundedSender<StreamMessage>,
}

impl ReplySink {
    /// Returns false once the consumer has gone away.
    pub fn send(&self, event: ReplyEvent) -> bool {
        self.tx.send(StreamMessage::Event(event)).is_ok()
    }
}

impl Drop for ReplySink {
    fn drop(&mut self) {
        let _ = self.tx.send(StreamMessage::Closed);
    }
}

/// Consumer half: yields events in emission order and ends right after the
/// first FINAL. If the producer closes first, a FINAL explaining the
/// interruption is yielded instead, so every reply has exactly one.
pub struct ReplyStream {
    inner: UnboundedReceiverStream<StreamMessage>,
    finished: bool,
}

pub fn reply_channel() -> (ReplySink, ReplyStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ReplySink { tx },
        ReplyStream {
            inner: UnboundedReceiverStream::new(rx),
            finished: false,
        },
    )
}

impl ReplyStream {
    /// A stream that yields only `answer`, for replies produced without the worker.
    pub fn immediate(answer: impl Into<String>) -> Self {
        let (sink, stream) = reply_channel();
        sink.send(ReplyEvent::Final(answer.into()));
        stream
    }
}

impl Stream for ReplyStream {
    type Item = ReplyEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            Some(StreamMessage::Event(event)) => {
                if event.is_final() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Some(StreamMessage::Closed) | None => {
                tracing::warn!("reply closed before a final answer");
                self.finished = true;
                Poll::Ready(Some(ReplyEvent::Final(INTERRUPTED_ANSWER.to_string())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn events_arrive_in_order_and_stop_after_final() {
        let (sink, stream) = reply_channel();
        sink.send(ReplyEvent::Partial("thinking".to_string()));
        sink.send(ReplyEvent::ToolCall("start_point".to_string()));
        sink.send(ReplyEvent::Final("done".to_string()));
        sink.send(ReplyEvent::Partial("late".to_string()));
        drop(sink);

        let events: Vec<ReplyEvent> = stream.collect().await;
        assert_eq!(
            events,
            vec![
                ReplyEvent::Partial("thinking".to_string()),
                ReplyEvent::ToolCall("start_point".to_string()),
                ReplyEvent::Final("done".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn early_close_still_yields_one_final() {
        let (sink, stream) = reply_channel();
        sink.send(ReplyEvent::ToolCall("get_person".to_string()));
        drop(sink);

        let events: Vec<ReplyEvent> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ReplyEvent::Final(INTERRUPTED_ANSWER.to_string()));
    }

    #[tokio::test]
    async fn events_cross_threads() {
        let (sink, stream) = reply_channel();
        let producer = std::thread::spawn(move || {
            for name in ["start_point", "get_person"] {
                sink.send(ReplyEvent::ToolCall(name.to_string()));
            }
            sink.send(ReplyEvent::Final("Lewis".to_string()));
        });

        let events: Vec<ReplyEvent> = stream.collect().await;
        producer.join().unwrap();
        assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);
        assert_eq!(events.last().unwrap().payload(), "Lewis");
    }

    #[tokio::test]
    async fn immediate_stream_is_a_single_final() {
        let events: Vec<ReplyEvent> = ReplyStream::immediate("help text").collect().await;
        assert_eq!(events, vec![ReplyEvent::Final("help text".to_string())]);
    }
}
