use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use crate::agents::chatbot::{ChatBot, ReplyOutcome};
use crate::error::AppError;
use crate::llm::provider::CompletionClient;
use crate::models::chat::ChatConfig;
use crate::orchestration::stream::{reply_channel, ReplySink, ReplyStream};
use crate::store::sqlite::GrampsDb;

pub const WORKER_STOPPED_ANSWER: &str = "The chat session has ended. Restart it to ask more questions.";

enum Job {
    Query { text: String, sink: ReplySink },
    Stop,
}

/// Runs one [`ChatBot`] on a dedicated worker thread.
///
/// The database connection is opened on that thread and never leaves it, so
/// every tool call and every query is serialized through the job queue.
pub struct ChatService {
    jobs: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ChatService {
    /// Spawns the worker and waits until `open_db` has succeeded or failed
    /// there.
    pub async fn start<F>(
        open_db: F,
        client: Option<Arc<dyn CompletionClient>>,
        config: ChatConfig,
    ) -> Result<Self, AppError>
    where
        F: FnOnce() -> Result<GrampsDb, AppError> + Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), AppError>>();

        let worker = std::thread::Builder::new()
            .name("db-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AppError::Message(format!("Unable to start worker runtime: {e}"))));
                        return;
                    }
                };

                tracing::debug!("opening database on the worker thread");
                let bot = match open_db().and_then(|db| ChatBot::new(db, client, config)) {
                    Ok(bot) => bot,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                run_worker(&runtime, bot, job_rx);
            })
            .map_err(|e| AppError::Message(format!("Unable to spawn worker thread: {e}")))?;

        let mut service = Self {
            jobs: Some(job_tx),
            worker: Some(worker),
        };

        match ready_rx.await {
            Ok(Ok(())) => Ok(service),
            Ok(Err(e)) => {
                service.stop_worker();
                Err(e)
            }
            Err(_) => {
                service.stop_worker();
                Err(AppError::Message("Worker thread exited during startup".to_string()))
            }
        }
    }

    /// Queues `query` behind any earlier ones and returns its events.
    pub fn get_reply_stream(&self, query: &str) -> ReplyStream {
        let Some(jobs) = &self.jobs else {
            return ReplyStream::immediate(WORKER_STOPPED_ANSWER);
        };

        let (sink, stream) = reply_channel();
        let job = Job::Query {
            text: query.to_string(),
            sink,
        };
        if jobs.send(job).is_err() {
            tracing::warn!("worker is gone, query dropped");
            return ReplyStream::immediate(WORKER_STOPPED_ANSWER);
        }
        stream
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Lets queued queries finish, then joins the worker.
    pub fn stop_worker(&mut self) {
        if let Some(jobs) = self.jobs.take() {
            let _ = jobs.send(Job::Stop);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for ChatService {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

// Runs outside `block_on`, so blocking on the queue is allowed here.
fn run_worker(runtime: &tokio::runtime::Runtime, mut bot: ChatBot, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.blocking_recv() {
        match job {
            Job::Query { text, sink } => {
                let outcome = runtime.block_on(bot.reply(&text, &mut |event| {
                    sink.send(event);
                }));
                drop(sink);
                if outcome == ReplyOutcome::Exit {
                    tracing::info!("exit requested, stopping worker");
                    break;
                }
            }
            Job::Stop => break,
        }
    }
    tracing::debug!("worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::event::ReplyEvent;
    use crate::seed::sample_database;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn open_failure_is_reported_at_startup() {
        let result = ChatService::start(
            || Err(AppError::Config("Unable to open database 'nowhere'".to_string())),
            None,
            ChatConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn exit_stops_the_worker() {
        let mut service = ChatService::start(sample_database, None, ChatConfig::default())
            .await
            .unwrap();

        let events: Vec<ReplyEvent> = service.get_reply_stream("exit").collect().await;
        assert_eq!(events.len(), 1);

        let events: Vec<ReplyEvent> = service.get_reply_stream("help").collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_final());

        service.stop_worker();
        assert!(!service.is_running());
        let events: Vec<ReplyEvent> = service.get_reply_stream("help").collect().await;
        assert_eq!(events, vec![ReplyEvent::Final(WORKER_STOPPED_ANSWER.to_string())]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queued_queries_finish_before_stop() {
        let mut service = ChatService::start(sample_database, None, ChatConfig::default())
            .await
            .unwrap();

        let first = service.get_reply_stream("help");
        let second = service.get_reply_stream("history");
        service.stop_worker();

        let first: Vec<ReplyEvent> = first.collect().await;
        let second: Vec<ReplyEvent> = second.collect().await;
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].payload(), WORKER_STOPPED_ANSWER);
        assert_ne!(second[0].payload(), WORKER_STOPPED_ANSWER);
    }
}
