use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::{Feedback, Interaction, InteractionSink, Record};

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    pub enqueued: u64,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Non-blocking front of the recording pipeline. `record_*` never waits and
/// never fails the caller; a background task drains the bounded queue into
/// the sink.
pub struct InteractionRecorder {
    sender: Mutex<Option<mpsc::Sender<Record>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl InteractionRecorder {
    /// Spawns the worker; must be called within a tokio runtime.
    pub fn spawn(sink: Arc<dyn InteractionSink>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(drain(receiver, sink, Arc::clone(&counters)));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            counters,
        }
    }

    pub fn record_interaction(
        &self,
        session_id: impl Into<String>,
        user_message: impl Into<String>,
        bot_response: impl Into<String>,
    ) {
        self.enqueue(Record::Interaction(Interaction::new(
            session_id,
            user_message,
            bot_response,
        )));
    }

    pub fn record_feedback(
        &self,
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        rating: f64,
        comment: Option<String>,
    ) {
        self.enqueue(Record::Feedback(Feedback::new(
            session_id, message_id, rating, comment,
        )));
    }

    fn enqueue(&self, record: Record) {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(kind = record.kind(), "Recorder is shut down, dropping record");
            return;
        };

        match sender.try_send(record) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    kind = record.kind(),
                    session_id = record.session_id(),
                    "Recorder queue full, dropping record"
                );
            }
            Err(TrySendError::Closed(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind = record.kind(), "Recorder worker stopped, dropping record");
            }
        }
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Closes the queue and waits until every queued record has been handed
    /// to the sink. Later records are dropped.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(sender);

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(err) = worker.await {
                tracing::error!("Recorder worker panicked: {}", err);
            }
        }

        let stats = self.stats();
        tracing::info!(
            written = stats.written,
            failed = stats.failed,
            dropped = stats.dropped,
            "Recorder drained"
        );
    }
}

async fn drain(
    mut receiver: mpsc::Receiver<Record>,
    sink: Arc<dyn InteractionSink>,
    counters: Arc<Counters>,
) {
    while let Some(record) = receiver.recv().await {
        let result = match &record {
            Record::Interaction(interaction) => sink.write_interaction(interaction).await,
            Record::Feedback(feedback) => sink.write_feedback(feedback).await,
        };

        match result {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    kind = record.kind(),
                    session_id = record.session_id(),
                    error = %err,
                    "Failed to record"
                );
            }
        }
    }

    sink.close().await;
}
