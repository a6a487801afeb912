//! Serial worker that drives the [`Correlator`] and dispatches checkpoints.
//!
//! Producers hold a [`CoordinatorHandle`]. Its entry points stamp the arrival
//! instant and enqueue a message, so they never block the calling thread. A
//! single worker thread owns the correlator, the sink and the observers; the
//! pending human task lives only inside that thread, which makes
//! cancel-and-replace a plain field update.

use crate::config::TimingConfig;
use crate::correlator::{
    AiCheckpoint, Correlator, FileChangeDecision, HumanRequest, TimerOutcome,
};
use crate::error::{AttribError, Result};
use crate::sink::{CheckpointObserver, CheckpointSink};
use crate::types::{CheckpointKind, CheckpointRecord};
use chrono::Utc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const WORKER_THREAD_NAME: &str = "attrib-coordinator";

/// Entry points the producers call. Implementations must return promptly.
pub trait ActivityInput: Send + Sync {
    fn signal_ai_activity(&self);
    fn handle_file_change(&self, path: &str);
    fn request_human_checkpoint(&self);
}

enum Message {
    AiSignal { at: Instant },
    FileChange { path: String, at: Instant },
    HumanRequest { at: Instant },
    AiRequest { path: Option<String>, at: Instant },
    Flush { done: Sender<()>, at: Instant },
    Shutdown { at: Instant },
}

impl Message {
    fn arrived_at(&self) -> Instant {
        match self {
            Message::AiSignal { at }
            | Message::FileChange { at, .. }
            | Message::HumanRequest { at }
            | Message::AiRequest { at, .. }
            | Message::Flush { at, .. }
            | Message::Shutdown { at } => *at,
        }
    }
}

/// Cloneable, thread-safe front door to the coordinator worker.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: Sender<Message>,
}

impl CoordinatorHandle {
    pub fn signal_ai_activity(&self) {
        self.send(Message::AiSignal { at: Instant::now() });
    }

    pub fn handle_file_change(&self, path: impl Into<String>) {
        self.send(Message::FileChange {
            path: path.into(),
            at: Instant::now(),
        });
    }

    pub fn request_human_checkpoint(&self) {
        self.send(Message::HumanRequest { at: Instant::now() });
    }

    pub fn request_ai_checkpoint(&self, path: Option<String>) {
        self.send(Message::AiRequest {
            path,
            at: Instant::now(),
        });
    }

    /// Blocks until every message sent before this call has been processed.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        let (done, wait) = mpsc::channel();
        self.tx
            .send(Message::Flush {
                done,
                at: Instant::now(),
            })
            .map_err(|_| AttribError::WorkerStopped)?;
        wait.recv_timeout(timeout)
            .map_err(|_| AttribError::WorkerStopped)
    }

    fn send(&self, message: Message) {
        if self.tx.send(message).is_err() {
            debug!("Coordinator worker stopped; dropping event");
        }
    }
}

impl ActivityInput for CoordinatorHandle {
    fn signal_ai_activity(&self) {
        CoordinatorHandle::signal_ai_activity(self);
    }

    fn handle_file_change(&self, path: &str) {
        CoordinatorHandle::handle_file_change(self, path);
    }

    fn request_human_checkpoint(&self) {
        CoordinatorHandle::request_human_checkpoint(self);
    }
}

/// Owns the worker thread. Dropping it stops the worker.
pub struct Coordinator {
    handle: CoordinatorHandle,
    worker: Option<JoinHandle<()>>,
}

impl Coordinator {
    pub fn spawn(
        timing: TimingConfig,
        sink: Box<dyn CheckpointSink>,
        observers: Vec<Box<dyn CheckpointObserver>>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let worker = Worker {
            correlator: Correlator::new(timing),
            sink,
            observers,
            rx,
        };

        let join = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(|source| AttribError::Io {
                context: "spawning coordinator worker".to_string(),
                source,
            })?;

        info!(
            ai_signal_window_ms = timing.ai_signal_window_ms,
            ai_grace_period_ms = timing.ai_grace_period_ms,
            human_debounce_ms = timing.human_debounce_ms,
            "Coordinator started"
        );

        Ok(Self {
            handle: CoordinatorHandle { tx },
            worker: Some(join),
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// Stops the worker after it drains queued messages. A pending human
    /// task is discarded.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(join) = self.worker.take() {
            let _ = self.handle.tx.send(Message::Shutdown { at: Instant::now() });
            if join.join().is_err() {
                warn!("Coordinator worker panicked");
            }
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    correlator: Correlator,
    sink: Box<dyn CheckpointSink>,
    observers: Vec<Box<dyn CheckpointObserver>>,
    rx: Receiver<Message>,
}

impl Worker {
    fn run(mut self) {
        loop {
            let message = match self.correlator.next_deadline() {
                Some(deadline) => match self.next_before(deadline) {
                    Some(message) => message,
                    None => {
                        self.fire_due(Instant::now());
                        continue;
                    }
                },
                None => match self.rx.recv() {
                    Ok(message) => message,
                    Err(_) => break,
                },
            };

            if !self.handle(message) {
                break;
            }
        }

        if let Some(task) = self.correlator.cancel_pending() {
            debug!(
                pending_for_ms = task.scheduled_at.elapsed().as_millis() as u64,
                "Discarding pending human checkpoint on shutdown"
            );
        }
        debug!("Coordinator worker stopped");
    }

    /// Waits for the next message that arrived no later than `deadline`.
    /// Returns `None` when the deadline should fire first, so events queued
    /// behind a slow dispatch are still applied in arrival order.
    fn next_before(&mut self, deadline: Instant) -> Option<Message> {
        let now = Instant::now();
        if deadline <= now {
            return match self.rx.try_recv() {
                Ok(message) if message.arrived_at() <= deadline => Some(message),
                Ok(message) => {
                    self.fire_due(deadline);
                    Some(message)
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
            };
        }

        match self.rx.recv_timeout(deadline - now) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.fire_due(deadline);
                Some(Message::Shutdown { at: deadline })
            }
        }
    }

    fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::AiSignal { at } => {
                self.correlator.signal_ai_activity(at);
                info!("AI activity signal received");
            }
            Message::FileChange { path, at } => {
                match self.correlator.handle_file_change(&path, at) {
                    FileChangeDecision::Ai { delta, checkpoint } => {
                        info!(
                            path = %path,
                            delta_ms = delta.as_millis() as u64,
                            "Correlated file change to AI"
                        );
                        self.dispatch_ai(checkpoint);
                    }
                    FileChangeDecision::Human(request) => {
                        log_human_request(request, Some(&path));
                    }
                }
            }
            Message::HumanRequest { at } => {
                let request = self.correlator.request_human_checkpoint(at);
                log_human_request(request, None);
            }
            Message::AiRequest { path, .. } => {
                let checkpoint = self.correlator.request_ai_checkpoint(path);
                self.dispatch_ai(checkpoint);
            }
            Message::Flush { done, .. } => {
                let _ = done.send(());
            }
            Message::Shutdown { .. } => return false,
        }
        true
    }

    fn fire_due(&mut self, now: Instant) {
        match self.correlator.take_due(now) {
            Some(TimerOutcome::Fire) => self.dispatch_human(),
            Some(TimerOutcome::SuppressedByGrace { since_ai }) => {
                info!(
                    since_ai_ms = since_ai.as_millis() as u64,
                    "Pending human checkpoint dropped (grace period active)"
                );
            }
            None => {}
        }
    }

    fn dispatch_human(&mut self) {
        let result = self.sink.record_human();
        if let Err(err) = &result {
            warn!(error = %err, "Human checkpoint failed");
        } else {
            info!("Human checkpoint recorded");
        }
        self.notify(CheckpointKind::Human, None, result.is_ok());
    }

    fn dispatch_ai(&mut self, checkpoint: AiCheckpoint) {
        if let Some(task) = checkpoint.cancelled {
            info!(
                pending_for_ms = task.scheduled_at.elapsed().as_millis() as u64,
                "AI checkpoint cancelled pending human checkpoint"
            );
        }

        let result = self.sink.record_agent_edit(checkpoint.file_path.as_deref());
        self.correlator.complete_ai_checkpoint(Instant::now());

        match &result {
            Ok(()) => info!(path = ?checkpoint.file_path, "AI checkpoint recorded"),
            Err(err) => warn!(
                path = ?checkpoint.file_path,
                error = %err,
                "AI checkpoint failed"
            ),
        }
        self.notify(CheckpointKind::Ai, checkpoint.file_path, result.is_ok());
    }

    fn notify(&self, kind: CheckpointKind, file_path: Option<String>, succeeded: bool) {
        let record = CheckpointRecord {
            kind,
            file_path,
            fired_at: Utc::now(),
            succeeded,
        };
        for observer in &self.observers {
            observer.checkpoint_recorded(&record);
        }
    }
}

fn log_human_request(request: HumanRequest, path: Option<&str>) {
    match request {
        HumanRequest::SuppressedByGrace { since_ai } => info!(
            path = ?path,
            since_ai_ms = since_ai.as_millis() as u64,
            "Human checkpoint ignored (grace period active)"
        ),
        HumanRequest::Scheduled { replaced, .. } => debug!(
            path = ?path,
            replaced,
            "Human checkpoint scheduled"
        ),
    }
}
