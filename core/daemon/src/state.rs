//! Producer wiring and checkpoint bookkeeping owned by the daemon.
//!
//! The coordinator is the only owner of attribution state. This module only
//! routes IPC events to the right producer and keeps counters for health
//! reporting.

use attrib_core::config::AttribConfig;
use attrib_core::{
    ActivityInput, CheckpointKind, CheckpointObserver, CheckpointRecord, CommandObserver,
    CoordinatorHandle, FileChangeEvent, FileChangeKind, FileChangeObserver, SignalDetector,
};
use attrib_daemon_protocol::{EventEnvelope, EventType};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// How many recent event ids are remembered for duplicate detection.
const RECENT_EVENT_IDS: usize = 1024;

#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSnapshot {
    pub log_lines: u64,
    pub ai_signals: u64,
    pub file_changes: u64,
    pub commands: u64,
    pub commands_forwarded: u64,
    pub human_checkpoints: u64,
    pub ai_checkpoints: u64,
    pub failed_checkpoints: u64,
    pub duplicate_events: u64,
    pub last_checkpoint: Option<CheckpointRecord>,
}

#[derive(Default)]
pub struct CheckpointLedger {
    inner: Mutex<LedgerSnapshot>,
}

impl CheckpointLedger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn update<F: FnOnce(&mut LedgerSnapshot)>(&self, apply: F) {
        match self.inner.lock() {
            Ok(mut guard) => apply(&mut guard),
            Err(_) => tracing::warn!("Checkpoint ledger lock poisoned"),
        }
    }
}

/// Observer registered with the coordinator; feeds the shared ledger.
pub struct LedgerObserver(pub Arc<CheckpointLedger>);

impl CheckpointObserver for LedgerObserver {
    fn checkpoint_recorded(&self, record: &CheckpointRecord) {
        self.0.update(|snapshot| {
            match (record.kind, record.succeeded) {
                (_, false) => snapshot.failed_checkpoints += 1,
                (CheckpointKind::Human, true) => snapshot.human_checkpoints += 1,
                (CheckpointKind::Ai, true) => snapshot.ai_checkpoints += 1,
            }
            snapshot.last_checkpoint = Some(record.clone());
        });
    }
}

/// Bounded set of recently applied event ids. Clients retry with the same
/// id, so a retry after a lost response must not be applied twice.
#[derive(Default)]
struct RecentEventIds {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentEventIds {
    /// Records `event_id`; returns false when it was already seen.
    fn insert(&mut self, event_id: &str) -> bool {
        if self.seen.contains(event_id) {
            return false;
        }
        if self.order.len() >= RECENT_EVENT_IDS {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(event_id.to_string());
        self.seen.insert(event_id.to_string());
        true
    }
}

pub struct SharedState {
    detector: SignalDetector,
    files: FileChangeObserver,
    commands: CommandObserver,
    ledger: Arc<CheckpointLedger>,
    recent_ids: Mutex<RecentEventIds>,
}

impl SharedState {
    pub fn new(
        config: &AttribConfig,
        handle: CoordinatorHandle,
        ledger: Arc<CheckpointLedger>,
    ) -> Self {
        let input: Arc<dyn ActivityInput> = Arc::new(handle);
        Self {
            detector: SignalDetector::new(config.detector.clone(), Arc::clone(&input)),
            files: FileChangeObserver::new(Arc::clone(&input)),
            commands: CommandObserver::new(config.commands.clone(), input),
            ledger,
            recent_ids: Mutex::new(RecentEventIds::default()),
        }
    }

    /// Routes `event` to its producer. Returns false when the event id was
    /// already applied and the event was dropped.
    pub fn update_from_event(&self, event: &EventEnvelope) -> bool {
        let fresh = match self.recent_ids.lock() {
            Ok(mut recent) => recent.insert(&event.event_id),
            Err(_) => {
                tracing::warn!("Recent event id lock poisoned");
                true
            }
        };
        if !fresh {
            tracing::debug!(event_id = %event.event_id, "Duplicate event dropped");
            self.ledger.update(|snapshot| snapshot.duplicate_events += 1);
            return false;
        }

        match event.event_type {
            EventType::LogLine => {
                let line = event.line.as_deref().unwrap_or_default();
                let matched = self.detector.observe(line);
                self.ledger.update(|snapshot| {
                    snapshot.log_lines += 1;
                    if matched {
                        snapshot.ai_signals += 1;
                    }
                });
            }
            EventType::FileChange => {
                let Some(path) = event.path.as_deref() else {
                    return true;
                };
                let kind = event
                    .change_kind
                    .as_deref()
                    .and_then(FileChangeKind::parse)
                    .unwrap_or(FileChangeKind::Modify);
                self.files.observe(&FileChangeEvent::new(path, kind));
                self.ledger.update(|snapshot| snapshot.file_changes += 1);
            }
            EventType::CommandFinished => {
                let name = event.command_name.as_deref().unwrap_or_default();
                let frames = event.stack_frames.as_deref().unwrap_or_default();
                let forwarded = self.commands.observe(name, frames);
                self.ledger.update(|snapshot| {
                    snapshot.commands += 1;
                    if forwarded {
                        snapshot.commands_forwarded += 1;
                    }
                });
            }
        }
        true
    }

    pub fn ledger_snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }
}
