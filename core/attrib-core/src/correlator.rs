//! Pure attribution state machine.
//!
//! The correlator owns the entire engine state (last AI signal, last AI
//! checkpoint, pending human task) and makes every timing decision. It never
//! reads a clock: callers pass the instant each operation is evaluated at,
//! which keeps the rules deterministic and testable.
//!
//! ```text
//! Idle ──human event──▶ PendingHuman ──debounce elapsed──▶ Idle (human fired)
//!   ▲                        │ └──newer human event──▶ PendingHuman (fire_at pushed out)
//!   │                        └──AI event──▶ Idle (pending cancelled)
//!   └──correlated AI event──▶ dispatch AI checkpoint ──▶ Idle
//! ```

use crate::config::TimingConfig;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingHumanTask {
    pub scheduled_at: Instant,
    pub fire_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Change arrived `delta` after the last AI signal, inside the window.
    Ai { delta: Duration },
    Human,
}

/// Outcome of a human checkpoint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanRequest {
    /// Dropped because an AI checkpoint completed `since_ai` ago.
    SuppressedByGrace { since_ai: Duration },
    /// A task is pending; `replaced` is true when it superseded an older one.
    Scheduled { fire_at: Instant, replaced: bool },
}

/// An AI checkpoint that must be dispatched now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiCheckpoint {
    pub file_path: Option<String>,
    /// The pending human task this request cancelled, if any.
    pub cancelled: Option<PendingHumanTask>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChangeDecision {
    Ai {
        delta: Duration,
        checkpoint: AiCheckpoint,
    },
    Human(HumanRequest),
}

/// Outcome of a pending human task reaching its fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Fire,
    SuppressedByGrace { since_ai: Duration },
}

#[derive(Debug, Clone)]
pub struct Correlator {
    timing: TimingConfig,
    last_ai_signal_at: Option<Instant>,
    last_ai_checkpoint_at: Option<Instant>,
    pending_human: Option<PendingHumanTask>,
}

impl Correlator {
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            timing,
            last_ai_signal_at: None,
            last_ai_checkpoint_at: None,
            pending_human: None,
        }
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn last_ai_signal_at(&self) -> Option<Instant> {
        self.last_ai_signal_at
    }

    pub fn last_ai_checkpoint_at(&self) -> Option<Instant> {
        self.last_ai_checkpoint_at
    }

    pub fn pending_human(&self) -> Option<PendingHumanTask> {
        self.pending_human
    }

    pub fn signal_ai_activity(&mut self, now: Instant) {
        self.last_ai_signal_at = Some(now);
    }

    /// Strict threshold: a change exactly `ai_signal_window` after the signal
    /// is human.
    pub fn classify(&self, now: Instant) -> Classification {
        match self.last_ai_signal_at {
            Some(signal_at) => {
                let delta = now.saturating_duration_since(signal_at);
                if delta < self.timing.ai_signal_window() {
                    Classification::Ai { delta }
                } else {
                    Classification::Human
                }
            }
            None => Classification::Human,
        }
    }

    pub fn handle_file_change(&mut self, path: &str, now: Instant) -> FileChangeDecision {
        match self.classify(now) {
            Classification::Ai { delta } => FileChangeDecision::Ai {
                delta,
                checkpoint: self.request_ai_checkpoint(Some(path.to_string())),
            },
            Classification::Human => FileChangeDecision::Human(self.request_human_checkpoint(now)),
        }
    }

    pub fn request_human_checkpoint(&mut self, now: Instant) -> HumanRequest {
        if let Some(since_ai) = self.grace_remaining(now) {
            return HumanRequest::SuppressedByGrace { since_ai };
        }

        let replaced = self.pending_human.is_some();
        let fire_at = now + self.timing.human_debounce();
        self.pending_human = Some(PendingHumanTask {
            scheduled_at: now,
            fire_at,
        });
        HumanRequest::Scheduled { fire_at, replaced }
    }

    /// Cancels any pending human task before the AI dispatch is handed out.
    pub fn request_ai_checkpoint(&mut self, file_path: Option<String>) -> AiCheckpoint {
        AiCheckpoint {
            file_path,
            cancelled: self.pending_human.take(),
        }
    }

    /// Must be called once the AI dispatch has returned, successful or not.
    pub fn complete_ai_checkpoint(&mut self, now: Instant) {
        self.last_ai_checkpoint_at = Some(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_human.map(|task| task.fire_at)
    }

    /// Takes the pending task if it is due at `now`, re-checking the grace
    /// period that may have started after the task was scheduled.
    pub fn take_due(&mut self, now: Instant) -> Option<TimerOutcome> {
        let task = self.pending_human?;
        if task.fire_at > now {
            return None;
        }
        self.pending_human = None;

        match self.grace_remaining(now) {
            Some(since_ai) => Some(TimerOutcome::SuppressedByGrace { since_ai }),
            None => Some(TimerOutcome::Fire),
        }
    }

    pub fn cancel_pending(&mut self) -> Option<PendingHumanTask> {
        self.pending_human.take()
    }

    /// Returns the time since the last AI checkpoint while still inside the
    /// grace period.
    fn grace_remaining(&self, now: Instant) -> Option<Duration> {
        let completed_at = self.last_ai_checkpoint_at?;
        let since_ai = now.saturating_duration_since(completed_at);
        (since_ai < self.timing.ai_grace_period()).then_some(since_ai)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn correlator() -> Correlator {
        Correlator::new(TimingConfig::default())
    }

    #[test]
    fn signal_then_change_inside_window_is_ai() {
        let t0 = Instant::now();
        let mut c = correlator();
        c.signal_ai_activity(t0);

        let decision = c.handle_file_change("/repo/a.txt", t0 + ms(500));
        assert_eq!(
            decision,
            FileChangeDecision::Ai {
                delta: ms(500),
                checkpoint: AiCheckpoint {
                    file_path: Some("/repo/a.txt".to_string()),
                    cancelled: None,
                },
            }
        );
        assert!(c.pending_human().is_none());
    }

    #[test]
    fn change_without_signal_is_human() {
        let t0 = Instant::now();
        let mut c = correlator();

        let decision = c.handle_file_change("/repo/b.txt", t0);
        assert_eq!(
            decision,
            FileChangeDecision::Human(HumanRequest::Scheduled {
                fire_at: t0 + ms(1500),
                replaced: false,
            })
        );
    }

    #[test]
    fn change_exactly_at_window_boundary_is_human() {
        let t0 = Instant::now();
        let mut c = correlator();
        c.signal_ai_activity(t0);

        assert_eq!(c.classify(t0 + ms(1999)), Classification::Ai { delta: ms(1999) });
        assert_eq!(c.classify(t0 + ms(2000)), Classification::Human);
        assert_eq!(c.classify(t0 + ms(2500)), Classification::Human);
    }

    #[test]
    fn change_reported_before_signal_is_ai() {
        let t0 = Instant::now();
        let mut c = correlator();
        c.signal_ai_activity(t0 + ms(100));

        assert_eq!(c.classify(t0), Classification::Ai { delta: ms(0) });
    }

    #[test]
    fn human_burst_coalesces_into_one_task() {
        let t0 = Instant::now();
        let mut c = correlator();

        for step in 0..5u64 {
            let at = t0 + ms(step * 400);
            let outcome = c.request_human_checkpoint(at);
            assert_eq!(
                outcome,
                HumanRequest::Scheduled {
                    fire_at: at + ms(1500),
                    replaced: step > 0,
                }
            );
        }

        let last = t0 + ms(1600);
        assert_eq!(c.next_deadline(), Some(last + ms(1500)));
        assert_eq!(c.take_due(last + ms(1499)), None);
        assert_eq!(c.take_due(last + ms(1500)), Some(TimerOutcome::Fire));
        assert_eq!(c.take_due(last + ms(5000)), None);
    }

    #[test]
    fn scenario_b_second_change_reschedules() {
        let t0 = Instant::now();
        let mut c = correlator();

        c.handle_file_change("/repo/b.txt", t0);
        let decision = c.handle_file_change("/repo/c.txt", t0 + ms(800));
        assert_eq!(
            decision,
            FileChangeDecision::Human(HumanRequest::Scheduled {
                fire_at: t0 + ms(2300),
                replaced: true,
            })
        );

        assert_eq!(c.take_due(t0 + ms(1500)), None);
        assert_eq!(c.take_due(t0 + ms(2300)), Some(TimerOutcome::Fire));
        assert!(c.pending_human().is_none());
    }

    #[test]
    fn scenario_c_human_inside_grace_is_dropped() {
        let t0 = Instant::now();
        let mut c = correlator();
        c.complete_ai_checkpoint(t0);

        let outcome = c.request_human_checkpoint(t0 + ms(3000));
        assert_eq!(
            outcome,
            HumanRequest::SuppressedByGrace { since_ai: ms(3000) }
        );
        assert!(c.pending_human().is_none());
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn human_after_grace_is_scheduled() {
        let t0 = Instant::now();
        let mut c = correlator();
        c.complete_ai_checkpoint(t0);

        let outcome = c.request_human_checkpoint(t0 + ms(5000));
        assert!(matches!(outcome, HumanRequest::Scheduled { .. }));
    }

    #[test]
    fn scenario_d_ai_event_preempts_pending_human() {
        let t0 = Instant::now();
        let mut c = correlator();
        c.request_human_checkpoint(t0);

        c.signal_ai_activity(t0 + ms(1000));
        let decision = c.handle_file_change("/repo/d.txt", t0 + ms(1000));
        match decision {
            FileChangeDecision::Ai { checkpoint, .. } => {
                assert_eq!(checkpoint.file_path.as_deref(), Some("/repo/d.txt"));
                assert_eq!(
                    checkpoint.cancelled,
                    Some(PendingHumanTask {
                        scheduled_at: t0,
                        fire_at: t0 + ms(1500),
                    })
                );
            }
            other => panic!("expected AI decision, got {:?}", other),
        }

        c.complete_ai_checkpoint(t0 + ms(1050));
        assert_eq!(c.take_due(t0 + ms(1500)), None);
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn fire_time_recheck_honours_grace_started_after_scheduling() {
        let t0 = Instant::now();
        let mut c = correlator();

        // Human request accepted while an AI dispatch is still in flight.
        let _ = c.request_ai_checkpoint(None);
        let outcome = c.request_human_checkpoint(t0);
        assert!(matches!(outcome, HumanRequest::Scheduled { .. }));
        c.complete_ai_checkpoint(t0 + ms(200));

        assert_eq!(
            c.take_due(t0 + ms(1500)),
            Some(TimerOutcome::SuppressedByGrace { since_ai: ms(1300) })
        );
        assert!(c.pending_human().is_none());
    }

    #[test]
    fn human_arriving_during_ai_dispatch_is_dropped() {
        let t0 = Instant::now();
        let mut c = correlator();
        c.complete_ai_checkpoint(t0 + ms(300));

        // Arrival stamped before completion still sits inside the grace window.
        assert_eq!(
            c.request_human_checkpoint(t0),
            HumanRequest::SuppressedByGrace { since_ai: ms(0) }
        );
    }

    #[test]
    fn ai_checkpoints_are_never_debounced() {
        let mut c = correlator();
        let first = c.request_ai_checkpoint(Some("/repo/a.txt".to_string()));
        let second = c.request_ai_checkpoint(Some("/repo/a.txt".to_string()));
        assert_eq!(first.file_path, second.file_path);
        assert!(first.cancelled.is_none());
        assert!(second.cancelled.is_none());
    }

    #[test]
    fn cancel_pending_clears_slot() {
        let t0 = Instant::now();
        let mut c = correlator();
        c.request_human_checkpoint(t0);
        assert!(c.cancel_pending().is_some());
        assert!(c.cancel_pending().is_none());
    }
}
