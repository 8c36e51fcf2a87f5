//! Typed recovery events and their observers
//!
//! The recovery core reports what it is doing through `RecoveryEvent`s; the
//! default observer turns them into log lines.

use crate::state::{ChallengeAttempt, ChallengeKind, CooldownWindow, PageState};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Phases of the recovery state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryPhase {
    Detecting,
    Cooldown,
    Solving,
    Reclassifying,
    Resolved,
    Escalated,
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detecting => "detecting",
            Self::Cooldown => "cooldown",
            Self::Solving => "solving",
            Self::Reclassifying => "reclassifying",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        };
        write!(f, "{}", name)
    }
}

/// Something the recovery core did or observed
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    PhaseChanged { phase: RecoveryPhase },
    StateClassified { state: PageState, evidence: String },
    AttemptStarted { kind: ChallengeKind, index: u32, max_attempts: u32 },
    AttemptFinished { attempt: ChallengeAttempt },
    StrategySwitched { from: ChallengeKind, to: ChallengeKind },
    TimeoutLimitReached { consecutive: u32 },
    CooldownStarted { window: CooldownWindow },
    CooldownProgress { remaining_minutes: u32 },
    CooldownFinished { minutes: u32 },
    NavigationFailed { url: String, error: String },
    ManualWaitStarted { state: PageState },
    ManualWaitFinished { waited: Duration },
}

/// Receives recovery events
pub trait RecoveryObserver: Send + Sync {
    fn on_event(&self, event: &RecoveryEvent);
}

/// Logs every event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RecoveryObserver for TracingObserver {
    fn on_event(&self, event: &RecoveryEvent) {
        match event {
            RecoveryEvent::PhaseChanged { phase } => tracing::debug!("Recovery phase: {}", phase),
            RecoveryEvent::StateClassified { state, evidence } => {
                tracing::info!("Page classified as {} ({})", state, evidence)
            }
            RecoveryEvent::AttemptStarted {
                kind,
                index,
                max_attempts,
            } => tracing::info!("Challenge attempt {}/{} ({})", index, max_attempts, kind),
            RecoveryEvent::AttemptFinished { attempt } => match &attempt.detail {
                Some(detail) => tracing::info!(
                    "Attempt {} finished: {} ({})",
                    attempt.index,
                    attempt.outcome,
                    detail
                ),
                None => tracing::info!("Attempt {} finished: {}", attempt.index, attempt.outcome),
            },
            RecoveryEvent::StrategySwitched { from, to } => {
                tracing::info!("Challenge changed from {} to {}", from, to)
            }
            RecoveryEvent::TimeoutLimitReached { consecutive } => tracing::warn!(
                "{} consecutive widget timeouts, treating page as access restricted",
                consecutive
            ),
            RecoveryEvent::CooldownStarted { window } => tracing::warn!(
                "Access restricted ({}), cooling down for {} minutes until {}",
                window.reason,
                window.minutes,
                window.ends_at().format("%Y-%m-%d %H:%M:%S UTC")
            ),
            RecoveryEvent::CooldownProgress { remaining_minutes } => {
                tracing::info!("Cooldown: {} minute(s) remaining", remaining_minutes)
            }
            RecoveryEvent::CooldownFinished { minutes } => {
                tracing::info!("Cooldown of {} minutes complete, resuming", minutes)
            }
            RecoveryEvent::NavigationFailed { url, error } => {
                tracing::warn!("Navigation to {} failed during recovery: {}", url, error)
            }
            RecoveryEvent::ManualWaitStarted { state } => tracing::warn!(
                "Automatic recovery exhausted ({}), waiting for manual resolution",
                state
            ),
            RecoveryEvent::ManualWaitFinished { waited } => {
                tracing::info!("Page cleared after {}s of manual wait", waited.as_secs())
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecoveryEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecoveryEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Phases in the order they were entered
    pub fn phases(&self) -> Vec<RecoveryPhase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecoveryEvent::PhaseChanged { phase } => Some(phase),
                _ => None,
            })
            .collect()
    }
}

impl RecoveryObserver for RecordingObserver {
    fn on_event(&self, event: &RecoveryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}
