/// Solve attempt records and the consecutive-timeout rule
use crate::state::page_state::ChallengeKind;
use std::fmt;

/// How a single solve attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    /// The answer was accepted
    Solved,

    /// An answer was produced and submitted, or rejected before submission
    Incorrect,

    /// The widget never exposed what the strategy was waiting for
    Timeout,

    /// A browser or inference call failed
    Error,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solved => "solved",
            Self::Incorrect => "incorrect",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ephemeral record of one solve attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeAttempt {
    pub kind: ChallengeKind,

    /// One-based index within the current episode
    pub index: u32,

    pub outcome: AttemptOutcome,

    /// Short human-readable reason for anything other than `Solved`
    pub detail: Option<String>,
}

impl ChallengeAttempt {
    pub fn new(kind: ChallengeKind, index: u32, outcome: AttemptOutcome) -> Self {
        Self {
            kind,
            index,
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_solved(&self) -> bool {
        self.outcome == AttemptOutcome::Solved
    }
}

/// Counts attempts within an episode and watches for runs of timeouts
///
/// A run of `timeout_limit` consecutive timeouts means the widget is not
/// really there, which is evidence of a block rather than a flaky challenge.
#[derive(Debug, Clone)]
pub struct AttemptTracker {
    max_attempts: u32,
    timeout_limit: u32,
    attempts: Vec<ChallengeAttempt>,
    consecutive_timeouts: u32,
}

impl AttemptTracker {
    pub fn new(max_attempts: u32, timeout_limit: u32) -> Self {
        Self {
            max_attempts,
            timeout_limit,
            attempts: Vec::new(),
            consecutive_timeouts: 0,
        }
    }

    /// Index the next attempt will carry
    pub fn next_index(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }

    /// Returns true while the attempt budget allows another attempt
    pub fn has_budget(&self) -> bool {
        (self.attempts.len() as u32) < self.max_attempts
    }

    pub fn record(&mut self, attempt: ChallengeAttempt) {
        if attempt.outcome == AttemptOutcome::Timeout {
            self.consecutive_timeouts += 1;
        } else {
            self.consecutive_timeouts = 0;
        }
        self.attempts.push(attempt);
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Returns true once the run of timeouts reaches the limit
    pub fn timeouts_exceeded(&self) -> bool {
        self.consecutive_timeouts >= self.timeout_limit
    }

    pub fn last(&self) -> Option<&ChallengeAttempt> {
        self.attempts.last()
    }

    pub fn attempts(&self) -> &[ChallengeAttempt] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<ChallengeAttempt> {
        self.attempts
    }
}
