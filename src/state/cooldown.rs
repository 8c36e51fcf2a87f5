use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// A bounded wait imposed after an access restriction is confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownWindow {
    pub started_at: DateTime<Utc>,
    pub minutes: u32,
    pub reason: String,
}

impl CooldownWindow {
    pub fn new(minutes: u32, reason: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            minutes,
            reason: reason.into(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.minutes) * 60)
    }

    /// Wall-clock time at which the window elapses
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.started_at + ChronoDuration::minutes(i64::from(self.minutes))
    }
}
