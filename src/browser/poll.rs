use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Outcome of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult<T> {
    Found(T),
    TimedOut,
}

impl<T> PollResult<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::TimedOut => None,
        }
    }
}

/// Calls `check` until it yields a value or `timeout` elapses
///
/// The check always runs at least once. Between checks the task sleeps for
/// `interval`, clipped so the last check happens at the deadline.
///
/// # Arguments
///
/// * `timeout` - Total time budget for the poll
/// * `interval` - Pause between checks
/// * `check` - Returns `Some` once the awaited condition holds
///
/// # Returns
///
/// `PollResult::Found` with the check's value, or `PollResult::TimedOut`
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> PollResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(value) = check().await {
            return PollResult::Found(value);
        }

        let now = Instant::now();
        if now >= deadline {
            return PollResult::TimedOut;
        }

        sleep(interval.min(deadline - now)).await;
    }
}
