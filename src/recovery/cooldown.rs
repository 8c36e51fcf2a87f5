use super::{RecoveryEvent, RecoveryObserver};
use crate::config::RecoveryConfig;
use crate::state::CooldownWindow;
use rand::Rng;
use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);

/// Draws and sits out randomized waits after an access restriction
#[derive(Debug, Clone)]
pub struct CooldownManager {
    min_minutes: u32,
    max_minutes: u32,
}

impl CooldownManager {
    /// Creates a manager for the closed band `[min_minutes, max_minutes]`
    pub fn new(min_minutes: u32, max_minutes: u32) -> Self {
        let (min_minutes, max_minutes) = if min_minutes <= max_minutes {
            (min_minutes, max_minutes)
        } else {
            (max_minutes, min_minutes)
        };
        Self {
            min_minutes,
            max_minutes,
        }
    }

    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self::new(config.cooldown_min_minutes, config.cooldown_max_minutes)
    }

    pub fn band(&self) -> (u32, u32) {
        (self.min_minutes, self.max_minutes)
    }

    /// Draws a window with a uniformly random whole number of minutes
    pub fn plan(&self, reason: &str) -> CooldownWindow {
        let minutes = rand::thread_rng().gen_range(self.min_minutes..=self.max_minutes);
        CooldownWindow::new(minutes, reason)
    }

    /// Plans a window and waits it out, reporting every minute
    ///
    /// # Arguments
    ///
    /// * `reason` - Why the wait is needed; carried on the window
    /// * `observer` - Receives `CooldownStarted`, one `CooldownProgress` per
    ///   minute and `CooldownFinished`
    ///
    /// # Returns
    ///
    /// The window that was waited out
    pub async fn wait_out(&self, reason: &str, observer: &dyn RecoveryObserver) -> CooldownWindow {
        let window = self.plan(reason);
        observer.on_event(&RecoveryEvent::CooldownStarted {
            window: window.clone(),
        });

        for remaining_minutes in (1..=window.minutes).rev() {
            observer.on_event(&RecoveryEvent::CooldownProgress { remaining_minutes });
            tokio::time::sleep(MINUTE).await;
        }

        observer.on_event(&RecoveryEvent::CooldownFinished {
            minutes: window.minutes,
        });
        window
    }
}
