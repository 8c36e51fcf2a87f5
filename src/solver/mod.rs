//! Challenge solving
//!
//! `ChallengeSolver` drives one of two strategies against a solvable page:
//!
//! - Text: screenshot the distorted image, ask a vision model for the characters
//! - Audio: switch the provider widget to audio, fetch the clip with the browser
//!   session, transcribe it and type the six digits
//!
//! After every unsuccessful attempt the page is classified again so a block
//! discovered mid-solve ends the episode immediately.

mod audio;
mod session;
mod text;

pub use audio::{extract_digits, REQUIRED_DIGITS};
pub use session::{MediaFetcher, SessionContext, SessionFetcher};
pub use text::{sanitize_text_answer, TEXT_INSTRUCTION};

use crate::browser::{BrowserError, BrowserResult, ClickMode, Frame, Locator, Page};
use crate::classifier::PageStateClassifier;
use crate::config::Config;
use crate::inference::{ImageToText, InferenceError, SpeechClient, SpeechToText, VisionClient};
use crate::recovery::{RecoveryEvent, RecoveryObserver};
use crate::state::{AttemptOutcome, AttemptTracker, ChallengeAttempt, ChallengeKind, PageState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised inside a solve attempt
///
/// These never escape `solve`; they become `AttemptOutcome::Error`.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Media fetch failed: {0}")]
    Media(String),

    #[error("No solver strategy for page state {0}")]
    Unsolvable(PageState),
}

/// Result type alias for solver operations
pub type SolverResult<T> = std::result::Result<T, SolverError>;

/// How a solve episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// The page is back to normal
    Solved,

    /// The attempt budget ran out on wrong answers or errors
    Failed,

    /// The attempt budget ran out and the last attempt timed out
    TimedOut,

    /// The page turned out to be an access restriction
    Restricted,
}

/// Outcome of a solve episode with every attempt made
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub outcome: SolveOutcome,
    pub attempts: Vec<ChallengeAttempt>,
}

/// Timing and budget knobs for the solver
#[derive(Debug, Clone)]
pub struct SolverSettings {
    pub max_attempts: u32,
    pub timeout_limit: u32,

    /// Bound on waiting for any single widget element
    pub widget_timeout: Duration,

    pub poll_interval: Duration,

    /// Pause after a submit before the page is judged
    pub submit_settle: Duration,

    /// Pause after reloading a challenge
    pub retry_settle: Duration,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            timeout_limit: 5,
            widget_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            submit_settle: Duration::from_secs(3),
            retry_settle: Duration::from_secs(2),
        }
    }
}

impl SolverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.recovery.max_challenge_attempts,
            timeout_limit: config.recovery.consecutive_timeout_limit,
            widget_timeout: config.browser.widget_timeout(),
            ..Self::default()
        }
    }
}

/// What a strategy concluded about one attempt
#[derive(Debug)]
struct Verdict {
    outcome: AttemptOutcome,
    detail: Option<String>,
}

impl Verdict {
    fn solved() -> Self {
        Self {
            outcome: AttemptOutcome::Solved,
            detail: None,
        }
    }

    fn incorrect(detail: impl Into<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Incorrect,
            detail: Some(detail.into()),
        }
    }

    fn timeout(detail: impl Into<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Timeout,
            detail: Some(detail.into()),
        }
    }
}

/// Solves text and audio challenges
pub struct ChallengeSolver {
    classifier: PageStateClassifier,
    vision: Arc<dyn ImageToText>,
    speech: Arc<dyn SpeechToText>,
    media: Arc<dyn MediaFetcher>,
    settings: SolverSettings,
}

impl ChallengeSolver {
    pub fn new(
        vision: Arc<dyn ImageToText>,
        speech: Arc<dyn SpeechToText>,
        media: Arc<dyn MediaFetcher>,
        settings: SolverSettings,
    ) -> Self {
        Self {
            classifier: PageStateClassifier::new(),
            vision,
            speech,
            media,
            settings,
        }
    }

    /// Builds a solver with the HTTP inference clients named in the configuration
    pub fn from_config(config: &Config) -> SolverResult<Self> {
        let vision = VisionClient::from_config(&config.inference)?;
        let speech = SpeechClient::from_config(&config.inference)?;
        let media = SessionFetcher::new(config.inference.request_timeout())?;
        Ok(Self::new(
            Arc::new(vision),
            Arc::new(speech),
            Arc::new(media),
            SolverSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Session-carrying fetcher, shared with downloads outside challenges
    pub fn media(&self) -> Arc<dyn MediaFetcher> {
        self.media.clone()
    }

    /// Runs a single attempt against the challenge currently shown
    ///
    /// # Arguments
    ///
    /// * `page` - The page showing the challenge
    /// * `state` - The classified state; must be solvable
    /// * `index` - One-based attempt index recorded on the result
    ///
    /// # Returns
    ///
    /// * `Ok(ChallengeAttempt)` - The attempt record; failures inside the attempt
    ///   are folded into its outcome
    /// * `Err(SolverError::Unsolvable)` - `state` has no strategy
    pub async fn attempt(
        &self,
        page: &dyn Page,
        state: PageState,
        index: u32,
    ) -> SolverResult<ChallengeAttempt> {
        let kind = state
            .challenge_kind()
            .ok_or(SolverError::Unsolvable(state))?;
        Ok(self.run_attempt(page, kind, index).await)
    }

    async fn run_attempt(&self, page: &dyn Page, kind: ChallengeKind, index: u32) -> ChallengeAttempt {
        let result = match kind {
            ChallengeKind::Text => self.attempt_text(page).await,
            ChallengeKind::Audio(_) => self.attempt_audio(page).await,
        };

        match result {
            Ok(verdict) => {
                let attempt = ChallengeAttempt::new(kind, index, verdict.outcome);
                match verdict.detail {
                    Some(detail) => attempt.with_detail(detail),
                    None => attempt,
                }
            }
            Err(e) => ChallengeAttempt::new(kind, index, AttemptOutcome::Error).with_detail(e.to_string()),
        }
    }

    /// Solves the challenge within the attempt budget
    ///
    /// # Arguments
    ///
    /// * `page` - The page showing the challenge
    /// * `state` - The state the page was classified as
    /// * `observer` - Receives attempt events
    ///
    /// # Returns
    ///
    /// A report whose outcome is `Restricted` as soon as the page shows an
    /// access restriction or the run of consecutive timeouts reaches the limit
    pub async fn solve(
        &self,
        page: &dyn Page,
        state: PageState,
        observer: &dyn RecoveryObserver,
    ) -> SolveReport {
        let Some(mut kind) = state.challenge_kind() else {
            let outcome = if state.is_restricted() {
                SolveOutcome::Restricted
            } else {
                SolveOutcome::Failed
            };
            return SolveReport {
                outcome,
                attempts: Vec::new(),
            };
        };

        let mut tracker = AttemptTracker::new(self.settings.max_attempts, self.settings.timeout_limit);

        while tracker.has_budget() {
            let index = tracker.next_index();
            observer.on_event(&RecoveryEvent::AttemptStarted {
                kind,
                index,
                max_attempts: self.settings.max_attempts,
            });

            let attempt = self.run_attempt(page, kind, index).await;
            observer.on_event(&RecoveryEvent::AttemptFinished {
                attempt: attempt.clone(),
            });

            let solved = attempt.is_solved();
            tracker.record(attempt);
            if solved {
                return report(SolveOutcome::Solved, tracker);
            }

            let current = self.classifier.classify(page).await;
            match current {
                PageState::Normal => return report(SolveOutcome::Solved, tracker),
                PageState::AccessRestricted => return report(SolveOutcome::Restricted, tracker),
                other => {
                    if let Some(next) = other.challenge_kind() {
                        if next != kind {
                            observer.on_event(&RecoveryEvent::StrategySwitched { from: kind, to: next });
                            kind = next;
                        }
                    }
                }
            }

            if tracker.timeouts_exceeded() {
                observer.on_event(&RecoveryEvent::TimeoutLimitReached {
                    consecutive: tracker.consecutive_timeouts(),
                });
                return report(SolveOutcome::Restricted, tracker);
            }

            if tracker.has_budget() {
                self.prepare_retry(page, kind).await;
            }
        }

        let outcome = match tracker.last() {
            Some(last) if last.outcome == AttemptOutcome::Timeout => SolveOutcome::TimedOut,
            _ => SolveOutcome::Failed,
        };
        report(outcome, tracker)
    }

    /// Gets a fresh challenge before the next attempt
    async fn prepare_retry(&self, page: &dyn Page, kind: ChallengeKind) {
        let result = match kind {
            ChallengeKind::Text => page.reload().await,
            ChallengeKind::Audio(_) => self.reload_audio_widget(page).await,
        };
        if let Err(e) = result {
            tracing::debug!("Refreshing {} challenge failed: {}", kind, e);
        }
        tokio::time::sleep(self.settings.retry_settle).await;
    }

    /// Waits for the page to react to a submission and judges it
    async fn judge_submission(&self, page: &dyn Page) -> Verdict {
        tokio::time::sleep(self.settings.submit_settle).await;
        match self.classifier.classify(page).await {
            PageState::Normal => Verdict::solved(),
            state => Verdict::incorrect(format!("page still shows {}", state)),
        }
    }
}

fn report(outcome: SolveOutcome, tracker: AttemptTracker) -> SolveReport {
    SolveReport {
        outcome,
        attempts: tracker.into_attempts(),
    }
}

/// Clicks normally, then forces the click if anything but a missing element got in the way
pub(crate) async fn click_with_fallback<F: Frame + ?Sized>(
    frame: &F,
    locator: &Locator,
) -> BrowserResult<()> {
    match frame.click(locator, ClickMode::Normal).await {
        Ok(()) => Ok(()),
        Err(BrowserError::ElementNotFound(target)) => Err(BrowserError::ElementNotFound(target)),
        Err(e) => {
            tracing::debug!("Normal click on {} failed ({}), forcing", locator, e);
            frame.click(locator, ClickMode::Forced).await
        }
    }
}
