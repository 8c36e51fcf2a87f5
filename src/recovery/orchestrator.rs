use super::{CooldownManager, RecoveryEvent, RecoveryObserver, RecoveryPhase, TracingObserver};
use crate::browser::{poll_until, Locator, Page, WaitUntil};
use crate::classifier::PageStateClassifier;
use crate::config::Config;
use crate::solver::{ChallengeSolver, SolveOutcome};
use crate::state::PageState;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// What the caller should do after a recovery episode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The page is usable; re-issue the interrupted navigation
    Resolved,

    /// Automatic recovery is exhausted; a human has to clear the page
    NeedsManualAttention { state: PageState },

    /// A navigation or browser step failed; skip the current item
    Failed { reason: String },
}

/// Recovery knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct RecoverySettings {
    pub anchor_url: String,

    /// Element that must be on the anchor page before access counts as restored
    pub ready_selector: Option<String>,

    /// Cooldown windows per episode
    pub max_cooldowns: u32,

    pub manual_poll_interval: Duration,
    pub navigation_timeout: Duration,

    /// How long to look for the ready selector
    pub confirm_timeout: Duration,
}

impl RecoverySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            anchor_url: config.portal.anchor_url.clone(),
            ready_selector: config.portal.ready_selector.clone(),
            max_cooldowns: config.recovery.max_cooldowns,
            manual_poll_interval: config.recovery.manual_poll_interval(),
            navigation_timeout: config.browser.navigation_timeout(),
            confirm_timeout: config.browser.widget_timeout(),
        }
    }
}

/// Per-episode bookkeeping for the recovery loop
#[derive(Debug, Default)]
struct Episode {
    cooldowns: u32,
    visited_anchor: bool,
    unknown_retried: bool,
}

/// The interruption state machine
///
/// `Detecting → {Cooldown, Solving} → Reclassifying → {Resolved, Escalated}`,
/// run as a bounded loop: every pass consumes a cooldown, an anchor visit or
/// a solve episode, each of which is capped.
pub struct RecoveryOrchestrator {
    classifier: PageStateClassifier,
    solver: ChallengeSolver,
    cooldown: CooldownManager,
    settings: RecoverySettings,
    observer: Arc<dyn RecoveryObserver>,
}

impl RecoveryOrchestrator {
    pub fn new(solver: ChallengeSolver, cooldown: CooldownManager, settings: RecoverySettings) -> Self {
        Self {
            classifier: PageStateClassifier::new(),
            solver,
            cooldown,
            settings,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Builds an orchestrator with HTTP inference clients from the configuration
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self::new(
            ChallengeSolver::from_config(config)?,
            CooldownManager::from_config(&config.recovery),
            RecoverySettings::from_config(config),
        ))
    }

    pub fn with_observer(mut self, observer: Arc<dyn RecoveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn classifier(&self) -> &PageStateClassifier {
        &self.classifier
    }

    pub fn solver(&self) -> &ChallengeSolver {
        &self.solver
    }

    fn emit(&self, event: RecoveryEvent) {
        self.observer.on_event(&event);
    }

    fn enter(&self, phase: RecoveryPhase) {
        self.emit(RecoveryEvent::PhaseChanged { phase });
    }

    async fn classify(&self, page: &dyn Page) -> (PageState, String) {
        let found = self.classifier.classify_detailed(page).await;
        self.emit(RecoveryEvent::StateClassified {
            state: found.state,
            evidence: found.evidence.clone(),
        });
        (found.state, found.evidence)
    }

    /// Drives the page back to a usable state
    ///
    /// # Arguments
    ///
    /// * `page` - The interrupted page
    ///
    /// # Returns
    ///
    /// * `Resolved` - Control can return to the crawl
    /// * `NeedsManualAttention` - Attempt or cooldown budgets are exhausted
    /// * `Failed` - A navigation step failed; nothing is raised
    pub async fn recover(&self, page: &dyn Page) -> RecoveryOutcome {
        self.enter(RecoveryPhase::Detecting);
        let (mut state, mut evidence) = self.classify(page).await;
        let mut episode = Episode::default();

        loop {
            match state {
                PageState::Normal => {
                    self.enter(RecoveryPhase::Resolved);
                    return RecoveryOutcome::Resolved;
                }

                PageState::AccessRestricted => {
                    if episode.cooldowns >= self.settings.max_cooldowns {
                        return self.escalate(PageState::AccessRestricted);
                    }

                    self.enter(RecoveryPhase::Cooldown);
                    self.cooldown.wait_out(&evidence, self.observer.as_ref()).await;
                    episode.cooldowns += 1;

                    match self.reclassify_at_anchor(page, &mut episode).await {
                        Ok((next, why)) => {
                            state = next;
                            evidence = why;
                        }
                        Err(reason) => return self.fail(reason),
                    }
                }

                solvable if solvable.is_solvable() => {
                    if !episode.visited_anchor {
                        // the anchor is the safe place to solve; a challenge may not follow us there
                        match self.reclassify_at_anchor(page, &mut episode).await {
                            Ok((next, why)) => {
                                state = next;
                                evidence = why;
                            }
                            Err(reason) => return self.fail(reason),
                        }
                        continue;
                    }

                    self.enter(RecoveryPhase::Solving);
                    let report = self.solver.solve(page, solvable, self.observer.as_ref()).await;
                    match report.outcome {
                        SolveOutcome::Solved => {
                            self.enter(RecoveryPhase::Resolved);
                            return RecoveryOutcome::Resolved;
                        }
                        SolveOutcome::Restricted => {
                            state = PageState::AccessRestricted;
                            evidence = "restriction discovered while solving".to_string();
                        }
                        SolveOutcome::Failed | SolveOutcome::TimedOut => {
                            return self.escalate(solvable);
                        }
                    }
                }

                _ => {
                    if episode.unknown_retried {
                        return self.escalate(state);
                    }
                    episode.unknown_retried = true;

                    match self.reclassify_at_anchor(page, &mut episode).await {
                        Ok((next, why)) => {
                            state = next;
                            evidence = why;
                        }
                        Err(reason) => return self.fail(reason),
                    }
                }
            }
        }
    }

    /// Moves to the anchor page and classifies what it shows
    ///
    /// A `Normal` anchor page is only trusted when the ready selector, if
    /// configured, is present; otherwise it is reported as `Unknown`.
    async fn reclassify_at_anchor(
        &self,
        page: &dyn Page,
        episode: &mut Episode,
    ) -> Result<(PageState, String), String> {
        self.navigate_to_anchor(page).await?;
        episode.visited_anchor = true;

        self.enter(RecoveryPhase::Reclassifying);
        let (state, evidence) = self.classify(page).await;
        if !state.is_normal() {
            return Ok((state, evidence));
        }

        match &self.settings.ready_selector {
            Some(selector) => {
                if self.page_is_ready(page, selector).await {
                    Ok((PageState::Normal, format!("{} present", selector)))
                } else {
                    tracing::warn!(
                        "Anchor page shows no interruption but {} is missing",
                        selector
                    );
                    Ok((PageState::Unknown, format!("{} missing on anchor page", selector)))
                }
            }
            None => {
                if episode.cooldowns > 0 {
                    tracing::warn!(
                        "No interruption after cooldown; assuming access is restored without a ready selector"
                    );
                }
                Ok((PageState::Normal, evidence))
            }
        }
    }

    async fn navigate_to_anchor(&self, page: &dyn Page) -> Result<(), String> {
        let url = self.settings.anchor_url.as_str();
        tracing::info!("Navigating to anchor page {}", url);

        let result = tokio::time::timeout(
            self.settings.navigation_timeout,
            page.goto(url, WaitUntil::DomContentLoaded),
        )
        .await;

        let error = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.settings.navigation_timeout),
        };

        self.emit(RecoveryEvent::NavigationFailed {
            url: url.to_string(),
            error: error.clone(),
        });
        Err(format!("navigation to {} failed: {}", url, error))
    }

    async fn page_is_ready(&self, page: &dyn Page, selector: &str) -> bool {
        let locator = Locator::css(selector);
        let locator_ref = &locator;
        poll_until(
            self.settings.confirm_timeout,
            Duration::from_millis(500),
            move || async move { matches!(page.count(locator_ref).await, Ok(n) if n > 0).then_some(()) },
        )
        .await
        .is_found()
    }

    fn escalate(&self, state: PageState) -> RecoveryOutcome {
        self.enter(RecoveryPhase::Escalated);
        RecoveryOutcome::NeedsManualAttention { state }
    }

    fn fail(&self, reason: String) -> RecoveryOutcome {
        tracing::error!("Recovery failed: {}", reason);
        RecoveryOutcome::Failed { reason }
    }

    /// Blocks until the page classifies as `Normal`
    ///
    /// Polls every `manual-poll-seconds` with no upper bound; an unattended
    /// run keeps waiting until the condition clears or the operator stops it.
    ///
    /// # Returns
    ///
    /// How long the wait took
    pub async fn wait_for_manual_resolution(&self, page: &dyn Page, state: PageState) -> Duration {
        self.emit(RecoveryEvent::ManualWaitStarted { state });
        let started = Instant::now();

        loop {
            tokio::time::sleep(self.settings.manual_poll_interval).await;
            if self.classifier.classify(page).await.is_normal() {
                break;
            }
        }

        let waited = started.elapsed();
        self.emit(RecoveryEvent::ManualWaitFinished { waited });
        waited
    }

    /// Recovers the page, waiting for manual help if needed
    ///
    /// # Returns
    ///
    /// `true` if the caller can re-issue its navigation, `false` if recovery
    /// failed and the current item should be skipped
    pub async fn handle_interruption(&self, page: &dyn Page) -> bool {
        match self.recover(page).await {
            RecoveryOutcome::Resolved => true,
            RecoveryOutcome::NeedsManualAttention { state } => {
                self.wait_for_manual_resolution(page, state).await;
                true
            }
            RecoveryOutcome::Failed { reason } => {
                tracing::warn!("Interruption not resolved: {}", reason);
                false
            }
        }
    }
}
