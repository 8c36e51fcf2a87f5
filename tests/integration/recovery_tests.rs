//! Recovery scenarios end to end

use crate::common::*;
use lex_harvest::browser::{Locator, MemoryPage};
use lex_harvest::config::load_config;
use lex_harvest::recovery::{RecoveryEvent, RecoveryOutcome, RecoveryPhase};
use lex_harvest::solver::SolverSettings;
use lex_harvest::state::{ChallengeVariant, PageState};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn cooldowns(events: &[RecoveryEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            RecoveryEvent::CooldownStarted { window } => Some(window.minutes),
            _ => None,
        })
        .collect()
}

fn attempts_started(events: &[RecoveryEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, RecoveryEvent::AttemptStarted { .. }))
        .count()
}

/// Serves the challenge frame on the first anchor visit and the healthy page afterwards
fn challenge_then_healthy_anchor(page: &MemoryPage, frame_html: &'static str) -> Arc<AtomicUsize> {
    let visits = Arc::new(AtomicUsize::new(0));
    let counter = visits.clone();
    page.on_goto(ANCHOR_URL, move |scene| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            scene.set_main_html("<html><body></body></html>");
            scene.add_frame("", CAPTCHA_FRAME_URL, frame_html);
        } else {
            scene.set_main_html(ANCHOR_HTML);
        }
    });
    visits
}

#[tokio::test(start_paused = true)]
async fn test_restriction_cools_down_then_resolves() {
    let page = MemoryPage::new(DOCUMENT_URL, RESTRICTED_HTML);
    page.route(ANCHOR_URL, ANCHOR_HTML);
    let (orchestrator, observer) = orchestrator(solver("", 3, 5), recovery_settings(Some(READY_SELECTOR), 2));

    let outcome = orchestrator.recover(&page).await;

    assert_eq!(outcome, RecoveryOutcome::Resolved);
    assert_eq!(
        observer.phases(),
        vec![
            RecoveryPhase::Detecting,
            RecoveryPhase::Cooldown,
            RecoveryPhase::Reclassifying,
            RecoveryPhase::Resolved,
        ]
    );

    let events = observer.events();
    let minutes = cooldowns(&events);
    assert_eq!(minutes.len(), 1);
    assert!((10..=20).contains(&minutes[0]));

    let progress = events
        .iter()
        .filter(|e| matches!(e, RecoveryEvent::CooldownProgress { .. }))
        .count();
    assert_eq!(progress as u32, minutes[0]);
    assert_eq!(attempts_started(&events), 0);
    assert_eq!(page.navigations(), vec![ANCHOR_URL.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_restriction_escalates_after_max_cooldowns() {
    let page = MemoryPage::new(DOCUMENT_URL, RESTRICTED_HTML);
    page.route(ANCHOR_URL, RESTRICTED_HTML);
    let (orchestrator, observer) = orchestrator(solver("", 3, 5), recovery_settings(None, 2));

    let outcome = orchestrator.recover(&page).await;

    assert_eq!(
        outcome,
        RecoveryOutcome::NeedsManualAttention {
            state: PageState::AccessRestricted
        }
    );
    assert_eq!(cooldowns(&observer.events()).len(), 2);
    assert_eq!(observer.phases().last(), Some(&RecoveryPhase::Escalated));
}

#[tokio::test(start_paused = true)]
async fn test_five_audio_timeouts_turn_into_a_cooldown() {
    let page = MemoryPage::new(DOCUMENT_URL, "<html><body></body></html>");
    page.with_scene(|scene| {
        scene.add_frame("", CAPTCHA_FRAME_URL, SILENT_AUDIO_WIDGET);
    });
    challenge_then_healthy_anchor(&page, SILENT_AUDIO_WIDGET);

    // the provider hard-blocks after the fifth request for audio
    let toggles = Arc::new(AtomicUsize::new(0));
    let counter = toggles.clone();
    page.on_click(Locator::css(TOGGLE), move |scene| {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
            scene.set_main_html(RESTRICTED_HTML);
        }
    });

    let (orchestrator, observer) = orchestrator(solver("", 10, 5), recovery_settings(Some(READY_SELECTOR), 2));
    let outcome = orchestrator.recover(&page).await;

    assert_eq!(outcome, RecoveryOutcome::Resolved);
    assert_eq!(toggles.load(Ordering::SeqCst), 5);

    let events = observer.events();
    assert_eq!(attempts_started(&events), 5);
    assert_eq!(cooldowns(&events).len(), 1);

    let phases = observer.phases();
    let solving = phases.iter().position(|p| *p == RecoveryPhase::Solving);
    let cooling = phases.iter().position(|p| *p == RecoveryPhase::Cooldown);
    assert!(solving.is_some() && cooling.is_some());
    assert!(solving < cooling);
}

#[tokio::test(start_paused = true)]
async fn test_default_configuration_detects_timeout_block() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(MINIMAL_CONFIG.as_bytes()).unwrap();
    let config = load_config(file.path()).unwrap();
    let settings = SolverSettings::from_config(&config);
    assert!(settings.max_attempts >= settings.timeout_limit);

    let page = MemoryPage::new(DOCUMENT_URL, "<html><body></body></html>");
    page.with_scene(|scene| {
        scene.add_frame("", CAPTCHA_FRAME_URL, SILENT_AUDIO_WIDGET);
    });
    challenge_then_healthy_anchor(&page, SILENT_AUDIO_WIDGET);

    let (orchestrator, observer) =
        orchestrator(solver_with("", settings), recovery_settings(Some(READY_SELECTOR), 2));
    let outcome = orchestrator.recover(&page).await;

    assert_eq!(outcome, RecoveryOutcome::Resolved);

    let events = observer.events();
    assert!(events.iter().any(|e| matches!(
        e,
        RecoveryEvent::TimeoutLimitReached {
            consecutive
        } if *consecutive == config.recovery.consecutive_timeout_limit
    )));
    assert_eq!(attempts_started(&events), config.recovery.consecutive_timeout_limit as usize);
    assert_eq!(cooldowns(&events).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_timeouts_alone_presume_restriction() {
    let page = MemoryPage::new(DOCUMENT_URL, "<html><body></body></html>");
    page.with_scene(|scene| {
        scene.add_frame("", CAPTCHA_FRAME_URL, SILENT_AUDIO_WIDGET);
    });
    challenge_then_healthy_anchor(&page, SILENT_AUDIO_WIDGET);

    let (orchestrator, observer) = orchestrator(solver("", 10, 5), recovery_settings(None, 2));
    let outcome = orchestrator.recover(&page).await;

    assert_eq!(outcome, RecoveryOutcome::Resolved);
    assert_eq!(page.click_count(&Locator::css(TOGGLE)), 5);

    let events = observer.events();
    assert!(events
        .iter()
        .any(|e| matches!(e, RecoveryEvent::TimeoutLimitReached { consecutive: 5 })));
    assert_eq!(cooldowns(&events).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_text_challenge_solved_at_anchor() {
    let page = MemoryPage::new(DOCUMENT_URL, TEXT_CHALLENGE_HTML);
    page.route(ANCHOR_URL, TEXT_CHALLENGE_HTML);
    page.on_click(Locator::css(TEXT_SUBMIT), |scene| scene.set_main_html(ANCHOR_HTML));

    let (orchestrator, observer) = orchestrator(solver("k7 Qz-2", 3, 5), recovery_settings(Some(READY_SELECTOR), 2));
    let outcome = orchestrator.recover(&page).await;

    assert_eq!(outcome, RecoveryOutcome::Resolved);
    assert_eq!(
        page.filled(&Locator::css("#captchaResponse")),
        vec![(0, "k7Qz2".to_string())]
    );
    assert_eq!(
        observer.phases(),
        vec![
            RecoveryPhase::Detecting,
            RecoveryPhase::Reclassifying,
            RecoveryPhase::Solving,
            RecoveryPhase::Resolved,
        ]
    );
    assert!(cooldowns(&observer.events()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_challenge_that_clears_on_anchor_needs_no_solving() {
    let page = MemoryPage::new(DOCUMENT_URL, TEXT_CHALLENGE_HTML);
    page.route(ANCHOR_URL, ANCHOR_HTML);

    let (orchestrator, observer) = orchestrator(solver("unused", 3, 5), recovery_settings(None, 2));
    let outcome = orchestrator.recover(&page).await;

    assert_eq!(outcome, RecoveryOutcome::Resolved);
    assert_eq!(attempts_started(&observer.events()), 0);
    assert!(page.filled(&Locator::css("#captchaResponse")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_solving_escalates() {
    let page = MemoryPage::new(DOCUMENT_URL, TEXT_CHALLENGE_HTML);
    page.route(ANCHOR_URL, TEXT_CHALLENGE_HTML);

    // the answer is never accepted
    let (orchestrator, observer) = orchestrator(solver("wrong", 3, 5), recovery_settings(None, 2));
    let outcome = orchestrator.recover(&page).await;

    assert_eq!(
        outcome,
        RecoveryOutcome::NeedsManualAttention {
            state: PageState::TextCaptcha
        }
    );
    assert_eq!(attempts_started(&observer.events()), 3);
    assert_eq!(page.reload_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_ready_selector_escalates_as_unknown() {
    let page = MemoryPage::new(DOCUMENT_URL, RESTRICTED_HTML);
    page.route(ANCHOR_URL, "<html><body><p>Maintenance page</p></body></html>");

    let (orchestrator, observer) = orchestrator(solver("", 3, 5), recovery_settings(Some(READY_SELECTOR), 2));
    let outcome = orchestrator.recover(&page).await;

    assert_eq!(
        outcome,
        RecoveryOutcome::NeedsManualAttention {
            state: PageState::Unknown
        }
    );
    // one visit after the cooldown, one retry for the unknown state
    assert_eq!(page.navigations().len(), 2);
    assert_eq!(cooldowns(&observer.events()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_anchor_navigation_failure_is_reported_not_raised() {
    let page = MemoryPage::new(DOCUMENT_URL, RESTRICTED_HTML);
    page.fail_navigation_to(ANCHOR_URL);

    let (orchestrator, observer) = orchestrator(solver("", 3, 5), recovery_settings(None, 2));
    let outcome = orchestrator.recover(&page).await;

    assert!(matches!(outcome, RecoveryOutcome::Failed { .. }));
    assert!(observer
        .events()
        .iter()
        .any(|e| matches!(e, RecoveryEvent::NavigationFailed { url, .. } if url == ANCHOR_URL)));
    assert!(!orchestrator.handle_interruption(&page).await);
}

#[tokio::test(start_paused = true)]
async fn test_manual_wait_returns_once_page_clears() {
    let page = MemoryPage::new(DOCUMENT_URL, RESTRICTED_HTML);
    page.route(ANCHOR_URL, RESTRICTED_HTML);

    let operator = page.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        operator.with_scene(|scene| scene.set_main_html(ANCHOR_HTML));
    });

    let (orchestrator, observer) = orchestrator(solver("", 3, 5), recovery_settings(None, 1));
    assert!(orchestrator.handle_interruption(&page).await);

    let events = observer.events();
    assert!(events.iter().any(|e| matches!(
        e,
        RecoveryEvent::ManualWaitStarted {
            state: PageState::AccessRestricted
        }
    )));
    let waited = events.iter().find_map(|e| match e {
        RecoveryEvent::ManualWaitFinished { waited } => Some(*waited),
        _ => None,
    });
    assert!(waited.is_some_and(|w| w > Duration::ZERO));
}

#[tokio::test(start_paused = true)]
async fn test_slider_variant_is_classified_from_iframe() {
    let page = MemoryPage::new(DOCUMENT_URL, "<html><body></body></html>");
    page.with_scene(|scene| {
        scene.add_frame(
            "",
            CAPTCHA_FRAME_URL,
            "<div id='captcha-container'><div class='sliderContainer'></div>\
             <button id='captcha__audio__button'></button></div>",
        );
    });

    let (orchestrator, _observer) = orchestrator(solver("", 3, 5), recovery_settings(None, 2));
    assert_eq!(
        orchestrator.classifier().classify(&page).await,
        PageState::AudioCaptchaChallenge {
            variant: ChallengeVariant::Slider
        }
    );
}
