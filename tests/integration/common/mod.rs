//! Shared fixtures: portal pages, inference doubles and builders

use async_trait::async_trait;
use lex_harvest::inference::{ImageToText, InferenceResult, SpeechToText};
use lex_harvest::recovery::{
    CooldownManager, RecordingObserver, RecoveryOrchestrator, RecoveryObserver, RecoverySettings,
};
use lex_harvest::solver::{ChallengeSolver, MediaFetcher, SessionContext, SolverResult, SolverSettings};
use std::sync::Arc;
use std::time::Duration;

pub const BASE_URL: &str = "https://portal.test";
pub const ANCHOR_URL: &str = "https://portal.test/en/on/laws/";
pub const DOCUMENT_URL: &str = "https://portal.test/en/on/laws/stat/rso-1990-c-h8/latest/";
pub const CAPTCHA_FRAME_URL: &str = "https://geo.captcha-delivery.com/captcha/?initialCid=abc";
pub const READY_SELECTOR: &str = "#legislation-home";

pub const ANCHOR_HTML: &str = r#"<html><body>
  <div id="legislation-home">
    <section>
      <h2>Legislation</h2>
      <a class="canlii" href="/en/on/laws/stat/">Statutes</a>
    </section>
  </div>
</body></html>"#;

pub const RESTRICTED_HTML: &str =
    "<html><body><h1>Too many requests</h1><p>Please try again later.</p></body></html>";

pub const TEXT_CHALLENGE_HTML: &str = "<html><body><form id='captchaForm'>\
    <p>Please proceed with our captcha test</p>\
    <img id='captchaTag' src='/captcha.png'><input id='captchaResponse'>\
    <input type='submit' value='ok'></form></body></html>";

/// Audio widget whose track never loads
pub const SILENT_AUDIO_WIDGET: &str =
    "<div id='captcha-container'><button id='captcha__audio__button'></button></div>";

pub const TOGGLE: &str = "#captcha__audio__button";
pub const TEXT_SUBMIT: &str = "input[type='submit'][value='ok']";

pub struct FixedVision(pub &'static str);

#[async_trait]
impl ImageToText for FixedVision {
    async fn read_image(&self, _image: &[u8], _instruction: &str) -> InferenceResult<String> {
        Ok(self.0.to_string())
    }
}

pub struct FixedSpeech(pub &'static str);

#[async_trait]
impl SpeechToText for FixedSpeech {
    async fn transcribe(&self, _audio: &[u8]) -> InferenceResult<String> {
        Ok(self.0.to_string())
    }
}

pub struct FixedMedia;

#[async_trait]
impl MediaFetcher for FixedMedia {
    async fn fetch(&self, _url: &str, _session: &SessionContext) -> SolverResult<Vec<u8>> {
        Ok(b"RIFF....WAVE".to_vec())
    }
}

pub fn solver(vision: &'static str, max_attempts: u32, timeout_limit: u32) -> ChallengeSolver {
    solver_with(
        vision,
        SolverSettings {
            max_attempts,
            timeout_limit,
            ..SolverSettings::default()
        },
    )
}

pub fn solver_with(vision: &'static str, settings: SolverSettings) -> ChallengeSolver {
    ChallengeSolver::new(
        Arc::new(FixedVision(vision)),
        Arc::new(FixedSpeech("4 1 5 9 2 6")),
        Arc::new(FixedMedia),
        settings,
    )
}

/// Smallest configuration file the loader accepts; everything else defaults
pub const MINIMAL_CONFIG: &str = r#"
[portal]
base-url = "https://portal.test"
anchor-url = "https://portal.test/en/on/laws/"
section-title = "Legislation"

[inference]
vision-endpoint = "http://localhost:11434/v1"
vision-model = "qwen2.5vl"
speech-endpoint = "http://localhost:8000/v1"
"#;

pub fn recovery_settings(ready_selector: Option<&str>, max_cooldowns: u32) -> RecoverySettings {
    RecoverySettings {
        anchor_url: ANCHOR_URL.to_string(),
        ready_selector: ready_selector.map(str::to_string),
        max_cooldowns,
        manual_poll_interval: Duration::from_secs(5),
        navigation_timeout: Duration::from_secs(30),
        confirm_timeout: Duration::from_secs(2),
    }
}

/// Orchestrator with a 10-20 minute cooldown band and a recording observer
pub fn orchestrator(
    solver: ChallengeSolver,
    settings: RecoverySettings,
) -> (RecoveryOrchestrator, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::new());
    let orchestrator = RecoveryOrchestrator::new(solver, CooldownManager::new(10, 20), settings)
        .with_observer(observer.clone() as Arc<dyn RecoveryObserver>);
    (orchestrator, observer)
}
