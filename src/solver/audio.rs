//! Audio challenge served by the verification provider

use super::{click_with_fallback, ChallengeSolver, SessionContext, SolverError, SolverResult, Verdict};
use crate::browser::{poll_until, BrowserResult, Frame, Locator, Page, PollResult};
use crate::classifier::indicators::{AUDIO_PANEL_ACTIVE, AUDIO_TOGGLE, CAPTCHA_CONTAINER, MAX_FRAMES};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Length of the spoken code
pub const REQUIRED_DIGITS: usize = 6;

const AUDIO_TRACK: &str = "audio.audio-captcha-track";
const DIGIT_INPUTS: &str = ".audio-captcha-inputs";
const SUBMIT_BUTTON: &str = ".audio-captcha-submit-button";
const RELOAD_BUTTON: &str = "#captcha__reload__button";

const TOGGLE_SETTLE: Duration = Duration::from_millis(1500);
const INPUT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DIGIT_DELAY: Duration = Duration::from_millis(100);

/// Keeps only the digits of a transcript
pub fn extract_digits(transcript: &str) -> String {
    transcript.chars().filter(char::is_ascii_digit).collect()
}

/// First frame (main frame included) holding the provider widget
async fn widget_frame(page: &dyn Page) -> Option<Arc<dyn Frame>> {
    let frames = page.frames().await.ok()?;
    let container = Locator::css(format!("{}, {}", CAPTCHA_CONTAINER, AUDIO_TOGGLE));
    for frame in frames.into_iter().take(MAX_FRAMES) {
        if matches!(frame.count(&container).await, Ok(n) if n > 0) {
            return Some(frame);
        }
    }
    None
}

async fn audio_mode_active(frame: &dyn Frame) -> BrowserResult<bool> {
    if frame.count(&Locator::css(AUDIO_PANEL_ACTIVE)).await? > 0 {
        return Ok(true);
    }
    let toggle = Locator::css(AUDIO_TOGGLE);
    let class = frame.attribute(&toggle, "class").await?.unwrap_or_default();
    let expanded = frame.attribute(&toggle, "aria-expanded").await?;
    Ok(class.split_whitespace().any(|c| c.contains("toggled")) || expanded.as_deref() == Some("true"))
}

/// Resolves a possibly relative media `src` against the frame URL
pub(super) fn resolve_src(frame_url: &str, src: &str) -> SolverResult<String> {
    if let Ok(absolute) = Url::parse(src) {
        return Ok(absolute.to_string());
    }
    Url::parse(frame_url)
        .and_then(|base| base.join(src))
        .map(|u| u.to_string())
        .map_err(|e| SolverError::Media(format!("unusable audio source '{}': {}", src, e)))
}

impl ChallengeSolver {
    pub(super) async fn attempt_audio(&self, page: &dyn Page) -> SolverResult<Verdict> {
        let located = poll_until(
            self.settings.widget_timeout,
            self.settings.poll_interval,
            move || async move { widget_frame(page).await },
        )
        .await;
        let frame = match located {
            PollResult::Found(frame) => frame,
            PollResult::TimedOut => return Ok(Verdict::timeout("challenge container never appeared")),
        };

        let toggle = Locator::css(AUDIO_TOGGLE);
        if !audio_mode_active(frame.as_ref()).await? && frame.count(&toggle).await? > 0 {
            tracing::debug!("Switching challenge widget to audio mode");
            click_with_fallback(frame.as_ref(), &toggle).await?;
            tokio::time::sleep(TOGGLE_SETTLE).await;
        }

        let track = Locator::css(AUDIO_TRACK);
        let frame_ref = frame.as_ref();
        let track_ref = &track;
        let src = poll_until(
            self.settings.widget_timeout,
            self.settings.poll_interval,
            move || async move {
                match frame_ref.attribute(track_ref, "src").await {
                    Ok(Some(src)) if !src.trim().is_empty() => Some(src),
                    _ => None,
                }
            },
        )
        .await;
        let src = match src {
            PollResult::Found(src) => src,
            PollResult::TimedOut => return Ok(Verdict::timeout("audio source never appeared")),
        };

        let audio_url = resolve_src(&frame.url(), &src)?;
        let session = SessionContext::capture(page, Some(frame.url())).await?;
        let audio = self.media.fetch(&audio_url, &session).await?;
        tracing::debug!("Fetched {} bytes of challenge audio", audio.len());

        let transcript = self.speech.transcribe(&audio).await?;
        let digits = extract_digits(&transcript);
        if digits.len() != REQUIRED_DIGITS {
            return Ok(Verdict::incorrect(format!(
                "expected {} digits, transcript had {}",
                REQUIRED_DIGITS,
                digits.len()
            )));
        }

        let inputs = Locator::css(DIGIT_INPUTS);
        let mut found = frame.count(&inputs).await?;
        if found != REQUIRED_DIGITS {
            tokio::time::sleep(INPUT_RETRY_DELAY).await;
            found = frame.count(&inputs).await?;
        }
        if found != REQUIRED_DIGITS {
            return Err(SolverError::Browser(crate::browser::BrowserError::ElementNotFound(
                format!("{} (expected {} fields, found {})", DIGIT_INPUTS, REQUIRED_DIGITS, found),
            )));
        }

        // the widget only accepts one character per field
        for (index, digit) in digits.chars().enumerate() {
            frame.fill(&inputs, index, &digit.to_string()).await?;
            tokio::time::sleep(DIGIT_DELAY).await;
        }

        let submit = Locator::css(SUBMIT_BUTTON);
        if frame.count(&submit).await? > 0 {
            click_with_fallback(frame.as_ref(), &submit).await?;
        }

        Ok(self.judge_submission(page).await)
    }

    /// Asks the widget for a new clip
    pub(super) async fn reload_audio_widget(&self, page: &dyn Page) -> BrowserResult<()> {
        let Some(frame) = widget_frame(page).await else {
            return Ok(());
        };
        let reload = Locator::css(RELOAD_BUTTON);
        if frame.count(&reload).await? > 0 {
            click_with_fallback(frame.as_ref(), &reload).await?;
        }
        Ok(())
    }
}
