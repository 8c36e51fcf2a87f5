//! Static text-image challenge and its spoken alternative

use super::audio::{extract_digits, resolve_src};
use super::{click_with_fallback, ChallengeSolver, SessionContext, SolverError, SolverResult, Verdict};
use crate::browser::{poll_until, Frame, Locator, Page, PollResult};
use crate::classifier::indicators::{
    PORTAL_AUDIO_TOGGLE, PORTAL_AUDIO_TRACK, TEXT_CAPTCHA_IMAGE, TEXT_CAPTCHA_INPUT,
};
use crate::state::AttemptOutcome;
use std::time::Duration;

/// Instruction sent with the challenge image
pub const TEXT_INSTRUCTION: &str = "Read the captcha text in this image. Only output the exact characters you see, nothing else. The captcha contains alphanumeric characters. Do not include any spaces or special characters.";

pub const SUBMIT_BUTTON: &str = "input[type='submit'][value='ok']";

/// Removes the cookie consent overlay, which can sit on top of the challenge form
pub const COOKIE_MODAL_SCRIPT: &str = r#"(() => {
  for (const id of ['cookieConsentBlocker', 'cookieConsentBanner', 'cookieConsentModal', 'cookieConsentContainer']) {
    const el = document.getElementById(id);
    if (el) el.remove();
  }
  document.querySelectorAll('.modal-backdrop').forEach((el) => el.remove());
  document.body.classList.remove('modal-open');
  document.body.style.overflow = 'auto';
})()"#;

const TOGGLE_SETTLE: Duration = Duration::from_secs(1);

/// Keeps only ASCII letters and digits from a model answer
pub fn sanitize_text_answer(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

async fn present<F: Frame + ?Sized>(frame: &F, selector: &str) -> bool {
    matches!(frame.count(&Locator::css(selector)).await, Ok(n) if n > 0)
}

impl ChallengeSolver {
    /// Tries the spoken alternative first, then reads the image
    pub(super) async fn attempt_text(&self, page: &dyn Page) -> SolverResult<Verdict> {
        if let Err(e) = page.evaluate(COOKIE_MODAL_SCRIPT).await {
            tracing::debug!("Cookie overlay removal failed: {}", e);
        }

        match self.attempt_portal_audio(page).await {
            Ok(Some(verdict)) if verdict.outcome == AttemptOutcome::Solved => return Ok(verdict),
            Ok(Some(verdict)) => {
                if !present(page, TEXT_CAPTCHA_INPUT).await {
                    return Ok(verdict);
                }
                tracing::debug!("Spoken answer rejected, reading the image instead");
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Spoken alternative unavailable: {}", e),
        }

        self.attempt_text_image(page).await
    }

    /// Answers the challenge from its audio track
    ///
    /// Returns `None` when there is no usable audio, so the caller can fall
    /// back to the image.
    async fn attempt_portal_audio(&self, page: &dyn Page) -> SolverResult<Option<Verdict>> {
        if !present(page, PORTAL_AUDIO_TRACK).await {
            if !present(page, PORTAL_AUDIO_TOGGLE).await {
                return Ok(None);
            }
            tracing::debug!("Switching text challenge to audio");
            click_with_fallback(page, &Locator::css(PORTAL_AUDIO_TOGGLE)).await?;
            tokio::time::sleep(TOGGLE_SETTLE).await;
        }

        let track = Locator::css(PORTAL_AUDIO_TRACK);
        let track_ref = &track;
        let src = poll_until(
            self.settings.widget_timeout,
            self.settings.poll_interval,
            move || async move {
                match page.attribute(track_ref, "src").await {
                    Ok(Some(src)) if !src.trim().is_empty() => Some(src),
                    _ => None,
                }
            },
        )
        .await;
        let src = match src {
            PollResult::Found(src) => src,
            PollResult::TimedOut => {
                tracing::debug!("Audio track never got a source");
                return Ok(None);
            }
        };

        let page_url = page.current_url().await?;
        let audio_url = resolve_src(&page_url, &src)?;
        let session = SessionContext::capture(page, Some(page_url)).await?;
        let audio = self.media.fetch(&audio_url, &session).await?;
        let transcript = self.speech.transcribe(&audio).await?;
        let digits = extract_digits(&transcript);
        if digits.is_empty() {
            tracing::debug!("No digits in transcript '{}'", transcript.trim());
            return Ok(None);
        }

        tracing::debug!("Submitting spoken challenge answer '{}'", digits);
        page.fill(&Locator::css(TEXT_CAPTCHA_INPUT), 0, &digits).await?;
        click_with_fallback(page, &Locator::css(SUBMIT_BUTTON)).await?;

        Ok(Some(self.judge_submission(page).await))
    }

    async fn attempt_text_image(&self, page: &dyn Page) -> SolverResult<Verdict> {
        if !present(page, TEXT_CAPTCHA_IMAGE).await && present(page, PORTAL_AUDIO_TOGGLE).await {
            click_with_fallback(page, &Locator::css(PORTAL_AUDIO_TOGGLE)).await?;
            tokio::time::sleep(TOGGLE_SETTLE).await;
        }

        let image = Locator::css(TEXT_CAPTCHA_IMAGE);
        let image_ref = &image;

        let appeared = poll_until(
            self.settings.widget_timeout,
            self.settings.poll_interval,
            move || async move {
                matches!(page.count(image_ref).await, Ok(n) if n > 0).then_some(())
            },
        )
        .await;
        if let PollResult::TimedOut = appeared {
            return Ok(Verdict::timeout("challenge image never appeared"));
        }

        let bytes = page.screenshot(&image).await?;
        if bytes.is_empty() {
            return Err(SolverError::Media("empty challenge screenshot".to_string()));
        }

        let raw = self.vision.read_image(&bytes, TEXT_INSTRUCTION).await?;
        let answer = sanitize_text_answer(&raw);
        if answer.is_empty() {
            return Ok(Verdict::incorrect(format!("unusable recognition '{}'", raw.trim())));
        }

        tracing::debug!("Submitting text challenge answer '{}'", answer);
        page.fill(&Locator::css(TEXT_CAPTCHA_INPUT), 0, &answer).await?;
        click_with_fallback(page, &Locator::css(SUBMIT_BUTTON)).await?;

        Ok(self.judge_submission(page).await)
    }
}
