//! Page state classification
//!
//! Decides which of the interruption states the browser is in. The checks
//! run in a fixed order:
//!
//! 1. Restriction phrases in the top document and restriction banners in any frame
//! 2. The provider's human-verification container, per frame
//! 3. The portal's static text-image challenge
//! 4. Residual challenge markers (`Unknown`), otherwise `Normal`
//!
//! A frame that cannot be queried is skipped; classification never fails.

pub mod indicators;

use crate::browser::{BrowserResult, Frame, Locator, Page};
use crate::state::{ChallengeVariant, PageState};
use indicators::*;
use std::sync::Arc;

/// A classification together with where it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub state: PageState,

    /// Frame index (0 is the main frame) holding the deciding evidence
    pub frame_index: Option<usize>,

    /// The phrase or selector that decided the state
    pub evidence: String,
}

impl Classification {
    fn new(state: PageState, frame_index: Option<usize>, evidence: impl Into<String>) -> Self {
        Self {
            state,
            frame_index,
            evidence: evidence.into(),
        }
    }

    fn normal() -> Self {
        Self::new(PageState::Normal, None, "no interruption markers")
    }
}

/// Inspects a page and its frames
#[derive(Debug, Clone)]
pub struct PageStateClassifier {
    max_frames: usize,
}

impl Default for PageStateClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStateClassifier {
    pub fn new() -> Self {
        Self {
            max_frames: MAX_FRAMES,
        }
    }

    /// Returns the current page state
    pub async fn classify(&self, page: &dyn Page) -> PageState {
        self.classify_detailed(page).await.state
    }

    /// Returns the current page state with the frame and evidence behind it
    ///
    /// # Arguments
    ///
    /// * `page` - The page to inspect; every frame up to the frame limit is examined
    ///
    /// # Returns
    ///
    /// The classification. Query failures degrade to `Normal` for the
    /// affected frame rather than surfacing as errors.
    pub async fn classify_detailed(&self, page: &dyn Page) -> Classification {
        if let Some(found) = restriction_phrase(page).await {
            return found;
        }

        let frames = match page.frames().await {
            Ok(frames) => frames,
            Err(e) => {
                tracing::debug!("Frame enumeration failed, inspecting main document only: {}", e);
                Vec::new()
            }
        };

        if frames.is_empty() {
            return self.classify_single(page).await;
        }

        let frames: Vec<Arc<dyn Frame>> = frames.into_iter().take(self.max_frames).collect();

        // banners in any frame outrank a widget in another frame
        for (index, frame) in frames.iter().enumerate() {
            match restriction_banner(frame.as_ref()).await {
                Ok(Some(evidence)) => {
                    return Classification::new(PageState::AccessRestricted, Some(index), evidence)
                }
                Ok(None) => {}
                Err(e) => skip_frame(index, frame.as_ref(), &e),
            }
        }

        for (index, frame) in frames.iter().enumerate() {
            match verification_widget(frame.as_ref()).await {
                Ok(Some((state, evidence))) => {
                    return Classification::new(state, Some(index), evidence)
                }
                Ok(None) => {}
                Err(e) => skip_frame(index, frame.as_ref(), &e),
            }
        }

        for (index, frame) in frames.iter().enumerate() {
            match text_challenge(frame.as_ref()).await {
                Ok(true) => {
                    return Classification::new(
                        PageState::TextCaptcha,
                        Some(index),
                        TEXT_CAPTCHA_IMAGE,
                    )
                }
                Ok(false) => {}
                Err(e) => skip_frame(index, frame.as_ref(), &e),
            }
        }

        for (index, frame) in frames.iter().enumerate() {
            if let Some(evidence) = residual_marker(frame.as_ref()).await {
                return Classification::new(PageState::Unknown, Some(index), evidence);
            }
        }

        Classification::normal()
    }

    /// Fallback when frames cannot be enumerated: treat the page as the only frame
    async fn classify_single(&self, page: &dyn Page) -> Classification {
        if let Ok(Some(evidence)) = restriction_banner(page).await {
            return Classification::new(PageState::AccessRestricted, Some(0), evidence);
        }
        if let Ok(Some((state, evidence))) = verification_widget(page).await {
            return Classification::new(state, Some(0), evidence);
        }
        if let Ok(true) = text_challenge(page).await {
            return Classification::new(PageState::TextCaptcha, Some(0), TEXT_CAPTCHA_IMAGE);
        }
        if let Some(evidence) = residual_marker(page).await {
            return Classification::new(PageState::Unknown, Some(0), evidence);
        }
        Classification::normal()
    }
}

fn skip_frame<F: Frame + ?Sized>(index: usize, frame: &F, error: &crate::browser::BrowserError) {
    tracing::debug!("Skipping frame {} ({}): {}", index, frame.url(), error);
}

/// Scans the top document's visible text for block messages
async fn restriction_phrase(page: &dyn Page) -> Option<Classification> {
    match page.inner_text(&Locator::css("body")).await {
        Ok(Some(body)) => find_phrase(&body, RESTRICTION_PHRASES)
            .map(|phrase| Classification::new(PageState::AccessRestricted, Some(0), phrase)),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("Body text unavailable, falling back to text locators: {}", e);
            for phrase in RESTRICTION_PHRASES {
                if let Ok(n) = page.count(&Locator::text(*phrase)).await {
                    if n > 0 {
                        return Some(Classification::new(
                            PageState::AccessRestricted,
                            Some(0),
                            *phrase,
                        ));
                    }
                }
            }
            None
        }
    }
}

/// Checks one frame for the provider's restriction banners
async fn restriction_banner<F: Frame + ?Sized>(frame: &F) -> BrowserResult<Option<String>> {
    let title = Locator::css(HUMAN_TITLE);
    if frame.count(&title).await? > 0 {
        let text = frame.inner_text(&title).await?.unwrap_or_default();
        if let Some(marker) = find_phrase(&text, HUMAN_TITLE_MARKERS) {
            return Ok(Some(format!("{} mentions '{}'", HUMAN_TITLE, marker)));
        }
    }

    let warning = Locator::css(ROBOT_WARNING);
    if frame.count(&warning).await? > 0 {
        let text = frame.inner_text(&warning).await?.unwrap_or_default();
        if let Some(marker) = find_phrase(&text, ROBOT_WARNING_MARKERS) {
            let controls = frame.count(&Locator::css(AUDIO_TOGGLE)).await?
                + frame.count(&Locator::css(SLIDER)).await?;
            if controls == 0 {
                return Ok(Some(format!("{} mentions '{}'", ROBOT_WARNING, marker)));
            }
        }
    }

    Ok(None)
}

/// Checks one frame for the provider's human-verification container
///
/// A container stripped of both its audio toggle and its slider is a block
/// page wearing the challenge's markup.
async fn verification_widget<F: Frame + ?Sized>(
    frame: &F,
) -> BrowserResult<Option<(PageState, String)>> {
    if frame.count(&Locator::css(CAPTCHA_CONTAINER)).await? == 0 {
        return Ok(None);
    }

    if frame.count(&Locator::css(SLIDER)).await? > 0 {
        return Ok(Some((
            PageState::AudioCaptchaChallenge {
                variant: ChallengeVariant::Slider,
            },
            SLIDER.to_string(),
        )));
    }

    if frame.count(&Locator::css(AUDIO_TOGGLE)).await? > 0 {
        return Ok(Some((
            PageState::AudioCaptchaChallenge {
                variant: ChallengeVariant::PureAudio,
            },
            AUDIO_TOGGLE.to_string(),
        )));
    }

    Ok(Some((
        PageState::AccessRestricted,
        format!("{} without audio or slider controls", CAPTCHA_CONTAINER),
    )))
}

async fn text_challenge<F: Frame + ?Sized>(frame: &F) -> BrowserResult<bool> {
    let prompt = Locator::css(format!("{}, {}", TEXT_CAPTCHA_IMAGE, PORTAL_AUDIO_TRACK));
    Ok(frame.count(&prompt).await? > 0 && frame.count(&Locator::css(TEXT_CAPTCHA_INPUT)).await? > 0)
}

async fn residual_marker<F: Frame + ?Sized>(frame: &F) -> Option<String> {
    for selector in RESIDUAL_SELECTORS {
        if matches!(frame.count(&Locator::css(*selector)).await, Ok(n) if n > 0) {
            return Some(selector.to_string());
        }
    }
    for phrase in RESIDUAL_PHRASES {
        if matches!(frame.count(&Locator::text(*phrase)).await, Ok(n) if n > 0) {
            return Some(phrase.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::MemoryPage;

    const URL: &str = "https://www.canlii.org/en/on/laws/";

    fn page(html: &str) -> MemoryPage {
        MemoryPage::new(URL, html)
    }

    #[tokio::test]
    async fn test_normal_page() {
        let page = page("<html><body><h1 class='main-title'>Statutes</h1></body></html>");
        let result = PageStateClassifier::new().classify_detailed(&page).await;
        assert_eq!(result.state, PageState::Normal);
        assert_eq!(result.frame_index, None);
    }

    #[tokio::test]
    async fn test_body_phrase_is_restricted() {
        let page = page("<html><body><p>Too many requests</p></body></html>");
        let result = PageStateClassifier::new().classify_detailed(&page).await;
        assert_eq!(result.state, PageState::AccessRestricted);
        assert_eq!(result.evidence, "too many requests");
    }

    #[tokio::test]
    async fn test_text_captcha() {
        let page = page(
            "<html><body><form id='captchaForm'><img id='captchaTag' src='/captcha.png'>\
             <input id='captchaResponse'></form></body></html>",
        );
        assert_eq!(PageStateClassifier::new().classify(&page).await, PageState::TextCaptcha);
    }

    #[tokio::test]
    async fn test_text_captcha_in_audio_mode() {
        let page = page(
            "<html><body><form id='captchaForm'><audio id='audioCaptchaTag' src='/a.wav'></audio>\
             <input id='captchaResponse'></form></body></html>",
        );
        assert_eq!(PageStateClassifier::new().classify(&page).await, PageState::TextCaptcha);
    }

    #[tokio::test]
    async fn test_text_captcha_without_input_is_unknown() {
        let page = page("<html><body><form id='captchaForm'><img id='captchaTag'></form></body></html>");
        assert_eq!(PageStateClassifier::new().classify(&page).await, PageState::Unknown);
    }

    #[tokio::test]
    async fn test_widget_in_iframe() {
        let page = page("<html><body><iframe src='https://geo.captcha-delivery.com/'></iframe></body></html>");
        page.with_scene(|scene| {
            scene.add_frame(
                "",
                "https://geo.captcha-delivery.com/captcha/",
                "<div id='captcha-container'><div class='sliderContainer'></div>\
                 <button id='captcha__audio__button'></button></div>",
            );
        });

        let result = PageStateClassifier::new().classify_detailed(&page).await;
        assert_eq!(
            result.state,
            PageState::AudioCaptchaChallenge {
                variant: ChallengeVariant::Slider
            }
        );
        assert_eq!(result.frame_index, Some(1));
    }

    #[tokio::test]
    async fn test_stripped_container_is_restricted() {
        let page = page("<html><body></body></html>");
        page.with_scene(|scene| {
            scene.add_frame("", "https://geo.captcha-delivery.com/", "<div class='captcha-container'></div>");
        });
        assert_eq!(
            PageStateClassifier::new().classify(&page).await,
            PageState::AccessRestricted
        );
    }

    #[tokio::test]
    async fn test_robot_warning_with_controls_is_not_restricted() {
        let page = page("<html><body></body></html>");
        page.with_scene(|scene| {
            scene.add_frame(
                "",
                "https://geo.captcha-delivery.com/",
                "<div id='captcha-container'><p class='captcha__robot__warning'>We detected unusual activity</p>\
                 <button id='captcha__audio__button'></button></div>",
            );
        });
        assert_eq!(
            PageStateClassifier::new().classify(&page).await,
            PageState::AudioCaptchaChallenge {
                variant: ChallengeVariant::PureAudio
            }
        );
    }

    #[tokio::test]
    async fn test_detached_frame_is_skipped() {
        let page = page("<html><body><h1>Statutes</h1></body></html>");
        page.with_scene(|scene| {
            let broken = scene.add_frame("ads", "https://ads.test/", "<div id='captcha-container'></div>");
            scene.detach_frame(broken);
            scene.add_frame(
                "",
                "https://geo.captcha-delivery.com/",
                "<div id='captcha-container'><button id='captcha__audio__button'></button></div>",
            );
        });

        let result = PageStateClassifier::new().classify_detailed(&page).await;
        assert!(result.state.is_solvable());
        assert_eq!(result.frame_index, Some(2));
    }

    #[tokio::test]
    async fn test_frames_beyond_limit_are_ignored() {
        let page = page("<html><body></body></html>");
        page.with_scene(|scene| {
            for i in 0..10 {
                scene.add_frame("", &format!("https://ads.test/{}", i), "<p>ad</p>");
            }
            scene.add_frame("", "https://geo.captcha-delivery.com/", "<div id='captcha-container'></div>");
        });
        assert_eq!(PageStateClassifier::new().classify(&page).await, PageState::Normal);
    }
}
