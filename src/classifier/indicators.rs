//! Markup the portal and its challenge provider are known to render

/// Upper bound on frames inspected per classification
pub const MAX_FRAMES: usize = 10;

/// Phrases in the top document's visible text that mean the IP is blocked
pub const RESTRICTION_PHRASES: &[&str] = &[
    "access denied",
    "access restricted",
    "temporarily blocked",
    "temporarily restricted",
    "too many requests",
    "rate limit exceeded",
    "ip has been blocked",
    "ip address has been blocked",
    "automated access detected",
    "unusual activity detected",
];

/// Provider banner stating that access is restricted
pub const HUMAN_TITLE: &str = ".captcha__human__title";
pub const HUMAN_TITLE_MARKERS: &[&str] = &["temporarily restricted", "access"];

/// Provider warning shown to traffic it has already judged automated
pub const ROBOT_WARNING: &str = ".captcha__robot__warning";
pub const ROBOT_WARNING_MARKERS: &[&str] = &["unusual activity", "automated"];

/// Human-verification container rendered by the challenge provider
pub const CAPTCHA_CONTAINER: &str =
    "#captcha-container, .captcha-container, #ddv1-captcha-container, [data-dd-captcha-container]";
pub const AUDIO_TOGGLE: &str = "#captcha__audio__button";
pub const AUDIO_PANEL_ACTIVE: &str = "#captcha__audio.toggled";
pub const SLIDER: &str = ".sliderContainer, #captcha__slider";

/// The portal's own static image challenge
pub const TEXT_CAPTCHA_IMAGE: &str = "#captchaTag";
pub const TEXT_CAPTCHA_INPUT: &str = "#captchaResponse";

/// Spoken alternative of the static challenge, answered in the same input
pub const PORTAL_AUDIO_TOGGLE: &str = "#toggleAudio";
pub const PORTAL_AUDIO_TRACK: &str = "#audioCaptchaTag";

/// Challenge leftovers that carry no widget we can drive
pub const RESIDUAL_SELECTORS: &[&str] = &[
    "#captchaForm",
    "#captchaTest",
    "#captcha__frame",
    ".captcha__human",
];
pub const RESIDUAL_PHRASES: &[&str] = &["please proceed with our captcha test", "verification required"];

/// Returns the first phrase from `phrases` found in `text`, ignoring case
pub fn find_phrase(text: &str, phrases: &[&'static str]) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    phrases.iter().copied().find(|p| lowered.contains(p))
}
