/// Page state definitions for interruption handling
///
/// This module defines every condition the portal can put the browser in,
/// as far as the crawl is concerned.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which flavour of audio challenge the provider rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeVariant {
    /// Slider puzzle with an audio alternative behind a toggle
    Slider,

    /// Audio-only widget
    PureAudio,
}

impl ChallengeVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slider => "slider",
            Self::PureAudio => "pure_audio",
        }
    }
}

/// Represents what the current page is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PageState {
    /// Regular portal content
    Normal,

    // ===== Solvable States =====
    /// A distorted alphanumeric image must be read and submitted
    TextCaptcha,

    /// An audio clip encodes a six digit code
    AudioCaptchaChallenge { variant: ChallengeVariant },

    // ===== Unsolvable States =====
    /// Rate-limit or block message with no working widget
    AccessRestricted,

    /// Challenge markers present but nothing we know how to drive
    Unknown,
}

impl PageState {
    /// Returns true if the page shows regular content
    pub fn is_normal(&self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Returns true if a solver strategy exists for this state
    pub fn is_solvable(&self) -> bool {
        matches!(self, Self::TextCaptcha | Self::AudioCaptchaChallenge { .. })
    }

    /// Returns true if this is a block that only time can lift
    pub fn is_restricted(&self) -> bool {
        matches!(self, Self::AccessRestricted)
    }

    /// Returns true for any state that interrupts the crawl
    pub fn is_interruption(&self) -> bool {
        !self.is_normal()
    }

    /// Returns the solver strategy that handles this state, if any
    pub fn challenge_kind(&self) -> Option<ChallengeKind> {
        match self {
            Self::TextCaptcha => Some(ChallengeKind::Text),
            Self::AudioCaptchaChallenge { variant } => Some(ChallengeKind::Audio(*variant)),
            _ => None,
        }
    }

    /// Stable label used in logs and events
    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::TextCaptcha => "text_captcha",
            Self::AudioCaptchaChallenge {
                variant: ChallengeVariant::Slider,
            } => "audio_captcha_slider",
            Self::AudioCaptchaChallenge {
                variant: ChallengeVariant::PureAudio,
            } => "audio_captcha_pure_audio",
            Self::AccessRestricted => "access_restricted",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a label produced by [`PageState::label`]
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "text_captcha" => Some(Self::TextCaptcha),
            "audio_captcha_slider" => Some(Self::AudioCaptchaChallenge {
                variant: ChallengeVariant::Slider,
            }),
            "audio_captcha_pure_audio" => Some(Self::AudioCaptchaChallenge {
                variant: ChallengeVariant::PureAudio,
            }),
            "access_restricted" => Some(Self::AccessRestricted),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The solver strategy a challenge needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeKind {
    Text,
    Audio(ChallengeVariant),
}

impl ChallengeKind {
    /// The page state this kind of challenge is detected as
    pub fn page_state(&self) -> PageState {
        match self {
            Self::Text => PageState::TextCaptcha,
            Self::Audio(variant) => PageState::AudioCaptchaChallenge { variant: *variant },
        }
    }
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Audio(variant) => write!(f, "audio/{}", variant.as_str()),
        }
    }
}
