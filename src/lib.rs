//! Lex-Harvest: an unattended harvester for a defended legal-document portal
//!
//! This crate walks the portal's hierarchical listings, recovers from the
//! portal's anti-bot interruptions (rate-limit blocks, text and audio
//! challenges), and keeps an append-only ledger so a long crawl can be
//! restarted without redoing finished documents.

pub mod browser;
pub mod classifier;
pub mod config;
pub mod crawler;
pub mod inference;
pub mod ledger;
pub mod recovery;
pub mod solver;
pub mod state;

use thiserror::Error;

/// Main error type for Lex-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("Inference error: {0}")]
    Inference(#[from] inference::InferenceError),

    #[error("Solver error: {0}")]
    Solver(#[from] solver::SolverError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] crawler::ArtifactError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Content error for {url}: {message}")]
    Content { url: String, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Lex-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use classifier::PageStateClassifier;
pub use config::Config;
pub use crawler::Crawler;
pub use ledger::{DocumentKey, DocumentRole, SkipLedger, TrackingStore};
pub use recovery::{CooldownManager, RecoveryOrchestrator, RecoveryOutcome};
pub use solver::ChallengeSolver;
pub use state::{AttemptOutcome, ChallengeAttempt, CooldownWindow, PageState};
