//! State module for interruption handling
//!
//! This module provides the vocabulary shared by the classifier, the solver
//! and the recovery orchestrator.
//!
//! # Components
//!
//! - `PageState`: What the browser is currently showing (normal, challenge, block)
//! - `ChallengeAttempt` / `AttemptTracker`: Per-episode solve attempts and the timeout rule
//! - `CooldownWindow`: A randomized wait imposed by an access restriction

mod challenge;
mod cooldown;
mod page_state;

// Re-export main types
pub use challenge::{AttemptOutcome, AttemptTracker, ChallengeAttempt};
pub use cooldown::CooldownWindow;
pub use page_state::{ChallengeKind, ChallengeVariant, PageState};
