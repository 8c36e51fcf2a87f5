//! Interruption recovery
//!
//! # Components
//!
//! - `CooldownManager`: randomized, minute-granular waits for access restrictions
//! - `RecoveryOrchestrator`: the state machine the crawler calls on any interruption
//! - `RecoveryEvent` / `RecoveryObserver`: typed progress reporting

mod cooldown;
mod events;
mod orchestrator;

pub use cooldown::CooldownManager;
pub use events::{RecordingObserver, RecoveryEvent, RecoveryObserver, RecoveryPhase, TracingObserver};
pub use orchestrator::{RecoveryOrchestrator, RecoveryOutcome, RecoverySettings};
