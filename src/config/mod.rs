//! Configuration module for Lex-Harvest
//!
//! This module handles loading, parsing, overriding and validating TOML
//! configuration files.
//!
//! # Example
//!
//! ```no_run
//! use lex_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Cooldown band: {}-{} minutes",
//!     config.recovery.cooldown_min_minutes,
//!     config.recovery.cooldown_max_minutes);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, Config, InferenceConfig, LedgerConfig, OutputConfig, PortalConfig,
    RecoveryConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, load_config_with_overrides,
    ConfigOverrides,
};
