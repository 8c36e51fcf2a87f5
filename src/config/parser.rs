use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Values that take precedence over the configuration file
///
/// These come from command-line flags or their environment variables.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub headless: Option<bool>,
    pub cooldown_min_minutes: Option<u32>,
    pub cooldown_max_minutes: Option<u32>,
    pub max_challenge_attempts: Option<u32>,
}

impl ConfigOverrides {
    /// Returns true if no override is set
    pub fn is_empty(&self) -> bool {
        self.headless.is_none()
            && self.cooldown_min_minutes.is_none()
            && self.cooldown_max_minutes.is_none()
            && self.max_challenge_attempts.is_none()
    }

    /// Applies the overrides onto a configuration in place
    pub fn apply(&self, config: &mut Config) {
        if let Some(headless) = self.headless {
            config.browser.headless = headless;
        }
        if let Some(min) = self.cooldown_min_minutes {
            config.recovery.cooldown_min_minutes = min;
        }
        if let Some(max) = self.cooldown_max_minutes {
            config.recovery.cooldown_max_minutes = max;
        }
        if let Some(attempts) = self.max_challenge_attempts {
            config.recovery.max_challenge_attempts = attempts;
        }
    }
}

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use lex_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Anchor page: {}", config.portal.anchor_url);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_overrides(path, &ConfigOverrides::default())
}

/// Loads a configuration file, applies overrides, then validates the result
///
/// Validation runs after the overrides so an override cannot smuggle in an
/// inverted cooldown band or a zero attempt budget.
pub fn load_config_with_overrides(
    path: &Path,
    overrides: &ConfigOverrides,
) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    overrides.apply(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so a ledger can be matched to the configuration that
/// produced it.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration with overrides and returns both the config and its hash
pub fn load_config_with_hash(
    path: &Path,
    overrides: &ConfigOverrides,
) -> Result<(Config, String), ConfigError> {
    let config = load_config_with_overrides(path, overrides)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
