use crate::config::types::{
    BrowserConfig, Config, InferenceConfig, LedgerConfig, OutputConfig, PortalConfig,
    RecoveryConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_portal_config(&config.portal)?;
    validate_browser_config(&config.browser)?;
    validate_recovery_config(&config.recovery)?;
    validate_inference_config(&config.inference)?;
    validate_ledger_config(&config.ledger)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates portal configuration
fn validate_portal_config(config: &PortalConfig) -> Result<(), ConfigError> {
    validate_http_url("base-url", &config.base_url)?;
    validate_http_url("anchor-url", &config.anchor_url)?;

    if config.section_title.trim().is_empty() {
        return Err(ConfigError::Validation(
            "section-title cannot be empty".to_string(),
        ));
    }

    if let Some(title) = &config.decision_section_title {
        if title.trim().is_empty() {
            return Err(ConfigError::Validation(
                "decision-section-title cannot be blank when set".to_string(),
            ));
        }
    }

    if let Some(selector) = &config.ready_selector {
        if selector.trim().is_empty() {
            return Err(ConfigError::Validation(
                "ready-selector cannot be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates browser configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.navigation_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "navigation-timeout-secs must be >= 1, got {}",
            config.navigation_timeout_secs
        )));
    }

    if config.widget_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "widget-timeout-secs must be >= 1, got {}",
            config.widget_timeout_secs
        )));
    }

    Ok(())
}

/// Validates recovery configuration
fn validate_recovery_config(config: &RecoveryConfig) -> Result<(), ConfigError> {
    if config.max_challenge_attempts < 1 || config.max_challenge_attempts > 100 {
        return Err(ConfigError::Validation(format!(
            "max-challenge-attempts must be between 1 and 100, got {}",
            config.max_challenge_attempts
        )));
    }

    if config.consecutive_timeout_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "consecutive-timeout-limit must be >= 1, got {}",
            config.consecutive_timeout_limit
        )));
    }

    if config.max_challenge_attempts < config.consecutive_timeout_limit {
        return Err(ConfigError::Validation(format!(
            "max-challenge-attempts ({}) must be >= consecutive-timeout-limit ({})",
            config.max_challenge_attempts, config.consecutive_timeout_limit
        )));
    }

    if config.cooldown_min_minutes < 1 {
        return Err(ConfigError::Validation(format!(
            "cooldown-min-minutes must be >= 1, got {}",
            config.cooldown_min_minutes
        )));
    }

    if config.cooldown_max_minutes > 240 {
        return Err(ConfigError::Validation(format!(
            "cooldown-max-minutes must be <= 240, got {}",
            config.cooldown_max_minutes
        )));
    }

    if config.cooldown_min_minutes > config.cooldown_max_minutes {
        return Err(ConfigError::Validation(format!(
            "cooldown band is inverted: min {} > max {}",
            config.cooldown_min_minutes, config.cooldown_max_minutes
        )));
    }

    if config.max_cooldowns < 1 || config.max_cooldowns > 10 {
        return Err(ConfigError::Validation(format!(
            "max-cooldowns must be between 1 and 10, got {}",
            config.max_cooldowns
        )));
    }

    if config.manual_poll_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "manual-poll-seconds must be >= 1, got {}",
            config.manual_poll_seconds
        )));
    }

    Ok(())
}

/// Validates inference configuration
fn validate_inference_config(config: &InferenceConfig) -> Result<(), ConfigError> {
    validate_http_url("vision-endpoint", &config.vision_endpoint)?;
    validate_http_url("speech-endpoint", &config.speech_endpoint)?;

    if config.vision_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "vision-model cannot be empty".to_string(),
        ));
    }

    if config.speech_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "speech-model cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    Ok(())
}

/// Validates ledger configuration
fn validate_ledger_config(config: &LedgerConfig) -> Result<(), ConfigError> {
    if config.tracking_path.is_empty() {
        return Err(ConfigError::Validation(
            "tracking-path cannot be empty".to_string(),
        ));
    }

    if config.skipped_path.is_empty() {
        return Err(ConfigError::Validation(
            "skipped-path cannot be empty".to_string(),
        ));
    }

    if config.tracking_path == config.skipped_path {
        return Err(ConfigError::Validation(format!(
            "tracking-path and skipped-path must differ, both are '{}'",
            config.tracking_path
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.work_dir.is_empty() {
        return Err(ConfigError::Validation(
            "work-dir cannot be empty".to_string(),
        ));
    }

    if config.artifact_dir.is_empty() {
        return Err(ConfigError::Validation(
            "artifact-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a URL parses and uses an http(s) scheme
fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}
