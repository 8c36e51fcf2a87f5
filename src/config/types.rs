use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Lex-Harvest
///
/// `browser` settings other than the timeouts are for the program that
/// launches the browser and hands the crate a `Page`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the portal lives and how to recognise a healthy page
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    /// Base URL used to resolve portal-relative hrefs
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Anchor page used as the safe place to resolve interruptions
    #[serde(rename = "anchor-url")]
    pub anchor_url: String,

    /// Heading of the homepage section that lists the document categories
    #[serde(rename = "section-title")]
    pub section_title: String,

    /// Heading of the homepage section listing boards and tribunals; their
    /// decisions are harvested as PDFs when set
    #[serde(rename = "decision-section-title", default)]
    pub decision_section_title: Option<String>,

    /// Element that must be present on the anchor page before recovery
    /// declares access restored
    #[serde(rename = "ready-selector", default)]
    pub ready_selector: Option<String>,
}

/// Browser session settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser without a visible window
    ///
    /// The crate drives a `Page` it is handed and never launches a browser
    /// itself; the embedding program reads this when it does.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Upper bound for a single navigation (seconds)
    #[serde(rename = "navigation-timeout-secs", default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Upper bound for waiting on a challenge widget element (seconds)
    #[serde(rename = "widget-timeout-secs", default = "default_widget_timeout")]
    pub widget_timeout_secs: u64,
}

/// Interruption recovery settings
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// Solve attempts per challenge episode
    ///
    /// Never below `consecutive-timeout-limit`, otherwise an episode ends
    /// before a run of widget timeouts can be recognised as a block.
    #[serde(rename = "max-challenge-attempts", default = "default_max_attempts")]
    pub max_challenge_attempts: u32,

    /// Consecutive widget timeouts after which a challenge is treated as a block
    #[serde(rename = "consecutive-timeout-limit", default = "default_timeout_limit")]
    pub consecutive_timeout_limit: u32,

    /// Lower bound of the cooldown band (minutes)
    #[serde(rename = "cooldown-min-minutes", default = "default_cooldown_min")]
    pub cooldown_min_minutes: u32,

    /// Upper bound of the cooldown band (minutes)
    #[serde(rename = "cooldown-max-minutes", default = "default_cooldown_max")]
    pub cooldown_max_minutes: u32,

    /// Cooldown windows per recovery episode before escalating
    #[serde(rename = "max-cooldowns", default = "default_max_cooldowns")]
    pub max_cooldowns: u32,

    /// Poll interval while waiting for a human to clear the page (seconds)
    #[serde(rename = "manual-poll-seconds", default = "default_manual_poll")]
    pub manual_poll_seconds: u64,
}

/// External inference endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// OpenAI-compatible endpoint serving a vision-language model
    #[serde(rename = "vision-endpoint")]
    pub vision_endpoint: String,

    #[serde(rename = "vision-model")]
    pub vision_model: String,

    /// Whisper-compatible transcription endpoint
    #[serde(rename = "speech-endpoint")]
    pub speech_endpoint: String,

    #[serde(rename = "speech-model", default = "default_speech_model")]
    pub speech_model: String,

    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Ledger file locations
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(rename = "tracking-path", default = "default_tracking_path")]
    pub tracking_path: String,

    #[serde(rename = "skipped-path", default = "default_skipped_path")]
    pub skipped_path: String,
}

/// Artifact output settings
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Scratch directory for rendered artifacts awaiting upload
    #[serde(rename = "work-dir", default = "default_work_dir")]
    pub work_dir: String,

    /// Directory backing the local artifact store
    #[serde(rename = "artifact-dir", default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Pause between documents (milliseconds)
    #[serde(rename = "document-delay-ms", default = "default_document_delay")]
    pub document_delay_ms: u64,
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn widget_timeout(&self) -> Duration {
        Duration::from_secs(self.widget_timeout_secs)
    }
}

impl RecoveryConfig {
    pub fn manual_poll_interval(&self) -> Duration {
        Duration::from_secs(self.manual_poll_seconds)
    }
}

impl InferenceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            navigation_timeout_secs: default_navigation_timeout(),
            widget_timeout_secs: default_widget_timeout(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_challenge_attempts: default_max_attempts(),
            consecutive_timeout_limit: default_timeout_limit(),
            cooldown_min_minutes: default_cooldown_min(),
            cooldown_max_minutes: default_cooldown_max(),
            max_cooldowns: default_max_cooldowns(),
            manual_poll_seconds: default_manual_poll(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tracking_path: default_tracking_path(),
            skipped_path: default_skipped_path(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            artifact_dir: default_artifact_dir(),
            document_delay_ms: default_document_delay(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_widget_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    50
}

fn default_timeout_limit() -> u32 {
    5
}

fn default_cooldown_min() -> u32 {
    10
}

fn default_cooldown_max() -> u32 {
    20
}

fn default_max_cooldowns() -> u32 {
    2
}

fn default_manual_poll() -> u64 {
    5
}

fn default_speech_model() -> String {
    "whisper-1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_tracking_path() -> String {
    "download_tracking.json".to_string()
}

fn default_skipped_path() -> String {
    "skipped_documents.json".to_string()
}

fn default_work_dir() -> String {
    "work".to_string()
}

fn default_artifact_dir() -> String {
    "artifacts".to_string()
}

fn default_document_delay() -> u64 {
    500
}
