//! Browser collaborator interface
//!
//! The crawl drives a real browser through these traits; this crate only
//! depends on the capability, not on a particular automation library.
//!
//! # Components
//!
//! - `Frame`: DOM queries and interaction within one document
//! - `Page`: the top-level document plus navigation, frames and session data
//! - `poll_until`: the single poll-with-timeout primitive used for every wait
//! - `MemoryPage`: an in-memory page backed by stored HTML

pub mod memory;
mod poll;

pub use memory::{MemoryPage, MemoryScene};
pub use poll::{poll_until, PollResult};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the browser collaborator
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("No element matches {0}")]
    ElementNotFound(String),

    #[error("Click on {0} was intercepted by another element")]
    ClickIntercepted(String),

    #[error("Frame {0} is detached")]
    FrameDetached(String),

    #[error("Invalid selector {0}")]
    InvalidSelector(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for browser operations
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// How an element is located
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// CSS selector
    Css(String),

    /// Case-insensitive text match on the innermost element containing the text
    Text(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn text(needle: impl Into<String>) -> Self {
        Self::Text(needle.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "css={}", selector),
            Self::Text(needle) => write!(f, "text={}", needle),
        }
    }
}

/// Click behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMode {
    Normal,

    /// Dispatch the click even if an overlay would intercept it
    Forced,
}

/// Navigation completion condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

/// A cookie from the browser context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

impl BrowserCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
        }
    }
}

/// Formats cookies as a `Cookie` request header value
pub fn cookie_header(cookies: &[BrowserCookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One document (the top-level page or an embedded frame)
#[async_trait]
pub trait Frame: Send + Sync {
    fn name(&self) -> String;

    fn url(&self) -> String;

    /// Number of elements matching the locator
    async fn count(&self, locator: &Locator) -> BrowserResult<usize>;

    /// Rendered text of the first match, `None` if nothing matches
    async fn inner_text(&self, locator: &Locator) -> BrowserResult<Option<String>>;

    /// Rendered text of every match
    async fn all_inner_texts(&self, locator: &Locator) -> BrowserResult<Vec<String>>;

    /// Attribute of the first match
    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>>;

    async fn click(&self, locator: &Locator, mode: ClickMode) -> BrowserResult<()>;

    /// Types `value` into the `index`-th match
    async fn fill(&self, locator: &Locator, index: usize, value: &str) -> BrowserResult<()>;

    /// Raster image of the first match
    async fn screenshot(&self, locator: &Locator) -> BrowserResult<Vec<u8>>;

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;
}

/// The top-level browser page
#[async_trait]
pub trait Page: Frame {
    async fn goto(&self, url: &str, wait: WaitUntil) -> BrowserResult<()>;

    async fn reload(&self) -> BrowserResult<()>;

    /// Every frame of the page, main frame first
    async fn frames(&self) -> BrowserResult<Vec<Arc<dyn Frame>>>;

    async fn cookies(&self) -> BrowserResult<Vec<BrowserCookie>>;

    async fn user_agent(&self) -> BrowserResult<String>;

    async fn current_url(&self) -> BrowserResult<String>;

    /// Serialized HTML of the main document
    async fn content(&self) -> BrowserResult<String>;
}
