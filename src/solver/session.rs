//! Out-of-band media fetches that reuse the browser session
//!
//! The challenge provider serves audio only to the session that requested
//! the challenge, so the fetch carries the browser's cookies and user agent.

use super::{SolverError, SolverResult};
use crate::browser::{cookie_header, BrowserCookie, BrowserResult, Page};
use async_trait::async_trait;
use reqwest::header::{COOKIE, REFERER, USER_AGENT};
use std::time::Duration;

/// Session identity copied from the browser
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub cookies: Vec<BrowserCookie>,
    pub user_agent: String,
    pub referer: Option<String>,
}

impl SessionContext {
    /// Captures cookies and user agent from the page
    pub async fn capture(page: &dyn Page, referer: Option<String>) -> BrowserResult<Self> {
        Ok(Self {
            cookies: page.cookies().await?,
            user_agent: page.user_agent().await?,
            referer,
        })
    }
}

/// Fetches challenge media
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, session: &SessionContext) -> SolverResult<Vec<u8>>;
}

/// `MediaFetcher` over HTTP
pub struct SessionFetcher {
    http: reqwest::Client,
}

impl SessionFetcher {
    pub fn new(timeout: Duration) -> SolverResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SolverError::Media(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl MediaFetcher for SessionFetcher {
    async fn fetch(&self, url: &str, session: &SessionContext) -> SolverResult<Vec<u8>> {
        let mut request = self.http.get(url);
        if !session.cookies.is_empty() {
            request = request.header(COOKIE, cookie_header(&session.cookies));
        }
        if !session.user_agent.is_empty() {
            request = request.header(USER_AGENT, session.user_agent.as_str());
        }
        if let Some(referer) = &session.referer {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SolverError::Media(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SolverError::Media(format!("GET {} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SolverError::Media(format!("Reading {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}
