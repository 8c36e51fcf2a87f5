//! Crawler coordinator - main traversal logic
//!
//! This module walks the portal from the anchor page down to documents:
//! - Opening pages and handing any interruption to the recovery orchestrator
//! - Expanding listings ("show more" and row dropdowns) before collecting refs
//! - Processing documents strictly one at a time
//! - Walking tribunals year by year and downloading decision PDFs
//! - Recording completions and skips in the ledgers

use super::artifact::{storage_key, ArtifactRenderer, ArtifactStore, HtmlArtifactRenderer, LocalArtifactStore};
use super::parser::{
    parse_category_links, parse_decision_listing, parse_decision_page, parse_document,
    parse_listing, parse_year_link, parse_year_options, DocumentRef,
};
use crate::browser::{Locator, Page, WaitUntil};
use crate::config::Config;
use crate::ledger::{SkipLedger, SkippedDocument, TrackedDocument, TrackingStore};
use crate::recovery::RecoveryOrchestrator;
use crate::solver::{click_with_fallback, MediaFetcher, SessionContext};
use crate::HarvestError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const COOKIE_ACCEPT: &str = "#understandCookieConsent";
const COOKIE_ACCEPT_SCRIPT: &str = "document.getElementById('understandCookieConsent').click()";
const SHOW_MORE: &str = "span.showMoreResults";
const MAX_SHOW_MORE: usize = 200;

/// Recovery rounds per navigation before the item is given up
const MAX_RECOVERIES: usize = 2;

/// Clicks every collapsed row dropdown and returns how many were opened
pub const EXPAND_DROPDOWNS_SCRIPT: &str = "(() => { let n = 0; \
document.querySelectorAll('#legislationsContainer a.pointer.text-nowrap').forEach(el => { \
if (!el.querySelector('i.fa-angle-up')) { el.click(); n += 1; } }); return n; })()";

/// Result of processing one document reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// The ledger already had the key; nothing was touched
    AlreadyComplete,
    Completed { storage_key: String },
    /// The portal marks the document as not in force
    Skipped { reason: String },
    Failed { reason: String },
}

/// Tally of a crawl or of one category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub categories: usize,
    pub failed_categories: usize,
    pub tribunals: usize,
    pub discovered: usize,
    pub completed: usize,
    pub already_complete: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CrawlReport {
    pub fn record(&mut self, outcome: &DocumentOutcome) {
        match outcome {
            DocumentOutcome::AlreadyComplete => self.already_complete += 1,
            DocumentOutcome::Completed { .. } => self.completed += 1,
            DocumentOutcome::Skipped { .. } => self.skipped += 1,
            DocumentOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &CrawlReport) {
        self.categories += other.categories;
        self.failed_categories += other.failed_categories;
        self.tribunals += other.tribunals;
        self.discovered += other.discovered;
        self.completed += other.completed;
        self.already_complete += other.already_complete;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Traversal knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_url: Url,
    pub anchor_url: String,
    pub section_title: String,
    pub decision_section_title: Option<String>,
    pub work_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub document_delay: Duration,
    pub navigation_timeout: Duration,
    pub listing_settle: Duration,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Ok(Self {
            base_url: Url::parse(&config.portal.base_url)?,
            anchor_url: config.portal.anchor_url.clone(),
            section_title: config.portal.section_title.clone(),
            decision_section_title: config.portal.decision_section_title.clone(),
            work_dir: PathBuf::from(&config.output.work_dir),
            artifact_dir: PathBuf::from(&config.output.artifact_dir),
            document_delay: Duration::from_millis(config.output.document_delay_ms),
            navigation_timeout: config.browser.navigation_timeout(),
            listing_settle: Duration::from_millis(1500),
        })
    }
}

/// Main crawler structure
///
/// Owns the ledgers and drives a single page; every step is sequential.
pub struct Crawler {
    page: Arc<dyn Page>,
    orchestrator: RecoveryOrchestrator,
    tracking: TrackingStore,
    skipped: SkipLedger,
    store: Box<dyn ArtifactStore>,
    renderer: Box<dyn ArtifactRenderer>,
    media: Arc<dyn MediaFetcher>,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(
        page: Arc<dyn Page>,
        orchestrator: RecoveryOrchestrator,
        tracking: TrackingStore,
        skipped: SkipLedger,
        settings: CrawlSettings,
    ) -> Self {
        let store = Box::new(LocalArtifactStore::new(settings.artifact_dir.clone()));
        let media = orchestrator.solver().media();
        Self {
            page,
            orchestrator,
            tracking,
            skipped,
            store,
            renderer: Box::new(HtmlArtifactRenderer),
            media,
            settings,
        }
    }

    /// Creates a crawler with ledgers, inference clients and a local store from the configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ledgers loaded (legacy layouts upgraded in memory)
    /// * `Err(HarvestError)` - A ledger is corrupt or a client could not be built
    pub fn from_config(config: &Config, page: Arc<dyn Page>) -> crate::Result<Self> {
        let tracking = TrackingStore::load(&config.ledger.tracking_path)?;
        let skipped = SkipLedger::load(&config.ledger.skipped_path)?;
        tracing::info!(
            "Loaded ledgers: {} complete, {} skipped",
            tracking.len(),
            skipped.len()
        );

        Ok(Self::new(
            page,
            RecoveryOrchestrator::from_config(config)?,
            tracking,
            skipped,
            CrawlSettings::from_config(config)?,
        ))
    }

    pub fn with_store(mut self, store: Box<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn ArtifactRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replaces the fetcher used for decision PDFs
    pub fn with_media(mut self, media: Arc<dyn MediaFetcher>) -> Self {
        self.media = media;
        self
    }

    pub fn tracking(&self) -> &TrackingStore {
        &self.tracking
    }

    pub fn skipped(&self) -> &SkipLedger {
        &self.skipped
    }

    pub fn orchestrator(&self) -> &RecoveryOrchestrator {
        &self.orchestrator
    }

    /// Navigates to `url`, recovering from interruptions and re-issuing the navigation
    async fn open(&self, url: &str) -> Result<(), String> {
        let page = self.page.as_ref();

        for round in 0..=MAX_RECOVERIES {
            let navigation = tokio::time::timeout(
                self.settings.navigation_timeout,
                page.goto(url, WaitUntil::Load),
            )
            .await;
            let nav_error = match navigation {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!(
                    "navigation to {} timed out after {:?}",
                    url, self.settings.navigation_timeout
                )),
            };
            if let Some(error) = &nav_error {
                tracing::warn!("{}", error);
            }

            let state = self.orchestrator.classifier().classify(page).await;
            if state.is_normal() {
                return nav_error.map_or(Ok(()), Err);
            }

            tracing::warn!("{} interrupted: {}", url, state);
            if round == MAX_RECOVERIES {
                break;
            }
            if !self.orchestrator.handle_interruption(page).await {
                return Err(format!("could not recover from {} on {}", state, url));
            }
            tracing::info!("Resuming {} after recovery", url);
        }

        Err(format!(
            "{} still interrupted after {} recoveries",
            url, MAX_RECOVERIES
        ))
    }

    /// Processes one document reference end to end
    ///
    /// # Arguments
    ///
    /// * `doc` - Reference collected from a listing
    ///
    /// # Returns
    ///
    /// The outcome; errors are logged and folded into `DocumentOutcome::Failed`
    pub async fn process_document(&mut self, doc: &DocumentRef) -> DocumentOutcome {
        if self.tracking.is_complete(&doc.key()) {
            tracing::info!("Skipping {} (already processed)", doc.title);
            return DocumentOutcome::AlreadyComplete;
        }

        match self.harvest(doc).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error processing document {}: {}", doc.title, e);
                DocumentOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn harvest(&mut self, doc: &DocumentRef) -> crate::Result<DocumentOutcome> {
        let url = self.settings.base_url.join(&doc.href)?.to_string();

        self.open(&url)
            .await
            .map_err(|message| HarvestError::Content {
                url: url.clone(),
                message,
            })?;

        let html = self.page.content().await?;
        let parsed = parse_document(&html);

        if let Some(warning) = parsed.inactive_warning() {
            let reason = warning.to_string();
            let skip = SkippedDocument::new(&doc.title, &doc.href, &url, &reason);
            if let Err(e) = self.skipped.record(skip) {
                tracing::error!("Failed to record skip for {}: {}", doc.title, e);
            }
            return Ok(DocumentOutcome::Skipped { reason });
        }

        let content = parsed.content_html.ok_or_else(|| HarvestError::Content {
            url: url.clone(),
            message: "content element not found".to_string(),
        })?;
        let title = parsed.title.unwrap_or_else(|| "Untitled Document".to_string());

        let key = storage_key(&doc.citation, &doc.title, self.renderer.extension());
        if self.store.exists(&key).await? {
            tracing::info!("{} already in store, recording only", key);
        } else {
            let local = self
                .renderer
                .render(&title, &content, &self.settings.work_dir.join(&key))?;
            self.store.put(&key, &local).await?;
            if let Err(e) = std::fs::remove_file(&local) {
                tracing::warn!("Failed to delete {}: {}", local.display(), e);
            }
        }

        let record = TrackedDocument::new(doc.key(), doc.role, &url, &doc.title, &key)
            .with_citation(&doc.citation);
        if let Err(e) = self.tracking.mark_complete(record) {
            tracing::error!("Ledger write failed for {}, continuing in memory: {}", doc.title, e);
        }

        Ok(DocumentOutcome::Completed { storage_key: key })
    }

    /// Downloads one decision PDF and records it
    ///
    /// A decision page without a PDF link is skipped and left out of both
    /// ledgers, so a later run looks at it again.
    pub async fn process_decision(&mut self, doc: &DocumentRef) -> DocumentOutcome {
        if self.tracking.is_complete(&doc.key()) {
            tracing::info!("Skipping {} (already processed)", doc.title);
            return DocumentOutcome::AlreadyComplete;
        }

        match self.harvest_decision(doc).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error processing decision {}: {}", doc.title, e);
                DocumentOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn harvest_decision(&mut self, doc: &DocumentRef) -> crate::Result<DocumentOutcome> {
        let url = self.settings.base_url.join(&doc.href)?.to_string();

        self.open(&url)
            .await
            .map_err(|message| HarvestError::Content {
                url: url.clone(),
                message,
            })?;

        let parsed = parse_decision_page(&self.page.content().await?);
        let Some(pdf_href) = parsed.pdf_href else {
            tracing::debug!("No PDF offered for {}", url);
            return Ok(DocumentOutcome::Skipped {
                reason: "no PDF link".to_string(),
            });
        };
        let pdf_url = self.settings.base_url.join(&pdf_href)?.to_string();

        let title = parsed.title.unwrap_or_else(|| {
            url.trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        });
        let key = storage_key("", &title, "pdf");

        if self.store.exists(&key).await? {
            tracing::info!("{} already in store, recording only", key);
        } else {
            let session =
                SessionContext::capture(self.page.as_ref(), Some(self.settings.base_url.to_string()))
                    .await?;
            let bytes = self.media.fetch(&pdf_url, &session).await?;

            std::fs::create_dir_all(&self.settings.work_dir)?;
            let local = self.settings.work_dir.join(&key);
            std::fs::write(&local, &bytes)?;
            tracing::info!("Downloaded {} ({} bytes)", key, bytes.len());

            self.store.put(&key, &local).await?;
            if let Err(e) = std::fs::remove_file(&local) {
                tracing::warn!("Failed to delete {}: {}", local.display(), e);
            }
        }

        let record =
            TrackedDocument::new(doc.key(), doc.role, &url, &title, &key).with_pdf_url(&pdf_url);
        if let Err(e) = self.tracking.mark_complete(record) {
            tracing::error!("Ledger write failed for {}, continuing in memory: {}", title, e);
        }

        Ok(DocumentOutcome::Completed { storage_key: key })
    }

    /// Loads every row of a listing, clicking "show more" and opening dropdowns
    async fn expand_listing(&self, url: &str) {
        let page = self.page.as_ref();
        let show_more = Locator::css(SHOW_MORE);

        for _ in 0..MAX_SHOW_MORE {
            match page.count(&show_more).await {
                Ok(n) if n > 0 => {}
                _ => break,
            }
            if let Err(e) = click_with_fallback(page, &show_more).await {
                tracing::debug!("Show more stopped: {}", e);
                break;
            }
            tokio::time::sleep(self.settings.listing_settle).await;

            let state = self.orchestrator.classifier().classify(page).await;
            if !state.is_normal() {
                tracing::warn!("Interruption while paginating {}: {}", url, state);
                if !self.orchestrator.handle_interruption(page).await || self.open(url).await.is_err() {
                    break;
                }
            }
        }

        match page.evaluate(EXPAND_DROPDOWNS_SCRIPT).await {
            Ok(opened) => {
                if let Some(n) = opened.as_u64().filter(|n| *n > 0) {
                    tracing::debug!("Expanded {} dropdowns", n);
                    tokio::time::sleep(Duration::from_millis(800)).await;
                }
            }
            Err(e) => tracing::debug!("Could not expand dropdowns: {}", e),
        }
    }

    /// Collects every reference in a category, then processes them one by one
    pub async fn crawl_category(&mut self, url: &str) -> CrawlReport {
        let mut report = CrawlReport {
            categories: 1,
            ..Default::default()
        };

        if let Err(reason) = self.open(url).await {
            tracing::error!("Skipping category {}: {}", url, reason);
            report.failed_categories += 1;
            return report;
        }

        self.expand_listing(url).await;

        let refs = match self.page.content().await {
            Ok(html) => parse_listing(&html),
            Err(e) => {
                tracing::error!("Could not read listing {}: {}", url, e);
                report.failed_categories += 1;
                return report;
            }
        };
        report.discovered = refs.len();
        tracing::info!("Collected {} items from {}", refs.len(), url);

        let total = refs.len();
        for (i, doc) in refs.iter().enumerate() {
            match &doc.parent_title {
                Some(parent) => tracing::info!(
                    "Processing item {}/{}: {} [{} of '{}']",
                    i + 1,
                    total,
                    doc.title,
                    doc.role,
                    parent
                ),
                None => tracing::info!("Processing item {}/{}: {}", i + 1, total, doc.title),
            }

            let outcome = self.process_document(doc).await;
            report.record(&outcome);

            if outcome != DocumentOutcome::AlreadyComplete && i + 1 < total {
                tokio::time::sleep(self.settings.document_delay).await;
            }
        }

        report
    }

    /// Walks a tribunal's decisions year by year
    pub async fn crawl_tribunal(&mut self, url: &str) -> CrawlReport {
        let mut report = CrawlReport {
            tribunals: 1,
            ..Default::default()
        };

        if let Err(reason) = self.open(url).await {
            tracing::error!("Skipping tribunal {}: {}", url, reason);
            report.failed_categories += 1;
            return report;
        }

        let year_link = match self.page.content().await {
            Ok(html) => parse_year_link(&html),
            Err(e) => {
                tracing::error!("Could not read tribunal page {}: {}", url, e);
                None
            }
        };
        let Some(index_url) = year_link.and_then(|href| self.settings.base_url.join(&href).ok()) else {
            tracing::warn!("No 'more, by year' link on {}", url);
            return report;
        };

        let index_url = index_url.to_string();
        if let Err(reason) = self.open(&index_url).await {
            tracing::error!("Skipping tribunal {}: {}", url, reason);
            report.failed_categories += 1;
            return report;
        }

        let years = match self.page.content().await {
            Ok(html) => parse_year_options(&html),
            Err(e) => {
                tracing::error!("Could not read year index {}: {}", index_url, e);
                report.failed_categories += 1;
                return report;
            }
        };
        tracing::info!("Found {} years for {}", years.len(), board_name(url));

        for year in years {
            let year_url = match self.settings.base_url.join(&year.href) {
                Ok(year_url) => year_url.to_string(),
                Err(e) => {
                    tracing::warn!("Bad year link {}: {}", year.href, e);
                    continue;
                }
            };
            tracing::info!("Visiting year {} of {}", year.label, board_name(url));
            let listed = self.crawl_decision_year(&year_url).await;
            report.merge(&listed);
        }

        report
    }

    /// Processes every decision listed for one year
    pub async fn crawl_decision_year(&mut self, url: &str) -> CrawlReport {
        let mut report = CrawlReport::default();

        if let Err(reason) = self.open(url).await {
            tracing::error!("Skipping year {}: {}", url, reason);
            report.failed_categories += 1;
            return report;
        }

        let refs = match self.page.content().await {
            Ok(html) => parse_decision_listing(&html),
            Err(e) => {
                tracing::error!("Could not read decisions {}: {}", url, e);
                report.failed_categories += 1;
                return report;
            }
        };
        if refs.is_empty() {
            tracing::warn!("No decisions listed on {}", url);
        }
        report.discovered = refs.len();

        let pending: Vec<&DocumentRef> = refs
            .iter()
            .filter(|doc| !self.tracking.is_complete(&doc.key()))
            .collect();
        report.already_complete = refs.len() - pending.len();
        if report.already_complete > 0 {
            tracing::info!("Skipping {} previously processed decisions", report.already_complete);
        }

        let total = pending.len();
        for (i, doc) in pending.into_iter().enumerate() {
            tracing::info!("[{}/{}] Processing decision {}", i + 1, total, doc.title);
            let outcome = self.process_decision(doc).await;
            report.record(&outcome);

            if i + 1 < total {
                tokio::time::sleep(self.settings.document_delay).await;
            }
        }

        report
    }

    async fn dismiss_cookie_banner(&self) {
        let page = self.page.as_ref();
        let accept = Locator::css(COOKIE_ACCEPT);
        if !matches!(page.count(&accept).await, Ok(n) if n > 0) {
            return;
        }

        if let Err(e) = click_with_fallback(page, &accept).await {
            tracing::debug!("Cookie button click failed ({}), using script", e);
            if let Err(e) = page.evaluate(COOKIE_ACCEPT_SCRIPT).await {
                tracing::warn!("Continuing without accepting cookies: {}", e);
                return;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    /// Runs the whole crawl from the anchor page
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - Totals across all categories
    /// * `Err(HarvestError)` - The anchor page could not be opened
    pub async fn run(&mut self) -> crate::Result<CrawlReport> {
        let anchor = self.settings.anchor_url.clone();
        tracing::info!("Starting crawl at {}", anchor);

        self.open(&anchor)
            .await
            .map_err(|message| HarvestError::Content {
                url: anchor.clone(),
                message,
            })?;
        self.dismiss_cookie_banner().await;

        let html = self.page.content().await?;
        let categories = parse_category_links(&html, &self.settings.section_title);
        if categories.is_empty() {
            tracing::warn!(
                "No category links under '{}' on {}",
                self.settings.section_title,
                anchor
            );
        }

        let tribunals = match &self.settings.decision_section_title {
            Some(title) => parse_category_links(&html, title),
            None => Vec::new(),
        };

        let mut report = CrawlReport::default();
        for href in categories {
            let url = match self.settings.base_url.join(&href) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    tracing::warn!("Bad category link {}: {}", href, e);
                    report.failed_categories += 1;
                    continue;
                }
            };
            tracing::info!("Crawling category {}", url);
            let category = self.crawl_category(&url).await;
            report.merge(&category);
        }

        for href in tribunals {
            let url = match self.settings.base_url.join(&href) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    tracing::warn!("Bad tribunal link {}: {}", href, e);
                    report.failed_categories += 1;
                    continue;
                }
            };
            tracing::info!("Processing tribunal {}", url);
            let tribunal = self.crawl_tribunal(&url).await;
            report.merge(&tribunal);
        }

        tracing::info!(
            "Crawl finished: {} completed, {} already done, {} skipped, {} failed",
            report.completed,
            report.already_complete,
            report.skipped,
            report.failed
        );
        Ok(report)
    }
}

/// Last path segment of a tribunal URL
fn board_name(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}
