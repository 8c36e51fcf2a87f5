//! Crawl pipeline against a scripted portal

use crate::common::*;
use async_trait::async_trait;
use lex_harvest::browser::{Locator, MemoryPage, Page};
use lex_harvest::crawler::{
    CrawlSettings, Crawler, DocumentOutcome, DocumentRef, LocalArtifactStore,
};
use lex_harvest::ledger::{DocumentKey, DocumentRole, SkipLedger, TrackingStore};
use lex_harvest::solver::{MediaFetcher, SessionContext, SolverResult};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

const CATEGORY_URL: &str = "https://portal.test/en/on/laws/stat/";
const REGULATION_URL: &str = "https://portal.test/en/on/laws/regu/rro-1990-reg-587/latest/";
const REPEALED_URL: &str = "https://portal.test/en/on/laws/stat/old-act/latest/";

const LANDING_HTML: &str = r#"<html><body>
  <div id="legislation-home">
    <button id="understandCookieConsent">I understand</button>
    <section><h2>Legislation</h2><a class="canlii" href="/en/on/laws/stat/">Statutes</a></section>
  </div>
</body></html>"#;

const FIRST_ROW: &str = r#"
  <tr>
    <td><a class="canlii" href="/en/on/laws/stat/rso-1990-c-h8/latest/">Highway Traffic Act</a></td>
    <td class="decisionDate">RSO 1990, c H.8</td>
    <td>
      <a class="pointer text-nowrap">Regulations <i class="fa fa-angle-up"></i></a>
      <div id="regulation_1">
        <div class="pt-1">In force</div>
        <ul><li><a href="/en/on/laws/regu/rro-1990-reg-587/latest/">Equipment</a>, <span class="nowrap">RRO 1990, Reg 587</span></li></ul>
        <div class="pt-1">Repealed</div>
        <ul><li><a href="/en/on/laws/regu/gone/">Gone</a></li></ul>
      </div>
    </td>
  </tr>"#;

const SECOND_ROW: &str = r#"
  <tr>
    <td><a class="canlii" href="/en/on/laws/stat/old-act/latest/">Old Act</a></td>
    <td class="decisionDate">RSO 1980, c 1</td>
  </tr>"#;

fn listing(rows: &str, show_more: bool) -> String {
    let more = if show_more {
        r#"<span class="showMoreResults">Show more results</span>"#
    } else {
        ""
    };
    format!(
        r#"<html><body><div id="legislation-home"><table id="legislationsContainer">{}</table>{}</div></body></html>"#,
        rows, more
    )
}

fn document(title: &str, warning: Option<&str>) -> String {
    let warnings = warning
        .map(|w| format!(r#"<div id="warnings"><div class="warning">{}</div></div>"#, w))
        .unwrap_or_default();
    format!(
        r#"<html><body><div id="legislation-home">{}<h1 class="main-title">{}</h1>
           <div id="docCont"><section><p>1. In this Act,</p></section></div></div></body></html>"#,
        warnings, title
    )
}

/// A portal with one category: a statute with a nested regulation, and a
/// repealed statute revealed by "show more"
fn portal() -> MemoryPage {
    let page = MemoryPage::new("about:blank", "<html><body></body></html>");
    page.route(ANCHOR_URL, LANDING_HTML);
    page.route(CATEGORY_URL, &listing(FIRST_ROW, true));
    page.route(DOCUMENT_URL, &document("Highway Traffic Act", None));
    page.route(REGULATION_URL, &document("Equipment", None));
    page.route(REPEALED_URL, &document("Old Act", Some("Repealed on January 1, 2000")));

    let full = listing(&format!("{}{}", FIRST_ROW, SECOND_ROW), false);
    page.on_click(Locator::css("span.showMoreResults"), move |scene| {
        scene.set_main_html(&full)
    });
    page
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn settings(&self) -> CrawlSettings {
        CrawlSettings {
            base_url: Url::parse(BASE_URL).unwrap(),
            anchor_url: ANCHOR_URL.to_string(),
            section_title: "Legislation".to_string(),
            decision_section_title: None,
            work_dir: self.path("work"),
            artifact_dir: self.path("artifacts"),
            document_delay: Duration::from_millis(500),
            navigation_timeout: Duration::from_secs(30),
            listing_settle: Duration::from_millis(1500),
        }
    }

    fn crawler(&self, page: &MemoryPage) -> Crawler {
        self.crawler_with(page, self.settings())
    }

    fn crawler_with(&self, page: &MemoryPage, settings: CrawlSettings) -> Crawler {
        let (orchestrator, _observer) =
            orchestrator(solver("", 3, 5), recovery_settings(Some(READY_SELECTOR), 2));
        Crawler::new(
            Arc::new(page.clone()) as Arc<dyn Page>,
            orchestrator,
            TrackingStore::load(self.path("tracking.json")).unwrap(),
            SkipLedger::load(self.path("skipped.json")).unwrap(),
            settings,
        )
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn highway_ref() -> DocumentRef {
    DocumentRef {
        href: "/en/on/laws/stat/rso-1990-c-h8/latest/".to_string(),
        title: "Highway Traffic Act".to_string(),
        citation: "RSO 1990, c H.8".to_string(),
        role: DocumentRole::Main,
        parent_title: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_crawl() {
    let workspace = Workspace::new();
    let page = portal();
    let mut crawler = workspace.crawler(&page);

    let report = crawler.run().await.unwrap();

    assert_eq!(report.categories, 1);
    assert_eq!(report.discovered, 3);
    assert_eq!(report.completed, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(
        file_names(&workspace.path("artifacts")),
        vec![
            "RRO 1990, Reg 587_Equipment.html".to_string(),
            "RSO 1990, c H.8_Highway Traffic Act.html".to_string(),
        ]
    );
    assert!(file_names(&workspace.path("work")).is_empty());

    assert_eq!(crawler.tracking().len(), 2);
    assert!(crawler
        .tracking()
        .is_complete(&DocumentKey::new(DocumentRole::Regulation, REGULATION_URL)));
    assert_eq!(crawler.skipped().len(), 1);
    assert_eq!(crawler.skipped().entries()[0].url, REPEALED_URL);

    assert_eq!(page.click_count(&Locator::css("#understandCookieConsent")), 1);
    assert_eq!(page.click_count(&Locator::css("span.showMoreResults")), 1);

    let stored = fs::read_to_string(workspace.path("artifacts").join("RSO 1990, c H.8_Highway Traffic Act.html")).unwrap();
    assert!(stored.contains("<h1>Highway Traffic Act</h1>"));
    assert!(stored.contains("1. In this Act,"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_skips_completed_documents_without_navigation() {
    let workspace = Workspace::new();
    {
        let page = portal();
        workspace.crawler(&page).run().await.unwrap();
    }

    let page = portal();
    let mut crawler = workspace.crawler(&page);
    let report = crawler.run().await.unwrap();

    assert_eq!(report.already_complete, 2);
    assert_eq!(report.completed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(crawler.tracking().len(), 2);
    assert_eq!(crawler.skipped().len(), 1);

    let navigations = page.navigations();
    assert!(!navigations.iter().any(|u| u == DOCUMENT_URL));
    assert!(!navigations.iter().any(|u| u == REGULATION_URL));
}

#[tokio::test(start_paused = true)]
async fn test_interruption_mid_document_is_recovered_and_navigation_reissued() {
    let workspace = Workspace::new();
    let page = MemoryPage::new("about:blank", "<html><body></body></html>");
    page.route(ANCHOR_URL, LANDING_HTML);

    let visits = Arc::new(AtomicUsize::new(0));
    let counter = visits.clone();
    let healthy = document("Highway Traffic Act", None);
    page.on_goto(DOCUMENT_URL, move |scene| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            scene.set_main_html(RESTRICTED_HTML);
        } else {
            scene.set_main_html(&healthy);
        }
    });

    let mut crawler = workspace.crawler(&page);
    let outcome = crawler.process_document(&highway_ref()).await;

    assert_eq!(
        outcome,
        DocumentOutcome::Completed {
            storage_key: "RSO 1990, c H.8_Highway Traffic Act.html".to_string()
        }
    );
    assert_eq!(
        page.navigations(),
        vec![
            DOCUMENT_URL.to_string(),
            ANCHOR_URL.to_string(),
            DOCUMENT_URL.to_string(),
        ]
    );
    assert_eq!(visits.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_existing_artifact_is_recorded_without_rendering() {
    let workspace = Workspace::new();
    let artifacts = workspace.path("artifacts");
    fs::create_dir_all(&artifacts).unwrap();
    let existing = artifacts.join("RSO 1990, c H.8_Highway Traffic Act.html");
    fs::write(&existing, "uploaded earlier").unwrap();

    let page = portal();
    let mut crawler = workspace
        .crawler(&page)
        .with_store(Box::new(LocalArtifactStore::new(&artifacts)));
    let outcome = crawler.process_document(&highway_ref()).await;

    assert!(matches!(outcome, DocumentOutcome::Completed { .. }));
    assert_eq!(fs::read_to_string(&existing).unwrap(), "uploaded earlier");
    assert!(crawler.tracking().is_complete(&highway_ref().key()));
}

#[tokio::test(start_paused = true)]
async fn test_legacy_ledger_entry_short_circuits() {
    let workspace = Workspace::new();
    fs::write(
        workspace.path("tracking.json"),
        r#"{"processed_documents": ["main_/en/on/laws/stat/rso-1990-c-h8/latest/"]}"#,
    )
    .unwrap();

    let page = portal();
    let mut crawler = workspace.crawler(&page);
    let outcome = crawler.process_document(&highway_ref()).await;

    assert_eq!(outcome, DocumentOutcome::AlreadyComplete);
    assert!(page.navigations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_document_fails_without_recording() {
    let workspace = Workspace::new();
    let page = portal();
    page.fail_navigation_to(DOCUMENT_URL);

    let mut crawler = workspace.crawler(&page);
    let outcome = crawler.process_document(&highway_ref()).await;

    assert!(matches!(outcome, DocumentOutcome::Failed { .. }));
    assert!(!crawler.tracking().is_complete(&highway_ref().key()));
}

const TRIBUNAL_URL: &str = "https://portal.test/en/on/onltb/";
const YEAR_INDEX_URL: &str = "https://portal.test/en/on/onltb/nav/date/";
const YEAR_URL: &str = "https://portal.test/en/on/onltb/nav/date/2024/";
const DECISION_URL: &str = "https://portal.test/en/on/onltb/doc/2024/2024onltb1/2024onltb1.html";
const DECISION_PDF_URL: &str = "https://portal.test/en/on/onltb/doc/2024/2024onltb1/2024onltb1.pdf";
const NO_PDF_URL: &str = "https://portal.test/en/on/onltb/doc/2024/2024onltb2/2024onltb2.html";

const TRIBUNALS_LANDING: &str = r#"<html><body><div id="legislation-home">
  <section><h2>Boards and Tribunals</h2><a class="canlii" href="/en/on/onltb/">Landlord and Tenant Board</a></section>
</div></body></html>"#;

#[derive(Default)]
struct PdfFetcher {
    requests: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl MediaFetcher for PdfFetcher {
    async fn fetch(&self, url: &str, session: &SessionContext) -> SolverResult<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), session.referer.clone()));
        Ok(b"%PDF-1.4".to_vec())
    }
}

/// One tribunal with one year holding a downloadable decision and one without a PDF
fn tribunal_portal() -> MemoryPage {
    let page = MemoryPage::new("about:blank", "<html><body></body></html>");
    page.route(ANCHOR_URL, TRIBUNALS_LANDING);
    page.route(
        TRIBUNAL_URL,
        r#"<html><body><div id="legislation-home"><a href="/en/on/onltb/nav/date/">more, by year</a></div></body></html>"#,
    );
    page.route(
        YEAR_INDEX_URL,
        r#"<html><body><div id="legislation-home"><select id="navYearsSelector">
             <option value="/en/on/onltb/nav/date/2024/">2024</option>
           </select></div></body></html>"#,
    );
    page.route(
        YEAR_URL,
        r#"<html><body><div id="legislation-home"><table id="decisionsListing">
             <tr><td><a class="canlii" href="/en/on/onltb/doc/2024/2024onltb1/2024onltb1.html">Tenant v Landlord</a></td></tr>
             <tr><td><a class="canlii" href="/en/on/onltb/doc/2024/2024onltb2/2024onltb2.html">Re Smith</a></td></tr>
           </table></div></body></html>"#,
    );
    page.route(
        DECISION_URL,
        r#"<html><body><div id="legislation-home"><h1 class="main-title">Tenant v Landlord, 2024 ONLTB 1</h1>
             <a id="pdf-link" href="/en/on/onltb/doc/2024/2024onltb1/2024onltb1.pdf">PDF</a></div></body></html>"#,
    );
    page.route(
        NO_PDF_URL,
        r#"<html><body><div id="legislation-home"><h1 class="main-title">Re Smith</h1></div></body></html>"#,
    );
    page
}

#[tokio::test(start_paused = true)]
async fn test_tribunal_decisions_are_downloaded() {
    let workspace = Workspace::new();
    let page = tribunal_portal();
    let fetcher = Arc::new(PdfFetcher::default());
    let settings = CrawlSettings {
        decision_section_title: Some("Boards and Tribunals".to_string()),
        ..workspace.settings()
    };
    let mut crawler = workspace
        .crawler_with(&page, settings)
        .with_media(fetcher.clone() as Arc<dyn MediaFetcher>);

    let report = crawler.run().await.unwrap();

    assert_eq!(report.tribunals, 1);
    assert_eq!(report.discovered, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);

    let stored = workspace
        .path("artifacts")
        .join("Tenant v Landlord, 2024 ONLTB 1.pdf");
    assert_eq!(fs::read(&stored).unwrap(), b"%PDF-1.4");
    assert!(file_names(&workspace.path("work")).is_empty());

    assert_eq!(
        fetcher.requests.lock().unwrap().clone(),
        vec![(DECISION_PDF_URL.to_string(), Some(format!("{}/", BASE_URL)))]
    );

    let key = DocumentKey::new(DocumentRole::Decision, DECISION_URL);
    assert!(crawler.tracking().is_complete(&key));
    let record = &crawler.tracking().documents()[0];
    assert_eq!(record.pdf_url.as_deref(), Some(DECISION_PDF_URL));
    assert_eq!(record.title, "Tenant v Landlord, 2024 ONLTB 1");

    // no PDF: not recorded anywhere, so a later run looks again
    assert!(!crawler
        .tracking()
        .is_complete(&DocumentKey::new(DocumentRole::Decision, NO_PDF_URL)));
    assert!(crawler.skipped().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_decisions_from_earlier_ledger_are_not_revisited() {
    let workspace = Workspace::new();
    fs::write(
        workspace.path("tracking.json"),
        format!(
            r#"{{"processed_documents": [{{
                "url": "{}",
                "title": "Tenant v Landlord, 2024 ONLTB 1",
                "pdf_url": "{}",
                "s3_key": "Tenant v Landlord, 2024 ONLTB 1.pdf",
                "downloaded_at": "2024-11-30 22:10:00"
            }}]}}"#,
            DECISION_URL, DECISION_PDF_URL
        ),
    )
    .unwrap();

    let page = tribunal_portal();
    let fetcher = Arc::new(PdfFetcher::default());
    let mut crawler = workspace
        .crawler(&page)
        .with_media(fetcher.clone() as Arc<dyn MediaFetcher>);

    let report = crawler.crawl_decision_year(YEAR_URL).await;

    assert_eq!(report.discovered, 2);
    assert_eq!(report.already_complete, 1);
    assert_eq!(report.skipped, 1);
    assert!(!page.navigations().iter().any(|u| u == DECISION_URL));
    assert!(fetcher.requests.lock().unwrap().is_empty());
}
