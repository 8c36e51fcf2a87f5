//! In-memory browser page
//!
//! `MemoryPage` keeps one HTML string per frame and answers locator queries
//! by parsing it with `scraper`. Navigations, clicks and reloads can be
//! scripted with hooks that rewrite the scene, which is enough to replay
//! saved portal pages and to drive the recovery logic without a browser.

use super::{
    BrowserCookie, BrowserError, BrowserResult, ClickMode, Frame, Locator, Page, WaitUntil,
};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Minimal PNG signature used when no screenshot bytes were configured
const PLACEHOLDER_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

type SceneHook = Box<dyn FnMut(&mut MemoryScene) + Send>;

/// One document held by the page
#[derive(Debug, Clone)]
struct MemoryDocument {
    name: String,
    url: String,
    html: String,
    detached: bool,
}

/// The mutable set of documents a hook may rewrite
#[derive(Debug, Clone)]
pub struct MemoryScene {
    documents: Vec<MemoryDocument>,
}

impl MemoryScene {
    fn new(url: &str, html: &str) -> Self {
        Self {
            documents: vec![MemoryDocument {
                name: String::new(),
                url: url.to_string(),
                html: html.to_string(),
                detached: false,
            }],
        }
    }

    pub fn url(&self) -> &str {
        &self.documents[0].url
    }

    pub fn set_url(&mut self, url: &str) {
        self.documents[0].url = url.to_string();
    }

    /// Replaces the main document and drops every embedded frame
    pub fn load(&mut self, url: &str, html: &str) {
        self.documents.truncate(1);
        self.documents[0].url = url.to_string();
        self.documents[0].html = html.to_string();
    }

    pub fn set_main_html(&mut self, html: &str) {
        self.documents[0].html = html.to_string();
    }

    /// Adds an embedded frame and returns its frame index
    pub fn add_frame(&mut self, name: &str, url: &str, html: &str) -> usize {
        self.documents.push(MemoryDocument {
            name: name.to_string(),
            url: url.to_string(),
            html: html.to_string(),
            detached: false,
        });
        self.documents.len() - 1
    }

    pub fn set_frame_html(&mut self, index: usize, html: &str) {
        if let Some(doc) = self.documents.get_mut(index) {
            doc.html = html.to_string();
        }
    }

    /// Marks a frame as detached; every later query on it fails
    pub fn detach_frame(&mut self, index: usize) {
        if let Some(doc) = self.documents.get_mut(index) {
            doc.detached = true;
        }
    }

    pub fn remove_frames(&mut self) {
        self.documents.truncate(1);
    }

    pub fn frame_count(&self) -> usize {
        self.documents.len()
    }
}

/// Record of what the page was asked to do
#[derive(Debug, Clone, Default)]
struct InteractionLog {
    navigations: Vec<String>,
    clicks: Vec<Locator>,
    fills: Vec<(Locator, usize, String)>,
    reloads: u32,
}

struct MemoryState {
    scene: MemoryScene,
    routes: HashMap<String, String>,
    goto_hooks: Vec<(String, SceneHook)>,
    click_hooks: Vec<(Locator, SceneHook)>,
    reload_hooks: Vec<SceneHook>,
    failing_urls: HashSet<String>,
    intercepted: HashSet<Locator>,
    screenshots: HashMap<Locator, Vec<u8>>,
    eval_results: HashMap<String, serde_json::Value>,
    cookies: Vec<BrowserCookie>,
    user_agent: String,
    log: InteractionLog,
}

/// A `Page` whose frames are HTML strings
///
/// Cloning yields another handle to the same page.
#[derive(Clone)]
pub struct MemoryPage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPage {
    /// Creates a page showing `html` at `url`
    pub fn new(url: &str, html: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                scene: MemoryScene::new(url, html),
                routes: HashMap::new(),
                goto_hooks: Vec::new(),
                click_hooks: Vec::new(),
                reload_hooks: Vec::new(),
                failing_urls: HashSet::new(),
                intercepted: HashSet::new(),
                screenshots: HashMap::new(),
                eval_results: HashMap::new(),
                cookies: Vec::new(),
                user_agent: DEFAULT_USER_AGENT.to_string(),
                log: InteractionLog::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ===== Scripting =====

    /// Serves `html` whenever `url` is navigated to
    pub fn route(&self, url: &str, html: &str) -> &Self {
        self.lock().routes.insert(url.to_string(), html.to_string());
        self
    }

    /// Runs `hook` after every navigation to `url`
    pub fn on_goto<F>(&self, url: &str, hook: F) -> &Self
    where
        F: FnMut(&mut MemoryScene) + Send + 'static,
    {
        self.lock().goto_hooks.push((url.to_string(), Box::new(hook)));
        self
    }

    /// Runs `hook` after every successful click on `locator`, in any frame
    pub fn on_click<F>(&self, locator: Locator, hook: F) -> &Self
    where
        F: FnMut(&mut MemoryScene) + Send + 'static,
    {
        self.lock().click_hooks.push((locator, Box::new(hook)));
        self
    }

    /// Runs `hook` after every reload
    pub fn on_reload<F>(&self, hook: F) -> &Self
    where
        F: FnMut(&mut MemoryScene) + Send + 'static,
    {
        self.lock().reload_hooks.push(Box::new(hook));
        self
    }

    /// Makes navigations to `url` fail
    pub fn fail_navigation_to(&self, url: &str) -> &Self {
        self.lock().failing_urls.insert(url.to_string());
        self
    }

    /// Makes normal clicks on `locator` fail as if an overlay covered it
    pub fn intercept_clicks(&self, locator: Locator) -> &Self {
        self.lock().intercepted.insert(locator);
        self
    }

    pub fn set_screenshot(&self, locator: Locator, bytes: Vec<u8>) -> &Self {
        self.lock().screenshots.insert(locator, bytes);
        self
    }

    pub fn set_eval_result(&self, script: &str, value: serde_json::Value) -> &Self {
        self.lock().eval_results.insert(script.to_string(), value);
        self
    }

    pub fn add_cookie(&self, cookie: BrowserCookie) -> &Self {
        self.lock().cookies.push(cookie);
        self
    }

    pub fn set_user_agent(&self, user_agent: &str) -> &Self {
        self.lock().user_agent = user_agent.to_string();
        self
    }

    /// Applies `f` to the scene directly
    pub fn with_scene<R>(&self, f: impl FnOnce(&mut MemoryScene) -> R) -> R {
        f(&mut self.lock().scene)
    }

    // ===== Inspection =====

    pub fn navigations(&self) -> Vec<String> {
        self.lock().log.navigations.clone()
    }

    pub fn clicks(&self) -> Vec<Locator> {
        self.lock().log.clicks.clone()
    }

    pub fn click_count(&self, locator: &Locator) -> usize {
        self.lock().log.clicks.iter().filter(|l| *l == locator).count()
    }

    /// Values typed into `locator`, as `(index, value)` pairs in order
    pub fn filled(&self, locator: &Locator) -> Vec<(usize, String)> {
        self.lock()
            .log
            .fills
            .iter()
            .filter(|(l, _, _)| l == locator)
            .map(|(_, i, v)| (*i, v.clone()))
            .collect()
    }

    pub fn reload_count(&self) -> u32 {
        self.lock().log.reloads
    }

    // ===== Frame operations shared by the page and its frame handles =====

    fn with_document<T>(
        &self,
        index: usize,
        query: impl FnOnce(&Html) -> BrowserResult<T>,
    ) -> BrowserResult<T> {
        let html = {
            let state = self.lock();
            let doc = state
                .scene
                .documents
                .get(index)
                .ok_or_else(|| BrowserError::FrameDetached(format!("#{}", index)))?;
            if doc.detached {
                return Err(BrowserError::FrameDetached(describe(doc, index)));
            }
            doc.html.clone()
        };
        let parsed = Html::parse_document(&html);
        query(&parsed)
    }

    fn frame_count_of(&self, index: usize, locator: &Locator) -> BrowserResult<usize> {
        self.with_document(index, |html| Ok(select(html, locator)?.len()))
    }

    fn frame_inner_text(&self, index: usize, locator: &Locator) -> BrowserResult<Option<String>> {
        self.with_document(index, |html| {
            Ok(select(html, locator)?.first().map(element_text))
        })
    }

    fn frame_all_inner_texts(&self, index: usize, locator: &Locator) -> BrowserResult<Vec<String>> {
        self.with_document(index, |html| {
            Ok(select(html, locator)?.iter().map(element_text).collect())
        })
    }

    fn frame_attribute(
        &self,
        index: usize,
        locator: &Locator,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        self.with_document(index, |html| {
            Ok(select(html, locator)?
                .first()
                .and_then(|el| el.value().attr(name))
                .map(str::to_string))
        })
    }

    fn frame_click(&self, index: usize, locator: &Locator, mode: ClickMode) -> BrowserResult<()> {
        if self.frame_count_of(index, locator)? == 0 {
            return Err(BrowserError::ElementNotFound(locator.to_string()));
        }

        let mut guard = self.lock();
        if mode == ClickMode::Normal && guard.intercepted.contains(locator) {
            return Err(BrowserError::ClickIntercepted(locator.to_string()));
        }
        guard.log.clicks.push(locator.clone());

        let state = &mut *guard;
        for (target, hook) in state.click_hooks.iter_mut() {
            if target == locator {
                hook(&mut state.scene);
            }
        }
        Ok(())
    }

    fn frame_fill(&self, index: usize, locator: &Locator, at: usize, value: &str) -> BrowserResult<()> {
        if self.frame_count_of(index, locator)? <= at {
            return Err(BrowserError::ElementNotFound(format!("{} [{}]", locator, at)));
        }
        self.lock()
            .log
            .fills
            .push((locator.clone(), at, value.to_string()));
        Ok(())
    }

    fn frame_screenshot(&self, index: usize, locator: &Locator) -> BrowserResult<Vec<u8>> {
        if self.frame_count_of(index, locator)? == 0 {
            return Err(BrowserError::ElementNotFound(locator.to_string()));
        }
        Ok(self
            .lock()
            .screenshots
            .get(locator)
            .cloned()
            .unwrap_or_else(|| PLACEHOLDER_PNG.to_vec()))
    }

    fn frame_evaluate(&self, index: usize, script: &str) -> BrowserResult<serde_json::Value> {
        self.with_document(index, |_| Ok(()))?;
        Ok(self
            .lock()
            .eval_results
            .get(script)
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    fn frame_name(&self, index: usize) -> String {
        self.lock()
            .scene
            .documents
            .get(index)
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    fn frame_url(&self, index: usize) -> String {
        self.lock()
            .scene
            .documents
            .get(index)
            .map(|d| d.url.clone())
            .unwrap_or_default()
    }
}

fn describe(doc: &MemoryDocument, index: usize) -> String {
    if doc.name.is_empty() {
        format!("#{} ({})", index, doc.url)
    } else {
        format!("{} ({})", doc.name, doc.url)
    }
}

/// Evaluates a locator against a parsed document
fn select<'a>(html: &'a Html, locator: &Locator) -> BrowserResult<Vec<ElementRef<'a>>> {
    match locator {
        Locator::Css(css) => {
            let selector = Selector::parse(css)
                .map_err(|e| BrowserError::InvalidSelector(format!("{}: {:?}", css, e)))?;
            Ok(html.select(&selector).collect())
        }
        Locator::Text(needle) => {
            let needle = needle.to_lowercase();
            Ok(html
                .root_element()
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| !is_hidden_element(el))
                .filter(|el| contains_text(el, &needle))
                .filter(|el| {
                    !el.children()
                        .filter_map(ElementRef::wrap)
                        .any(|child| contains_text(&child, &needle))
                })
                .collect())
        }
    }
}

fn is_hidden_element(el: &ElementRef<'_>) -> bool {
    matches!(
        el.value().name(),
        "head" | "script" | "style" | "title" | "noscript" | "template"
    )
}

fn contains_text(el: &ElementRef<'_>, needle: &str) -> bool {
    element_text(el).to_lowercase().contains(needle)
}

/// Text content with whitespace collapsed
fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Frame for MemoryPage {
    fn name(&self) -> String {
        self.frame_name(0)
    }

    fn url(&self) -> String {
        self.frame_url(0)
    }

    async fn count(&self, locator: &Locator) -> BrowserResult<usize> {
        self.frame_count_of(0, locator)
    }

    async fn inner_text(&self, locator: &Locator) -> BrowserResult<Option<String>> {
        self.frame_inner_text(0, locator)
    }

    async fn all_inner_texts(&self, locator: &Locator) -> BrowserResult<Vec<String>> {
        self.frame_all_inner_texts(0, locator)
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>> {
        self.frame_attribute(0, locator, name)
    }

    async fn click(&self, locator: &Locator, mode: ClickMode) -> BrowserResult<()> {
        self.frame_click(0, locator, mode)
    }

    async fn fill(&self, locator: &Locator, index: usize, value: &str) -> BrowserResult<()> {
        self.frame_fill(0, locator, index, value)
    }

    async fn screenshot(&self, locator: &Locator) -> BrowserResult<Vec<u8>> {
        self.frame_screenshot(0, locator)
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        self.frame_evaluate(0, script)
    }
}

#[async_trait]
impl Page for MemoryPage {
    async fn goto(&self, url: &str, _wait: WaitUntil) -> BrowserResult<()> {
        let mut guard = self.lock();
        guard.log.navigations.push(url.to_string());

        if guard.failing_urls.contains(url) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }

        let state = &mut *guard;
        let mut matched = false;
        if let Some(html) = state.routes.get(url) {
            state.scene.load(url, html);
            matched = true;
        }
        for (target, hook) in state.goto_hooks.iter_mut() {
            if target == url {
                if !matched {
                    state.scene.load(url, "");
                    matched = true;
                }
                hook(&mut state.scene);
            }
        }

        if !matched {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        Ok(())
    }

    async fn reload(&self) -> BrowserResult<()> {
        let mut guard = self.lock();
        guard.log.reloads += 1;
        let state = &mut *guard;
        for hook in state.reload_hooks.iter_mut() {
            hook(&mut state.scene);
        }
        Ok(())
    }

    async fn frames(&self) -> BrowserResult<Vec<Arc<dyn Frame>>> {
        let count = self.lock().scene.frame_count();
        Ok((0..count)
            .map(|index| {
                Arc::new(MemoryFrame {
                    page: self.clone(),
                    index,
                }) as Arc<dyn Frame>
            })
            .collect())
    }

    async fn cookies(&self) -> BrowserResult<Vec<BrowserCookie>> {
        Ok(self.lock().cookies.clone())
    }

    async fn user_agent(&self) -> BrowserResult<String> {
        Ok(self.lock().user_agent.clone())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.frame_url(0))
    }

    async fn content(&self) -> BrowserResult<String> {
        self.with_document(0, |html| Ok(html.html()))
    }
}

/// Handle to one frame of a `MemoryPage`
struct MemoryFrame {
    page: MemoryPage,
    index: usize,
}

#[async_trait]
impl Frame for MemoryFrame {
    fn name(&self) -> String {
        self.page.frame_name(self.index)
    }

    fn url(&self) -> String {
        self.page.frame_url(self.index)
    }

    async fn count(&self, locator: &Locator) -> BrowserResult<usize> {
        self.page.frame_count_of(self.index, locator)
    }

    async fn inner_text(&self, locator: &Locator) -> BrowserResult<Option<String>> {
        self.page.frame_inner_text(self.index, locator)
    }

    async fn all_inner_texts(&self, locator: &Locator) -> BrowserResult<Vec<String>> {
        self.page.frame_all_inner_texts(self.index, locator)
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> BrowserResult<Option<String>> {
        self.page.frame_attribute(self.index, locator, name)
    }

    async fn click(&self, locator: &Locator, mode: ClickMode) -> BrowserResult<()> {
        self.page.frame_click(self.index, locator, mode)
    }

    async fn fill(&self, locator: &Locator, index: usize, value: &str) -> BrowserResult<()> {
        self.page.frame_fill(self.index, locator, index, value)
    }

    async fn screenshot(&self, locator: &Locator) -> BrowserResult<Vec<u8>> {
        self.page.frame_screenshot(self.index, locator)
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        self.page.frame_evaluate(self.index, script)
    }
}
