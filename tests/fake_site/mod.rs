#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use navscrape::browser::{BrowserConnector, BrowserPage, BrowserSession, RenderedAnchor};
use navscrape::config::{
    Credentials, DedupScope, FragmentPolicy, OutputFormat, ScrapeConfig, SessionConfig, SiteProfile,
};
use navscrape::error::ScrapeError;
use navscrape::formats::url_without_fragment;
use navscrape::parser::dynamic_tree::{CONTENT_LINKS, TREE_ANCHORS};
use url::Url;

pub const HOST: &str = "https://docs.test";

/// Click-driven tree rendered on one page.
#[derive(Debug, Clone)]
pub struct FakeEntry {
    pub title: String,
    pub href: String,
    pub children: Vec<FakeEntry>,
    pub content: Vec<(String, String)>,
}

impl FakeEntry {
    pub fn new(title: &str, href: &str) -> Self {
        Self {
            title: title.to_owned(),
            href: href.to_owned(),
            children: Vec::new(),
            content: Vec::new(),
        }
    }

    pub fn child(mut self, child: FakeEntry) -> Self {
        self.children.push(child);
        self
    }

    pub fn content_link(mut self, title: &str, href: &str) -> Self {
        self.content.push((title.to_owned(), href.to_owned()));
        self
    }
}

/// In-memory documentation site with a login form, served through fake browser pages.
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, String>>,
    frames: Mutex<HashMap<String, String>>,
    print_links: Mutex<HashMap<String, String>>,
    pdf_failures: Mutex<HashSet<String>>,
    drop_connection_on: Mutex<HashSet<String>>,
    interactive: Mutex<HashMap<String, Vec<FakeEntry>>>,
    reject_login: Mutex<bool>,
    refused_connects: AtomicUsize,
    connect_limit: Mutex<Option<usize>>,
    connect_attempts: AtomicUsize,
    connects: AtomicUsize,
    visits: Mutex<Vec<String>>,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn page(&self, url: &str, html: impl Into<String>) {
        self.pages
            .lock()
            .expect("pages lock")
            .insert(url_without_fragment(url).to_owned(), html.into());
    }

    pub fn frame(&self, url: &str, html: impl Into<String>) {
        self.frames
            .lock()
            .expect("frames lock")
            .insert(url_without_fragment(url).to_owned(), html.into());
    }

    pub fn print_link(&self, url: &str, href: &str) {
        self.print_links
            .lock()
            .expect("print lock")
            .insert(url_without_fragment(url).to_owned(), href.to_owned());
    }

    pub fn fail_pdf(&self, url: &str) {
        self.pdf_failures.lock().expect("pdf lock").insert(url.to_owned());
    }

    /// The next navigation to `url` reports a lost browser connection.
    pub fn drop_connection_on(&self, url: &str) {
        self.drop_connection_on
            .lock()
            .expect("drop lock")
            .insert(url.to_owned());
    }

    pub fn interactive_tree(&self, url: &str, roots: Vec<FakeEntry>) {
        self.interactive
            .lock()
            .expect("tree lock")
            .insert(url_without_fragment(url).to_owned(), roots);
    }

    pub fn reject_login(&self) {
        *self.reject_login.lock().expect("login lock") = true;
    }

    /// The next `count` connection attempts are refused.
    pub fn refuse_next_connects(&self, count: usize) {
        self.refused_connects.store(count, Ordering::SeqCst);
    }

    /// Every connection attempt after `successes` successful ones is refused.
    pub fn refuse_connects_after(&self, successes: usize) {
        *self.connect_limit.lock().expect("limit lock") = Some(successes);
    }

    /// Successful connections.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn visits_to(&self, url: &str) -> usize {
        self.visits
            .lock()
            .expect("visits lock")
            .iter()
            .filter(|visited| visited.as_str() == url)
            .count()
    }
}

pub struct FakeConnector {
    site: Arc<FakeSite>,
}

impl FakeConnector {
    pub fn new(site: Arc<FakeSite>) -> Arc<Self> {
        Arc::new(Self { site })
    }
}

#[async_trait]
impl BrowserConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        self.site.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let refused_now = self
            .site
            .refused_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        let limit = self.site.connect_limit.lock().expect("limit lock");
        if refused_now || limit.is_some_and(|max| self.site.connects() >= max) {
            return Err(ScrapeError::ConnectionFatal("connection refused".to_owned()));
        }
        self.site.connects.fetch_add(1, Ordering::SeqCst);
        drop(limit);
        Ok(Box::new(FakeSession {
            site: Arc::clone(&self.site),
        }))
    }
}

struct FakeSession {
    site: Arc<FakeSite>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        Ok(Box::new(FakePage {
            site: Arc::clone(&self.site),
            state: Mutex::new(PageState::default()),
        }))
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        Ok(())
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    expanded: HashSet<String>,
    content: Vec<RenderedAnchor>,
}

struct FakePage {
    site: Arc<FakeSite>,
    state: Mutex<PageState>,
}

impl FakePage {
    fn current(&self) -> String {
        self.state.lock().expect("page state").url.clone()
    }

    /// Tree anchors currently visible: roots plus children of expanded entries.
    fn visible_tree(&self) -> Vec<FakeEntry> {
        let state = self.state.lock().expect("page state");
        let trees = self.site.interactive.lock().expect("tree lock");
        let Some(roots) = trees.get(url_without_fragment(&state.url)) else {
            return Vec::new();
        };
        let mut visible = Vec::new();
        let mut stack: Vec<&FakeEntry> = roots.iter().rev().collect();
        while let Some(entry) = stack.pop() {
            visible.push(entry.clone());
            if state.expanded.contains(&entry.title) {
                stack.extend(entry.children.iter().rev());
            }
        }
        visible
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), ScrapeError> {
        // Lets other workers run between navigations, as a real browser round-trip would.
        tokio::task::yield_now().await;
        if self.site.drop_connection_on.lock().expect("drop lock").remove(url) {
            return Err(ScrapeError::ConnectionFatal("target closed".to_owned()));
        }
        self.site.visits.lock().expect("visits lock").push(url.to_owned());
        let mut state = self.state.lock().expect("page state");
        state.url = url.to_owned();
        state.expanded.clear();
        state.content.clear();
        Ok(())
    }

    async fn wait_for_idle(&self, _timeout: Duration) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn url(&self) -> Result<String, ScrapeError> {
        Ok(self.current())
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        let url = self.current();
        self.site
            .pages
            .lock()
            .expect("pages lock")
            .get(url_without_fragment(&url))
            .cloned()
            .ok_or_else(|| ScrapeError::Browser(format!("404 for {url}")))
    }

    async fn frame_content(&self, _frame_name: &str) -> Result<Option<String>, ScrapeError> {
        let url = self.current();
        Ok(self
            .site
            .frames
            .lock()
            .expect("frames lock")
            .get(url_without_fragment(&url))
            .cloned())
    }

    async fn attribute(&self, _selector: &str, name: &str) -> Result<Option<String>, ScrapeError> {
        if name != "href" {
            return Ok(None);
        }
        let url = self.current();
        Ok(self
            .site
            .print_links
            .lock()
            .expect("print lock")
            .get(url_without_fragment(&url))
            .cloned())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), ScrapeError> {
        if selector == test_site().submit_selector && !*self.site.reject_login.lock().expect("login lock") {
            self.state.lock().expect("page state").url = format!("{HOST}/profile/home");
        }
        Ok(())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<bool, ScrapeError> {
        if selector != TREE_ANCHORS {
            return Ok(false);
        }
        let Some(entry) = self.visible_tree().into_iter().nth(index) else {
            return Ok(false);
        };
        let mut state = self.state.lock().expect("page state");
        state.expanded.insert(entry.title.clone());
        state.content = entry
            .content
            .iter()
            .map(|(title, href)| RenderedAnchor {
                title: title.clone(),
                href: href.clone(),
            })
            .collect();
        Ok(true)
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, ScrapeError> {
        Ok(serde_json::Value::Null)
    }

    async fn render_pdf(&self) -> Result<Vec<u8>, ScrapeError> {
        let url = self.current();
        if self.site.pdf_failures.lock().expect("pdf lock").contains(&url) {
            return Err(ScrapeError::Browser("printing is disabled".to_owned()));
        }
        Ok(format!("%PDF-1.4 {url}").into_bytes())
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn rendered_anchors(&self, selector: &str) -> Result<Vec<RenderedAnchor>, ScrapeError> {
        if selector == TREE_ANCHORS {
            return Ok(self
                .visible_tree()
                .into_iter()
                .map(|entry| RenderedAnchor {
                    title: entry.title,
                    href: entry.href,
                })
                .collect());
        }
        if selector == CONTENT_LINKS {
            return Ok(self.state.lock().expect("page state").content.clone());
        }
        Ok(Vec::new())
    }
}

pub fn test_site() -> SiteProfile {
    SiteProfile {
        base_url: HOST.to_owned(),
        login_url: format!("{HOST}/login"),
        landing_prefix: format!("{HOST}/profile"),
        username_selector: "#user".to_owned(),
        password_selector: "#password".to_owned(),
        submit_selector: "#submit".to_owned(),
        print_link_selector: "#print".to_owned(),
    }
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        site: test_site(),
        credentials: Credentials {
            username: "reader".to_owned(),
            password: "secret".to_owned(),
        },
        browser_url: "fake://browser".to_owned(),
        page_timeout: Duration::from_secs(1),
        network_timeout: Duration::from_secs(1),
        retry_count: 1,
        retry_delay: Duration::from_millis(1),
        reconnect_cooldown: Duration::ZERO,
    }
}

pub fn scrape_config(seed: &str, out_dir: &Path) -> ScrapeConfig {
    ScrapeConfig {
        session: session_config(),
        seed_url: Url::parse(seed).expect("parse seed url"),
        formats: vec![OutputFormat::Json],
        workers: 1,
        max_depth: 3,
        request_delay: Duration::ZERO,
        out_dir: out_dir.to_path_buf(),
        no_scrape: false,
        force_reindex: false,
        update: false,
        rag: false,
        limit: None,
        fragments: FragmentPolicy::Distinct,
        dedup: DedupScope::Content,
        interactive: true,
        click_settle: Duration::ZERO,
    }
}

/// Navigation-tree page listing `entries` as `(title, path)` pairs.
pub fn navtree_page(entries: &[(&str, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(title, path)| format!(r#"<li><a href="{path}">{title}</a></li>"#))
        .collect();
    format!(r#"<html><body><div id="w_metadata_navtree"><ul>{items}</ul></div></body></html>"#)
}

/// Table-of-contents page whose article body lives in the document frame.
pub fn toc_page(entries: &[(&str, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(title, path)| format!(r#"<li><a href="{path}">{title}</a></li>"#))
        .collect();
    format!(
        r#"<html><body><div id="w_metadata_toc"><ul>{items}</ul></div><iframe name="w_metadata_doc_frame"></iframe></body></html>"#
    )
}

/// Article page with body `text` and links to `(title, path)` pairs.
pub fn article_page(text: &str, links: &[(&str, &str)]) -> String {
    let anchors: String = links
        .iter()
        .map(|(title, path)| format!(r#"<p><a href="{path}">{title}</a></p>"#))
        .collect();
    format!(r#"<html><body><div id="w_content"><p>{text}</p>{anchors}</div></body></html>"#)
}

pub fn url(path: &str) -> String {
    format!("{HOST}{path}")
}
