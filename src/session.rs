use std::sync::Arc;

use url::Url;

use crate::browser::{BrowserConnector, BrowserPage, BrowserSession};
use crate::config::SessionConfig;
use crate::error::ScrapeError;
use crate::formats::NavNode;
use crate::parser::{self, ArticleExtract, ParserVariant};
use crate::retry::retry_with_backoff;

/// An article page read through the browser.
#[derive(Debug, Clone)]
pub struct FetchedArticle {
    pub variant: ParserVariant,
    pub extract: ArticleExtract,
    pub print_href: Option<String>,
}

/// Layout report for one page.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageStructure {
    pub url: String,
    pub final_url: String,
    pub variant: Option<ParserVariant>,
    pub containers: Vec<&'static str>,
    pub toc_entries: Option<usize>,
    pub error: Option<String>,
}

/// A logged-in remote browser session that can be torn down and re-established.
///
/// Pages opened through it are always closed before the call that opened them returns.
pub struct SiteSession {
    connector: Arc<dyn BrowserConnector>,
    browser: Option<Box<dyn BrowserSession>>,
    config: SessionConfig,
    label: String,
}

impl SiteSession {
    pub fn new(connector: Arc<dyn BrowserConnector>, config: SessionConfig, label: impl Into<String>) -> Self {
        Self {
            connector,
            browser: None,
            config,
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Connects and logs in.
    pub async fn start(&mut self) -> Result<(), ScrapeError> {
        self.connect().await?;
        self.login().await
    }

    async fn connect(&mut self) -> Result<(), ScrapeError> {
        let connector = Arc::clone(&self.connector);
        let policy = self.config.network_retry();
        let browser = retry_with_backoff(&policy, "connect", ScrapeError::is_network_recoverable, || {
            let connector = Arc::clone(&connector);
            async move { connector.connect().await }
        })
        .await?;
        self.browser = Some(browser);
        tracing::debug!(session = %self.label, "browser connected");
        Ok(())
    }

    pub async fn login(&self) -> Result<(), ScrapeError> {
        let page = self.new_page().await?;
        let result = self.login_on(page.as_ref()).await;
        close_page(page.as_ref()).await;
        result?;
        tracing::info!(session = %self.label, "logged in");
        Ok(())
    }

    async fn login_on(&self, page: &dyn BrowserPage) -> Result<(), ScrapeError> {
        let site = &self.config.site;
        let credentials = &self.config.credentials;

        page.goto(&site.login_url, self.config.page_timeout).await?;
        page.wait_for_idle(self.config.network_timeout).await?;
        page.fill(&site.username_selector, &credentials.username).await?;
        page.fill(&site.password_selector, &credentials.password).await?;
        page.click(&site.submit_selector).await?;
        page.wait_for_idle(self.config.network_timeout).await?;

        let landed = page.url().await?;
        if !landed.starts_with(&site.landing_prefix) {
            return Err(ScrapeError::AuthenticationFailure {
                expected: site.landing_prefix.clone(),
                actual: landed,
            });
        }
        Ok(())
    }

    /// Best-effort teardown, then a fresh connection and login.
    pub async fn reconnect(&mut self) -> Result<(), ScrapeError> {
        tracing::warn!(session = %self.label, "reconnecting browser session");
        self.teardown().await;
        self.start().await?;
        tokio::time::sleep(self.config.reconnect_cooldown).await;
        tracing::info!(session = %self.label, "browser session re-established");
        Ok(())
    }

    pub async fn close(&mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if let Some(mut browser) = self.browser.take()
            && let Err(err) = browser.close().await
        {
            tracing::debug!(session = %self.label, %err, "ignoring browser close failure");
        }
    }

    pub async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScrapeError::ConnectionFatal("session is not connected".to_owned()))?;
        browser.new_page().await
    }

    /// Navigates `page` and waits for it to settle, retrying transient failures.
    pub async fn navigate(&self, page: &dyn BrowserPage, url: &str) -> Result<(), ScrapeError> {
        let policy = self.config.navigation_retry();
        let page_timeout = self.config.page_timeout;
        let idle_timeout = self.config.network_timeout;
        retry_with_backoff(&policy, "navigate", ScrapeError::is_retryable, || async move {
            page.goto(url, page_timeout).await?;
            page.wait_for_idle(idle_timeout).await
        })
        .await
    }

    /// Opens a page on `url`. The caller owns the page and must close it.
    pub async fn open(&self, url: &str) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        let page = self.new_page().await?;
        if let Err(err) = self.navigate(page.as_ref(), url).await {
            close_page(page.as_ref()).await;
            return Err(err);
        }
        Ok(page)
    }

    /// Reads the navigation tree of the seed page.
    pub async fn fetch_toc(&self, url: &Url) -> Result<(ParserVariant, Vec<NavNode>), ScrapeError> {
        let page = self.open(url.as_str()).await?;
        let result = async {
            let html = page.content().await?;
            let variant = parser::select_parser(url, Some(&html))?;
            let nodes = variant.extract_toc_links(&html, url)?;
            Ok::<_, ScrapeError>((variant, nodes))
        }
        .await;
        close_page(page.as_ref()).await;
        result
    }

    pub async fn fetch_article(&self, url: &Url) -> Result<FetchedArticle, ScrapeError> {
        let page = self.open(url.as_str()).await?;
        let result = self.read_article(page.as_ref(), url).await;
        close_page(page.as_ref()).await;
        result
    }

    async fn read_article(&self, page: &dyn BrowserPage, url: &Url) -> Result<FetchedArticle, ScrapeError> {
        let outer = page.content().await?;
        let variant = parser::select_parser(url, Some(&outer))?;
        let article_html = match variant.content_frame() {
            Some(frame) => page
                .frame_content(frame)
                .await?
                .ok_or_else(|| ScrapeError::StructureNotFound {
                    container: format!("iframe[name=\"{frame}\"]"),
                })?,
            None => outer,
        };
        let extract = variant.extract_article(&article_html, url);
        let print_href = page
            .attribute(&self.config.site.print_link_selector, "href")
            .await?;
        Ok(FetchedArticle {
            variant,
            extract,
            print_href,
        })
    }

    /// Prints the article: the site's print view when it offers one, else the page itself.
    pub async fn render_pdf(&self, url: &Url, print_href: Option<&str>) -> Result<Vec<u8>, ScrapeError> {
        if let Some(href) = print_href {
            match self.print_url(url, href) {
                Ok(print_url) => match self.render_page(print_url.as_str()).await {
                    Ok(bytes) => return Ok(bytes),
                    Err(err) if err.is_connection_fatal() => return Err(err),
                    Err(err) => {
                        tracing::debug!(url = %url, %err, "print view failed; rendering article page");
                    }
                },
                Err(err) => tracing::debug!(url = %url, %err, "unusable print link"),
            }
        }
        self.render_page(url.as_str()).await
    }

    fn print_url(&self, url: &Url, href: &str) -> Result<Url, ScrapeError> {
        if href.starts_with('/') {
            let base = format!("{}{href}", self.config.site.base_url.trim_end_matches('/'));
            return Url::parse(&base).map_err(|err| ScrapeError::invalid_url(&base, err));
        }
        url.join(href).map_err(|err| ScrapeError::invalid_url(href, err))
    }

    async fn render_page(&self, url: &str) -> Result<Vec<u8>, ScrapeError> {
        let page = self.open(url).await?;
        let result = page.render_pdf().await;
        close_page(page.as_ref()).await;
        result
    }

    /// Structure report used by the `detect` command.
    pub async fn inspect(&self, url: &Url) -> Result<PageStructure, ScrapeError> {
        let page = self.open(url.as_str()).await?;
        let result = async {
            let final_url = page.url().await?;
            let html = page.content().await?;
            let containers = parser::select::known_containers(&html);
            let (variant, toc_entries, error) = match parser::select_parser(url, Some(&html)) {
                Ok(variant) => match variant.extract_toc_links(&html, url) {
                    Ok(nodes) => (
                        Some(variant),
                        Some(nodes.iter().map(NavNode::size).sum()),
                        None,
                    ),
                    Err(err) => (Some(variant), None, Some(err.to_string())),
                },
                Err(err) => (None, None, Some(err.to_string())),
            };
            Ok::<_, ScrapeError>(PageStructure {
                url: url.to_string(),
                final_url,
                variant,
                containers,
                toc_entries,
                error,
            })
        }
        .await;
        close_page(page.as_ref()).await;
        result
    }
}

async fn close_page(page: &dyn BrowserPage) {
    if let Err(err) = page.close().await {
        tracing::debug!(%err, "ignoring page close failure");
    }
}
