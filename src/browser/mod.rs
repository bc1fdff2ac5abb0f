//! Remote browser seam.
//!
//! Everything above this module talks to [`BrowserConnector`], [`BrowserSession`] and
//! [`BrowserPage`]; [`cdp`] implements them over the Chrome DevTools protocol.

pub mod cdp;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ScrapeError;

#[async_trait]
pub trait BrowserConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrowserSession>, ScrapeError>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError>;

    async fn close(&mut self) -> Result<(), ScrapeError>;
}

/// An anchor as rendered in the live DOM.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenderedAnchor {
    pub title: String,
    pub href: String,
}

#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Waits until the document finished loading and pending navigation settled.
    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), ScrapeError>;

    async fn url(&self) -> Result<String, ScrapeError>;

    async fn content(&self) -> Result<String, ScrapeError>;

    /// Document of a same-origin iframe, or `None` when the frame is absent.
    async fn frame_content(&self, frame_name: &str) -> Result<Option<String>, ScrapeError>;

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>, ScrapeError>;

    async fn fill(&self, selector: &str, value: &str) -> Result<(), ScrapeError>;

    async fn click(&self, selector: &str) -> Result<(), ScrapeError>;

    /// Clicks the `index`-th match of `selector`, queried fresh. Returns `false` when
    /// fewer elements match than expected.
    async fn click_nth(&self, selector: &str, index: usize) -> Result<bool, ScrapeError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScrapeError>;

    /// A4 print with backgrounds.
    async fn render_pdf(&self) -> Result<Vec<u8>, ScrapeError>;

    async fn close(&self) -> Result<(), ScrapeError>;

    /// Title and href of every element matching `selector`, in document order.
    async fn rendered_anchors(&self, selector: &str) -> Result<Vec<RenderedAnchor>, ScrapeError> {
        let value = self.evaluate(&anchors_script(selector)).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value)
            .map_err(|err| ScrapeError::Browser(format!("decode rendered anchors: {err}")))
    }
}

fn anchors_script(selector: &str) -> String {
    let selector = serde_json::Value::from(selector);
    format!(
        "Array.from(document.querySelectorAll({selector})).map(a => ({{\
            title: (a.innerText || a.textContent || '').trim(), \
            href: a.getAttribute('href') || '' }}))"
    )
}
