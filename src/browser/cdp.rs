use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::HandlerConfig;
use chromiumoxide::{Browser, Page};
use futures::StreamExt as _;
use tokio::task::JoinHandle;

use super::{BrowserConnector, BrowserPage, BrowserSession};
use crate::error::ScrapeError;

const READY_POLL: Duration = Duration::from_millis(100);
const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;

/// Connects to a remote DevTools endpoint such as a browserless container.
#[derive(Debug, Clone)]
pub struct CdpConnector {
    endpoint: String,
    request_timeout: Duration,
}

impl CdpConnector {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl BrowserConnector for CdpConnector {
    async fn connect(&self) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        let ws_url = resolve_ws_endpoint(&self.endpoint).await?;
        tracing::debug!(%ws_url, "connecting to remote browser");

        let handler_config = HandlerConfig {
            request_timeout: self.request_timeout,
            ..Default::default()
        };
        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(classify)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(CdpSession {
            browser,
            handler_task,
        }))
    }
}

/// Returns the browser websocket URL. `http(s)://` endpoints are resolved through
/// `/json/version`; websocket URLs pointing at `/devtools/` are used as is.
pub async fn resolve_ws_endpoint(endpoint: &str) -> Result<String, ScrapeError> {
    if (endpoint.starts_with("ws://") || endpoint.starts_with("wss://"))
        && endpoint.contains("/devtools/")
    {
        return Ok(endpoint.to_owned());
    }

    let http_url = endpoint
        .replacen("wss://", "https://", 1)
        .replacen("ws://", "http://", 1);
    let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

    let version: serde_json::Value = reqwest::Client::new()
        .get(&version_url)
        .send()
        .await
        .map_err(|err| ScrapeError::ConnectionFatal(format!("reach {version_url}: {err}")))?
        .error_for_status()
        .map_err(|err| ScrapeError::ConnectionFatal(format!("query {version_url}: {err}")))?
        .json()
        .await
        .map_err(|err| ScrapeError::ConnectionFatal(format!("decode {version_url}: {err}")))?;

    version
        .get("webSocketDebuggerUrl")
        .and_then(|value| value.as_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            ScrapeError::ConnectionFatal(format!("no webSocketDebuggerUrl in {version_url}"))
        })
}

struct CdpSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for CdpSession {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScrapeError> {
        let page = self.browser.new_page("about:blank").await.map_err(classify)?;
        Ok(Box::new(CdpPage { page }))
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        let result = self.browser.close().await;
        self.handler_task.abort();
        result.map(|_| ()).map_err(classify)
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

struct CdpPage {
    page: Page,
}

impl CdpPage {
    async fn evaluate_value(&self, script: &str) -> Result<serde_json::Value, ScrapeError> {
        let result = self.page.evaluate(script).await.map_err(classify)?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| ScrapeError::Timeout(format!("navigate to {url} after {timeout:?}")))?
            .map_err(classify)?;
        Ok(())
    }

    async fn wait_for_idle(&self, timeout: Duration) -> Result<(), ScrapeError> {
        let settle = async {
            self.page.wait_for_navigation().await.map_err(classify)?;
            loop {
                let state = self.evaluate_value("document.readyState").await?;
                if state.as_str() == Some("complete") {
                    return Ok::<(), ScrapeError>(());
                }
                tokio::time::sleep(READY_POLL).await;
            }
        };
        tokio::time::timeout(timeout, settle)
            .await
            .map_err(|_| ScrapeError::Timeout(format!("page idle after {timeout:?}")))?
    }

    async fn url(&self) -> Result<String, ScrapeError> {
        Ok(self.page.url().await.map_err(classify)?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        self.page.content().await.map_err(classify)
    }

    async fn frame_content(&self, frame_name: &str) -> Result<Option<String>, ScrapeError> {
        let name = serde_json::Value::from(frame_name);
        let script = format!(
            "(() => {{ const f = document.querySelector('iframe[name=' + JSON.stringify({name}) + ']') \
                || document.getElementById({name}); \
              return f && f.contentDocument ? f.contentDocument.documentElement.outerHTML : null; }})()"
        );
        let value = self.evaluate_value(&script).await?;
        Ok(value.as_str().map(str::to_owned))
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>, ScrapeError> {
        let selector = serde_json::Value::from(selector);
        let name = serde_json::Value::from(name);
        let script = format!(
            "(() => {{ const el = document.querySelector({selector}); \
              return el ? el.getAttribute({name}) : null; }})()"
        );
        let value = self.evaluate_value(&script).await?;
        Ok(value.as_str().map(str::to_owned))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), ScrapeError> {
        let element = self.page.find_element(selector).await.map_err(classify)?;
        element.click().await.map_err(classify)?;
        element.type_str(value).await.map_err(classify)?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), ScrapeError> {
        let element = self.page.find_element(selector).await.map_err(classify)?;
        element.click().await.map_err(classify)?;
        Ok(())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<bool, ScrapeError> {
        let elements = self.page.find_elements(selector).await.map_err(classify)?;
        let Some(element) = elements.get(index) else {
            return Ok(false);
        };
        element.click().await.map_err(classify)?;
        Ok(true)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScrapeError> {
        self.evaluate_value(script).await
    }

    async fn render_pdf(&self) -> Result<Vec<u8>, ScrapeError> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            paper_width: Some(A4_WIDTH_IN),
            paper_height: Some(A4_HEIGHT_IN),
            ..Default::default()
        };
        self.page.pdf(params).await.map_err(classify)
    }

    async fn close(&self) -> Result<(), ScrapeError> {
        self.page.clone().close().await.map_err(classify)
    }
}

fn classify(err: CdpError) -> ScrapeError {
    match err {
        CdpError::Timeout => ScrapeError::Timeout("browser request".to_owned()),
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            ScrapeError::ConnectionFatal(err.to_string())
        }
        other => ScrapeError::from_browser_message(other.to_string()),
    }
}
