/// Failure classes shared by the parsers, the browser layer and the worker pool.
///
/// Retry and recovery decisions are driven by [`ScrapeError::is_retryable`] and
/// [`ScrapeError::is_connection_fatal`], never by matching on message text at the call site.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("structure not found: no `{container}` container on the page")]
    StructureNotFound { container: String },

    #[error("unknown page structure: {url}")]
    UnknownStructure { url: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("browser connection lost: {0}")]
    ConnectionFatal(String),

    #[error("authentication failed: expected redirect to {expected}, landed on {actual}")]
    AuthenticationFailure { expected: String, actual: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("write output: {0}")]
    Output(String),
}

const CLOSED_MARKERS: &[&str] = &[
    "target closed",
    "browser closed",
    "connection closed",
    "has been closed",
    "websocket",
    "disconnected",
    "channel closed",
];

impl ScrapeError {
    /// Classifies a raw browser error message. Messages reporting a closed browser,
    /// context or transport become [`ScrapeError::ConnectionFatal`].
    pub fn from_browser_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if CLOSED_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return Self::ConnectionFatal(message);
        }
        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::Timeout(message);
        }
        Self::Browser(message)
    }

    pub fn invalid_url(url: &str, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.to_owned(),
            source,
        }
    }

    /// Transient failures worth another attempt with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Browser(_))
    }

    /// Failures that need a fresh browser session rather than a simple retry.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::ConnectionFatal(_))
    }

    /// Failures worth another attempt when establishing a connection, where a refused
    /// or dropped transport is as transient as a timeout.
    pub fn is_network_recoverable(&self) -> bool {
        self.is_retryable() || self.is_connection_fatal()
    }
}
