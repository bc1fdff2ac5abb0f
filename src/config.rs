use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::cli::{ConnectionArgs, ScrapeArgs};
use crate::retry::RetryPolicy;

pub const USER_ENV: &str = "LOGIN_1C_USER";
pub const PASSWORD_ENV: &str = "LOGIN_1C_PASSWORD";
pub const BROWSER_URL_ENV: &str = "BROWSERLESS_URL";
pub const DEFAULT_BROWSER_URL: &str = "http://localhost:3000";

const PAGE_TIMEOUT_SECS: (u64, u64) = (10, 300);
const NETWORK_TIMEOUT_SECS: (u64, u64) = (5, 180);
const RETRY_COUNT: (u32, u32) = (0, 10);
const RETRY_DELAY_SECS: (f64, f64) = (0.1, 60.0);
const REQUEST_DELAY_SECS: (f64, f64) = (0.0, 10.0);

const TIMEOUT_BACKOFF: f64 = 1.5;
const NETWORK_BACKOFF: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Txt,
    Markdown,
    Pdf,
}

impl OutputFormat {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Txt => "txt",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Txt => "txt",
            Self::Markdown => "md",
            Self::Pdf => "pdf",
        }
    }
}

/// Whether nodes whose URLs differ only by `#fragment` are separate articles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FragmentPolicy {
    #[default]
    Distinct,
    SameArticle,
}

/// Key used by the shared duplicate-content set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DedupScope {
    #[default]
    Content,
    UrlAndContent,
}

/// Site-specific URLs and selectors.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    pub base_url: String,
    pub login_url: String,
    pub landing_prefix: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    pub print_link_selector: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            base_url: "https://its.1c.ru".to_owned(),
            login_url: "https://login.1c.ru/login".to_owned(),
            landing_prefix: "https://login.1c.ru/user/profile".to_owned(),
            username_selector: "input#username".to_owned(),
            password_selector: "input#password".to_owned(),
            submit_selector: "#loginButton".to_owned(),
            print_link_selector: "#w_metadata_print_href".to_owned(),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> anyhow::Result<Self> {
        let username = std::env::var(USER_ENV)
            .with_context(|| format!("{USER_ENV} must be set (environment or .env)"))?;
        let password = std::env::var(PASSWORD_ENV)
            .with_context(|| format!("{PASSWORD_ENV} must be set (environment or .env)"))?;
        Ok(Self { username, password })
    }
}

/// Everything one browser session needs: endpoint, login and timing.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub site: SiteProfile,
    pub credentials: Credentials,
    pub browser_url: String,
    pub page_timeout: Duration,
    pub network_timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub reconnect_cooldown: Duration,
}

impl SessionConfig {
    pub fn from_args(args: &ConnectionArgs) -> anyhow::Result<Self> {
        validate_connection_args(args)?;
        let credentials = Credentials::from_env()?;
        let browser_url = args
            .browser_url
            .clone()
            .or_else(|| std::env::var(BROWSER_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BROWSER_URL.to_owned());

        Ok(Self {
            site: SiteProfile::default(),
            credentials,
            browser_url,
            page_timeout: Duration::from_secs(args.timeout),
            network_timeout: Duration::from_secs(args.network_timeout),
            retry_count: args.retry_count,
            retry_delay: Duration::from_secs_f64(args.retry_delay),
            reconnect_cooldown: Duration::from_secs(5),
        })
    }

    /// Backoff for navigation and idle waits.
    pub fn navigation_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_delay, TIMEOUT_BACKOFF)
    }

    /// Backoff for establishing the browser connection.
    pub fn network_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_delay, NETWORK_BACKOFF)
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub session: SessionConfig,
    pub seed_url: Url,
    pub formats: Vec<OutputFormat>,
    pub workers: usize,
    pub max_depth: usize,
    pub request_delay: Duration,
    pub out_dir: PathBuf,
    pub no_scrape: bool,
    pub force_reindex: bool,
    pub update: bool,
    pub rag: bool,
    pub limit: Option<usize>,
    pub fragments: FragmentPolicy,
    pub dedup: DedupScope,
    pub interactive: bool,
    pub click_settle: Duration,
}

impl ScrapeConfig {
    pub fn from_args(args: &ScrapeArgs) -> anyhow::Result<Self> {
        validate_connection_args(&args.connection)?;
        check_range("request delay (s)", args.delay, REQUEST_DELAY_SECS)?;
        if args.parallel == 0 {
            anyhow::bail!("--parallel must be at least 1");
        }
        if args.max_depth == 0 {
            anyhow::bail!("--max-depth must be at least 1");
        }

        let seed_url = Url::parse(&args.url).context("parse seed url")?;
        if seed_url.scheme() != "http" && seed_url.scheme() != "https" {
            anyhow::bail!("seed url must be http/https: {seed_url}");
        }

        let mut formats = Vec::new();
        for format in &args.formats {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }

        let session = SessionConfig::from_args(&args.connection)?;

        Ok(Self {
            session,
            seed_url,
            formats,
            workers: args.parallel,
            max_depth: args.max_depth,
            request_delay: Duration::from_secs_f64(args.delay),
            out_dir: PathBuf::from(&args.out),
            no_scrape: args.no_scrape,
            force_reindex: args.force_reindex,
            update: args.update,
            rag: args.rag,
            limit: args.limit,
            fragments: args.fragments,
            dedup: args.dedup,
            interactive: !args.no_interactive,
            click_settle: Duration::from_millis(args.click_settle_ms),
        })
    }
}

/// Range checks run before anything touches the network or the filesystem.
pub fn validate_connection_args(args: &ConnectionArgs) -> anyhow::Result<()> {
    check_range("page timeout (s)", args.timeout, PAGE_TIMEOUT_SECS)?;
    check_range("network timeout (s)", args.network_timeout, NETWORK_TIMEOUT_SECS)?;
    check_range("retry count", args.retry_count, RETRY_COUNT)?;
    check_range("retry delay (s)", args.retry_delay, RETRY_DELAY_SECS)?;
    Ok(())
}

fn check_range<T>(name: &str, value: T, (min, max): (T, T)) -> anyhow::Result<()>
where
    T: PartialOrd + fmt::Display,
{
    // Written so that NaN fails both comparisons and is rejected.
    let in_range = min <= value && value <= max;
    if !in_range {
        anyhow::bail!("{name} must be between {min} and {max}, got {value}");
    }
    Ok(())
}
