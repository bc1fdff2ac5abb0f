use clap::{Args, Parser, Subcommand};

use crate::config::{DedupScope, FragmentPolicy, OutputFormat};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover the article tree under a seed URL and export every article.
    Scrape(ScrapeArgs),
    /// Report which page layout a URL uses and which known containers it has.
    Detect(DetectArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Remote browser endpoint (falls back to BROWSERLESS_URL, then http://localhost:3000).
    #[arg(long)]
    pub browser_url: Option<String>,

    /// Page navigation timeout in seconds (10-300).
    #[arg(long, default_value_t = 90)]
    pub timeout: u64,

    /// Network idle timeout in seconds (5-180).
    #[arg(long, default_value_t = 60)]
    pub network_timeout: u64,

    /// Retries after a failed navigation (0-10).
    #[arg(long, default_value_t = 3)]
    pub retry_count: u32,

    /// Initial retry delay in seconds (0.1-60).
    #[arg(long, default_value_t = 2.0)]
    pub retry_delay: f64,
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Seed URL whose navigation container lists the articles.
    pub url: String,

    /// Output formats (repeatable or comma separated).
    #[arg(short = 'f', long = "format", value_enum, value_delimiter = ',', default_value = "json")]
    pub formats: Vec<OutputFormat>,

    /// Number of concurrent workers, each with its own browser session.
    #[arg(short = 'p', long, default_value_t = 1)]
    pub parallel: usize,

    /// Maximum navigation depth; seed entries are level 1.
    #[arg(long, default_value_t = 3)]
    pub max_depth: usize,

    /// Build and save the index only.
    #[arg(long)]
    pub no_scrape: bool,

    /// Ignore a saved index and rediscover the tree.
    #[arg(long)]
    pub force_reindex: bool,

    /// Keep existing output and rewrite only articles whose content changed.
    #[arg(long)]
    pub update: bool,

    /// Add breadcrumb context to markdown output.
    #[arg(long)]
    pub rag: bool,

    /// Scrape only the first N articles of the index.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Root directory for output; a subdirectory is named after the seed URL.
    #[arg(long, default_value = "out")]
    pub out: String,

    /// Delay between article requests in seconds (0-10).
    #[arg(long, default_value_t = 0.5)]
    pub delay: f64,

    /// How to treat entries whose URLs differ only by fragment.
    #[arg(long, value_enum, default_value_t = FragmentPolicy::Distinct)]
    pub fragments: FragmentPolicy,

    /// Scope of duplicate-content suppression.
    #[arg(long, value_enum, default_value_t = DedupScope::Content)]
    pub dedup: DedupScope,

    /// Skip click-driven expansion of lazily rendered trees.
    #[arg(long)]
    pub no_interactive: bool,

    /// Wait after each tree click, in milliseconds.
    #[arg(long, default_value_t = 800)]
    pub click_settle_ms: u64,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Page to inspect.
    pub url: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}
