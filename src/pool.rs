use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::browser::BrowserConnector;
use crate::config::{DedupScope, OutputFormat, SessionConfig};
use crate::error::ScrapeError;
use crate::fingerprint::{Fingerprint, FingerprintRegistry};
use crate::formats::{FlatArticle, url_without_fragment};
use crate::retry::sleep_with_jitter;
use crate::session::SiteSession;
use crate::store::OutputStore;

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub workers: usize,
    pub update: bool,
    pub dedup: DedupScope,
    pub request_delay: Duration,
    /// Fingerprints recorded by the previous run, keyed by article URL.
    pub previous: HashMap<String, Fingerprint>,
}

/// What happened to one article. Only `Failed` is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Saved(Fingerprint),
    Duplicate(Fingerprint),
    Unchanged(Fingerprint),
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub saved: usize,
    pub duplicates: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Items left in the queue because every worker terminated.
    pub unprocessed: usize,
    /// Fingerprint per article index for every article that was read successfully.
    pub fingerprints: HashMap<usize, Fingerprint>,
}

impl PoolReport {
    fn record(&mut self, article: &FlatArticle, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Saved(fp) => {
                self.saved += 1;
                self.fingerprints.insert(article.index, fp);
            }
            ItemOutcome::Duplicate(fp) => {
                self.duplicates += 1;
                self.fingerprints.insert(article.index, fp);
            }
            ItemOutcome::Unchanged(fp) => {
                self.unchanged += 1;
                self.fingerprints.insert(article.index, fp);
            }
            ItemOutcome::Failed => self.failed += 1,
        }
    }
}

/// FIFO of `(article, queue position)` shared by all workers.
struct WorkQueue {
    items: Mutex<VecDeque<(FlatArticle, usize)>>,
    remaining: AtomicUsize,
    drained: Notify,
}

impl WorkQueue {
    fn new(articles: Vec<FlatArticle>) -> Self {
        let items: VecDeque<_> = articles.into_iter().enumerate().map(|(i, a)| (a, i)).collect();
        Self {
            remaining: AtomicUsize::new(items.len()),
            items: Mutex::new(items),
            drained: Notify::new(),
        }
    }

    fn pop(&self) -> Option<(FlatArticle, usize)> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn pending(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Marks one item as finished.
    fn ack(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct Shared {
    connector: Arc<dyn BrowserConnector>,
    session_config: SessionConfig,
    store: Arc<OutputStore>,
    options: PoolOptions,
    registry: FingerprintRegistry,
    report: Mutex<PoolReport>,
    progress: ProgressBar,
}

impl Shared {
    fn record(&self, article: &FlatArticle, outcome: ItemOutcome) {
        match &outcome {
            ItemOutcome::Saved(_) => tracing::debug!(title = %article.title, "saved"),
            ItemOutcome::Duplicate(_) => {
                tracing::debug!(title = %article.title, url = %article.url, "duplicate content; skipped")
            }
            ItemOutcome::Unchanged(_) => {
                tracing::debug!(title = %article.title, url = %article.url, "unchanged; skipped")
            }
            ItemOutcome::Failed => {}
        }
        self.report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(article, outcome);
        self.progress.inc(1);
    }
}

/// Scrapes `articles` with `options.workers` workers, each on its own logged-in session.
///
/// Returns an error only when every worker terminated before the queue drained.
pub async fn run_pool(
    articles: Vec<FlatArticle>,
    connector: Arc<dyn BrowserConnector>,
    session_config: SessionConfig,
    store: Arc<OutputStore>,
    options: PoolOptions,
) -> anyhow::Result<PoolReport> {
    let total = articles.len();
    if total == 0 {
        tracing::info!("nothing to scrape");
        return Ok(PoolReport::default());
    }
    let workers = options.workers.max(1).min(total);

    let progress = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        progress.set_style(style.progress_chars("█▓░"));
    }

    let queue = Arc::new(WorkQueue::new(articles));
    let shared = Arc::new(Shared {
        connector,
        session_config,
        store,
        options,
        registry: FingerprintRegistry::new(),
        report: Mutex::new(PoolReport::default()),
        progress,
    });
    let cancel = CancellationToken::new();

    tracing::info!(articles = total, workers, "scraping articles");

    let mut worker_errors = 0;
    if workers == 1 {
        if let Err(err) = run_worker(1, Arc::clone(&shared), Arc::clone(&queue), cancel.clone()).await {
            tracing::error!(worker = 1, %err, "worker terminated");
            worker_errors += 1;
        }
    } else {
        let mut set = JoinSet::new();
        for id in 1..=workers {
            set.spawn(run_worker(id, Arc::clone(&shared), Arc::clone(&queue), cancel.clone()));
        }

        loop {
            tokio::select! {
                _ = queue.wait_drained() => break,
                joined = set.join_next() => match joined {
                    Some(outcome) => worker_errors += worker_exit(outcome),
                    None => break,
                },
            }
        }

        cancel.cancel();
        while let Some(outcome) = set.join_next().await {
            worker_errors += worker_exit(outcome);
        }
    }

    shared.progress.finish_and_clear();
    let mut report = shared
        .report
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    report.unprocessed = queue.pending();

    if report.unprocessed > 0 && worker_errors >= workers {
        anyhow::bail!(
            "all {workers} workers terminated with {} articles left in the queue",
            report.unprocessed
        );
    }
    Ok(report)
}

fn worker_exit(outcome: Result<Result<(), ScrapeError>, tokio::task::JoinError>) -> usize {
    match outcome {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            tracing::error!(%err, "worker terminated");
            1
        }
        Err(err) => {
            tracing::error!(%err, "worker task failed");
            1
        }
    }
}

/// One worker: session acquired on entry and released on every exit path.
async fn run_worker(
    id: usize,
    shared: Arc<Shared>,
    queue: Arc<WorkQueue>,
    cancel: CancellationToken,
) -> Result<(), ScrapeError> {
    let mut session = SiteSession::new(
        Arc::clone(&shared.connector),
        shared.session_config.clone(),
        format!("worker-{id}"),
    );
    let result = match session.start().await {
        Ok(()) => work_loop(&mut session, &shared, &queue, &cancel).await,
        Err(err) => Err(err),
    };
    session.close().await;
    result
}

async fn work_loop(
    session: &mut SiteSession,
    shared: &Shared,
    queue: &WorkQueue,
    cancel: &CancellationToken,
) -> Result<(), ScrapeError> {
    while !cancel.is_cancelled() {
        let Some((article, position)) = queue.pop() else {
            break;
        };
        tracing::debug!(session = session.label(), position, title = %article.title, "processing");

        let outcome = process_with_recovery(session, shared, &article).await;
        match outcome {
            Ok(outcome) => {
                shared.record(&article, outcome);
                queue.ack();
            }
            Err(err) => {
                shared.record(&article, ItemOutcome::Failed);
                queue.ack();
                return Err(err);
            }
        }

        sleep_with_jitter(shared.options.request_delay).await;
    }
    Ok(())
}

/// Per-item failures become `Failed`. A lost connection triggers one reconnect and one
/// more attempt; only a failed reconnect is returned as an error.
async fn process_with_recovery(
    session: &mut SiteSession,
    shared: &Shared,
    article: &FlatArticle,
) -> Result<ItemOutcome, ScrapeError> {
    match process_article(session, shared, article).await {
        Ok(outcome) => return Ok(outcome),
        Err(err) if err.is_connection_fatal() => {
            tracing::warn!(title = %article.title, url = %article.url, %err, "connection lost");
            session.reconnect().await?;
        }
        Err(err) => {
            tracing::warn!(title = %article.title, url = %article.url, %err, "article failed");
            return Ok(ItemOutcome::Failed);
        }
    }

    match process_article(session, shared, article).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            tracing::warn!(title = %article.title, url = %article.url, %err, "article failed after reconnect");
            Ok(ItemOutcome::Failed)
        }
    }
}

async fn process_article(
    session: &SiteSession,
    shared: &Shared,
    article: &FlatArticle,
) -> Result<ItemOutcome, ScrapeError> {
    let url = Url::parse(&article.url).map_err(|err| ScrapeError::invalid_url(&article.url, err))?;
    let fetched = session.fetch_article(&url).await?;
    let fingerprint = fetched.extract.fingerprint.clone();

    let key = match shared.options.dedup {
        DedupScope::Content => fingerprint.clone(),
        DedupScope::UrlAndContent => fingerprint.scoped_to(url_without_fragment(&article.url)),
    };
    if !shared.registry.claim(&key, article.index) {
        return Ok(ItemOutcome::Duplicate(fingerprint));
    }
    if shared.options.update && shared.options.previous.get(&article.url) == Some(&fingerprint) {
        return Ok(ItemOutcome::Unchanged(fingerprint));
    }

    shared
        .store
        .persist(article, &fetched.extract, &fingerprint)
        .map_err(|err| ScrapeError::Output(format!("{err:#}")))?;

    if shared.store.wants(OutputFormat::Pdf) {
        let rendered = match session.render_pdf(&url, fetched.print_href.as_deref()).await {
            Err(err) if err.is_connection_fatal() => return Err(err),
            other => other,
        };
        shared
            .store
            .persist_pdf(article, rendered)
            .map_err(|err| ScrapeError::Output(format!("{err:#}")))?;
    }

    Ok(ItemOutcome::Saved(fingerprint))
}
