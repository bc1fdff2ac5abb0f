use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use url::Url;

use crate::browser::BrowserConnector;
use crate::browser::cdp::CdpConnector;
use crate::cli::ScrapeArgs;
use crate::config::ScrapeConfig;
use crate::discovery::{TreeDiscovery, expand_interactive};
use crate::flatten::flatten;
use crate::formats::{FlatArticle, NavNode};
use crate::parser::ParserVariant;
use crate::pool::{PoolOptions, PoolReport, run_pool};
use crate::session::SiteSession;
use crate::store::{OutputStore, should_force_reindex};

/// Totals of one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub articles: Vec<FlatArticle>,
    pub rediscovered: bool,
    pub report: Option<PoolReport>,
}

pub async fn run(args: ScrapeArgs) -> anyhow::Result<()> {
    let config = ScrapeConfig::from_args(&args)?;
    let connector = Arc::new(CdpConnector::new(
        config.session.browser_url.clone(),
        config.session.network_timeout,
    ));
    let summary = execute(config, connector).await?;
    tracing::info!(
        output_dir = %summary.output_dir.display(),
        articles = summary.articles.len(),
        "done"
    );
    Ok(())
}

/// Discovers the tree under the seed URL and, unless `no_scrape` is set, scrapes every
/// article into the output directory.
pub async fn execute(
    config: ScrapeConfig,
    connector: Arc<dyn BrowserConnector>,
) -> anyhow::Result<RunSummary> {
    let output_dir = config.out_dir.join(output_name(&config.seed_url));
    let store = Arc::new(OutputStore::new(
        output_dir.clone(),
        config.formats.clone(),
        config.rag,
    ));

    let mut session = SiteSession::new(Arc::clone(&connector), config.session.clone(), "discovery");
    let planned = async {
        session.start().await.context("start browser session")?;
        plan_tree(&config, &store, &mut session).await
    }
    .await;
    let (tree, rediscovered) = match planned {
        Ok(planned) => planned,
        Err(err) => {
            session.close().await;
            return Err(err);
        }
    };
    session.close().await;

    let mut articles = flatten(&tree, config.fragments);
    tracing::info!(
        articles = articles.len(),
        output_dir = %output_dir.display(),
        "navigation tree ready"
    );

    store.prepare(config.update)?;
    store.persist_tree(&tree)?;
    store.persist_index(&articles)?;

    if config.no_scrape {
        tracing::info!("--no-scrape set; skipping article download");
        return Ok(RunSummary {
            output_dir,
            articles,
            rediscovered,
            report: None,
        });
    }

    let previous: HashMap<String, _> = store
        .load_metadata()?
        .into_iter()
        .filter_map(|article| article.content_hash.map(|hash| (article.url, hash)))
        .collect();

    let queued: Vec<FlatArticle> = match config.limit {
        Some(limit) => articles.iter().take(limit).cloned().collect(),
        None => articles.clone(),
    };

    let report = run_pool(
        queued,
        connector,
        config.session.clone(),
        Arc::clone(&store),
        PoolOptions {
            workers: config.workers,
            update: config.update,
            dedup: config.dedup,
            request_delay: config.request_delay,
            previous: previous.clone(),
        },
    )
    .await?;

    for article in &mut articles {
        article.content_hash = report
            .fingerprints
            .get(&article.index)
            .or_else(|| previous.get(&article.url))
            .cloned();
    }
    store.persist_metadata(&articles)?;
    store.persist_table_of_contents(&tree, &articles)?;

    tracing::info!(
        saved = report.saved,
        duplicates = report.duplicates,
        unchanged = report.unchanged,
        failed = report.failed,
        unprocessed = report.unprocessed,
        "scrape finished"
    );

    Ok(RunSummary {
        output_dir,
        articles,
        rediscovered,
        report: Some(report),
    })
}

/// Reuses the saved tree when it is still trustworthy, otherwise discovers a fresh one.
/// Returns the tree and whether discovery ran.
async fn plan_tree(
    config: &ScrapeConfig,
    store: &OutputStore,
    session: &mut SiteSession,
) -> anyhow::Result<(Vec<NavNode>, bool)> {
    let saved = if config.force_reindex {
        None
    } else {
        store.load_tree()?
    };

    let Some(saved) = saved else {
        let tree = discover(config, session, None).await?;
        return Ok((tree, true));
    };
    if !config.update {
        tracing::info!(entries = saved.len(), "reusing saved navigation tree");
        return Ok((saved, false));
    }

    let (variant, fresh_roots) = session
        .fetch_toc(&config.seed_url)
        .await
        .context("read root table of contents")?;
    let previous = store.load_metadata()?;
    let fresh = flatten(&fresh_roots, config.fragments);
    if should_force_reindex(&fresh, &previous) {
        tracing::info!("site structure changed; rediscovering");
        let tree = discover(config, session, Some((variant, fresh_roots))).await?;
        return Ok((tree, true));
    }

    tracing::info!(entries = saved.len(), "structure unchanged; reusing saved navigation tree");
    Ok((saved, false))
}

async fn discover(
    config: &ScrapeConfig,
    session: &mut SiteSession,
    root: Option<(ParserVariant, Vec<NavNode>)>,
) -> anyhow::Result<Vec<NavNode>> {
    let (variant, mut roots) = match root {
        Some(root) => root,
        None => session
            .fetch_toc(&config.seed_url)
            .await
            .context("read root table of contents")?,
    };
    tracing::info!(variant = variant.name(), roots = roots.len(), "root table of contents");

    if variant == ParserVariant::DynamicTree && config.interactive {
        match expand_interactive(session, &config.seed_url, config.max_depth, config.click_settle).await {
            Ok(expanded) if !expanded.is_empty() => roots = expanded,
            Ok(_) => tracing::debug!("interactive expansion revealed nothing"),
            Err(err) if err.is_connection_fatal() => {
                return Err(err).context("interactive tree expansion");
            }
            Err(err) => tracing::warn!(%err, "interactive tree expansion failed; using static tree"),
        }
    }

    TreeDiscovery::new(session, config.max_depth, config.request_delay)
        .expand(&mut roots)
        .await
        .context("tree discovery")?;
    Ok(roots)
}

/// Last non-empty path segment of the seed URL, else its host.
pub fn output_name(seed_url: &Url) -> String {
    seed_url
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .map(str::to_owned)
        .or_else(|| seed_url.host_str().map(str::to_owned))
        .unwrap_or_else(|| "site".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_uses_last_path_segment() -> anyhow::Result<()> {
        assert_eq!(output_name(&Url::parse("https://its.1c.ru/db/v8std")?), "v8std");
        assert_eq!(output_name(&Url::parse("https://its.1c.ru/db/v8327doc/")?), "v8327doc");
        assert_eq!(output_name(&Url::parse("https://its.1c.ru/")?), "its.1c.ru");
        Ok(())
    }
}
