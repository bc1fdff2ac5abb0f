use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use url::Url;

use crate::browser::{BrowserPage, RenderedAnchor};
use crate::error::ScrapeError;
use crate::formats::{NavNode, url_without_fragment};
use crate::parser::dynamic_tree::{CONTENT_LINKS, TREE_ANCHORS};
use crate::session::SiteSession;

struct Entry {
    title: String,
    url: String,
    key: String,
    children: Vec<usize>,
}

/// Entries still to be clicked at one tree level.
struct Level {
    depth: usize,
    pending: VecDeque<usize>,
}

/// Expands a lazily rendered navigation tree by clicking through it.
///
/// Each click is followed by `settle`, then the tree and the content panel are re-read.
/// Newly revealed tree entries become children of the clicked entry and are clicked
/// next, one level deeper; content-panel links become leaf articles. Elements are
/// looked up fresh by key before every click.
pub async fn expand_interactive(
    session: &SiteSession,
    seed_url: &Url,
    max_depth: usize,
    settle: Duration,
) -> Result<Vec<NavNode>, ScrapeError> {
    let page = session.open(seed_url.as_str()).await?;
    let result = Expansion::new(page.as_ref(), seed_url.clone(), max_depth, settle)
        .run()
        .await;
    if let Err(err) = page.close().await {
        tracing::debug!(%err, "ignoring page close failure");
    }
    result
}

struct Expansion<'p> {
    page: &'p dyn BrowserPage,
    page_url: Url,
    max_depth: usize,
    settle: Duration,
    entries: Vec<Entry>,
    by_key: HashMap<String, usize>,
}

impl<'p> Expansion<'p> {
    fn new(page: &'p dyn BrowserPage, page_url: Url, max_depth: usize, settle: Duration) -> Self {
        Self {
            page,
            page_url,
            max_depth,
            settle,
            entries: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    async fn run(mut self) -> Result<Vec<NavNode>, ScrapeError> {
        if let Ok(current) = self.page.url().await
            && let Ok(current) = Url::parse(&current)
        {
            self.page_url = current;
        }

        let initial = self.page.rendered_anchors(TREE_ANCHORS).await?;
        let roots: Vec<usize> = initial
            .iter()
            .filter_map(|anchor| self.register(anchor))
            .collect();

        let mut levels = Vec::new();
        if 1 < self.max_depth {
            levels.push(Level {
                depth: 1,
                pending: roots.iter().copied().collect(),
            });
        }

        let mut clicks = 0usize;
        while let Some(level) = levels.last_mut() {
            let Some(entry) = level.pending.pop_front() else {
                levels.pop();
                continue;
            };
            let depth = level.depth;

            let revealed = match self.open_entry(entry).await {
                Ok(revealed) => revealed,
                Err(err) if err.is_connection_fatal() => return Err(err),
                Err(err) => {
                    let title = &self.entries[entry].title;
                    tracing::warn!(%title, %err, "tree entry click failed");
                    continue;
                }
            };
            clicks += 1;

            if !revealed.is_empty() && depth + 1 < self.max_depth {
                levels.push(Level {
                    depth: depth + 1,
                    pending: revealed.into(),
                });
            }
        }

        tracing::info!(
            clicks,
            entries = self.entries.len(),
            "interactive tree expansion finished"
        );
        Ok(roots.iter().map(|&root| self.build(root)).collect())
    }

    /// Clicks `entry` and records what appeared. Returns newly revealed tree entries.
    async fn open_entry(&mut self, entry: usize) -> Result<Vec<usize>, ScrapeError> {
        let anchors = self.page.rendered_anchors(TREE_ANCHORS).await?;
        let key = &self.entries[entry].key;
        let Some(position) = anchors
            .iter()
            .position(|anchor| self.key_of(anchor).as_deref() == Some(key.as_str()))
        else {
            tracing::debug!(title = %self.entries[entry].title, "tree entry no longer rendered");
            return Ok(Vec::new());
        };

        if !self.page.click_nth(TREE_ANCHORS, position).await? {
            return Ok(Vec::new());
        }
        tokio::time::sleep(self.settle).await;

        let mut revealed = Vec::new();
        for anchor in self.page.rendered_anchors(TREE_ANCHORS).await? {
            if let Some(child) = self.register(&anchor) {
                self.entries[entry].children.push(child);
                revealed.push(child);
            }
        }
        for link in self.page.rendered_anchors(CONTENT_LINKS).await? {
            if let Some(child) = self.register(&link) {
                self.entries[entry].children.push(child);
            }
        }
        Ok(revealed)
    }

    /// Records an anchor not seen before and returns its index.
    fn register(&mut self, anchor: &RenderedAnchor) -> Option<usize> {
        let key = self.key_of(anchor)?;
        if self.by_key.contains_key(&key) {
            return None;
        }
        let url = self
            .page_url
            .join(anchor.href.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or_else(|| self.page_url.clone());
        let index = self.entries.len();
        self.entries.push(Entry {
            title: anchor.title.trim().to_owned(),
            url: url.to_string(),
            key: key.clone(),
            children: Vec::new(),
        });
        self.by_key.insert(key, index);
        Some(index)
    }

    /// Navigable anchors are keyed by URL, toggles without a target by title.
    fn key_of(&self, anchor: &RenderedAnchor) -> Option<String> {
        let title = anchor.title.trim();
        if title.is_empty() {
            return None;
        }
        let href = anchor.href.trim();
        let navigable = !href.is_empty() && !href.starts_with('#');
        match self.page_url.join(href) {
            Ok(url) if navigable && matches!(url.scheme(), "http" | "https") => {
                Some(url_without_fragment(url.as_str()).to_owned())
            }
            _ => Some(format!("title:{title}")),
        }
    }

    fn build(&self, index: usize) -> NavNode {
        let entry = &self.entries[index];
        let mut node = NavNode::new(entry.title.clone(), entry.url.clone());
        node.children = entry.children.iter().map(|&child| self.build(child)).collect();
        node
    }
}
