//! Recursive tree discovery.
//!
//! Depth is counted in levels: seed entries are level 1, and a node is only visited
//! while its level is below `max_depth`, so a tree never grows past `max_depth` levels.

mod interactive;

use std::collections::HashSet;
use std::time::Duration;

use url::Url;

pub use interactive::expand_interactive;

use crate::error::ScrapeError;
use crate::formats::{NavNode, url_without_fragment};
use crate::retry::sleep_with_jitter;
use crate::session::SiteSession;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub visited: usize,
    pub failed: usize,
    pub added: usize,
}

pub struct TreeDiscovery<'a> {
    session: &'a mut SiteSession,
    max_depth: usize,
    request_delay: Duration,
}

impl<'a> TreeDiscovery<'a> {
    pub fn new(session: &'a mut SiteSession, max_depth: usize, request_delay: Duration) -> Self {
        Self {
            session,
            max_depth,
            request_delay,
        }
    }

    /// Visits every node of `roots` depth-first and appends nested links found on each
    /// page as new children. Nodes already present (e.g. from a saved tree) are expanded
    /// too. A failing node abandons only its own branch.
    pub async fn expand(&mut self, roots: &mut Vec<NavNode>) -> Result<DiscoveryStats, ScrapeError> {
        let mut stats = DiscoveryStats::default();
        let mut known = known_urls(roots);
        let mut visited: HashSet<String> = HashSet::new();
        let mut reconnected: HashSet<String> = HashSet::new();

        let mut stack: Vec<(Vec<usize>, usize)> =
            (0..roots.len()).rev().map(|i| (vec![i], 1)).collect();

        while let Some((path, level)) = stack.pop() {
            if level >= self.max_depth {
                continue;
            }
            let Some(node) = node_at(roots, &path) else {
                continue;
            };
            let key = url_without_fragment(&node.url).to_owned();
            if !visited.insert(key.clone()) {
                continue;
            }
            let (title, url) = (node.title.clone(), node.url.clone());

            match self.nested_links(&url).await {
                Ok(links) => {
                    stats.visited += 1;
                    if let Some(node) = node_at_mut(roots, &path) {
                        for link in links {
                            if known.insert(url_without_fragment(&link.url).to_owned()) {
                                node.children.push(NavNode::new(link.title, link.url));
                                stats.added += 1;
                            }
                        }
                    }
                }
                Err(err) if err.is_connection_fatal() && reconnected.insert(key.clone()) => {
                    tracing::warn!(%title, %url, %err, "browser lost during discovery");
                    self.session.reconnect().await?;
                    visited.remove(&key);
                    stack.push((path, level));
                    continue;
                }
                Err(err) => {
                    stats.failed += 1;
                    tracing::warn!(%title, %url, %err, "skipping branch");
                    continue;
                }
            }

            let child_count = node_at(roots, &path).map_or(0, |node| node.children.len());
            for i in (0..child_count).rev() {
                let mut child = path.clone();
                child.push(i);
                stack.push((child, level + 1));
            }
            sleep_with_jitter(self.request_delay).await;
        }

        tracing::info!(
            visited = stats.visited,
            added = stats.added,
            failed = stats.failed,
            "discovery finished"
        );
        Ok(stats)
    }

    async fn nested_links(&self, url: &str) -> Result<Vec<NavNode>, ScrapeError> {
        let parsed = Url::parse(url).map_err(|err| ScrapeError::invalid_url(url, err))?;
        let fetched = self.session.fetch_article(&parsed).await?;
        tracing::debug!(%url, variant = fetched.variant.name(), links = fetched.extract.nested_links.len(), "expanded node");
        Ok(fetched.extract.nested_links)
    }
}

fn known_urls(roots: &[NavNode]) -> HashSet<String> {
    let mut known = HashSet::new();
    let mut stack: Vec<&NavNode> = roots.iter().collect();
    while let Some(node) = stack.pop() {
        known.insert(url_without_fragment(&node.url).to_owned());
        stack.extend(node.children.iter());
    }
    known
}

fn node_at<'t>(roots: &'t [NavNode], path: &[usize]) -> Option<&'t NavNode> {
    let (first, rest) = path.split_first()?;
    let mut node = roots.get(*first)?;
    for i in rest {
        node = node.children.get(*i)?;
    }
    Some(node)
}

fn node_at_mut<'t>(roots: &'t mut [NavNode], path: &[usize]) -> Option<&'t mut NavNode> {
    let (first, rest) = path.split_first()?;
    let mut node = roots.get_mut(*first)?;
    for i in rest {
        node = node.children.get_mut(*i)?;
    }
    Some(node)
}
