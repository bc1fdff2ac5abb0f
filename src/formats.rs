use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavNode {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub children: Vec<NavNode>,
}

impl NavNode {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

/// One scrapeable article. Also the record shape of `_meta.json` and the flat index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatArticle {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub breadcrumb: Vec<String>,
    pub filename_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<Fingerprint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDocument {
    pub title: String,
    pub url: String,
    pub breadcrumb: Vec<String>,
    pub content: String,
    pub content_hash: Fingerprint,
    pub scraped_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownFrontMatter {
    pub title: String,
    pub url: String,
    pub breadcrumb: Vec<String>,
    pub content_hash: Fingerprint,
}

/// Drops the `#fragment` part; discovery treats such URLs as one destination.
pub fn url_without_fragment(url: &str) -> &str {
    match url.split_once('#') {
        Some((base, _)) => base,
        None => url,
    }
}
