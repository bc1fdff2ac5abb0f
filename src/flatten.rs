use std::collections::HashSet;

use crate::config::FragmentPolicy;
use crate::formats::{FlatArticle, NavNode, url_without_fragment};

const TITLE_CHARS: usize = 50;

/// Pre-order walk of the tree; indexes are 1-based and fix each article's filename.
pub fn flatten(tree: &[NavNode], fragments: FragmentPolicy) -> Vec<FlatArticle> {
    let mut articles = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<(&NavNode, Vec<String>)> =
        tree.iter().rev().map(|node| (node, Vec::new())).collect();

    while let Some((node, breadcrumb)) = stack.pop() {
        let mut child_crumb = breadcrumb.clone();
        child_crumb.push(node.title.clone());
        for child in node.children.iter().rev() {
            stack.push((child, child_crumb.clone()));
        }

        if fragments == FragmentPolicy::SameArticle
            && !seen.insert(url_without_fragment(&node.url).to_owned())
        {
            continue;
        }

        let index = articles.len() + 1;
        articles.push(FlatArticle {
            index,
            title: node.title.clone(),
            url: node.url.clone(),
            breadcrumb,
            filename_base: filename_base(index, &node.title),
            content_hash: None,
        });
    }

    articles
}

pub fn filename_base(index: usize, title: &str) -> String {
    format!("{index:03}_{}", sanitize_title(title))
}

/// Lowercase alphanumerics, spaces turned into `_`, at most 50 characters.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    kept.trim()
        .replace(' ', "_")
        .chars()
        .take(TITLE_CHARS)
        .collect()
}
