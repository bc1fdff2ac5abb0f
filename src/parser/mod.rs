//! Layout-specific extractors.
//!
//! The documentation site renders articles in several incompatible DOM shapes. Each
//! [`ParserVariant`] knows one of them and offers the same two operations: read the
//! navigation tree, and read an article (content, nested links, fingerprint).

mod dom;
pub mod dynamic_tree;
pub mod navtree;
pub mod select;
pub mod toc;

use scraper::{ElementRef, Html};
use serde::Serialize;
use url::Url;

pub use select::select_parser;

use crate::error::ScrapeError;
use crate::fingerprint::Fingerprint;
use crate::formats::NavNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserVariant {
    /// Classic `div#w_metadata_toc` table of contents; articles live in an iframe.
    Toc,
    /// `div#w_metadata_navtree` with articles in `div#w_content`.
    NavTree,
    /// Client-rendered tree; the most permissive variant.
    DynamicTree,
}

#[derive(Debug, Clone)]
pub struct ArticleExtract {
    pub html: String,
    pub text: String,
    pub nested_links: Vec<NavNode>,
    pub fingerprint: Fingerprint,
}

impl ArticleExtract {
    fn new(html: String, text: String, nested_links: Vec<NavNode>) -> Self {
        let fingerprint = Fingerprint::of_text(&text);
        Self {
            html,
            text: crate::fingerprint::normalize_text(&text),
            nested_links,
            fingerprint,
        }
    }
}

impl ParserVariant {
    pub fn name(self) -> &'static str {
        match self {
            Self::Toc => "toc",
            Self::NavTree => "navtree",
            Self::DynamicTree => "dynamic_tree",
        }
    }

    pub fn extract_toc_links(self, html: &str, page_url: &Url) -> Result<Vec<NavNode>, ScrapeError> {
        match self {
            Self::Toc => toc::extract_toc_links(html, page_url),
            Self::NavTree => navtree::extract_toc_links(html, page_url),
            Self::DynamicTree => dynamic_tree::extract_toc_links(html, page_url),
        }
    }

    pub fn extract_article(self, html: &str, url: &Url) -> ArticleExtract {
        match self {
            Self::Toc => toc::extract_article(html, url),
            Self::NavTree => navtree::extract_article(html, url),
            Self::DynamicTree => dynamic_tree::extract_article(html, url),
        }
    }

    /// Name of the iframe holding the article body, for layouts that embed it.
    pub fn content_frame(self) -> Option<&'static str> {
        match self {
            Self::Toc => Some(toc::CONTENT_FRAME),
            Self::NavTree | Self::DynamicTree => None,
        }
    }
}

const INLINE_NOISE: &str = "script, style, noscript";
const PAGE_CHROME: &str = "nav, header, footer, aside, .tree, .navigation, .sidebar, \
    #w_metadata_toc, #w_metadata_navtree, #w_metadata_tree, script, style, noscript";

/// Tries each container in `chain`; when none exists, falls back to the body with
/// navigation chrome removed. Nested links come from whatever was kept.
fn extract_with_chain<F>(html: &str, url: &Url, chain: &[&str], path_filter: F) -> ArticleExtract
where
    F: Fn(&str) -> bool,
{
    let document = Html::parse_document(html);

    if let Some(container) = chain.iter().find_map(|css| dom::first_match(&document, css)) {
        let (content, text) = dom::render_filtered(container, &[dom::selector(INLINE_NOISE)]);
        let links = dom::nested_links(container, url, &path_filter);
        return ArticleExtract::new(content, text, links);
    }

    let Some(body) = dom::body(&document) else {
        return ArticleExtract::new(String::new(), String::new(), Vec::new());
    };
    let (content, text) = dom::render_filtered(body, &[dom::selector(PAGE_CHROME)]);
    let kept = Html::parse_fragment(&content);
    let links = dom::nested_links(kept.root_element(), url, &path_filter);
    ArticleExtract::new(content, text, links)
}

fn toc_from_container(container: ElementRef<'_>, page_url: &Url) -> Vec<NavNode> {
    let list = dom::selector("ul");
    match container.select(&list).next() {
        Some(ul) => dom::parse_nested_list(ul, page_url),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://its.example/db/v8std/content/1/hdoc").expect("parse url")
    }

    #[test]
    fn re_extraction_is_idempotent() {
        let html = r#"<html><body><div id="w_content"><p>Stable text</p></div></body></html>"#;
        let a = ParserVariant::NavTree.extract_article(html, &page());
        let b = ParserVariant::NavTree.extract_article(html, &page());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert!(!a.fingerprint.is_empty_sentinel());
    }

    #[test]
    fn blank_article_gets_sentinel_fingerprint() {
        let html = r#"<html><body><div id="w_content">   </div></body></html>"#;
        let extract = ParserVariant::NavTree.extract_article(html, &page());
        assert!(extract.fingerprint.is_empty_sentinel());
    }

    #[test]
    fn only_classic_layout_reads_an_iframe() {
        assert_eq!(ParserVariant::Toc.content_frame(), Some("w_metadata_doc_frame"));
        assert_eq!(ParserVariant::NavTree.content_frame(), None);
        assert_eq!(ParserVariant::DynamicTree.content_frame(), None);
    }
}
