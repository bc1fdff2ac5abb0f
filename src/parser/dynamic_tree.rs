use scraper::Html;
use url::Url;

use super::{ArticleExtract, dom};
use crate::error::ScrapeError;
use crate::formats::NavNode;

const CONTAINERS: &[&str] = &[".tree", "div#w_metadata_tree", "aside"];
const CONTENT_CHAIN: &[&str] = &[
    "div#w_content",
    "div.content",
    "article",
    "main",
    "div[id*=\"content\"]",
];

/// Anchors of the rendered navigation tree, re-read after every click.
pub const TREE_ANCHORS: &str = ".tree a, #w_metadata_tree a";
/// Article links shown in the content panel once a tree entry is opened.
pub const CONTENT_LINKS: &str = "#w_content a, div.content a, li.doc a";

pub fn extract_toc_links(html: &str, page_url: &Url) -> Result<Vec<NavNode>, ScrapeError> {
    let document = Html::parse_document(html);
    let container = CONTAINERS
        .iter()
        .find_map(|css| dom::first_match(&document, css))
        .ok_or_else(|| ScrapeError::StructureNotFound {
            container: CONTAINERS.join(" | "),
        })?;

    let nodes = super::toc_from_container(container, page_url);
    if nodes.is_empty() {
        return Ok(dom::all_anchors(container, page_url));
    }
    Ok(nodes)
}

pub fn extract_article(html: &str, url: &Url) -> ArticleExtract {
    super::extract_with_chain(html, url, CONTENT_CHAIN, |path| {
        path.starts_with("/db/") || path.starts_with("/section/")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://its.example/section/dev").expect("parse url")
    }

    #[test]
    fn prefers_tree_then_falls_back_to_aside() {
        let html = r#"<aside><ul><li><a href="/db/x">Aside entry</a></li></ul></aside>"#;
        let nodes = extract_toc_links(html, &page()).expect("aside present");
        assert_eq!(nodes[0].title, "Aside entry");

        let html = r#"<aside><ul><li><a href="/db/x">Aside</a></li></ul></aside>
            <div class="tree"><ul><li><a href="/db/y">Tree</a></li></ul></div>"#;
        let nodes = extract_toc_links(html, &page()).expect("tree present");
        assert_eq!(nodes[0].title, "Tree");
    }

    #[test]
    fn tree_without_list_collects_flat_anchors() {
        let html = r#"<div id="w_metadata_tree"><a href="/db/a">First</a><span><a href="/db/b">Second</a></span></div>"#;
        let nodes = extract_toc_links(html, &page()).expect("tree present");
        let titles: Vec<_> = nodes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["First", "Second"]);
        assert!(nodes.iter().all(|n| n.children.is_empty()));
    }

    #[test]
    fn no_container_is_structure_not_found() {
        let err = extract_toc_links("<html><body><p>plain</p></body></html>", &page())
            .expect_err("no tree");
        assert!(matches!(err, ScrapeError::StructureNotFound { .. }));
    }

    #[test]
    fn accepts_section_and_db_links() {
        let html = r#"<html><body><div class="content"><p>Text</p>
            <a href="/section/dev/tools">Tools section</a>
            <a href="/db/metod/content/1">Method article</a>
            <a href="/about">About site</a></div></body></html>"#;
        let extract = extract_article(html, &page());
        assert_eq!(extract.nested_links.len(), 2);
    }
}
