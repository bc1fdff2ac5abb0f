use scraper::Html;
use url::Url;

use super::{ArticleExtract, dom};
use crate::error::ScrapeError;
use crate::formats::NavNode;

pub const CONTAINER: &str = "div#w_metadata_toc";
pub const CONTENT_FRAME: &str = "w_metadata_doc_frame";
const NESTED_INDEX: &str = "div.index";

pub fn extract_toc_links(html: &str, page_url: &Url) -> Result<Vec<NavNode>, ScrapeError> {
    let document = Html::parse_document(html);
    let container =
        dom::first_match(&document, CONTAINER).ok_or_else(|| ScrapeError::StructureNotFound {
            container: CONTAINER.to_owned(),
        })?;
    Ok(super::toc_from_container(container, page_url))
}

/// `html` is the iframe document; the whole body is the article.
pub fn extract_article(html: &str, url: &Url) -> ArticleExtract {
    let document = Html::parse_document(html);
    let (content, text) = match dom::body(&document) {
        Some(body) => dom::render_filtered(body, &[dom::selector(super::INLINE_NOISE)]),
        None => (String::new(), String::new()),
    };
    let nested_links = dom::first_match(&document, NESTED_INDEX)
        .map(|index| dom::nested_links(index, url, |_| true))
        .unwrap_or_default();
    ArticleExtract::new(content, text, nested_links)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://its.example/db/book/content/1/hdoc").expect("parse url")
    }

    #[test]
    fn toc_links_are_absolute_and_in_document_order() {
        let html = r#"<html><body><div id="w_metadata_toc"><ul>
            <li><a href="/db/book/content/10/hdoc">Chapter one</a>
              <ul><li><a href="/db/book/content/11/hdoc">Section 1.1</a></li></ul>
            </li>
            <li><a href="/db/book/content/20/hdoc">Chapter two</a></li>
            <li><a href="https://its.example/db/book/content/30/hdoc">Chapter three</a></li>
        </ul></div></body></html>"#;
        let nodes = extract_toc_links(html, &page()).expect("toc present");
        let urls: Vec<_> = nodes.iter().map(|n| n.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://its.example/db/book/content/10/hdoc",
                "https://its.example/db/book/content/20/hdoc",
                "https://its.example/db/book/content/30/hdoc",
            ]
        );
        assert_eq!(nodes[0].children[0].title, "Section 1.1");
    }

    #[test]
    fn missing_container_is_structure_not_found() {
        let err = extract_toc_links("<html><body><p>nothing</p></body></html>", &page())
            .expect_err("no toc");
        assert!(matches!(err, ScrapeError::StructureNotFound { .. }));
    }

    #[test]
    fn empty_container_yields_no_nodes() {
        let nodes = extract_toc_links(r#"<div id="w_metadata_toc"></div>"#, &page())
            .expect("container present");
        assert!(nodes.is_empty());
    }

    #[test]
    fn nested_index_links_pass_filters() {
        let html = r#"<html><body><h1>Overview</h1><p>Intro text.</p>
            <div class="index">
              <a href="/db/book/content/12/hdoc">Nested Article 1</a>
              <a href="/db/book/content/13/hdoc">Nested Article 2</a>
              <a href="/db/other/content/1/hdoc">См. книгу «Другая»</a>
              <a href="/db/book/content/14/hdoc">7</a>
              <a href="https://elsewhere.example/db/x">Foreign host</a>
            </div></body></html>"#;
        let extract = extract_article(html, &page());
        let titles: Vec<_> = extract.nested_links.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["Nested Article 1", "Nested Article 2"]);
        assert!(extract.text.contains("Intro text."));
        assert!(!extract.fingerprint.is_empty_sentinel());
    }
}
