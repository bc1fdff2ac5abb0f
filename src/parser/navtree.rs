use scraper::Html;
use url::Url;

use super::{ArticleExtract, dom};
use crate::error::ScrapeError;
use crate::formats::NavNode;

pub const CONTAINER: &str = "div#w_metadata_navtree";
const CONTENT_CHAIN: &[&str] = &["div#w_content", "div.content-wrapper"];

pub fn extract_toc_links(html: &str, page_url: &Url) -> Result<Vec<NavNode>, ScrapeError> {
    let document = Html::parse_document(html);
    let container =
        dom::first_match(&document, CONTAINER).ok_or_else(|| ScrapeError::StructureNotFound {
            container: CONTAINER.to_owned(),
        })?;
    Ok(super::toc_from_container(container, page_url))
}

pub fn extract_article(html: &str, url: &Url) -> ArticleExtract {
    super::extract_with_chain(html, url, CONTENT_CHAIN, |path| path.starts_with("/db/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://its.example/db/v8std/content/1/hdoc").expect("parse url")
    }

    #[test]
    fn reads_nested_navtree() {
        let html = r#"<div id="w_metadata_navtree"><ul>
            <li><a href="/db/v8std/content/2/hdoc">Standards</a>
              <ul><li><a href="/db/v8std/content/3/hdoc">Naming</a></li></ul></li>
        </ul></div>"#;
        let nodes = extract_toc_links(html, &page()).expect("navtree present");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].children[0].url, "https://its.example/db/v8std/content/3/hdoc");
    }

    #[test]
    fn article_links_are_limited_to_db_paths() {
        let html = r#"<html><body>
            <div id="w_metadata_navtree"><a href="/db/v8std/content/99/hdoc">Tree entry</a></div>
            <div id="w_content"><p>Body text</p>
              <a href="/db/v8std/content/5/hdoc">Related rule</a>
              <a href="/news/1">Latest news</a>
            </div></body></html>"#;
        let extract = extract_article(html, &page());
        let titles: Vec<_> = extract.nested_links.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["Related rule"]);
        assert!(!extract.text.contains("Tree entry"));
    }

    #[test]
    fn falls_back_to_body_without_chrome() {
        let html = r#"<html><body><nav><a href="/db/v8std/content/7/hdoc">Menu link</a></nav>
            <p>Only the body</p><a href="/db/v8std/content/8/hdoc">Body link</a></body></html>"#;
        let extract = extract_article(html, &page());
        assert_eq!(extract.text, "Only the body\nBody link");
        let titles: Vec<_> = extract.nested_links.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["Body link"]);
    }
}
