use scraper::Html;
use url::Url;

use super::{ParserVariant, dom};
use crate::error::ScrapeError;

/// Documentation families whose layout is known from the URL alone.
const URL_PATTERNS: &[(&str, ParserVariant)] = &[
    ("v8std", ParserVariant::NavTree),
    ("v8327doc", ParserVariant::NavTree),
];

/// Container signals in priority order.
const DOM_SIGNALS: &[(&str, ParserVariant)] = &[
    ("div#w_metadata_navtree", ParserVariant::NavTree),
    ("div#w_metadata_toc", ParserVariant::Toc),
    (".tree", ParserVariant::DynamicTree),
    ("div#w_metadata_tree", ParserVariant::DynamicTree),
    ("div#w_content", ParserVariant::NavTree),
    ("div.content-wrapper", ParserVariant::NavTree),
    ("iframe[name=\"w_metadata_doc_frame\"]", ParserVariant::Toc),
    ("iframe#w_metadata_doc_frame", ParserVariant::Toc),
    ("div.index", ParserVariant::Toc),
];

pub fn variant_for_url(url: &Url) -> Option<ParserVariant> {
    let path = url.path();
    URL_PATTERNS
        .iter()
        .find(|(pattern, _)| path.contains(pattern))
        .map(|(_, variant)| *variant)
}

/// Known containers present in `html`, for structure reports.
pub fn known_containers(html: &str) -> Vec<&'static str> {
    let document = Html::parse_document(html);
    DOM_SIGNALS
        .iter()
        .filter(|(css, _)| dom::first_match(&document, css).is_some())
        .map(|(css, _)| *css)
        .collect()
}

/// Picks the parser for a page: URL patterns first, then DOM signals, then the
/// permissive dynamic-tree parser for any page that has body text at all.
pub fn select_parser(url: &Url, html: Option<&str>) -> Result<ParserVariant, ScrapeError> {
    if let Some(variant) = variant_for_url(url) {
        return Ok(variant);
    }

    let unknown = || ScrapeError::UnknownStructure {
        url: url.to_string(),
    };
    let html = html.filter(|html| !html.trim().is_empty()).ok_or_else(unknown)?;
    let document = Html::parse_document(html);

    if let Some((_, variant)) = DOM_SIGNALS
        .iter()
        .find(|(css, _)| dom::first_match(&document, css).is_some())
    {
        return Ok(*variant);
    }

    match dom::body(&document) {
        Some(body) if !dom::text_of(body).is_empty() => Ok(ParserVariant::DynamicTree),
        _ => Err(unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("parse url")
    }

    #[test]
    fn url_patterns_win_over_dom() {
        let html = r#"<div id="w_metadata_toc"></div>"#;
        let variant =
            select_parser(&url("https://its.example/db/v8std/content/1/hdoc"), Some(html));
        assert_eq!(variant.expect("selected"), ParserVariant::NavTree);
    }

    #[test]
    fn dom_signals_decide_when_url_is_unknown() {
        let u = url("https://its.example/db/cabinetdoc");
        let cases = [
            (r#"<div id="w_metadata_navtree"></div>"#, ParserVariant::NavTree),
            (r#"<div id="w_metadata_toc"></div>"#, ParserVariant::Toc),
            (r#"<div class="tree"></div>"#, ParserVariant::DynamicTree),
            (r#"<div id="w_content"></div>"#, ParserVariant::NavTree),
            (r#"<iframe name="w_metadata_doc_frame"></iframe>"#, ParserVariant::Toc),
            (r#"<div class="index"></div>"#, ParserVariant::Toc),
        ];
        for (html, expected) in cases {
            assert_eq!(select_parser(&u, Some(html)).expect(html), expected, "{html}");
        }
    }

    #[test]
    fn inconclusive_dom_defaults_to_permissive_variant() {
        let u = url("https://its.example/db/unknown");
        let variant = select_parser(&u, Some("<html><body><p>Some text</p></body></html>"));
        assert_eq!(variant.expect("selected"), ParserVariant::DynamicTree);
    }

    #[test]
    fn no_signal_at_all_is_unknown_structure() {
        let u = url("https://its.example/db/unknown");
        assert!(matches!(
            select_parser(&u, None),
            Err(ScrapeError::UnknownStructure { .. })
        ));
        assert!(matches!(
            select_parser(&u, Some("<html><body>   </body></html>")),
            Err(ScrapeError::UnknownStructure { .. })
        ));
    }

    #[test]
    fn reports_present_containers() {
        let found = known_containers(
            r#"<div id="w_metadata_toc"></div><iframe id="w_metadata_doc_frame"></iframe>"#,
        );
        assert_eq!(found, ["div#w_metadata_toc", "iframe#w_metadata_doc_frame"]);
    }
}
