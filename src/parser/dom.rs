use std::collections::HashSet;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::formats::{NavNode, url_without_fragment};

/// Anchor texts that point at other books rather than nested articles.
const BOILERPLATE_PHRASES: &[&str] = &[
    "см. книгу",
    "см. также книгу",
    "смотри книгу",
    "перейти к книге",
    "открыть книгу",
    "see book",
    "see the book",
    "back to top",
    "наверх",
    "в начало",
];

const MIN_ANCHOR_CHARS: usize = 3;

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("built-in selector `{css}` is invalid: {err}"))
}

pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves an anchor href against the page URL, keeping only http(s) targets.
pub(crate) fn resolve_href(href: &str, page_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let resolved = page_url.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

/// Deepest list level kept. A saved tree is reloaded through serde_json, whose
/// nesting limit counts two levels per node.
const MAX_LIST_DEPTH: usize = 50;

struct ListLevel<'a> {
    items: std::vec::IntoIter<ElementRef<'a>>,
    nodes: Vec<NavNode>,
    parent: Option<NavNode>,
}

impl<'a> ListLevel<'a> {
    fn open(ul: ElementRef<'a>, parent: Option<NavNode>) -> Self {
        let items: Vec<_> = child_elements(ul)
            .filter(|el| el.value().name() == "li")
            .collect();
        Self {
            items: items.into_iter(),
            nodes: Vec::new(),
            parent,
        }
    }
}

/// Walks a `ul` the way tables of contents nest: each direct `li` holds one anchor
/// and optionally a nested `ul` with its children.
pub(crate) fn parse_nested_list(ul: ElementRef<'_>, page_url: &Url) -> Vec<NavNode> {
    let nested_ul = selector("ul");
    let mut stack = vec![ListLevel::open(ul, None)];
    let mut roots = Vec::new();
    let mut truncated = false;

    loop {
        let depth = stack.len();
        let Some(level) = stack.last_mut() else {
            break;
        };
        if let Some(li) = level.items.next() {
            let Some(node) = list_entry(li, page_url) else {
                continue;
            };
            match li.select(&nested_ul).next() {
                Some(child_ul) if depth < MAX_LIST_DEPTH => {
                    stack.push(ListLevel::open(child_ul, Some(node)));
                }
                Some(_) => {
                    truncated = true;
                    level.nodes.push(node);
                }
                None => level.nodes.push(node),
            }
            continue;
        }

        let Some(ListLevel { nodes, parent, .. }) = stack.pop() else {
            break;
        };
        match (parent, stack.last_mut()) {
            (Some(mut parent), Some(outer)) => {
                parent.children = nodes;
                outer.nodes.push(parent);
            }
            _ => roots = nodes,
        }
    }

    if truncated {
        tracing::warn!(limit = MAX_LIST_DEPTH, "list nesting too deep, dropping deeper levels");
    }
    roots
}

fn list_entry(li: ElementRef<'_>, page_url: &Url) -> Option<NavNode> {
    let anchor = child_elements(li).find(|el| el.value().name() == "a")?;
    let title = text_of(anchor);
    let url = resolve_href(anchor.value().attr("href")?, page_url)?;
    (!title.is_empty()).then(|| NavNode::new(title, url.as_str()))
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

/// Flat list of every titled anchor under `container`, in document order.
pub(crate) fn all_anchors(container: ElementRef<'_>, page_url: &Url) -> Vec<NavNode> {
    let anchors = selector("a[href]");
    container
        .select(&anchors)
        .filter_map(|anchor| {
            let title = text_of(anchor);
            let url = resolve_href(anchor.value().attr("href")?, page_url)?;
            (!title.is_empty()).then(|| NavNode::new(title, url.as_str()))
        })
        .collect()
}

/// Anchor text filter for nested article links.
pub(crate) fn is_article_anchor_text(text: &str) -> bool {
    if text.chars().count() < MIN_ANCHOR_CHARS {
        return false;
    }
    if text
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '.' | ',' | '-' | '/'))
    {
        return false;
    }
    let lower = text.to_lowercase();
    !BOILERPLATE_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Same-site article links inside `container` accepted by `path_filter`.
pub(crate) fn nested_links(
    container: ElementRef<'_>,
    page_url: &Url,
    path_filter: impl Fn(&str) -> bool,
) -> Vec<NavNode> {
    let mut seen = HashSet::new();
    all_anchors(container, page_url)
        .into_iter()
        .filter(|node| is_article_anchor_text(&node.title))
        .filter(|node| {
            Url::parse(&node.url).is_ok_and(|url| {
                url.host_str() == page_url.host_str() && path_filter(url.path())
            })
        })
        .filter(|node| seen.insert(url_without_fragment(&node.url).to_owned()))
        .collect()
}

/// Serialized HTML and plain text of `element`'s children, leaving out any subtree
/// matched by `skip`.
pub(crate) fn render_filtered(element: ElementRef<'_>, skip: &[Selector]) -> (String, String) {
    let mut html = String::new();
    let mut text = String::new();
    render_children(element, skip, &mut html, &mut text);
    (html, text)
}

enum Step<'a, N> {
    Visit(N),
    Close { name: &'a str, block: bool },
}

fn push_children<'a, N>(stack: &mut Vec<Step<'a, N>>, children: impl Iterator<Item = N>) {
    let children: Vec<N> = children.collect();
    stack.extend(children.into_iter().rev().map(Step::Visit));
}

// Explicit stack: pages nest deep enough to overflow a recursive walk.
fn render_children(element: ElementRef<'_>, skip: &[Selector], html: &mut String, text: &mut String) {
    let mut stack = Vec::new();
    push_children(&mut stack, element.children());

    while let Some(step) = stack.pop() {
        let child = match step {
            Step::Visit(child) => child,
            Step::Close { name, block } => {
                if block {
                    text.push('\n');
                }
                html.push_str("</");
                html.push_str(name);
                html.push('>');
                continue;
            }
        };
        match child.value() {
            Node::Text(content) => {
                html.push_str(&escape_text(content));
                text.push_str(content);
            }
            Node::Element(data) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if skip.iter().any(|sel| sel.matches(&child_el)) {
                    continue;
                }
                let name = data.name();
                html.push('<');
                html.push_str(name);
                for (attr, value) in data.attrs() {
                    html.push(' ');
                    html.push_str(attr);
                    html.push_str("=\"");
                    html.push_str(&escape_attr(value));
                    html.push('"');
                }
                html.push('>');
                if VOID_ELEMENTS.contains(&name) {
                    if name == "br" {
                        text.push('\n');
                    }
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    text.push('\n');
                }
                stack.push(Step::Close { name, block });
                push_children(&mut stack, child_el.children());
            }
            _ => {}
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

pub(crate) fn first_match<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    document.select(&selector(css)).next()
}

pub(crate) fn body(document: &Html) -> Option<ElementRef<'_>> {
    first_match(document, "body")
}
