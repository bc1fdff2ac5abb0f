use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::config::OutputFormat;
use crate::error::ScrapeError;
use crate::fingerprint::Fingerprint;
use crate::formats::{ArticleDocument, FlatArticle, MarkdownFrontMatter, NavNode};
use crate::parser::ArticleExtract;

const INDEX_DIR: &str = "_index";
const TREE_FILE: &str = "_toc_tree.json";
const INDEX_FILE: &str = "index.json";
const META_FILE: &str = "_meta.json";
const TOC_FILE: &str = "_toc.md";

/// Share of new URLs (in tenths) above which a saved index is considered stale.
const REINDEX_THRESHOLD_TENTHS: usize = 1;

/// On-disk layout for one seed URL.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
    formats: Vec<OutputFormat>,
    rag: bool,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>, formats: Vec<OutputFormat>, rag: bool) -> Self {
        Self {
            root: root.into(),
            formats,
            rag,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn wants(&self, format: OutputFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn format_dir(&self, format: OutputFormat) -> PathBuf {
        self.root.join(format.dir_name())
    }

    pub fn article_path(&self, format: OutputFormat, article: &FlatArticle) -> PathBuf {
        self.format_dir(format)
            .join(format!("{}.{}", article.filename_base, format.extension()))
    }

    fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    /// Creates the requested format directories. Outside update mode they start empty.
    pub fn prepare(&self, update: bool) -> anyhow::Result<()> {
        for format in &self.formats {
            let dir = self.format_dir(*format);
            if !update && dir.exists() {
                std::fs::remove_dir_all(&dir)
                    .with_context(|| format!("clear output dir: {}", dir.display()))?;
            }
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create output dir: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Writes the text formats of one article.
    pub fn persist(
        &self,
        article: &FlatArticle,
        extract: &ArticleExtract,
        fingerprint: &Fingerprint,
    ) -> anyhow::Result<()> {
        if self.wants(OutputFormat::Json) {
            let document = ArticleDocument {
                title: article.title.clone(),
                url: article.url.clone(),
                breadcrumb: article.breadcrumb.clone(),
                content: extract.text.clone(),
                content_hash: fingerprint.clone(),
                scraped_at: chrono::Utc::now().to_rfc3339(),
            };
            let json = serde_json::to_string_pretty(&document).context("serialize article json")?;
            write_file(&self.article_path(OutputFormat::Json, article), json.as_bytes())?;
        }

        if self.wants(OutputFormat::Txt) {
            let text = format!(
                "Title: {}\nURL: {}\n\n{}\n",
                article.title, article.url, extract.text
            );
            write_file(&self.article_path(OutputFormat::Txt, article), text.as_bytes())?;
        }

        if self.wants(OutputFormat::Markdown) {
            let markdown = self.render_markdown(article, extract, fingerprint)?;
            write_file(
                &self.article_path(OutputFormat::Markdown, article),
                markdown.as_bytes(),
            )?;
        }

        Ok(())
    }

    fn render_markdown(
        &self,
        article: &FlatArticle,
        extract: &ArticleExtract,
        fingerprint: &Fingerprint,
    ) -> anyhow::Result<String> {
        let front = MarkdownFrontMatter {
            title: article.title.clone(),
            url: article.url.clone(),
            breadcrumb: article.breadcrumb.clone(),
            content_hash: fingerprint.clone(),
        };
        let yaml = serde_yaml::to_string(&front).context("serialize markdown front matter")?;

        let mut body = html2md::parse_html(&extract.html).trim().to_owned();
        if body.is_empty() {
            body = extract.text.clone();
        }

        let mut markdown = format!("---\n{yaml}---\n\n# {}\n\n", article.title);
        if self.rag {
            let mut trail = article.breadcrumb.clone();
            trail.push(article.title.clone());
            let _ = writeln!(markdown, "> {}\n", trail.join(" / "));
            let _ = writeln!(markdown, "source: <{}>\n", article.url);
        }
        markdown.push_str(&body);
        markdown.push('\n');
        Ok(markdown)
    }

    /// Writes the PDF, or an `.error.txt` next to where it would have been.
    pub fn persist_pdf(
        &self,
        article: &FlatArticle,
        rendered: Result<Vec<u8>, ScrapeError>,
    ) -> anyhow::Result<()> {
        let path = self.article_path(OutputFormat::Pdf, article);
        match rendered {
            Ok(bytes) => write_file(&path, &bytes),
            Err(err) => {
                tracing::warn!(title = %article.title, url = %article.url, %err, "pdf rendering failed");
                let mut error_path = path.into_os_string();
                error_path.push(".error.txt");
                let message = format!("PDF rendering failed for {}\n{err}\n", article.url);
                write_file(Path::new(&error_path), message.as_bytes())
            }
        }
    }

    pub fn persist_tree(&self, tree: &[NavNode]) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(tree).context("serialize navigation tree")?;
        write_atomic(&self.index_dir().join(TREE_FILE), &json)
    }

    pub fn load_tree(&self) -> anyhow::Result<Option<Vec<NavNode>>> {
        read_json(&self.index_dir().join(TREE_FILE))
    }

    pub fn persist_index(&self, articles: &[FlatArticle]) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(articles).context("serialize article index")?;
        write_atomic(&self.index_dir().join(INDEX_FILE), &json)
    }

    pub fn persist_metadata(&self, articles: &[FlatArticle]) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(articles).context("serialize metadata")?;
        write_atomic(&self.root.join(META_FILE), &json)
    }

    pub fn load_metadata(&self) -> anyhow::Result<Vec<FlatArticle>> {
        Ok(read_json(&self.root.join(META_FILE))?.unwrap_or_default())
    }

    /// Nested markdown list mirroring the tree, linking each article to its file.
    pub fn persist_table_of_contents(
        &self,
        tree: &[NavNode],
        articles: &[FlatArticle],
    ) -> anyhow::Result<()> {
        let link_format = [
            OutputFormat::Markdown,
            OutputFormat::Txt,
            OutputFormat::Json,
            OutputFormat::Pdf,
        ]
        .into_iter()
        .find(|format| self.wants(*format));

        let mut by_url: HashMap<&str, &FlatArticle> = HashMap::new();
        for article in articles {
            by_url.entry(article.url.as_str()).or_insert(article);
        }

        let mut out = String::from("# Table of Contents\n\n");
        let mut listed = HashSet::new();
        let mut stack: Vec<(&NavNode, usize)> = tree.iter().rev().map(|node| (node, 0)).collect();
        while let Some((node, depth)) = stack.pop() {
            for child in node.children.iter().rev() {
                stack.push((child, depth + 1));
            }
            let indent = "  ".repeat(depth);
            match (by_url.get(node.url.as_str()), link_format) {
                (Some(article), Some(format)) if listed.insert(article.index) => {
                    let _ = writeln!(
                        out,
                        "{indent}- [{}]({}/{}.{})",
                        node.title,
                        format.dir_name(),
                        article.filename_base,
                        format.extension()
                    );
                }
                _ => {
                    let _ = writeln!(out, "{indent}- {}", node.title);
                }
            }
        }

        write_atomic(&self.root.join(TOC_FILE), out.as_bytes())
    }
}

/// True when the fresh tree contains enough URLs the previous run never indexed.
pub fn should_force_reindex(fresh: &[FlatArticle], previous: &[FlatArticle]) -> bool {
    if previous.is_empty() {
        return true;
    }
    if fresh.is_empty() {
        return false;
    }
    let known: HashSet<&str> = previous.iter().map(|article| article.url.as_str()).collect();
    let unknown = fresh
        .iter()
        .filter(|article| !known.contains(article.url.as_str()))
        .count();
    unknown * 10 > fresh.len() * REINDEX_THRESHOLD_TENTHS
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("output path must have parent: {}", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| anyhow::anyhow!("replace {}: {}", path.display(), err.error))?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let value = serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}
