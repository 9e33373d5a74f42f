//! Site navigation tree built from the Markdown files under the source
//! directory.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use std::time::UNIX_EPOCH;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::frontmatter::split_front_matter_lossy;
use crate::paths::{OutputPathRegistry, segments_to_url};
use crate::scanner::SourceDocument;
use crate::site::format_segment_title;

static HEADING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(#{1,6})\s+(.+?)\s*(?:#+\s*)?$").expect("valid regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Name,
    Mtime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigationNode {
    pub name: String,
    pub title: String,
    pub url: Option<String>,
    pub is_leaf: bool,
    pub segments: Vec<String>,
    pub children: Vec<NavigationNode>,
    #[serde(skip)]
    pub mtime: f64,
}

impl NavigationNode {
    fn directory(name: &str, segments: &[String], mtime: f64) -> Self {
        Self {
            name: name.to_string(),
            title: format_segment_title(name),
            url: None,
            is_leaf: false,
            segments: segments.to_vec(),
            children: Vec::new(),
            mtime,
        }
    }
}

/// A document as it appears in the navigation.
#[derive(Debug, Clone)]
pub struct NavigationEntry {
    pub segments: Vec<String>,
    pub output_segments: Vec<String>,
    pub title: String,
    pub url: String,
    pub mtime: f64,
}

impl NavigationEntry {
    fn sort_name(&self) -> String {
        self.segments.join("/").to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationBuilder {
    sort_by: SortKey,
    order: SortOrder,
}

impl NavigationBuilder {
    pub fn new(sort_by: SortKey, order: SortOrder) -> Self {
        Self { sort_by, order }
    }

    /// Describe each document and register its output path.
    pub fn collect(
        &self,
        documents: &[SourceDocument],
        registry: &mut OutputPathRegistry,
    ) -> Vec<NavigationEntry> {
        documents
            .iter()
            .map(|document| {
                let segments = document.segments();
                let output_segments = registry.register(&segments);
                NavigationEntry {
                    title: extract_title(document),
                    url: segments_to_url(&output_segments),
                    mtime: modified_seconds(document.path()),
                    segments,
                    output_segments,
                }
            })
            .collect()
    }

    pub fn build(
        &self,
        documents: &[SourceDocument],
        registry: &mut OutputPathRegistry,
    ) -> Vec<NavigationNode> {
        let entries = self.collect(documents, registry);
        self.build_tree(entries)
    }

    pub fn build_tree(&self, mut entries: Vec<NavigationEntry>) -> Vec<NavigationNode> {
        entries.sort_by(|a, b| self.compare_entries(a, b));

        let mut roots = Vec::new();
        for entry in &entries {
            insert(&mut roots, entry);
        }
        self.sort_nodes(&mut roots);
        roots
    }

    fn compare_entries(&self, a: &NavigationEntry, b: &NavigationEntry) -> Ordering {
        let ordering = match self.sort_by {
            SortKey::Name => a.sort_name().cmp(&b.sort_name()),
            SortKey::Mtime => a.mtime.total_cmp(&b.mtime),
        };
        self.apply_order(ordering)
    }

    fn sort_nodes(&self, nodes: &mut [NavigationNode]) {
        nodes.sort_by(|a, b| {
            let ordering = match self.sort_by {
                SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortKey::Mtime => a.mtime.total_cmp(&b.mtime),
            };
            self.apply_order(ordering)
        });
        for node in nodes.iter_mut() {
            self.sort_nodes(&mut node.children);
        }
    }

    fn apply_order(&self, ordering: Ordering) -> Ordering {
        match self.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

fn insert(roots: &mut Vec<NavigationNode>, entry: &NavigationEntry) {
    let last = entry.segments.len().saturating_sub(1);
    let mut level = roots;
    for (depth, segment) in entry.segments.iter().enumerate() {
        let index = match level.iter().position(|node| node.name == *segment) {
            Some(index) => index,
            None => {
                level.push(NavigationNode::directory(
                    segment,
                    &entry.segments[..=depth],
                    entry.mtime,
                ));
                level.len() - 1
            }
        };
        let node = &mut level[index];
        if depth == last {
            node.title = entry.title.clone();
            node.url = Some(entry.url.clone());
            node.is_leaf = true;
            node.mtime = entry.mtime;
        }
        level = &mut node.children;
    }
}

/// Navigation title: front matter `title`, else the first heading, else the
/// humanized file stem.
pub fn extract_title(document: &SourceDocument) -> String {
    let fallback = || format_segment_title(&document.stem());
    let text = match document.text() {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!("Could not read {}: {err}", document.path().display());
            return fallback();
        }
    };
    title_from_text(text).unwrap_or_else(fallback)
}

fn title_from_text(text: &str) -> Option<String> {
    let (front_matter, body) = split_front_matter_lossy(text);
    if let Some(title) = front_matter.get("title").and_then(|v| v.as_str()) {
        let title = title.trim();
        if !title.is_empty() {
            return Some(title.to_string());
        }
    }
    HEADING_PATTERN
        .captures(body)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|title| !title.is_empty())
}

fn modified_seconds(path: &Path) -> f64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs_f64())
        .unwrap_or_default()
}
