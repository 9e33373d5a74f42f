//! Mapping from source path segments to collision-free output segments.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z\x{4e00}-\x{9fff}._-]").expect("valid regex"));

const INDEX_SEGMENT: &str = "index";
const FALLBACK_SEGMENT: &str = "page";

/// Make a single path segment safe for use in an output file name.
pub fn sanitize_segment(segment: &str) -> String {
    let collapsed = WHITESPACE.replace_all(segment.trim(), "-");
    let replaced = DISALLOWED.replace_all(&collapsed, "-");
    let trimmed = replaced.trim_matches(|c| matches!(c, '-' | '_' | '.'));
    if trimmed.is_empty() {
        FALLBACK_SEGMENT.to_string()
    } else {
        trimmed.to_lowercase()
    }
}

/// Assigns output segments for the lifetime of one build.
///
/// The same source segments always map to the same output; two different
/// sources never share one. Collisions are resolved by suffixing the last
/// segment with `-2`, `-3`, ...
#[derive(Debug, Default)]
pub struct OutputPathRegistry {
    assigned: HashMap<Vec<String>, Vec<String>>,
    used: HashSet<Vec<String>>,
}

impl OutputPathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, segments: &[String]) -> Vec<String> {
        if let Some(existing) = self.assigned.get(segments) {
            return existing.clone();
        }

        let mut normalized: Vec<String> = segments.iter().map(|s| sanitize_segment(s)).collect();
        if normalized.is_empty() {
            normalized.push(INDEX_SEGMENT.to_string());
        }

        let mut candidate = normalized.clone();
        if let Some(base) = normalized.last() {
            let mut suffix = 2;
            while self.used.contains(&candidate) {
                if let Some(last) = candidate.last_mut() {
                    *last = format!("{base}-{suffix}");
                }
                suffix += 1;
            }
        }

        tracing::trace!(source = ?segments, output = ?candidate, "Registered output path");
        self.used.insert(candidate.clone());
        self.assigned.insert(segments.to_vec(), candidate.clone());
        candidate
    }

    pub fn get(&self, segments: &[String]) -> Option<&[String]> {
        self.assigned.get(segments).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

/// `out/dir/page.html` for `["dir", "page"]`, `out/index.html` for `[]`.
pub fn destination_path(output_root: &Path, segments: &[String]) -> PathBuf {
    let Some((last, dirs)) = segments.split_last() else {
        return output_root.join(format!("{INDEX_SEGMENT}.html"));
    };
    let mut path = output_root.to_path_buf();
    path.extend(dirs);
    path.push(format!("{last}.html"));
    path
}

/// Site-relative URL, e.g. `dir/page.html`.
pub fn segments_to_url(segments: &[String]) -> String {
    if segments.is_empty() {
        return format!("{INDEX_SEGMENT}.html");
    }
    format!("{}.html", segments.join("/"))
}

/// Relative prefix from a page back to the site root: `""` at the top level,
/// `"../"` one directory down, and so on.
pub fn root_prefix(segments: &[String]) -> String {
    "../".repeat(segments.len().saturating_sub(1))
}
