//! User-supplied ignore rules, matched against paths relative to the source
//! directory.

use std::borrow::Cow;
use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;

/// One normalized ignore rule.
///
/// Prefix rules (written with a trailing `/`) match a path and everything
/// below it. Other rules are shell-style globs where `*` also crosses `/`.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: String,
    is_prefix: bool,
    glob: Option<Pattern>,
}

impl IgnoreRule {
    pub fn prefix(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_prefix: true,
            glob: None,
        }
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let glob = match Pattern::new(&collapse_stars(&pattern)) {
            Ok(glob) => Some(glob),
            Err(err) => {
                tracing::debug!("Ignore pattern '{pattern}' is not a valid glob ({err}), matching literally");
                None
            }
        };
        Self {
            pattern,
            is_prefix: false,
            glob,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_prefix(&self) -> bool {
        self.is_prefix
    }

    pub fn matches(&self, relative: &str) -> bool {
        if self.is_prefix {
            return relative == self.pattern
                || relative
                    .strip_prefix(self.pattern.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
        }
        match &self.glob {
            Some(glob) => glob.matches(relative),
            None => relative == self.pattern,
        }
    }
}

/// Reduce runs of `*` to a single `*` unless they form a whole path
/// component, where `**` keeps its recursive meaning.
fn collapse_stars(pattern: &str) -> Cow<'_, str> {
    if !pattern.contains("**") {
        return Cow::Borrowed(pattern);
    }

    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find('*') {
        let run = rest[start..].len() - rest[start..].trim_start_matches('*').len();
        out.push_str(&rest[..start]);
        let after = &rest[start + run..];
        let whole_component =
            (out.is_empty() || out.ends_with('/')) && (after.is_empty() || after.starts_with('/'));
        out.push_str(if run > 1 && whole_component { "**" } else { "*" });
        rest = after;
    }
    out.push_str(rest);
    Cow::Owned(out)
}

#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    source_dir: PathBuf,
    resolved_source_dir: PathBuf,
    rules: Vec<IgnoreRule>,
}

impl IgnoreFilter {
    pub fn new<S: AsRef<str>>(source_dir: &Path, patterns: &[S]) -> Self {
        let resolved_source_dir =
            fs::canonicalize(source_dir).unwrap_or_else(|_| source_dir.to_path_buf());
        let mut filter = Self {
            source_dir: source_dir.to_path_buf(),
            resolved_source_dir,
            rules: Vec::new(),
        };
        filter.rules = patterns
            .iter()
            .filter_map(|raw| filter.normalize(raw.as_ref()))
            .collect();
        filter
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let Some(relative) = self.relative_to_source(path) else {
            return false;
        };
        self.rules.iter().any(|rule| rule.matches(&relative))
    }

    fn relative_to_source(&self, path: &Path) -> Option<String> {
        let relative = path
            .strip_prefix(&self.source_dir)
            .or_else(|_| path.strip_prefix(&self.resolved_source_dir))
            .ok()?;
        Some(to_posix(relative))
    }

    fn normalize(&self, raw: &str) -> Option<IgnoreRule> {
        let text = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        if text.is_empty() {
            return None;
        }
        let text = text.replace('\\', "/");
        let text = self.strip_source_prefix(text.trim_start_matches('/'));
        if text.is_empty() {
            return None;
        }

        let is_prefix = text.ends_with('/');
        let pattern = text.trim_end_matches('/');
        if pattern.is_empty() {
            return None;
        }

        Some(if is_prefix {
            IgnoreRule::prefix(pattern)
        } else {
            IgnoreRule::glob(pattern)
        })
    }

    /// Drop a leading copy of the source directory from a pattern, written
    /// either as its absolute location or as its directory name.
    fn strip_source_prefix<'a>(&self, text: &'a str) -> &'a str {
        let absolute = to_posix(&self.resolved_source_dir);
        let absolute = absolute.trim_matches('/');
        if !absolute.is_empty() {
            if text == absolute {
                return "";
            }
            if let Some(rest) = text.strip_prefix(absolute).and_then(|r| r.strip_prefix('/')) {
                return rest;
            }
        }

        let name = self
            .resolved_source_dir
            .file_name()
            .or_else(|| self.source_dir.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !name.is_empty() {
            if text == name {
                return "";
            }
            if let Some(rest) = text.strip_prefix(name.as_str()).and_then(|r| r.strip_prefix('/')) {
                return rest;
            }
        }
        text
    }
}

fn to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
