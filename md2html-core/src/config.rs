use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::navigation::{SortKey, SortOrder};
use crate::renderer::Metadata;

pub const DEFAULT_CONFIG_FILE: &str = "md2html.config.yaml";

/// Ordering applied to every level of the navigation tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub sort_by: SortKey,
    pub order: SortOrder,
}

/// Fully resolved build settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub theme: String,
    pub theme_dirs: Vec<PathBuf>,
    pub clean_output: bool,
    pub copy_static: bool,
    pub watch: bool,
    pub exclude_hide: bool,
    pub metadata: Metadata,
    #[serde(deserialize_with = "string_or_list")]
    pub ignore: Vec<String>,
    pub navigation: NavigationConfig,
    /// Unrecognised top-level keys, exposed to templates with the site
    /// metadata.
    #[serde(skip)]
    pub extra: Metadata,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("docs"),
            output_dir: PathBuf::from("build/html"),
            theme: "github".to_string(),
            theme_dirs: Vec::new(),
            clean_output: true,
            copy_static: true,
            watch: false,
            exclude_hide: false,
            metadata: Metadata::new(),
            ignore: Vec::new(),
            navigation: NavigationConfig::default(),
            extra: Metadata::new(),
        }
    }
}

impl AppConfig {
    pub const KNOWN_KEYS: [&'static str; 11] = [
        "source_dir",
        "output_dir",
        "theme",
        "theme_dirs",
        "clean_output",
        "copy_static",
        "watch",
        "exclude_hide",
        "metadata",
        "ignore",
        "navigation",
    ];

    /// Site-wide template data: `metadata` overlaid with `extra`.
    pub fn site_metadata(&self) -> Metadata {
        let mut site = self.metadata.clone();
        for (key, value) in &self.extra {
            site.insert(key.clone(), value.clone());
        }
        site
    }

    /// Collect unrecognised keys from a raw top-level mapping into `extra`.
    pub fn absorb_extra(&mut self, raw: Metadata) {
        for (key, value) in raw {
            if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                self.extra.insert(key, value);
            }
        }
    }

    /// Rebase relative paths onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.source_dir = resolve_path(base, &self.source_dir);
        self.output_dir = resolve_path(base, &self.output_dir);
        self.theme_dirs = self
            .theme_dirs
            .iter()
            .map(|dir| resolve_path(base, dir))
            .collect();
    }
}

pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Accept `ignore: "one"` as well as `ignore: [a, b]`; blank entries are
/// dropped.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<Value>),
        Nothing(Option<()>),
    }

    let items = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(item) => vec![item],
        OneOrMany::Many(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect(),
        OneOrMany::Nothing(_) => Vec::new(),
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}
