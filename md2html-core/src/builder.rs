use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::AppConfig;
use crate::frontmatter::FrontMatter;
use crate::ignore::IgnoreFilter;
use crate::markdown::HeadingEntry;
use crate::navigation::{NavigationBuilder, NavigationNode};
use crate::paths::{OutputPathRegistry, destination_path, root_prefix, segments_to_url};
use crate::renderer::{MarkdownRenderer, Metadata, RenderError};
use crate::scanner::{ScanError, SiteScanner, SourceDocument};
use crate::site::{copy_static_resource, ensure_directory, is_markdown_file};
use crate::template::{Theme, ThemeError, ThemeManager};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Source directory {} does not exist", .0.display())]
    SourceNotFound(PathBuf),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Theme(#[from] ThemeError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
    move |source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderResult {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub html: String,
    pub metadata: Metadata,
    pub toc: Vec<HeadingEntry>,
    pub front_matter: FrontMatter,
}

#[derive(Debug)]
pub enum RebuildOutcome {
    /// The whole site was rebuilt.
    Full(Vec<RenderResult>),
    /// A single static asset was copied.
    Asset { source: PathBuf, destination: PathBuf },
    Skipped,
}

/// State that lives for exactly one build.
#[derive(Debug, Default)]
pub struct BuildSession {
    registry: OutputPathRegistry,
    navigation: Vec<NavigationNode>,
    /// Documents loaded for navigation, keyed by source path. Their text is
    /// cached, so rendering does not read them again.
    documents: HashMap<PathBuf, SourceDocument>,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &OutputPathRegistry {
        &self.registry
    }

    pub fn navigation(&self) -> &[NavigationNode] {
        &self.navigation
    }

    /// Hand over a document loaded earlier in this build.
    pub fn take_document(&mut self, path: &Path) -> Option<SourceDocument> {
        self.documents.remove(path)
    }

    fn output_segments(&mut self, segments: &[String]) -> Vec<String> {
        match self.registry.get(segments) {
            Some(existing) => existing.to_vec(),
            None => self.registry.register(segments),
        }
    }
}

pub struct SiteBuilder {
    config: AppConfig,
    renderer: MarkdownRenderer,
    scanner: SiteScanner,
    ignore: IgnoreFilter,
}

impl SiteBuilder {
    pub fn new(config: AppConfig, theme: Theme) -> Self {
        let renderer = MarkdownRenderer::new(theme, config.site_metadata())
            .exclude_hide(config.exclude_hide);
        let scanner = SiteScanner::new(&config.source_dir);
        let ignore = IgnoreFilter::new(&config.source_dir, &config.ignore);
        Self {
            config,
            renderer,
            scanner,
            ignore,
        }
    }

    /// Load the configured theme and create a builder for it.
    pub fn from_config(config: AppConfig) -> Result<Self, BuildError> {
        let theme = ThemeManager::new(config.theme_dirs.iter().cloned()).load(&config.theme)?;
        Ok(Self::new(config, theme))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Add a site-wide template value, e.g. the live-reload snippet.
    pub fn add_site_value<T: Serialize>(mut self, key: &str, value: T) -> Result<Self, BuildError> {
        let json_value = serde_json::to_value(value)?;
        self.renderer
            .site_metadata_mut()
            .insert(key.to_string(), json_value);
        Ok(self)
    }

    pub fn site_value(&self, key: &str) -> Option<&Value> {
        self.renderer.site_metadata().get(key)
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        self.ignore.should_ignore(path)
    }

    pub fn build_all(&self) -> Result<Vec<RenderResult>, BuildError> {
        let source_dir = &self.config.source_dir;
        let output_dir = &self.config.output_dir;
        tracing::info!("Starting static site build from {}", source_dir.display());

        if !source_dir.is_dir() {
            return Err(BuildError::SourceNotFound(source_dir.clone()));
        }

        if self.config.clean_output && output_dir.exists() {
            tracing::debug!("Cleaning output directory {}", output_dir.display());
            fs::remove_dir_all(output_dir).map_err(io_error(output_dir))?;
        }
        ensure_directory(output_dir).map_err(io_error(output_dir))?;

        let mut session = BuildSession::new();
        self.build_navigation(&mut session)?;
        let navigation = serde_json::to_value(&session.navigation)?;

        let mut results = Vec::new();
        for path in self.scanner.scan() {
            if self.should_ignore(&path) {
                tracing::debug!("Skipping ignored path {}", path.display());
                continue;
            }
            if path.is_dir() {
                continue;
            }
            if is_markdown_file(&path) {
                let document = match session.take_document(&path) {
                    Some(document) => document,
                    None => self.scanner.document(path)?,
                };
                results.push(self.build_single_markdown(&mut session, &document, &navigation)?);
            } else if self.config.copy_static {
                self.copy_asset(&path)?;
            }
        }

        tracing::info!("Built {} pages into {}", results.len(), output_dir.display());
        Ok(results)
    }

    fn build_navigation(&self, session: &mut BuildSession) -> Result<(), BuildError> {
        let documents = self.scanner.markdown_documents(|path| {
            let ignored = self.should_ignore(path);
            if ignored {
                tracing::debug!("Excluding {} from navigation", path.display());
            }
            !ignored
        })?;
        let builder = NavigationBuilder::new(
            self.config.navigation.sort_by,
            self.config.navigation.order,
        );
        session.navigation = builder.build(&documents, &mut session.registry);
        session.documents = documents
            .into_iter()
            .map(|document| (document.path().to_path_buf(), document))
            .collect();
        Ok(())
    }

    fn build_single_markdown(
        &self,
        session: &mut BuildSession,
        document: &SourceDocument,
        navigation: &Value,
    ) -> Result<RenderResult, BuildError> {
        tracing::debug!("Rendering {}", document.path().display());

        let segments = document.segments();
        let output_segments = session.output_segments(&segments);
        let destination = destination_path(&self.config.output_dir, &output_segments);

        let mut site = self.renderer.site_metadata().clone();
        site.insert("navigation".to_string(), navigation.clone());
        site.insert("current_segments".to_string(), serde_json::to_value(&segments)?);
        site.insert(
            "current_page".to_string(),
            Value::String(segments_to_url(&output_segments)),
        );
        site.insert("root".to_string(), Value::String(root_prefix(&output_segments)));

        let text = document.text().map_err(io_error(document.path()))?;
        let rendered = self.renderer.render_with_site(text, document.path(), &site)?;

        if let Some(parent) = destination.parent() {
            ensure_directory(parent).map_err(io_error(parent))?;
        }
        fs::write(&destination, &rendered.html).map_err(io_error(&destination))?;
        tracing::info!("Generated {}", destination.display());

        Ok(RenderResult {
            source: document.path().to_path_buf(),
            destination,
            html: rendered.html,
            metadata: rendered.metadata,
            toc: rendered.toc,
            front_matter: rendered.front_matter,
        })
    }

    fn copy_asset(&self, path: &Path) -> Result<PathBuf, BuildError> {
        let relative = self.scanner.relative(path)?;
        let destination = self.config.output_dir.join(relative);
        copy_static_resource(path, &destination).map_err(io_error(path))?;
        tracing::debug!("Copied static asset {} -> {}", path.display(), destination.display());
        Ok(destination)
    }

    /// Whether a change to `path` invalidates the whole site: Markdown edits
    /// and deletions of anything that is not ignored.
    pub fn requires_full_rebuild(&self, path: &Path) -> bool {
        if path.is_dir() || self.should_ignore(path) {
            return false;
        }
        !path.exists() || is_markdown_file(path)
    }

    /// React to a single changed path.
    ///
    /// Markdown edits and deletions rebuild everything because output paths
    /// and navigation depend on the whole file set. Static assets are copied
    /// on their own.
    pub fn rebuild_path(&self, path: &Path) -> Result<RebuildOutcome, BuildError> {
        if path.is_dir() {
            return Ok(RebuildOutcome::Skipped);
        }
        if self.should_ignore(path) {
            tracing::debug!("Ignoring change to {}", path.display());
            return Ok(RebuildOutcome::Skipped);
        }

        if self.requires_full_rebuild(path) {
            tracing::info!("{} changed, rebuilding site", path.display());
            return Ok(RebuildOutcome::Full(self.build_all()?));
        }
        if !self.config.copy_static {
            return Ok(RebuildOutcome::Skipped);
        }

        let destination = self.copy_asset(path)?;
        tracing::info!("Updated asset {}", destination.display());
        Ok(RebuildOutcome::Asset {
            source: path.to_path_buf(),
            destination,
        })
    }
}

/// Load the theme named in `config` and build the whole site once.
pub fn convert_docs_directory(config: AppConfig) -> Result<Vec<RenderResult>, BuildError> {
    SiteBuilder::from_config(config)?.build_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, text: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn config(tmp: &TempDir) -> AppConfig {
        AppConfig {
            source_dir: tmp.path().join("docs"),
            output_dir: tmp.path().join("out"),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_missing_source_leaves_output_untouched() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write(&config.output_dir, "keep.txt", "x");

        let err = SiteBuilder::from_config(config.clone())
            .unwrap()
            .build_all()
            .unwrap_err();
        assert!(matches!(err, BuildError::SourceNotFound(_)));
        assert!(config.output_dir.join("keep.txt").exists());
    }

    #[test]
    fn test_build_writes_pages_and_assets() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write(&config.source_dir, "index.md", "# Home\n");
        write(&config.source_dir, "Guide/Getting Started.md", "# Start\n\n## Install\n");
        write(&config.source_dir, "img/logo.png", "png");
        write(&config.output_dir, "stale.html", "old");

        let builder = SiteBuilder::from_config(config.clone()).unwrap();
        let results = builder.build_all().unwrap();

        assert_eq!(results.len(), 2);
        assert!(!config.output_dir.join("stale.html").exists());
        assert!(config.output_dir.join("img/logo.png").exists());

        let page = config.output_dir.join("guide/getting-started.html");
        let html = fs::read_to_string(&page).unwrap();
        assert!(html.contains("<h2 id=\"install\">Install</h2>"));
        assert!(html.contains("href=\"../index.html\""));
        assert!(html.contains("href=\"../guide/getting-started.html\""));
    }

    #[test]
    fn test_navigation_documents_are_reused_for_rendering() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write(&config.source_dir, "a.md", "# A\n");
        let source = config.source_dir.join("a.md");

        let builder = SiteBuilder::from_config(config).unwrap();
        let mut session = BuildSession::new();
        builder.build_navigation(&mut session).unwrap();

        // The cached text survives the file going away.
        fs::remove_file(&source).unwrap();
        let document = session.take_document(&source).unwrap();
        assert_eq!(document.text().unwrap(), "# A\n");
        assert!(session.take_document(&source).is_none());
    }

    #[test]
    fn test_no_copy_static_skips_assets() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig {
            copy_static: false,
            ..config(&tmp)
        };
        write(&config.source_dir, "a.md", "# A\n");
        write(&config.source_dir, "data.json", "{}");

        SiteBuilder::from_config(config.clone()).unwrap().build_all().unwrap();
        assert!(config.output_dir.join("a.html").exists());
        assert!(!config.output_dir.join("data.json").exists());
    }

    #[test]
    fn test_colliding_sources_get_distinct_outputs() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write(&config.source_dir, "A B.md", "# One\n");
        write(&config.source_dir, "a-b.md", "# Two\n");

        let results = SiteBuilder::from_config(config.clone()).unwrap().build_all().unwrap();
        let mut destinations: Vec<PathBuf> = results.into_iter().map(|r| r.destination).collect();
        destinations.sort();
        assert_eq!(
            destinations,
            vec![config.output_dir.join("a-b-2.html"), config.output_dir.join("a-b.html")]
        );
    }

    #[test]
    fn test_rebuild_path_outcomes() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig {
            ignore: vec!["drafts/".to_string()],
            ..config(&tmp)
        };
        write(&config.source_dir, "a.md", "# A\n");
        write(&config.source_dir, "style.css", "body{}");
        write(&config.source_dir, "drafts/wip.md", "# WIP\n");

        let builder = SiteBuilder::from_config(config.clone()).unwrap();
        builder.build_all().unwrap();

        let outcome = builder.rebuild_path(&config.source_dir).unwrap();
        assert!(matches!(outcome, RebuildOutcome::Skipped));

        let outcome = builder
            .rebuild_path(&config.source_dir.join("drafts/wip.md"))
            .unwrap();
        assert!(matches!(outcome, RebuildOutcome::Skipped));

        write(&config.source_dir, "style.css", "body{color:red}");
        let outcome = builder.rebuild_path(&config.source_dir.join("style.css")).unwrap();
        assert!(matches!(outcome, RebuildOutcome::Asset { .. }));
        assert_eq!(
            fs::read_to_string(config.output_dir.join("style.css")).unwrap(),
            "body{color:red}"
        );

        let outcome = builder.rebuild_path(&config.source_dir.join("a.md")).unwrap();
        assert!(matches!(outcome, RebuildOutcome::Full(ref pages) if pages.len() == 1));

        fs::remove_file(config.source_dir.join("a.md")).unwrap();
        let outcome = builder.rebuild_path(&config.source_dir.join("a.md")).unwrap();
        assert!(matches!(outcome, RebuildOutcome::Full(ref pages) if pages.is_empty()));
        assert!(!config.output_dir.join("a.html").exists());
    }

    #[test]
    fn test_site_values_reach_templates() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        write(&config.source_dir, "a.md", "# A\n");

        let builder = SiteBuilder::from_config(config.clone())
            .unwrap()
            .add_site_value("live_reload_snippet", "<script>reload()</script>")
            .unwrap();
        let results = builder.build_all().unwrap();
        assert!(results[0].html.contains("<script>reload()</script>\n</body>"));
    }
}
