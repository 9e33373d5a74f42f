use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::container::{self, ContainerDefaults};
use crate::frontmatter::{FrontMatter, FrontMatterError, split_front_matter};
use crate::markdown::{self, HeadingEntry};
use crate::site::format_segment_title;
use crate::template::{PageContext, Theme, ThemeError};

/// Free-form key/value data handed to templates.
pub type Metadata = Map<String, Value>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid front matter in {}: {source}", path.display())]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },
    #[error(transparent)]
    Theme(#[from] ThemeError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub html: String,
    pub metadata: Metadata,
    pub toc: Vec<HeadingEntry>,
    pub front_matter: FrontMatter,
}

/// Turns one Markdown document into a themed HTML page.
#[derive(Debug)]
pub struct MarkdownRenderer {
    theme: Theme,
    defaults: ContainerDefaults,
    site_metadata: Metadata,
    exclude_hide: bool,
}

impl MarkdownRenderer {
    pub fn new(theme: Theme, site_metadata: Metadata) -> Self {
        let defaults = theme.container_defaults();
        Self {
            theme,
            defaults,
            site_metadata,
            exclude_hide: false,
        }
    }

    /// Drop `hide` containers and everything inside them.
    pub fn exclude_hide(mut self, exclude: bool) -> Self {
        self.exclude_hide = exclude;
        self
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn site_metadata(&self) -> &Metadata {
        &self.site_metadata
    }

    pub fn site_metadata_mut(&mut self) -> &mut Metadata {
        &mut self.site_metadata
    }

    pub fn render(&self, text: &str, source_path: &Path) -> Result<RenderedDocument, RenderError> {
        self.render_with_site(text, source_path, &self.site_metadata)
    }

    /// Render with a page-specific site mapping (navigation, current page).
    pub fn render_with_site(
        &self,
        text: &str,
        source_path: &Path,
        site: &Metadata,
    ) -> Result<RenderedDocument, RenderError> {
        let (front_matter, body) =
            split_front_matter(text).map_err(|source| RenderError::FrontMatter {
                path: source_path.to_path_buf(),
                source,
            })?;

        let body = container::normalize_shorthand(body);
        let stream = markdown::parse(&body, self.exclude_hide);
        let (stream, toc) = markdown::decorate_headings(stream);
        let content = markdown::render_html(&stream, &self.defaults);

        let metadata = build_metadata(&front_matter, &toc, source_path);
        let html = self.theme.render(PageContext {
            content: &content,
            metadata: &metadata,
            toc: &toc,
            front_matter: &front_matter,
            site,
        })?;

        Ok(RenderedDocument {
            html,
            metadata,
            toc,
            front_matter,
        })
    }
}

fn build_metadata(front_matter: &FrontMatter, toc: &[HeadingEntry], source_path: &Path) -> Metadata {
    let mut metadata = front_matter.clone();
    if !metadata.contains_key("title") {
        if let Some(heading) = toc.iter().find(|h| h.level == 1) {
            metadata.insert("title".to_string(), Value::String(heading.title.clone()));
        }
    }
    if !metadata.get("title").is_some_and(is_truthy) {
        let stem = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        metadata.insert("title".to_string(), Value::String(format_segment_title(&stem)));
    }
    metadata
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::ThemeManager;
    use pretty_assertions::assert_eq;

    fn renderer() -> MarkdownRenderer {
        let theme = ThemeManager::default().load("github").unwrap();
        MarkdownRenderer::new(theme, Metadata::new())
    }

    #[test]
    fn test_front_matter_title_wins() {
        let doc = renderer()
            .render("---\ntitle: X\n---\n# Y\n", Path::new("docs/page.md"))
            .unwrap();
        assert_eq!(doc.metadata["title"], "X");
        assert_eq!(doc.toc[0].title, "Y");
    }

    #[test]
    fn test_first_h1_then_file_stem() {
        let r = renderer();
        let doc = r.render("## Sub\n\n# Main\n", Path::new("a.md")).unwrap();
        assert_eq!(doc.metadata["title"], "Main");

        let doc = r.render("no headings\n", Path::new("docs/getting_started.md")).unwrap();
        assert_eq!(doc.metadata["title"], "getting started");

        let doc = r.render("---\ntitle: ''\n---\n# Ignored\n", Path::new("x-y.md")).unwrap();
        assert_eq!(doc.metadata["title"], "x y");
    }

    #[test]
    fn test_unknown_front_matter_keys_pass_through() {
        let doc = renderer()
            .render("---\nauthor: me\ntags: [a]\n---\nbody\n", Path::new("p.md"))
            .unwrap();
        assert_eq!(doc.front_matter["author"], "me");
        assert_eq!(doc.metadata["author"], "me");
        assert_eq!(doc.metadata["title"], "p");
    }

    #[test]
    fn test_shorthand_matches_explicit_hide() {
        let r = renderer();
        let shorthand = r.render("::: 更多内容\nbody\n:::\n", Path::new("a.md")).unwrap();
        let explicit = r.render("::: hide 更多内容\nbody\n:::\n", Path::new("a.md")).unwrap();
        assert_eq!(shorthand.html, explicit.html);
        assert!(explicit.html.contains("<summary>更多内容</summary>"));
    }

    #[test]
    fn test_theme_admonition_titles_apply() {
        let doc = renderer().render("::: note\nx\n:::\n", Path::new("a.md")).unwrap();
        assert!(doc.html.contains("md2html-admonition--note"));
        assert!(doc.html.contains("<div class=\"md2html-admonition__title\">提示</div>"));
    }

    #[test]
    fn test_invalid_front_matter_names_document() {
        let err = renderer()
            .render("---\n- a\n---\nbody", Path::new("docs/bad.md"))
            .unwrap_err();
        assert!(err.to_string().contains("docs/bad.md"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let r = renderer();
        let text = "# A\n\n## A\n\n::: warning careful\n`x`\n:::\n";
        let first = r.render(text, Path::new("a.md")).unwrap();
        let second = r.render(text, Path::new("a.md")).unwrap();
        assert_eq!(first.html, second.html);
    }

    #[test]
    fn test_exclude_hide() {
        let r = renderer().exclude_hide(true);
        let doc = r
            .render("# Title\n\n::: hide answer\n## Secret\n:::\n", Path::new("a.md"))
            .unwrap();
        assert!(!doc.html.contains("Secret"));
        assert_eq!(doc.toc.len(), 1);
    }
}
