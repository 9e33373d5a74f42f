//! Theme discovery and themed page rendering.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tera::{Context, Tera};
use thiserror::Error;

use crate::container::{ContainerDefaults, DEFAULT_COLLAPSE_TITLE, DEFAULT_HIDE_TITLE};
use crate::markdown::{CLASS_STYLE, HeadingEntry, THEME_SET};

const DEFAULT_TEMPLATE: &str = "base.html";
const DEFAULT_SYNTAX_THEME: &str = "InspiredGitHub";
const CONFIG_FILE: &str = "config.yaml";
const BODY_CLOSE: &str = "</body>";

struct BuiltinTheme {
    name: &'static str,
    config: &'static str,
    styles: &'static str,
    templates: &'static [(&'static str, &'static str)],
}

const BUILTIN_THEMES: &[BuiltinTheme] = &[BuiltinTheme {
    name: "github",
    config: include_str!("../themes/github/config.yaml"),
    styles: include_str!("../themes/github/styles.css"),
    templates: &[
        ("nav.html", include_str!("../themes/github/nav.html")),
        ("base.html", include_str!("../themes/github/base.html")),
    ],
}];

#[derive(Debug, Error)]
#[error("Theme '{0}' not found")]
pub struct ThemeNotFoundError(pub String);

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error(transparent)]
    ThemeNotFound(#[from] ThemeNotFoundError),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse theme config {origin}: {source}")]
    Config {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Everything a template sees for one page.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub content: &'a str,
    pub metadata: &'a Map<String, Value>,
    pub toc: &'a [HeadingEntry],
    pub front_matter: &'a Map<String, Value>,
    pub site: &'a Map<String, Value>,
}

#[derive(Debug)]
pub struct Theme {
    name: String,
    tera: Tera,
    template: String,
    config: Map<String, Value>,
    style_block: String,
    syntax_block: String,
}

impl Theme {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    pub fn render(&self, page: PageContext<'_>) -> Result<String, ThemeError> {
        let mut context = Context::new();
        context.insert("content", page.content);
        context.insert("metadata", page.metadata);
        context.insert("front_matter", page.front_matter);
        context.insert("site", page.site);
        context.insert("style_block", &self.style_block);
        context.insert("syntax_block", &self.syntax_block);
        context.insert("theme", &self.config);
        context.insert("toc", page.toc);

        let html = self.tera.render(&self.template, &context)?;

        match page.site.get("live_reload_snippet").and_then(Value::as_str) {
            Some(snippet) if !snippet.is_empty() => Ok(inject_snippet(&html, snippet)),
            _ => Ok(html),
        }
    }

    pub fn default_hide_title(&self) -> String {
        self.config_string("default_hide_title")
            .unwrap_or_else(|| DEFAULT_HIDE_TITLE.to_string())
    }

    pub fn default_hide_collapse_title(&self) -> String {
        self.config_string("default_hide_collapse_title")
            .unwrap_or_else(|| DEFAULT_COLLAPSE_TITLE.to_string())
    }

    /// Admonition titles keyed by container kind, from `admonitions.<kind>.title`.
    pub fn admonition_titles(&self) -> HashMap<String, String> {
        let Some(Value::Object(admonitions)) = self.config.get("admonitions") else {
            return HashMap::new();
        };
        admonitions
            .iter()
            .filter_map(|(kind, entry)| {
                let title = entry.get("title").and_then(value_to_string)?;
                Some((kind.to_lowercase(), title))
            })
            .collect()
    }

    pub fn container_defaults(&self) -> ContainerDefaults {
        ContainerDefaults {
            hide_title: self.default_hide_title(),
            collapse_title: self.default_hide_collapse_title(),
            admonition_titles: self.admonition_titles(),
        }
    }

    fn config_string(&self, key: &str) -> Option<String> {
        self.config.get(key).and_then(value_to_string)
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn inject_snippet(html: &str, snippet: &str) -> String {
    match html.find(BODY_CLOSE) {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + snippet.len() + 1);
            out.push_str(&html[..index]);
            out.push_str(snippet);
            out.push('\n');
            out.push_str(&html[index..]);
            out
        }
        None => format!("{html}\n{snippet}"),
    }
}

fn wrap_style_block(css: &str) -> String {
    let css = css.trim();
    if css.is_empty() {
        return String::new();
    }
    format!("<style>\n{css}\n</style>")
}

/// Resolves a theme name to a loaded [`Theme`].
///
/// Lookup order: the name as a filesystem path, each extra theme directory,
/// then the themes compiled into the binary.
#[derive(Debug, Clone, Default)]
pub struct ThemeManager {
    extra_paths: Vec<PathBuf>,
}

impl ThemeManager {
    pub fn new<I, P>(extra_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            extra_paths: extra_paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn load(&self, name: &str) -> Result<Theme, ThemeError> {
        tracing::debug!("Loading theme '{name}'");

        if let Some(theme) = self.load_from_paths(name)? {
            return Ok(theme);
        }
        if let Some(theme) = load_builtin(name)? {
            return Ok(theme);
        }
        Err(ThemeNotFoundError(name.to_string()).into())
    }

    fn load_from_paths(&self, name: &str) -> Result<Option<Theme>, ThemeError> {
        let direct = Path::new(name);
        if direct.exists() {
            let display_name = direct
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string());
            return build_from_dir(direct, &display_name).map(Some);
        }

        for root in &self.extra_paths {
            let candidate = root.join(name);
            if candidate.exists() {
                return build_from_dir(&candidate, name).map(Some);
            }
        }
        Ok(None)
    }
}

fn load_builtin(name: &str) -> Result<Option<Theme>, ThemeError> {
    let Some(builtin) = BUILTIN_THEMES.iter().find(|t| t.name == name) else {
        return Ok(None);
    };
    tracing::debug!("Using built-in theme '{name}'");

    let config = parse_config(builtin.config, &format!("built-in theme '{name}'"))?;
    let mut tera = Tera::default();
    tera.add_raw_templates(builtin.templates.iter().copied())?;

    let syntax_css = generated_syntax_css(&config);
    Ok(Some(assemble(name, tera, config, builtin.styles, &syntax_css)?))
}

fn build_from_dir(root: &Path, name: &str) -> Result<Theme, ThemeError> {
    tracing::debug!("Building theme from {}", root.display());

    let config_path = root.join(CONFIG_FILE);
    let config = match read_optional(&config_path)? {
        Some(text) => parse_config(&text, &config_path.display().to_string())?,
        None => Map::new(),
    };

    let mut tera = Tera::new(&format!("{}/**/*.html", root.display()))?;
    let template = template_name(&config);
    if !tera.get_template_names().any(|n| n == template) {
        tera.add_template_file(root.join(&template), Some(template.as_str()))?;
    }

    let styles = read_optional(&root.join("styles.css"))?.unwrap_or_default();
    let syntax_css = match read_optional(&root.join("syntax.css"))? {
        Some(css) => css,
        None => generated_syntax_css(&config),
    };

    assemble(name, tera, config, &styles, &syntax_css)
}

fn assemble(
    name: &str,
    tera: Tera,
    config: Map<String, Value>,
    styles: &str,
    syntax_css: &str,
) -> Result<Theme, ThemeError> {
    Ok(Theme {
        name: name.to_string(),
        template: template_name(&config),
        tera,
        config,
        style_block: wrap_style_block(styles),
        syntax_block: wrap_style_block(syntax_css),
    })
}

fn template_name(config: &Map<String, Value>) -> String {
    config
        .get("template")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TEMPLATE)
        .to_string()
}

fn read_optional(path: &Path) -> Result<Option<String>, ThemeError> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|source| ThemeError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_config(text: &str, origin: &str) -> Result<Map<String, Value>, ThemeError> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(text).map_err(|source| {
        tracing::error!("Failed to parse theme config {origin}: {source}");
        ThemeError::Config {
            origin: origin.to_string(),
            source,
        }
    })?;
    match serde_json::to_value(parsed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        _ => {
            tracing::warn!("Theme config {origin} must contain a mapping");
            Ok(Map::new())
        }
    }
}

fn generated_syntax_css(config: &Map<String, Value>) -> String {
    let requested = config
        .get("syntax_theme")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SYNTAX_THEME);
    let theme = match THEME_SET.themes.get(requested) {
        Some(theme) => theme,
        None => {
            tracing::warn!("Unknown syntax theme '{requested}', using {DEFAULT_SYNTAX_THEME}");
            match THEME_SET.themes.get(DEFAULT_SYNTAX_THEME) {
                Some(theme) => theme,
                None => return String::new(),
            }
        }
    };
    syntect::html::css_for_theme_with_class_style(theme, CLASS_STYLE).unwrap_or_else(|err| {
        tracing::warn!("Could not generate syntax CSS: {err}");
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn render(theme: &Theme, content: &str, site: Map<String, Value>) -> String {
        let metadata = map(json!({"title": "Page"}));
        let front_matter = Map::new();
        theme
            .render(PageContext {
                content,
                metadata: &metadata,
                toc: &[],
                front_matter: &front_matter,
                site: &site,
            })
            .unwrap()
    }

    #[test]
    fn test_builtin_theme_loads() {
        let theme = ThemeManager::default().load("github").unwrap();
        assert_eq!(theme.name(), "github");
        let html = render(&theme, "<p>hello</p>", Map::new());
        assert!(html.contains("<p>hello</p>"));
        assert!(html.contains("<title>Page"));
        assert!(html.contains("<style>"));
    }

    #[test]
    fn test_unknown_theme_is_not_found() {
        let err = ThemeManager::default().load("no-such-theme").unwrap_err();
        assert!(matches!(err, ThemeError::ThemeNotFound(_)));
        assert_eq!(err.to_string(), "Theme 'no-such-theme' not found");
    }

    #[test]
    fn test_theme_from_extra_dir() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("plain");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("page.html"),
            "<html><body><h1>{{ metadata.title }}</h1>{{ content | safe }}</body></html>",
        )
        .unwrap();
        fs::write(
            root.join("config.yaml"),
            "template: page.html\ndefault_hide_title: Open\nadmonitions:\n  note:\n    title: FYI\n",
        )
        .unwrap();
        fs::write(root.join("syntax.css"), ".x { color: red; }").unwrap();

        let theme = ThemeManager::new([tmp.path()]).load("plain").unwrap();
        let html = render(&theme, "<em>hi</em>", Map::new());
        assert_eq!(html, "<html><body><h1>Page</h1><em>hi</em></body></html>");

        let defaults = theme.container_defaults();
        assert_eq!(defaults.hide_title, "Open");
        assert_eq!(defaults.collapse_title, DEFAULT_COLLAPSE_TITLE);
        assert_eq!(defaults.admonition_titles.get("note").map(String::as_str), Some("FYI"));
    }

    #[test]
    fn test_live_reload_injection() {
        assert_eq!(
            inject_snippet("<body>x</body></body>", "<script></script>"),
            "<body>x<script></script>\n</body></body>"
        );
        assert_eq!(inject_snippet("<p>x</p>", "<s/>"), "<p>x</p>\n<s/>");

        let theme = ThemeManager::default().load("github").unwrap();
        let site = map(json!({"live_reload_snippet": "<script>live()</script>"}));
        let html = render(&theme, "", site);
        assert!(html.contains("<script>live()</script>\n</body>"));
    }

    #[test]
    fn test_style_blocks() {
        assert_eq!(wrap_style_block("  \n "), "");
        assert_eq!(wrap_style_block(" a{} "), "<style>\na{}\n</style>");
    }
}
