use clap::ArgMatches;
use config::{Config, Environment, File, FileFormat, Map as EnvMap};
use md2html_core::config::resolve_path;
use md2html_core::{AppConfig, DEFAULT_CONFIG_FILE, Metadata};
use serde_json::Value;
use std::any::Any;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Failed to determine working directory: {0}")]
    WorkingDir(#[from] std::io::Error),
}

/// Resolve the build configuration with cascading precedence:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (MD2HTML_*)
/// 3. Configuration file
/// 4. Defaults (lowest priority)
pub fn load_app_config(args: &ArgMatches) -> Result<AppConfig, ConfigError> {
    let cwd = std::env::current_dir()?;
    load_with(args, &cwd, None)
}

/// `env` replaces the process environment when given.
fn load_with(
    args: &ArgMatches,
    cwd: &Path,
    env: Option<EnvMap<String, String>>,
) -> Result<AppConfig, ConfigError> {
    let config_file = value::<PathBuf>(args, "config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config_path = resolve_path(cwd, &config_file);
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.to_path_buf());

    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if config_path.is_file() {
        builder = builder.add_source(File::from(config_path.as_path()).format(FileFormat::Yaml));
    } else {
        tracing::warn!("Configuration file {} does not exist", config_path.display());
    }

    builder = builder.add_source(
        Environment::with_prefix("MD2HTML")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("ignore")
            .with_list_parse_key("theme_dirs")
            .source(env),
    );

    let overrides = cli_overrides(args, cwd);
    if !overrides.is_empty() {
        builder = builder.add_source(Config::try_from(&overrides)?);
    }

    let layered = builder.build()?;
    let raw: Metadata = layered.clone().try_deserialize()?;
    let mut app: AppConfig = layered.try_deserialize()?;
    app.absorb_extra(raw);
    // CLI paths are already absolute, so this only rebases the lower layers.
    app.resolve_paths(&base_dir);
    Ok(app)
}

fn cli_overrides(args: &ArgMatches, cwd: &Path) -> Metadata {
    let path_value = |path: &PathBuf| Value::String(resolve_path(cwd, path).to_string_lossy().into_owned());
    let mut overrides = Metadata::new();

    if let Some(src) = value::<PathBuf>(args, "src") {
        overrides.insert("source_dir".into(), path_value(src));
    }
    if let Some(dst) = value::<PathBuf>(args, "dst") {
        overrides.insert("output_dir".into(), path_value(dst));
    }
    if let Some(theme) = value::<String>(args, "theme") {
        overrides.insert("theme".into(), Value::String(theme.clone()));
    }

    let theme_dirs = values::<PathBuf>(args, "theme_dir");
    if !theme_dirs.is_empty() {
        overrides.insert(
            "theme_dirs".into(),
            Value::Array(theme_dirs.iter().map(path_value).collect()),
        );
    }
    let ignore = values::<String>(args, "ignore");
    if !ignore.is_empty() {
        overrides.insert(
            "ignore".into(),
            Value::Array(ignore.into_iter().map(Value::String).collect()),
        );
    }

    if flag(args, "no_clean") {
        overrides.insert("clean_output".into(), Value::Bool(false));
    }
    if flag(args, "no_copy_static") {
        overrides.insert("copy_static".into(), Value::Bool(false));
    }
    for key in ["watch", "exclude_hide"] {
        if flag(args, key) {
            overrides.insert(key.into(), Value::Bool(true));
        }
    }

    let mut metadata = Metadata::new();
    if let Some(title) = value::<String>(args, "site_title") {
        metadata.insert("title".into(), Value::String(title.clone()));
    }
    if let Some(description) = value::<String>(args, "site_description") {
        metadata.insert("description".into(), Value::String(description.clone()));
    }
    if !metadata.is_empty() {
        overrides.insert("metadata".into(), Value::Object(metadata));
    }

    overrides
}

// Commands define different flags, so lookups tolerate unknown ids.
fn value<'a, T: Any + Clone + Send + Sync + 'static>(args: &'a ArgMatches, id: &str) -> Option<&'a T> {
    args.try_get_one::<T>(id).ok().flatten()
}

fn values<T: Any + Clone + Send + Sync + 'static>(args: &ArgMatches, id: &str) -> Vec<T> {
    args.try_get_many::<T>(id)
        .ok()
        .flatten()
        .map(|items| items.cloned().collect())
        .unwrap_or_default()
}

pub fn flag(args: &ArgMatches, id: &str) -> bool {
    value::<bool>(args, id).copied().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd;
    use md2html_core::SortOrder;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn build_args(argv: &[&str]) -> ArgMatches {
        let mut full = vec!["build"];
        full.extend_from_slice(argv);
        cmd::build::make_subcommand()
            .try_get_matches_from(full)
            .unwrap()
    }

    fn no_env() -> Option<EnvMap<String, String>> {
        Some(EnvMap::new())
    }

    #[test]
    fn test_defaults_without_config_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_with(&build_args(&[]), tmp.path(), no_env()).unwrap();

        assert_eq!(config.source_dir, tmp.path().join("docs"));
        assert_eq!(config.output_dir, tmp.path().join("build/html"));
        assert_eq!(config.theme, "github");
        assert!(config.clean_output);
        assert!(config.copy_static);
        assert!(!config.watch);
        assert!(config.ignore.is_empty());
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_file_paths_resolve_against_config_directory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("conf")).unwrap();
        fs::write(
            tmp.path().join("conf/site.yaml"),
            "source_dir: content\n\
             output_dir: /srv/www\n\
             theme_dirs: [themes]\n\
             ignore: drafts/\n\
             copy_static: false\n\
             metadata:\n  title: Docs\n  lang: en\n\
             footer: hello\n",
        )
        .unwrap();

        let config = load_with(&build_args(&["--config", "conf/site.yaml"]), tmp.path(), no_env())
            .unwrap();

        assert_eq!(config.source_dir, tmp.path().join("conf/content"));
        assert_eq!(config.output_dir, PathBuf::from("/srv/www"));
        assert_eq!(config.theme_dirs, vec![tmp.path().join("conf/themes")]);
        assert_eq!(config.ignore, vec!["drafts/".to_string()]);
        assert!(!config.copy_static);
        assert_eq!(config.metadata["title"], "Docs");
        assert_eq!(config.extra["footer"], "hello");
        assert_eq!(config.site_metadata()["footer"], "hello");
    }

    #[test]
    fn test_environment_overrides_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            "theme: github\nclean_output: true\n",
        )
        .unwrap();

        let env = EnvMap::from([
            ("MD2HTML_THEME".to_string(), "dark".to_string()),
            ("MD2HTML_CLEAN_OUTPUT".to_string(), "false".to_string()),
            ("MD2HTML_NAVIGATION__ORDER".to_string(), "desc".to_string()),
            ("MD2HTML_IGNORE".to_string(), "a,b/".to_string()),
        ]);
        let config = load_with(&build_args(&[]), tmp.path(), Some(env)).unwrap();

        assert_eq!(config.theme, "dark");
        assert!(!config.clean_output);
        assert_eq!(config.navigation.order, SortOrder::Desc);
        assert_eq!(config.ignore, vec!["a".to_string(), "b/".to_string()]);
    }

    #[test]
    fn test_cli_args_override() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            "source_dir: from-file\nignore: [x]\nmetadata:\n  title: File\n  lang: en\n",
        )
        .unwrap();

        let args = build_args(&[
            "--src",
            "notes",
            "--no-clean",
            "--exclude-hide",
            "--watch",
            "--ignore",
            "a",
            "--ignore",
            "b",
            "--site-title",
            "Cli",
            "--site-description",
            "About",
        ]);
        let config = load_with(&args, tmp.path(), no_env()).unwrap();

        assert_eq!(config.source_dir, tmp.path().join("notes"));
        assert!(!config.clean_output);
        assert!(config.exclude_hide);
        assert!(config.watch);
        assert_eq!(config.ignore, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.metadata["title"], "Cli");
        assert_eq!(config.metadata["description"], "About");
        assert_eq!(config.metadata["lang"], "en");
    }

    #[test]
    fn test_serve_flags_are_not_required() {
        let tmp = TempDir::new().unwrap();
        let args = cmd::serve::make_subcommand()
            .try_get_matches_from(["serve", "--port", "9000", "--dst", "public"])
            .unwrap();
        let config = load_with(&args, tmp.path(), no_env()).unwrap();

        assert_eq!(config.output_dir, tmp.path().join("public"));
        assert!(!config.watch);
        assert_eq!(args.get_one::<u16>("port"), Some(&9000));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(DEFAULT_CONFIG_FILE), "source_dir: [unclosed\n").unwrap();
        assert!(load_with(&build_args(&[]), tmp.path(), no_env()).is_err());
    }
}
