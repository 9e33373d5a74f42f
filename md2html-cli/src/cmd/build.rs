use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use md2html_core::{DEFAULT_CONFIG_FILE, SiteBuilder};
use md2html_dev_server::SourceWatcher;
use std::path::PathBuf;

use crate::config::load_app_config;

/// Flags shared by `build` and `serve`.
pub fn add_build_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("src")
                .long("src")
                .value_name("DIR")
                .help("Source directory containing markdown files")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dst")
                .long("dst")
                .value_name("DIR")
                .help("Destination directory for generated HTML")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("theme")
                .long("theme")
                .value_name("NAME")
                .help("Theme name or path to use"),
        )
        .arg(
            Arg::new("theme_dir")
                .long("theme-dir")
                .value_name("DIR")
                .help("Additional directory to look for custom themes (repeatable)")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration YAML file")
                .value_parser(value_parser!(PathBuf))
                .default_value(DEFAULT_CONFIG_FILE),
        )
        .arg(
            Arg::new("no_clean")
                .long("no-clean")
                .help("Do not clean the output directory before building")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no_copy_static")
                .long("no-copy-static")
                .help("Disable copying non-markdown static assets")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("exclude_hide")
                .long("exclude-hide")
                .help("Exclude all ::: hide blocks from output HTML")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ignore")
                .long("ignore")
                .value_name("PATTERN")
                .help("Skip matching source paths (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("site_title")
                .long("site-title")
                .value_name("TITLE")
                .help("Override site title metadata for templates"),
        )
        .arg(
            Arg::new("site_description")
                .long("site-description")
                .value_name("TEXT")
                .help("Override site description metadata for templates"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
}

pub fn make_subcommand() -> Command {
    add_build_args(Command::new("build"))
        .about("Convert Markdown documents into themed HTML")
        .arg(
            Arg::new("watch")
                .long("watch")
                .help("Watch source directory and rebuild on file changes")
                .action(ArgAction::SetTrue),
        )
}

pub async fn execute(args: &ArgMatches) -> Result<()> {
    let config = load_app_config(args)?;
    tracing::debug!(?config, "Resolved configuration");

    let watch = config.watch;
    let builder = SiteBuilder::from_config(config)?;
    let results = builder.build_all()?;
    tracing::info!(
        "Generated {} page(s) in {}",
        results.len(),
        builder.config().output_dir.display()
    );

    if !watch {
        return Ok(());
    }

    let watcher = SourceWatcher::start(builder, |path| {
        tracing::info!("Rebuilt after change to {}", path.display());
    })?;
    tracing::info!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tokio::task::spawn_blocking(move || watcher.stop()).await?;
    Ok(())
}
