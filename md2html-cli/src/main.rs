use std::process::ExitCode;

use anyhow::{Result, anyhow};
use clap::{ArgMatches, Command};
use tracing_subscriber::EnvFilter;

mod cmd;
mod config;

fn cli() -> Command {
    Command::new("md2html")
        .about("Convert Markdown documents under a directory into themed HTML output")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(cmd::build::make_subcommand())
        .subcommand(cmd::serve::make_subcommand())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(name: &str, args: &ArgMatches) -> Result<()> {
    match name {
        "build" => cmd::build::execute(args).await,
        "serve" => cmd::serve::execute(args).await,
        other => Err(anyhow!("Unknown command: {other}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    let Some((name, args)) = matches.subcommand() else {
        return ExitCode::FAILURE;
    };

    init_logging(config::flag(args, "verbose"));

    match run(name, args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("md2html failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
