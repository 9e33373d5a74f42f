use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use md2html_core::SiteBuilder;
use md2html_dev_server::{LiveServer, LiveServerConfig};

use crate::cmd::build::add_build_args;
use crate::config::{flag, load_app_config};

pub fn make_subcommand() -> Command {
    add_build_args(Command::new("serve"))
        .about("Start development server with live reload")
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Host to bind to")
                .default_value("127.0.0.1"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to serve on")
                .value_parser(value_parser!(u16))
                .default_value("8000"),
        )
        .arg(
            Arg::new("open")
                .long("open")
                .help("Open browser automatically")
                .action(ArgAction::SetTrue),
        )
}

pub async fn execute(args: &ArgMatches) -> Result<()> {
    let config = load_app_config(args)?;
    tracing::debug!(?config, "Resolved configuration");

    let defaults = LiveServerConfig::default();
    let server_config = LiveServerConfig {
        host: args
            .get_one::<String>("host")
            .cloned()
            .unwrap_or(defaults.host),
        port: args.get_one::<u16>("port").copied().unwrap_or(defaults.port),
        open: flag(args, "open"),
    };

    let builder = SiteBuilder::from_config(config)?;
    LiveServer::new(server_config, builder)?.run().await
}
