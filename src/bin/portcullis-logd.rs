//! Access-log service entry point (C5, spec.md §4.5/§6).

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use portcullis::config::Config;
use portcullis::signals::{self, Signals};

#[derive(Parser)]
#[command(name = "portcullis-logd", about = "Access-log writer service")]
struct Cli {
    #[arg(short, long, default_value = "/etc/portcullis.toml")]
    config: PathBuf,

    /// Overrides the socket path from the config file.
    #[arg(long)]
    socket: Option<PathBuf>,
}

static SIGNALS: Signals = Signals::new();

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    let socket_path = cli.socket.unwrap_or_else(|| config.logging.socket_path.clone());
    let group_names: Vec<String> = config.filter_groups.iter().map(|g| g.name.clone()).collect();

    signals::install_supervisor(&SIGNALS);

    portcullis::log_service::run_service(&socket_path, &config.logging, &group_names, &SIGNALS)
        .context("log service loop exited")
}
