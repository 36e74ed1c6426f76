//! Per-IP concurrent-user accounting service entry point (C4, spec.md §4.4/§6).

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use portcullis::config::Config;
use portcullis::signals::{self, Signals};

#[derive(Parser)]
#[command(name = "portcullis-ipacctd", about = "Per-IP concurrent-user accounting service")]
struct Cli {
    #[arg(short, long, default_value = "/etc/portcullis.toml")]
    config: PathBuf,

    /// Overrides the socket path from the config file.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Overrides the stats file path from the config file.
    #[arg(long)]
    stats_file: Option<PathBuf>,
}

static SIGNALS: Signals = Signals::new();

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    let socket_path = cli.socket.unwrap_or_else(|| config.ip_accounting.socket_path.clone());
    let stats_file = cli.stats_file.unwrap_or_else(|| config.ip_accounting.stats_file.clone());

    signals::install_supervisor(&SIGNALS);

    portcullis::ip_accounting::run_service(&socket_path, &stats_file, config.ip_accounting.max_ips, &SIGNALS)
        .context("ip accounting service loop exited")
}
