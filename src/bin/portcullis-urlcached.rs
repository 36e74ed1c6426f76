//! URL classification cache service entry point (C3, spec.md §4.3/§6).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use portcullis::config::Config;
use portcullis::signals::{self, Signals};

#[derive(Parser)]
#[command(name = "portcullis-urlcached", about = "URL classification cache service")]
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
    let socket_path = cli.socket.unwrap_or_else(|| config.url_cache.socket_path.clone());
    let group_count = config.filter_groups.len().max(1);

    signals::install_supervisor(&SIGNALS);

    portcullis::url_cache::run_service(
        &socket_path,
        group_count,
        config.url_cache.url_cache_number,
        Duration::from_secs(config.url_cache.url_cache_age_secs),
        &SIGNALS,
    )
    .context("url cache service loop exited")
}
