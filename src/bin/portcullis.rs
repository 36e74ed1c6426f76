//! Supervisor entry point (C8, spec.md §4.8/§6).
//!
//! Loads configuration, binds listeners, spawns the three auxiliary
//! services, drops to the unprivileged user for everything downstream
//! of fork, and runs the supervisor main loop until it exits for a
//! full reload or a real shutdown.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use nix::unistd::User;
use tracing::{info, warn};

use portcullis::config::Config;
use portcullis::pidfile::PidFile;
use portcullis::plugins::{self, auth::AuthPlugin};
use portcullis::signals::{self, Signals};
use portcullis::supervisor::{self, registry, LoopExit, Supervisor};
use portcullis::worker::{Classifier, NoopClassifier, Services};
use portcullis::{ip_table::IpTable, log_service::LogClient, url_cache::UrlCacheClient};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "portcullis", about = "Filtering forwarding HTTP proxy supervisor")]
struct Cli {
    #[arg(short, long, default_value = "/etc/portcullis.toml")]
    config: PathBuf,

    /// Stay attached to the controlling terminal instead of daemonizing.
    #[arg(long)]
    foreground: bool,
}

static SIGNALS: Signals = Signals::new();

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let _ = cli.foreground; // daemonization itself is an out-of-scope collaborator (spec.md §1)

    let mut config = Config::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;

    let proxy_user = User::from_name(&config.privilege.proxy_user)
        .context("looking up proxy_user")?
        .with_context(|| format!("no such user: {}", config.privilege.proxy_user))?;

    let pidfile =
        PidFile::create(&config.privilege.pid_file, std::process::id() as i32).context("creating PID file")?;

    signals::install_supervisor(&SIGNALS);

    loop {
        let listeners = bind_listeners(&config)?;
        let services = leak_services(&config)?;
        registry::install(services);

        let mut aux = spawn_auxiliary_services(&config)?;

        let sup = Supervisor {
            listeners: &listeners,
            pool: &config.pool,
            proxy_uid: proxy_user.uid,
            proxy_gid: proxy_user.gid,
            services_factory: registry::build_services,
        };

        let exit = supervisor::run(&sup, &SIGNALS);
        terminate_auxiliary_services(&mut aux);

        match exit {
            LoopExit::FullReload => {
                info!("reloading configuration");
                config = match Config::load(&cli.config) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, "reload failed, keeping previous configuration");
                        config
                    }
                };
                continue;
            }
            LoopExit::Terminated => {
                info!("shut down cleanly");
                drop(pidfile);
                return Ok(());
            }
            LoopExit::Fatal => {
                drop(pidfile);
                bail!("supervisor loop exited fatally (consecutive failure limit reached)");
            }
        }
    }
}

fn bind_listeners(config: &Config) -> anyhow::Result<Vec<TcpListener>> {
    config
        .listeners
        .iter()
        .map(|l| portcullis::net::bind_listener(&l.addr).with_context(|| format!("binding {}", l.addr)))
        .collect()
}

fn leak_path(path: &Path) -> &'static Path {
    Box::leak(path.to_path_buf().into_boxed_path())
}

/// Builds the whole read-only service graph for one configuration
/// generation and leaks it to `'static`. Called once at startup and
/// once per gentle/full reload; the previous generation is left
/// leaked by [`registry::install`], not freed.
fn leak_services(config: &Config) -> anyhow::Result<Services<'static>> {
    let mut ip_table = IpTable::new();
    for group in &config.filter_groups {
        ip_table
            .load_file(&group.ip_list_path)
            .with_context(|| format!("loading filter group file {}", group.ip_list_path.display()))?;
    }
    let ip_table: &'static IpTable = Box::leak(Box::new(ip_table));

    let filter_group_names: &'static [String] =
        Box::leak(config.filter_groups.iter().map(|g| g.name.clone()).collect::<Vec<_>>().into_boxed_slice());

    let auth_plugins: &'static [Box<dyn AuthPlugin>] =
        Box::leak(plugins::build_auth_plugins(&config.auth_plugins).into_boxed_slice());

    let classifier_box: Box<dyn Classifier> = Box::new(NoopClassifier);
    let classifier: &'static dyn Classifier = Box::leak(classifier_box);

    let scanner = match &config.scanner {
        Some(scanner_config) => Some(&*Box::leak(Box::new(plugins::build_scanner(scanner_config)?))),
        None => None,
    };

    let url_cache_client: &'static UrlCacheClient = Box::leak(Box::new(UrlCacheClient::new(CLIENT_TIMEOUT)));
    let log_client: &'static LogClient = Box::leak(Box::new(LogClient::new(CLIENT_TIMEOUT)));

    Ok(Services {
        ip_table,
        auth_plugins,
        classifier,
        scanner,
        url_cache_client,
        url_cache_socket: leak_path(&config.url_cache.socket_path),
        log_client,
        log_socket: leak_path(&config.logging.socket_path),
        log_user_agent: config.logging.log_user_agent,
        filter_group_names,
        store_ram_cap: config.store.ram_cap,
        store_disk_cap: config.store.disk_cap,
        store_tempdir: leak_path(&config.store.tempdir),
        naughtiness_threshold: config.naughtiness_threshold,
    })
}

/// Spawns the three auxiliary IPC services as direct child processes,
/// re-executing the sibling binaries named in `config.ipc` (spec.md
/// §2, "co-resident processes"). They live for the supervisor's whole
/// run, independent of worker recycling.
fn spawn_auxiliary_services(config: &Config) -> anyhow::Result<Vec<Child>> {
    let mut children = Vec::new();
    children.push(
        Command::new(&config.ipc.logd_path)
            .arg("--socket")
            .arg(&config.logging.socket_path)
            .spawn()
            .with_context(|| format!("spawning {}", config.ipc.logd_path.display()))?,
    );
    children.push(
        Command::new(&config.ipc.urlcached_path)
            .arg("--socket")
            .arg(&config.url_cache.socket_path)
            .spawn()
            .with_context(|| format!("spawning {}", config.ipc.urlcached_path.display()))?,
    );
    children.push(
        Command::new(&config.ipc.ipacctd_path)
            .arg("--socket")
            .arg(&config.ip_accounting.socket_path)
            .spawn()
            .with_context(|| format!("spawning {}", config.ipc.ipacctd_path.display()))?,
    );
    Ok(children)
}

fn terminate_auxiliary_services(children: &mut [Child]) {
    for child in children {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(child.id() as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
        let _ = child.wait();
    }
}

