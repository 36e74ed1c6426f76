//! Forking and initializing one worker child (spec.md §4.7's opening
//! sequence), grounded on `FatController.cpp`'s `forkchild`.

use std::net::TcpListener;
use std::os::unix::net::UnixStream;

use nix::unistd::{ForkResult, Gid, Pid, Uid};
use tracing::error;

use crate::signals::Signals;
use crate::worker::{self, Services};

static WORKER_SIGNALS: Signals = Signals::new();

pub struct WorkerStartup<'a> {
    pub listeners: &'a [TcpListener],
    pub max_requests: u32,
    pub proxy_uid: Uid,
    pub proxy_gid: Gid,
}

/// Forks a new worker. The parent gets back the child's pid and its
/// end of a freshly created control-channel pair; the child never
/// returns from this call — it runs the worker loop and exits the
/// process directly, matching a prefork server's child entry point.
pub fn spawn_worker(
    startup: &WorkerStartup,
    build_services: impl FnOnce() -> Services<'static>,
) -> nix::Result<(Pid, UnixStream)> {
    let (parent_end, child_end) = UnixStream::pair()?;

    match unsafe { nix::unistd::fork()? } {
        ForkResult::Parent { child } => {
            drop(child_end);
            Ok((child, parent_end))
        }
        ForkResult::Child => {
            drop(parent_end);
            let exit_code = run_worker_child(child_end, startup, build_services);
            std::process::exit(exit_code);
        }
    }
}

/// Everything the worker does between fork and its first ready token
/// (spec.md §4.7): reset signal handlers, drop privileges permanently
/// (real uid, not just effective), then enter the request loop.
fn run_worker_child(
    control: UnixStream,
    startup: &WorkerStartup,
    build_services: impl FnOnce() -> Services<'static>,
) -> i32 {
    crate::signals::install_worker(&WORKER_SIGNALS);

    if let Err(e) = drop_privileges(startup.proxy_uid, startup.proxy_gid) {
        error!(error = %e, "failed to drop privileges, refusing to serve requests");
        return 1;
    }

    let services = build_services();
    let reason = worker::run(control, startup.listeners, startup.max_requests, &WORKER_SIGNALS, &services);
    reason.exit_code()
}

/// Changes the real (not just effective) uid/gid, per spec.md §9:
/// "must change real uid, not only effective, so child fork limits
/// count against the unprivileged user." Group must drop first —
/// dropping uid first would strip the privilege needed to change gid.
fn drop_privileges(uid: Uid, gid: Gid) -> nix::Result<()> {
    nix::unistd::setgid(gid)?;
    nix::unistd::setuid(uid)?;
    Ok(())
}
