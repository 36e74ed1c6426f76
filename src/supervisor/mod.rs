//! Supervisor main loop (C8, spec.md §4.8), grounded on
//! `FatController.cpp`'s `mainloop` (the `select`/`poll`-over-children-
//! plus-listeners loop, its prefork/cull hysteresis, and its
//! HUP/TERM cascades).

pub mod fork;
pub mod registry;
pub mod slot;

pub use fork::{spawn_worker, WorkerStartup};
pub use slot::{Slot, SlotState, SlotTable};

use std::net::TcpListener;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use tracing::{info, warn};

use crate::config::PoolConfig;
use crate::ipc;
use crate::signals::Signals;
use crate::worker::Services;

const POLL_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_SPARE_PERSISTENCE: Duration = Duration::from_secs(2 * 60);
const HANDOFF_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const GRACEFUL_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Reason the main loop returned, so the binary entry point knows
/// whether to re-read configuration and call `run` again.
pub enum LoopExit {
    Terminated,
    FullReload,
    Fatal,
}

/// Builds a fresh [`Services`] for a newly forked worker. The
/// supervisor binary leaks its loaded configuration/plugin state to
/// `'static` once at startup (replaced wholesale on reload, never
/// mutated in place — spec.md §5, "Shared resources"), so every call
/// just borrows from that.
pub type ServicesFactory = fn() -> Services<'static>;

pub struct Supervisor<'a> {
    pub listeners: &'a [TcpListener],
    pub pool: &'a PoolConfig,
    pub proxy_uid: nix::unistd::Uid,
    pub proxy_gid: nix::unistd::Gid,
    pub services_factory: ServicesFactory,
}

pub fn run(sup: &Supervisor, signals: &'static Signals) -> LoopExit {
    let mut slots = SlotTable::new(sup.pool.max_workers);
    let mut consecutive_failures: u32 = 0;
    let mut preforked = false;
    let mut max_spare_since: Option<Instant> = None;

    let initial = sup.pool.min_workers.min(sup.pool.max_workers);
    prefork(sup, &mut slots, initial);

    loop {
        reap_zombies(&mut slots);

        if signals.terminate_requested() {
            shutdown_cascade(&mut slots);
            return LoopExit::Terminated;
        }
        if signals.take_full_reload() {
            hup_all(&slots);
            return LoopExit::FullReload;
        }
        if signals.take_gentle_reload() {
            // Filter-group and plugin-list reload happens in the binary
            // (it owns the leaked config); here we just HUP workers so
            // they recycle under it and top the pool back up.
            hup_all(&slots);
            preforked = false;
            prefork(sup, &mut slots, sup.pool.min_workers.min(sup.pool.max_workers));
        }

        let events = match poll_once(&slots, sup.listeners) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "poll failed");
                consecutive_failures += 1;
                if consecutive_failures >= sup.pool.consecutive_failure_limit {
                    return LoopExit::Fatal;
                }
                continue;
            }
        };

        if events.is_empty() {
            reap_zombies(&mut slots);
            maintain_pool(sup, &mut slots, &mut max_spare_since);
            continue;
        }

        for event in events {
            match event {
                PollEvent::Worker(index) => {
                    if handle_worker_ready(&mut slots, index) {
                        consecutive_failures = 0;
                    } else {
                        terminate_slot(&mut slots, index);
                        consecutive_failures += 1;
                    }
                }
                PollEvent::Listener(listener_index) => {
                    let idle = slots.num_idle();
                    let room = sup.pool.max_workers - slots.num_workers();
                    if idle == 0 && room > 0 {
                        if !preforked {
                            let batch = sup.pool.prefork_batch.min(room);
                            prefork(sup, &mut slots, batch);
                            preforked = true;
                        }
                    } else if let Some(target) = slots.first_idle() {
                        if dispatch_handoff(&mut slots, target, listener_index) {
                            consecutive_failures = 0;
                        } else {
                            terminate_slot(&mut slots, target);
                            consecutive_failures += 1;
                        }
                    }
                }
            }
        }

        if consecutive_failures >= sup.pool.consecutive_failure_limit {
            return LoopExit::Fatal;
        }

        if slots.num_initializing() == 0 {
            preforked = false;
        }

        reap_zombies(&mut slots);
    }
}

enum PollEvent {
    Worker(usize),
    Listener(u8),
}

/// Polls every occupied slot's channel plus every listener in one
/// pass, returning which ones are readable. The `PollFd` borrows are
/// scoped to this function so the caller is free to mutate `slots`
/// with the plain index list returned.
fn poll_once(slots: &SlotTable, listeners: &[TcpListener]) -> nix::Result<Vec<PollEvent>> {
    struct Target {
        fd: RawFd,
        event: PollEvent,
    }
    let mut targets = Vec::new();
    for (index, slot) in slots.iter() {
        if let Some(channel) = &slot.channel {
            targets.push(Target {
                fd: channel.as_raw_fd(),
                event: PollEvent::Worker(index),
            });
        }
    }
    for (index, listener) in listeners.iter().enumerate() {
        targets.push(Target {
            fd: listener.as_raw_fd(),
            event: PollEvent::Listener(index as u8),
        });
    }

    let mut pollfds: Vec<PollFd> = targets
        .iter()
        .map(|t| PollFd::new(unsafe { BorrowedFd::borrow_raw(t.fd) }, PollFlags::POLLIN))
        .collect();

    let timeout = PollTimeout::try_from(POLL_TIMEOUT.as_millis() as u16).expect("60s fits a u16 millisecond timeout");
    let ready = poll(&mut pollfds, timeout)?;
    if ready <= 0 {
        return Ok(Vec::new());
    }

    let mut events = Vec::new();
    for (pollfd, target) in pollfds.iter().zip(targets.into_iter()) {
        if pollfd.revents().unwrap_or(PollFlags::empty()).contains(PollFlags::POLLIN) {
            events.push(target.event);
        }
    }
    Ok(events)
}

fn handle_worker_ready(slots: &mut SlotTable, index: usize) -> bool {
    let Some(slot) = slots.get_mut(index) else {
        return false;
    };
    let Some(channel) = &mut slot.channel else {
        return false;
    };
    match ipc::recv_ready(channel, Duration::from_millis(50)) {
        Ok(()) => {
            slots.set_state(index, SlotState::Idle);
            true
        }
        Err(e) => {
            warn!(error = %e, index, "worker ready read failed");
            false
        }
    }
}

fn dispatch_handoff(slots: &mut SlotTable, index: usize, listener_index: u8) -> bool {
    let Some(slot) = slots.get_mut(index) else {
        return false;
    };
    let Some(channel) = &mut slot.channel else {
        return false;
    };
    if let Err(e) = ipc::send_listener_index(channel, listener_index, HANDOFF_ACK_TIMEOUT) {
        warn!(error = %e, index, "handoff send failed");
        return false;
    }
    if let Err(e) = ipc::recv_ack(channel, HANDOFF_ACK_TIMEOUT) {
        warn!(error = %e, index, "handoff ack not received");
        return false;
    }
    slots.set_state(index, SlotState::Busy);
    true
}

fn terminate_slot(slots: &mut SlotTable, index: usize) {
    if let Some(slot) = slots.get(index) {
        if let Some(pid) = slot.pid {
            let _ = kill(pid, Signal::SIGTERM);
        }
    }
    slots.set_state(index, SlotState::Culled);
}

/// Reaps exited children and frees their slots. Called at both ends
/// of an iteration (spec.md §4.8's tie-break rule).
fn reap_zombies(slots: &mut SlotTable) {
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, _)) | Ok(WaitStatus::Signaled(pid, _, _)) => {
                if let Some(index) = slots.find_by_pid(pid) {
                    slots.release(index);
                }
            }
            _ => break,
        }
    }
}

fn prefork(sup: &Supervisor, slots: &mut SlotTable, count: usize) {
    for _ in 0..count {
        let Some(index) = slots.first_free() else {
            break;
        };
        let startup = WorkerStartup {
            listeners: sup.listeners,
            max_requests: sup.pool.max_requests_per_worker,
            proxy_uid: sup.proxy_uid,
            proxy_gid: sup.proxy_gid,
        };
        match spawn_worker(&startup, sup.services_factory) {
            Ok((pid, channel)) => {
                slots.occupy(index, pid, channel);
                info!(pid = pid.as_raw(), index, "worker forked");
            }
            Err(e) => {
                warn!(error = %e, "fork failed");
                break;
            }
        }
    }
}

fn maintain_pool(sup: &Supervisor, slots: &mut SlotTable, max_spare_since: &mut Option<Instant>) {
    let idle = slots.num_idle();
    let room = sup.pool.max_workers - slots.num_workers();

    if idle < sup.pool.min_spare && room > 0 {
        prefork(sup, slots, sup.pool.prefork_batch.min(room));
    }

    match slots.idle_excess_since(sup.pool.max_spare) {
        Some(since) => {
            let persisted_since = max_spare_since.get_or_insert(since);
            if persisted_since.elapsed() >= MAX_SPARE_PERSISTENCE {
                let excess = idle - sup.pool.max_spare;
                cull(slots, excess);
                *max_spare_since = None;
            }
        }
        None => *max_spare_since = None,
    }
}

fn cull(slots: &mut SlotTable, count: usize) {
    let mut culled = 0;
    let indices: Vec<usize> = slots
        .iter()
        .filter(|(_, s)| s.state == SlotState::Idle)
        .map(|(i, _)| i)
        .collect();
    for index in indices {
        if culled >= count {
            break;
        }
        terminate_slot(slots, index);
        culled += 1;
    }
}

fn hup_all(slots: &SlotTable) {
    for (_, slot) in slots.iter() {
        if let Some(pid) = slot.pid {
            let _ = kill(pid, Signal::SIGHUP);
        }
    }
}

/// TERM's graceful shutdown cascade (spec.md §4.8): HUP everyone,
/// give them a moment to finish their current request, then TERM
/// whoever is still around, then reap.
fn shutdown_cascade(slots: &mut SlotTable) {
    hup_all(slots);
    std::thread::sleep(GRACEFUL_SHUTDOWN_GRACE);
    let indices: Vec<usize> = slots.iter().filter(|(_, s)| s.pid.is_some()).map(|(i, _)| i).collect();
    for index in indices {
        terminate_slot(slots, index);
    }
    reap_zombies(slots);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    fn occupy_idle(slots: &mut SlotTable, pid: i32) -> usize {
        let (a, _b) = UnixStream::pair().unwrap();
        let index = slots.first_free().unwrap();
        slots.occupy(index, nix::unistd::Pid::from_raw(pid), a);
        slots.set_state(index, SlotState::Idle);
        index
    }

    /// spec.md §8 scenario 6: a pool with more idle workers than
    /// `max_spare` culls exactly the excess, leaving the rest idle.
    #[test]
    fn cull_trims_only_the_excess_idle_workers() {
        let mut slots = SlotTable::new(8);
        for pid in 1..=6 {
            occupy_idle(&mut slots, pid);
        }
        assert_eq!(slots.num_idle(), 6);

        let max_spare = 2;
        let excess = slots.num_idle() - max_spare;
        cull(&mut slots, excess);

        assert_eq!(slots.num_idle(), 2);
        let culled = slots.iter().filter(|(_, s)| s.state == SlotState::Culled).count();
        assert_eq!(culled, 4);
    }

    #[test]
    fn cull_never_touches_busy_slots() {
        let mut slots = SlotTable::new(4);
        let busy = occupy_idle(&mut slots, 1);
        slots.set_state(busy, SlotState::Busy);
        occupy_idle(&mut slots, 2);
        occupy_idle(&mut slots, 3);

        cull(&mut slots, 10);

        assert_eq!(slots.get(busy).unwrap().state, SlotState::Busy);
        assert_eq!(slots.num_idle(), 0);
    }

    /// The consecutive-failure counter in `run` resets to zero on any
    /// successful `handle_worker_ready`, never on a rolling window
    /// (DESIGN.md's Open Question decision) — demonstrated here at the
    /// level of the primitive `run`'s loop consults: a slot whose ready
    /// token arrives cleanly reports success regardless of how many
    /// prior slots failed.
    #[test]
    fn handle_worker_ready_succeeds_independently_of_prior_failures() {
        let mut slots = SlotTable::new(2);
        let (bad_peer, bad) = UnixStream::pair().unwrap();
        let bad_index = slots.first_free().unwrap();
        slots.occupy(bad_index, nix::unistd::Pid::from_raw(1), bad);
        let _ = bad_peer.shutdown(std::net::Shutdown::Both);
        assert!(!handle_worker_ready(&mut slots, bad_index));

        let (mut good_peer, good) = UnixStream::pair().unwrap();
        let good_index = slots.first_free().unwrap();
        slots.occupy(good_index, nix::unistd::Pid::from_raw(2), good);
        good_peer.write_all(crate::ipc::READY_TOKEN).unwrap();
        assert!(handle_worker_ready(&mut slots, good_index));
        assert_eq!(slots.get(good_index).unwrap().state, SlotState::Idle);
    }
}
