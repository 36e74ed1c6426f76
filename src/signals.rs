//! Process-local signal flags.
//!
//! DESIGN.md note: the original's globals (`o`, assorted booleans set
//! from signal handlers) become a single atomic-access record here.
//! Only a signal handler writes to it; event loops poll it at the top
//! of every iteration and translate a set flag into a cancellation of
//! the current blocking wait (spec.md §5, "Cancellation").

use std::sync::atomic::{AtomicBool, Ordering};

/// Flags toggled from within a signal handler and polled from event loops.
///
/// `'static` by construction: every process that needs one makes it a
/// `static SIGNALS: Signals = Signals::new();` so the handler (which
/// cannot capture state) can reach it through a plain function pointer.
#[derive(Debug, Default)]
pub struct Signals {
    full_reload: AtomicBool,
    gentle_reload: AtomicBool,
    terminate: AtomicBool,
}

impl Signals {
    pub const fn new() -> Self {
        Self {
            full_reload: AtomicBool::new(false),
            gentle_reload: AtomicBool::new(false),
            terminate: AtomicBool::new(false),
        }
    }

    pub fn request_full_reload(&self) {
        self.full_reload.store(true, Ordering::SeqCst);
    }

    pub fn request_gentle_reload(&self) {
        self.gentle_reload.store(true, Ordering::SeqCst);
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    pub fn take_full_reload(&self) -> bool {
        self.full_reload.swap(false, Ordering::SeqCst)
    }

    pub fn take_gentle_reload(&self) -> bool {
        self.gentle_reload.swap(false, Ordering::SeqCst)
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    pub fn any_pending(&self) -> bool {
        self.full_reload.load(Ordering::SeqCst)
            || self.gentle_reload.load(Ordering::SeqCst)
            || self.terminate.load(Ordering::SeqCst)
    }
}

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use once_cell::sync::OnceCell;

static ACTIVE: OnceCell<&'static Signals> = OnceCell::new();

extern "C" fn dispatch(raw: i32) {
    let Some(signals) = ACTIVE.get() else {
        return;
    };
    if raw == Signal::SIGHUP as i32 {
        signals.request_full_reload();
    } else if raw == Signal::SIGUSR1 as i32 {
        signals.request_gentle_reload();
    } else if raw == Signal::SIGTERM as i32 {
        signals.request_terminate();
    }
}

/// Installs the supervisor's signal set: HUP requests a full reload,
/// USR1 a gentle reload, TERM a graceful shutdown; SIGPIPE is ignored
/// unconditionally (spec.md §6). Exactly one `Signals` may be wired up
/// this way per process.
pub fn install_supervisor(signals: &'static Signals) {
    let _ = ACTIVE.set(signals);
    let action = SigAction::new(SigHandler::Handler(dispatch), SaFlags::SA_RESTART, SigSet::empty());
    unsafe {
        let _ = signal::sigaction(Signal::SIGHUP, &action);
        let _ = signal::sigaction(Signal::SIGUSR1, &action);
        let _ = signal::sigaction(Signal::SIGTERM, &action);
        let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigIgn);
    }
}

/// Installs the worker's post-fork signal set (spec.md §4.7): TERM
/// reset to its default disposition (an idle or mid-accept worker can
/// simply die), USR1 ignored, HUP routed through `dispatch` so the
/// worker can finish its in-flight request before exiting the loop.
pub fn install_worker(signals: &'static Signals) {
    let _ = ACTIVE.set(signals);
    let hup_action = SigAction::new(SigHandler::Handler(dispatch), SaFlags::SA_RESTART, SigSet::empty());
    unsafe {
        let _ = signal::sigaction(Signal::SIGHUP, &hup_action);
        let _ = signal::signal(Signal::SIGTERM, SigHandler::SigDfl);
        let _ = signal::signal(Signal::SIGUSR1, SigHandler::SigIgn);
        let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigIgn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_the_flag() {
        let s = Signals::new();
        s.request_full_reload();
        assert!(s.take_full_reload());
        assert!(!s.take_full_reload());
    }

    #[test]
    fn independent_flags() {
        let s = Signals::new();
        s.request_gentle_reload();
        assert!(!s.terminate_requested());
        assert!(s.any_pending());
        s.take_gentle_reload();
        assert!(!s.any_pending());
    }
}
