//! Process-wide holder for the leaked, `'static` [`Services`] a forked
//! worker builds itself from (spec.md §5, "Shared resources": the
//! filter-group table, plugin list, and configured limits are
//! read-only between reloads; a reload replaces them wholesale").
//!
//! `supervisor::ServicesFactory` is a plain `fn() -> Services<'static>`
//! pointer (not a closure) so it stays valid across `fork()`; this is
//! the static it closes over. Only the supervisor's single thread ever
//! writes to it, so a bare `AtomicPtr` is enough — no mutex needed.

use std::sync::atomic::{AtomicPtr, Ordering};

use crate::worker::Services;

static CURRENT: AtomicPtr<Services<'static>> = AtomicPtr::new(std::ptr::null_mut());

/// Installs a freshly built `Services` as the one `build_services`
/// reads from. The previous generation, if any, is deliberately leaked
/// rather than dropped: workers forked under it may still be running
/// and holding the same references.
pub fn install(services: Services<'static>) {
    let ptr = Box::into_raw(Box::new(services));
    CURRENT.store(ptr, Ordering::SeqCst);
}

/// The `ServicesFactory` every worker fork calls post-privilege-drop.
pub fn build_services() -> Services<'static> {
    let ptr = CURRENT.load(Ordering::SeqCst);
    assert!(!ptr.is_null(), "registry::install must run before any fork");
    unsafe { *ptr }
}
