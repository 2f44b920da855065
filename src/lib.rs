//! This crate provides the [`BootstrapLock`], a process-wide recursive lock for the
//! phase of process startup in which no other synchronization facility exists yet.
//!
//! # Motivation
//!
//! A runtime starting up has to protect fragile global state before it knows how many
//! threads there are and before its own locks are initialized. Such a lock must
//!
//! 1. work from the very first line of the process without any setup,
//! 2. be re-entrant, because one bootstrap step frequently calls another step that
//!    needs the same lock,
//! 3. be usable while external tooling suspends and inspects threads.
//!
//! The third point rules out native critical regions on some platforms: a thread that
//! holds the region cannot safely be suspended by a thread that is trying to enter it.
//! Both threads can end up parked forever. The [`BootstrapLock`] can therefore be built
//! on two backends, selected once per process with [`configure`] or the
//! [`BACKEND_ENV_VAR`] environment variable:
//!
//! - [`BackendChoice::CriticalRegion`]: a native mutex. Fast.
//! - [`BackendChoice::SignalObject`]: an auto-reset signal used as a single ticket.
//!   Much slower when uncontended, but free of the suspension hazard. This is the
//!   default.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use bootstrap_lock::{Locked, acquire, with_lock};
//!
//! static MODULES: Locked<RefCell<Vec<&str>>> = Locked::new(RefCell::new(Vec::new()));
//!
//! fn register(name: &'static str) {
//!     let guard = &acquire();
//!     MODULES.get(guard).borrow_mut().push(name);
//! }
//!
//! with_lock(|guard| {
//!     // Re-entering the lock from the same thread does not block.
//!     register("core");
//!     register("io");
//!     assert_eq!(MODULES.get(guard).borrow().len(), 2);
//! });
//! ```
//!
//! # Failure
//!
//! Nothing in this crate returns an error once the lock is in use. Releasing the lock
//! from a thread that does not hold it is reported on stderr and aborts the process.

pub use {
    config::{BACKEND_ENV_VAR, BackendChoice, configure, configured},
    error::ConfigError,
    lock::{BootstrapLock, Guard},
    locked::Locked,
};

mod backend;
mod config;
mod error;
mod lock;
mod locked;
mod thread_token;

/// Acquires the bootstrap lock of this process.
///
/// This is a shorthand for `BootstrapLock::global().acquire()`.
#[inline]
pub fn acquire() -> Guard<'static> {
    BootstrapLock::global().acquire()
}

/// Runs `f` while holding the bootstrap lock.
///
/// The lock is released when `f` returns or unwinds.
///
/// # Example
///
/// ```
/// use bootstrap_lock::{BootstrapLock, with_lock};
///
/// let depth = with_lock(|_| with_lock(|_| BootstrapLock::global().depth()));
/// assert_eq!(depth, Some(2));
/// assert!(!BootstrapLock::global().is_locked());
/// ```
#[inline]
pub fn with_lock<T>(f: impl FnOnce(&Guard<'static>) -> T) -> T {
    let guard = acquire();
    f(&guard)
}
