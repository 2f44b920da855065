use {
    crate::config::BackendChoice,
    std::{
        io::{self, Write},
        process,
    },
    thiserror::Error,
};


/// An error returned when configuring the bootstrap lock.
///
/// These are the only recoverable errors of this crate. Everything that goes wrong
/// inside the lock itself is a [`Violation`] and aborts the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A backend name could not be parsed.
    #[error("unknown bootstrap lock backend '{raw}'; expected one of: {expected:?}")]
    UnknownBackend {
        raw: String,
        expected: &'static [&'static str],
    },
    /// The process-wide backend setting was already fixed to a different value.
    #[error("bootstrap lock backend is already fixed to {current}, cannot switch to {requested}")]
    AlreadyFixed {
        current: BackendChoice,
        requested: BackendChoice,
    },
}

/// A broken invariant of the bootstrap lock.
///
/// Violations are never returned to callers. They are passed to [`fatal`] which
/// aborts the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum Violation {
    #[error("release attempted by thread {caller:#x} but the lock is owned by thread {owner:#x}")]
    NotOwner { owner: usize, caller: usize },
    #[error("release attempted on a lock that is not held")]
    NotHeld,
    #[error("recursion depth overflow")]
    DepthOverflow,
}

/// Reports the violation and aborts the process.
///
/// The diagnostic is written straight to stderr. The `tracing` dispatcher is not
/// involved: a subscriber could block on the bootstrap lock and keep the process from
/// aborting.
#[cold]
#[inline(never)]
pub(crate) fn fatal(violation: Violation) -> ! {
    let _ = writeln!(io::stderr(), "fatal error: bootstrap lock: {violation}");
    process::abort()
}
