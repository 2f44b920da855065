use {
    crate::config::BackendChoice,
    parking_lot::{Condvar, Mutex, RawMutex, lock_api::RawMutex as RawMutexTrait},
};


/// The OS-level resource behind the bootstrap lock.
///
/// Neither variant is reentrant from the point of view of this type. Recursion is
/// handled by the owner bookkeeping in [`BootstrapLock`](crate::BootstrapLock), which
/// never calls [`Backend::enter`] while the calling thread already holds the backend.
pub(crate) enum Backend {
    CriticalRegion(RawMutex),
    SignalObject(Signal),
}

/// An auto-reset signal.
///
/// While the signal is raised, exactly one call to [`Signal::wait`] consumes it and
/// returns. Raising a signal that nobody waits for is not lost: it stays raised until
/// the next waiter arrives.
pub(crate) struct Signal {
    raised: Mutex<bool>,
    condvar: Condvar,
}

impl Backend {
    pub(crate) fn new(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::CriticalRegion => Backend::CriticalRegion(RawMutex::INIT),
            BackendChoice::SignalObject => Backend::SignalObject(Signal::new(true)),
        }
    }

    pub(crate) fn choice(&self) -> BackendChoice {
        match self {
            Backend::CriticalRegion(_) => BackendChoice::CriticalRegion,
            Backend::SignalObject(_) => BackendChoice::SignalObject,
        }
    }

    /// Blocks until the calling thread holds the backend.
    #[inline]
    pub(crate) fn enter(&self) {
        match self {
            Backend::CriticalRegion(raw) => raw.lock(),
            Backend::SignalObject(signal) => signal.wait(),
        }
    }

    /// # Safety
    ///
    /// - The calling thread must hold the backend.
    #[inline]
    pub(crate) unsafe fn leave(&self) {
        match self {
            // SAFETY: - Forwarded to the caller.
            Backend::CriticalRegion(raw) => unsafe { raw.unlock() },
            Backend::SignalObject(signal) => signal.raise(),
        }
    }

    pub(crate) fn is_held(&self) -> bool {
        match self {
            Backend::CriticalRegion(raw) => raw.is_locked(),
            Backend::SignalObject(signal) => !signal.is_raised(),
        }
    }
}

impl Signal {
    pub(crate) fn new(raised: bool) -> Self {
        Self {
            raised: Mutex::new(raised),
            condvar: Condvar::new(),
        }
    }

    /// Waits until the signal is raised and lowers it again.
    pub(crate) fn wait(&self) {
        let mut raised = self.raised.lock();
        while !*raised {
            self.condvar.wait(&mut raised);
        }
        *raised = false;
    }

    pub(crate) fn raise(&self) {
        *self.raised.lock() = true;
        self.condvar.notify_one();
    }

    pub(crate) fn is_raised(&self) -> bool {
        *self.raised.lock()
    }
}
