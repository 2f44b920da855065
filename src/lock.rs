#[cfg(doc)]
use crate::{config::configure, locked::Locked};
use {
    crate::{
        backend::Backend,
        config::{BackendChoice, configured},
        error::{Violation, fatal},
        thread_token::{NO_THREAD, current_thread_token},
    },
    opera::{PhantomNotSend, PhantomNotSync},
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{
        cell::Cell,
        fmt::{Debug, Formatter},
        ptr,
        sync::{
            OnceLock,
            atomic::{AtomicUsize, Ordering::Relaxed},
        },
    },
};

#[cfg(test)]
mod tests;

pub(crate) static GLOBAL: BootstrapLock = BootstrapLock::new();

/// The process-wide recursive lock used during bootstrap.
///
/// There is exactly one instance per process, reachable through
/// [`BootstrapLock::global`]. It needs no setup: the backend is constructed on the
/// first acquisition, so the lock can be used from the very first lines of the
/// process.
///
/// The thread holding the lock can acquire it again any number of times without
/// blocking. Other threads block in [`BootstrapLock::acquire`] until every guard of the
/// holder has been dropped. There is no timeout, no cancellation, and no fairness
/// between waiters.
///
/// # Example
///
/// ```
/// use bootstrap_lock::BootstrapLock;
///
/// let lock = BootstrapLock::global();
/// let outer = lock.acquire();
/// let inner = lock.acquire();
/// assert_eq!(lock.depth(), Some(2));
/// drop(inner);
/// drop(outer);
/// assert!(!lock.is_locked());
/// ```
pub struct BootstrapLock {
    // We enforce the following invariants:
    // 1. if depth > 0, then the backend is held
    // 2. if owner != NO_THREAD, then the backend is held by the thread with that token
    // 3. depth > 0 if and only if owner != NO_THREAD
    // The current thread holds a ticket if depth > 0 and owner is its token.
    choice: Option<BackendChoice>,
    backend: OnceLock<Backend>,
    // Mutations of this field are protected by the backend.
    owner: AtomicUsize,
    // This field is protected by the backend.
    depth: Cell<u64>,
}

/// An acquired ticket of the [`BootstrapLock`].
///
/// Created by [`BootstrapLock::acquire`]. Dropping the guard gives the ticket back,
/// also while unwinding. Once the last guard of the holding thread is gone, other
/// threads can acquire the lock.
///
/// A [`Guard`] is needed to access [`Locked`] data.
///
/// Passing a guard to [`mem::forget`](std::mem::forget) leaks its ticket. It can be
/// given back with [`BootstrapLock::force_release`].
pub struct Guard<'a> {
    lock: &'a BootstrapLock,
    _phantom_not_send: PhantomNotSend,
    _phantom_not_sync: PhantomNotSync,
}

// SAFETY: - depth is only accessed by the thread that holds the backend.
//         - owner is atomic.
//         - The backend is only handed out through the OnceLock.
unsafe impl Sync for BootstrapLock {}

assert_impl_all!(BootstrapLock: Send, Sync);
assert_not_impl_any!(Guard<'_>: Sync, Send);

impl BootstrapLock {
    const fn new() -> Self {
        Self::with_choice(None)
    }

    /// Creates a lock that ignores the process-wide setting and uses `choice`.
    #[cfg(test)]
    pub(crate) const fn with_backend(choice: BackendChoice) -> Self {
        Self::with_choice(Some(choice))
    }

    const fn with_choice(choice: Option<BackendChoice>) -> Self {
        Self {
            choice,
            backend: OnceLock::new(),
            owner: AtomicUsize::new(NO_THREAD),
            depth: Cell::new(0),
        }
    }

    /// Returns the bootstrap lock of this process.
    #[inline]
    pub fn global() -> &'static BootstrapLock {
        &GLOBAL
    }

    /// Acquires this lock.
    ///
    /// If the lock is held by another thread, this function blocks until that thread
    /// has dropped all of its guards. If the calling thread already holds the lock, it
    /// returns immediately.
    ///
    /// The first call in the process constructs the backend selected by
    /// [`configure`]. Concurrent first callers wait for the construction to finish.
    ///
    /// # Example
    ///
    /// ```
    /// use bootstrap_lock::BootstrapLock;
    ///
    /// let _guard = BootstrapLock::global().acquire();
    /// ```
    #[inline]
    pub fn acquire(&self) -> Guard<'_> {
        let backend = self.backend();
        if self.owner.load(Relaxed) != current_thread_token() {
            self.acquire_slow(backend);
        }
        // SAFETY: - Either owner already was the token of the current thread or we've
        //           just set it.
        unsafe { self.add_ticket() }
    }

    #[cold]
    #[inline(never)]
    fn acquire_slow(&self, backend: &Backend) {
        backend.enter();
        // SAFETY: - We've just entered the backend.
        //         - Therefore
        //           - we are allowed to mutate this field.
        //           - setting owner to the token of the current thread upholds the
        //             invariant.
        debug_assert_eq!(self.depth.get(), 0);
        self.owner.store(current_thread_token(), Relaxed);
    }

    #[inline]
    fn backend(&self) -> &Backend {
        match self.backend.get() {
            Some(backend) => backend,
            None => self.init_backend(),
        }
    }

    #[cold]
    #[inline(never)]
    fn init_backend(&self) -> &Backend {
        // Nothing inside the init closure may call out of this crate: a subscriber that
        // acquires this lock would re-enter the OnceLock and deadlock.
        let choice = self.choice.unwrap_or_else(configured);
        let mut constructed = false;
        let backend = self.backend.get_or_init(|| {
            constructed = true;
            Backend::new(choice)
        });
        if constructed {
            tracing::debug!(backend = %backend.choice(), "constructed bootstrap lock");
        }
        backend
    }

    /// # Safety
    ///
    /// - owner must be the token of the current thread.
    #[inline]
    unsafe fn add_ticket(&self) -> Guard<'_> {
        // SAFETY: - By the requirements of this function, the current thread holds the
        //           backend and is allowed to access depth.
        let depth = self.depth.get();
        let Some(depth) = depth.checked_add(1) else {
            fatal(Violation::DepthOverflow);
        };
        self.depth.set(depth);
        Guard {
            lock: self,
            _phantom_not_send: Default::default(),
            _phantom_not_sync: Default::default(),
        }
    }

    /// Gives back a ticket whose [`Guard`] was passed to
    /// [`mem::forget`](std::mem::forget).
    ///
    /// # Safety
    ///
    /// - The invariant that each [`Guard`] owns a ticket must be upheld whenever a
    ///   [`Guard`] is used or dropped.
    ///
    /// Calling this function from a thread that does not hold the lock is not undefined
    /// behavior. It aborts the process.
    ///
    /// # Example
    ///
    /// ```
    /// use std::mem;
    /// use bootstrap_lock::BootstrapLock;
    ///
    /// let lock = BootstrapLock::global();
    /// mem::forget(lock.acquire());
    /// assert!(lock.is_held_by_current_thread());
    /// // SAFETY: This gives back the ticket of the guard we just forgot.
    /// unsafe {
    ///     lock.force_release();
    /// }
    /// assert!(!lock.is_held_by_current_thread());
    /// ```
    #[inline]
    pub unsafe fn force_release(&self) {
        self.release();
    }

    #[inline]
    fn release(&self) {
        let caller = current_thread_token();
        let owner = self.owner.load(Relaxed);
        if owner != caller {
            fatal(match owner {
                NO_THREAD => Violation::NotHeld,
                _ => Violation::NotOwner { owner, caller },
            });
        }
        // SAFETY: - owner is the token of the current thread, so by the invariants we
        //           hold the backend and may access depth.
        let depth = self.depth.get();
        if depth == 0 {
            fatal(Violation::NotHeld);
        }
        self.depth.set(depth - 1);
        if depth == 1 {
            self.release_slow();
        }
    }

    #[cold]
    #[inline(never)]
    fn release_slow(&self) {
        let Some(backend) = self.backend.get() else {
            fatal(Violation::NotHeld);
        };
        self.owner.store(NO_THREAD, Relaxed);
        // SAFETY: - We still hold the backend. depth is 0 and owner is cleared, so the
        //           invariants hold once it is released.
        unsafe {
            backend.leave();
        }
    }

    /// Returns whether any thread holds this lock.
    ///
    /// # Example
    ///
    /// ```
    /// use bootstrap_lock::BootstrapLock;
    ///
    /// let lock = BootstrapLock::global();
    /// assert!(!lock.is_locked());
    /// let _guard = lock.acquire();
    /// assert!(lock.is_locked());
    /// ```
    pub fn is_locked(&self) -> bool {
        self.backend.get().is_some_and(Backend::is_held)
    }

    /// Returns whether the current thread holds this lock.
    ///
    /// # Example
    ///
    /// ```
    /// use std::thread;
    /// use bootstrap_lock::BootstrapLock;
    ///
    /// let lock = BootstrapLock::global();
    /// let _guard = lock.acquire();
    /// assert!(lock.is_held_by_current_thread());
    /// thread::scope(|scope| {
    ///     scope.spawn(|| assert!(!lock.is_held_by_current_thread()));
    /// });
    /// ```
    #[inline]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Relaxed) == current_thread_token()
    }

    /// Returns the recursion depth of the current thread.
    ///
    /// Returns `None` if the current thread does not hold the lock.
    pub fn depth(&self) -> Option<u64> {
        // SAFETY: - If owner is our token, we hold the backend and may read depth.
        self.is_held_by_current_thread().then(|| self.depth.get())
    }

    /// Returns the backend of this lock.
    ///
    /// Returns `None` until the lock has been acquired for the first time.
    pub fn backend_choice(&self) -> Option<BackendChoice> {
        self.backend.get().map(Backend::choice)
    }

    #[inline]
    pub(crate) fn addr(&self) -> *const u8 {
        let addr: *const Self = self;
        addr.cast()
    }
}

impl Debug for BootstrapLock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapLock")
            .field("id", &self.addr())
            .field("backend", &self.backend_choice())
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

impl PartialEq for BootstrapLock {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for BootstrapLock {}

impl<'a> Guard<'a> {
    /// Returns the lock this guard belongs to.
    #[inline]
    pub fn lock(&self) -> &'a BootstrapLock {
        self.lock
    }
}

impl Drop for Guard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.release();
    }
}

impl Debug for Guard<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("lock_id", &self.lock.addr())
            .finish_non_exhaustive()
    }
}
