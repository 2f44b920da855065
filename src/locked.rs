use {
    crate::lock::{BootstrapLock, GLOBAL, Guard},
    debug_fn::debug_fn,
    static_assertions::{assert_impl_all, assert_not_impl_any},
    std::{
        cell::UnsafeCell,
        fmt::{Debug, Formatter},
        ops::Deref,
    },
};


/// A value that can only be accessed while the bootstrap lock is held.
///
/// Apart from that, this object behaves like the wrapped value:
///
/// - `Locked<T>: Sync` if and only if `T: Send`.
/// - Only the thread holding the bootstrap lock can access the value.
///
/// Since [`Locked::get`] hands out shared references, mutation goes through cheap
/// non-atomic interior mutability such as [`Cell`](std::cell::Cell) or
/// [`RefCell`](std::cell::RefCell).
///
/// This object derefs to the [`BootstrapLock`].
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use bootstrap_lock::{Locked, acquire};
///
/// static STAGE: Locked<Cell<u32>> = Locked::new(Cell::new(0));
///
/// fn advance() {
///     let guard = &acquire();
///     let stage = STAGE.get(guard);
///     stage.set(stage.get() + 1);
/// }
///
/// let guard = &acquire();
/// advance();
/// advance();
/// assert_eq!(STAGE.get(guard).get(), 2);
/// ```
pub struct Locked<T>
where
    T: ?Sized,
{
    lock: &'static BootstrapLock,
    value: UnsafeCell<T>,
}

assert_impl_all!(BootstrapLock: Sync);

// SAFETY: - We've asserted above that BootstrapLock is Sync.
//         - UnsafeCell keeps Locked from being Sync for any other T.
//         - Locked only gives access to the thread holding the lock, meaning that Sync
//           can be modeled as transferring ownership every time the holder changes.
unsafe impl<T> Sync for Locked<T> where T: ?Sized + Send {}

impl<T> Locked<T> {
    /// Wraps a value so that it is guarded by the bootstrap lock.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self::with_lock(&GLOBAL, value)
    }

    #[inline]
    pub(crate) const fn with_lock(lock: &'static BootstrapLock, value: T) -> Self {
        Self {
            lock,
            value: UnsafeCell::new(value),
        }
    }

    /// Unwraps the value, consuming this object.
    ///
    /// # Example
    ///
    /// ```
    /// use bootstrap_lock::Locked;
    ///
    /// let locked = Locked::new(5);
    /// assert_eq!(locked.into_inner(), 5);
    /// ```
    #[inline]
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T> Deref for Locked<T>
where
    T: ?Sized,
{
    type Target = BootstrapLock;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.lock
    }
}

impl<T> Locked<T>
where
    T: ?Sized,
{
    /// Accesses the value.
    ///
    /// # Panic
    ///
    /// Panics if the guard does not belong to the lock guarding this object.
    #[inline]
    pub fn get<'a>(&'a self, guard: &'a Guard<'_>) -> &'a T {
        assert_not_impl_any!(Guard<'_>: Sync, Send);
        assert!(
            *self.lock == *guard.lock(),
            "guard does not guard this object",
        );
        // SAFETY: - Since Guard: !Sync and Guard: !Send, and only one thread at a time
        //           can hold self.lock, no other thread can have a guard for self.lock.
        //         - References are only handed out here and in get_mut, and get_mut
        //           needs &mut self.
        //         - All references handed out here borrow a guard, so no other thread
        //           can have a reference to the value.
        //         - Returning this reference for T: !Sync but T: Send can therefore be
        //           modeled as moving ownership to this thread.
        unsafe { &*self.value.get() }
    }

    /// Returns a mutable reference to the value.
    ///
    /// No locking is needed since the borrow is exclusive.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Returns a pointer to the value.
    #[inline]
    pub fn data_ptr(&self) -> *const T {
        self.value.get()
    }
}

impl<T> Debug for Locked<T>
where
    T: Debug + ?Sized,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locked")
            .field("lock_id", &self.lock.addr())
            .field(
                "value",
                &debug_fn(|fmt| {
                    // Formatting must never block, so the value is only shown to the
                    // thread that already holds the lock.
                    if self.lock.is_held_by_current_thread() {
                        let guard = self.lock.acquire();
                        Debug::fmt(self.get(&guard), fmt)
                    } else {
                        fmt.write_str("<locked>")
                    }
                }),
            )
            .finish_non_exhaustive()
    }
}
