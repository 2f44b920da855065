use std::ptr;


/// Owner slot value meaning "nobody".
///
/// Tokens are addresses, so a live thread never has this token. An exited thread's
/// token may be handed to a thread spawned later. If the exited thread leaked a guard,
/// the newcomer inherits its hold on the lock. The exit is ordered before the
/// newcomer's start, so depth and owner still describe a single holder.
pub(crate) const NO_THREAD: usize = 0;

thread_local! {
    static ANCHOR: u8 = const { 0 };
}

/// Returns a token identifying the calling thread. Never [`NO_THREAD`].
#[inline(always)]
pub(crate) fn current_thread_token() -> usize {
    ANCHOR.with(|anchor| ptr::from_ref(anchor).addr())
}
