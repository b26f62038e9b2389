//! # Critical Sections
//!
//! Interrupt-safe critical section wrappers over the `critical-section`
//! facade. All shared kernel state must be accessed within a critical
//! section to prevent data races between task-level code and interrupt
//! handlers.
//!
//! Two forms are provided. The closure form is for single-shot state
//! access. The save/restore form (`enter`/`exit`) is for the scheduler
//! and the queue protocols, which open and close the critical section
//! several times across one logical operation (dispatching a task, or
//! copying queue data with interrupts enabled).
//!
//! On bare-metal ARM the implementation is registered by `arch`; host
//! tests use the `critical-section/std` implementation. Both support
//! nesting through the restore token.

pub(crate) use critical_section::RestoreState;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Keep critical sections as short as possible to bound interrupt
/// latency: no data copies, no callbacks, no task functions inside.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    critical_section::with(|_cs| f())
}

/// Open a critical section and return the token that closes it.
///
/// # Safety
///
/// Every `enter` must be paired with exactly one [`exit`] receiving its
/// token, on the same call path, in LIFO order with respect to nesting.
#[inline]
pub(crate) unsafe fn enter() -> RestoreState {
    critical_section::acquire()
}

/// Close a critical section opened by [`enter`].
///
/// # Safety
///
/// `restore` must come from the matching [`enter`], and the section must
/// be the innermost one still open.
#[inline]
pub(crate) unsafe fn exit(restore: RestoreState) {
    critical_section::release(restore)
}
