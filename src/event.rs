//! # Event Wait Lists
//!
//! A blocking primitive owns a pair of wait lists: `list_read` parks
//! tasks waiting for data to become available, `list_write` parks tasks
//! waiting for space. A task sits on at most one wait list at a time.
//!
//! Blocking is split into two steps so that the caller can briefly
//! re-enable interrupts between them without losing a wakeup:
//!
//! 1. [`pre_pend`] — with interrupts disabled and the scheduler locked,
//!    the task claims its slot on the wait list. From this point an
//!    unblock (from another task or an interrupt) will find and wake it.
//! 2. [`pend`] — with interrupts enabled again, finalize: leave the
//!    ready list and arm the wake deadline. If the task was unblocked
//!    during the window, its event node is no longer on the wait list
//!    and the step is a no-op.
//!
//! Wakeups go through [`unblock_tasks`], one task per call; the producer
//! decides how many tasks to wake based on what it published.

use crate::config::{Tick, MAX_DELAY};
use crate::kernel::kernel;
use crate::list::{List, Node};
use crate::log::trace;
use crate::sync;
use crate::task::TaskId;

/// Read/write wait-list pair embedded in a blocking primitive.
pub(crate) struct EventRw {
    pub(crate) list_read: List,
    pub(crate) list_write: List,
}

impl EventRw {
    pub(crate) const fn new() -> Self {
        EventRw {
            list_read: List::new(),
            list_write: List::new(),
        }
    }

    /// Wire both wait lists. Must run after the event has reached its
    /// final address.
    pub(crate) fn init(&mut self) {
        self.list_read.init();
        self.list_write.init();
    }
}

/// Claim the task's slot on `list`, leaving any previous wait list.
///
/// # Safety
///
/// Caller holds the critical section and the scheduler lock; `list` is
/// an initialized wait list at a stable address.
pub(crate) unsafe fn pre_pend(list: *mut List, id: TaskId) {
    let k = kernel();
    let ev: *mut Node = &mut k.tasks[id.0].event_node;
    if (*ev).is_attached() {
        List::remove(ev);
    }
    (*list).insert_last(ev);
}

/// Finalize a pend started by [`pre_pend`]: leave the ready list and arm
/// the wake deadline (`MAX_DELAY` waits indefinitely).
///
/// # Safety
///
/// Caller holds the scheduler lock (interrupts may be enabled); `list`
/// is the wait list passed to the matching [`pre_pend`].
pub(crate) unsafe fn pend(list: *mut List, id: TaskId, ticks_to_wait: Tick) {
    let restore = sync::enter();
    let k = kernel();
    let t: *mut crate::task::Task = &mut k.tasks[id.0];
    let ev: *mut Node = &mut (*t).event_node;
    if (*ev).is_on(list) {
        let sn: *mut Node = &mut (*t).sched_node;
        if (*sn).is_attached() {
            List::remove(sn);
        }
        if ticks_to_wait != MAX_DELAY {
            let wake = k.tick.wrapping_add(ticks_to_wait);
            (*t).wake_tick = wake;
            k.insert_delayed(sn, wake);
        }
        trace!("task {} pended for {} ticks", id.0, ticks_to_wait);
    }
    // else: unblocked during the pre-pend window; the wake already
    // moved the task back to its ready list.
    sync::exit(restore);
}

/// Wake the task at the head of `list`, moving it to its ready list.
/// Wakes nothing if the list is empty.
///
/// # Safety
///
/// Caller holds the critical section and the scheduler lock.
pub(crate) unsafe fn unblock_tasks(list: *mut List) {
    if (*list).is_empty() {
        return;
    }
    let node = (*list).first();
    let id = (*node).owner();
    kernel().make_ready(id);
    trace!("task {} unblocked", id.0);
}
