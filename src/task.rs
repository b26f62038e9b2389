//! # Task Control Block
//!
//! Defines the task model. A task is a function that the scheduler
//! invokes to completion — there is no per-task stack and no mid-body
//! suspension. "Blocking" a task only marks it not-ready: the current
//! invocation still runs until the function returns, and the task is
//! invoked again once its event fires or its deadline elapses.
//!
//! Task control blocks are stored in a fixed array inside the kernel
//! singleton — no heap allocation. Applications refer to tasks through
//! [`TaskId`] handles returned by `create_task`.

use crate::config::Tick;
use crate::list::Node;

/// Opaque parameter handed to the task function on every invocation.
pub type TaskParameter = *mut ();

/// A task body. Runs to completion on the shared stack each time the
/// scheduler dispatches the task.
pub type TaskFunction = fn(TaskParameter);

/// Handle to a task slot in the kernel's TCB array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Owner marker for nodes not yet bound to a task (list sentinels,
    /// unallocated TCB slots).
    pub(crate) const NONE: TaskId = TaskId(usize::MAX);
}

/// Task Control Block.
///
/// Carries two intrusive nodes. `sched_node` links the task into exactly
/// one of: its priority's ready list, the suspended list, or a delayed
/// list while a timed pend is in flight. `event_node` links it into at
/// most one event wait list. The wake deadline is only meaningful while
/// `sched_node` sits on a delayed list.
pub(crate) struct Task {
    pub(crate) func: TaskFunction,
    pub(crate) param: TaskParameter,
    pub(crate) priority: u8,
    pub(crate) sched_node: Node,
    pub(crate) event_node: Node,
    pub(crate) wake_tick: Tick,
    /// Whether this slot is allocated.
    pub(crate) active: bool,
}

impl Task {
    /// An unallocated TCB slot. Used to initialize the kernel's array.
    pub(crate) const fn empty() -> Self {
        Task {
            func: Task::unused,
            param: core::ptr::null_mut(),
            priority: 0,
            sched_node: Node::new(),
            event_node: Node::new(),
            wake_tick: 0,
            active: false,
        }
    }

    /// Placeholder body for unallocated slots. Never dispatched.
    fn unused(_param: TaskParameter) {}
}

// Safety: the raw parameter pointer is only dereferenced by the task
// body the application supplied with it; the kernel itself treats it as
// an opaque value. TCBs are only mutated inside critical sections.
unsafe impl Send for Task {}
unsafe impl Sync for Task {}
