//! # Kernel
//!
//! Global kernel state and the public scheduler API.
//!
//! The kernel multiplexes a fixed set of tasks over a single hardware
//! stack. All state lives in one process-wide singleton: the tick
//! counter, the currently running task, one ready list per priority,
//! the suspended list, and the delayed lists that order timed pends by
//! deadline. [`init`] must run before the tick interrupt is enabled.
//!
//! ## Startup Sequence
//!
//! ```text
//! main()
//!   ├─► kernel::init()           ← Wire the kernel lists
//!   ├─► kernel::create_task(…)   ← Register tasks (×N)
//!   ├─► start tick timer         ← Platform wiring (calls tick_interrupt)
//!   └─► loop { kernel::sched() } ← Dispatch loop
//! ```
//!
//! ## Dispatch Model
//!
//! `sched()` picks the highest-priority ready task whose priority is
//! strictly above the task it interrupts, rotates it to the back of its
//! ready list (round robin within the level), and calls its function to
//! completion on the current stack. In cooperative mode `sched()` does
//! nothing while a task is running; in preemptive mode it may nest, so
//! a tick can run a higher-priority task on top of a lower one.

use core::ptr::addr_of_mut;

use crate::config::{
    KernelMode, Tick, HIGH_PRIORITY, KERNEL_MODE, LOW_PRIORITY, MAX_TASKS, NUM_PRIORITIES,
};
use crate::list::{List, Node};
use crate::log::trace;
use crate::sync;
use crate::task::{Task, TaskFunction, TaskId, TaskParameter};

// ---------------------------------------------------------------------------
// Kernel state singleton
// ---------------------------------------------------------------------------

/// The kernel singleton. Mutated only inside critical sections.
pub(crate) struct Kernel {
    /// Monotonic tick counter; wraps.
    pub(crate) tick: Tick,

    /// Currently running task, `None` when idle.
    pub(crate) current_task: Option<TaskId>,

    /// Scheduler lock nesting count. While non-zero, `sched()` does not
    /// dispatch; interrupts stay enabled.
    pub(crate) sched_lock_depth: usize,

    /// Fixed TCB array; `create_task` hands out slots in order.
    pub(crate) tasks: [Task; MAX_TASKS],
    pub(crate) task_count: usize,

    /// One ready list per priority, dispatched highest first.
    tasks_ready: [List; NUM_PRIORITIES],
    tasks_suspended: List,

    /// Timed pends sorted by wake deadline. The two lists alternate
    /// between the current tick epoch and the post-wraparound epoch.
    tasks_delayed: [List; 2],
    delayed_current: usize,
}

impl Kernel {
    pub(crate) const fn new() -> Self {
        const EMPTY_TASK: Task = Task::empty();
        const EMPTY_LIST: List = List::new();
        Kernel {
            tick: 0,
            current_task: None,
            sched_lock_depth: 0,
            tasks: [EMPTY_TASK; MAX_TASKS],
            task_count: 0,
            tasks_ready: [EMPTY_LIST; NUM_PRIORITIES],
            tasks_suspended: EMPTY_LIST,
            tasks_delayed: [EMPTY_LIST; 2],
            delayed_current: 0,
        }
    }

    /// Wire every list and clear all task slots. The list sentinels are
    /// self-referential, so this must run at the singleton's final
    /// address, with the caller holding the critical section.
    fn reset(&mut self) {
        self.tick = 0;
        self.current_task = None;
        self.sched_lock_depth = 0;
        self.task_count = 0;
        for task in self.tasks.iter_mut() {
            *task = Task::empty();
        }
        for list in self.tasks_ready.iter_mut() {
            list.init();
        }
        self.tasks_suspended.init();
        for list in self.tasks_delayed.iter_mut() {
            list.init();
        }
        self.delayed_current = 0;
    }

    /// Move a task to the tail of its priority's ready list, detaching
    /// its event node and its scheduler node from wherever they sit.
    ///
    /// # Safety
    ///
    /// Caller holds the critical section; `id` is an allocated slot.
    pub(crate) unsafe fn make_ready(&mut self, id: TaskId) {
        let t: *mut Task = &mut self.tasks[id.0];
        debug_assert!((*t).active);
        let ev: *mut Node = &mut (*t).event_node;
        if (*ev).is_attached() {
            List::remove(ev);
        }
        let sn: *mut Node = &mut (*t).sched_node;
        if (*sn).is_attached() {
            List::remove(sn);
        }
        let priority = (*t).priority as usize;
        self.tasks_ready[priority].insert_last(sn);
    }

    /// Sorted insert into the delayed list for `wake`'s epoch. A wake
    /// tick numerically at or below the current tick can only be
    /// reached after the counter wraps, so it goes to the overflow
    /// epoch list.
    ///
    /// # Safety
    ///
    /// Caller holds the critical section; `node` is detached and owned
    /// by an allocated task whose `wake_tick` is `wake`.
    pub(crate) unsafe fn insert_delayed(&mut self, node: *mut Node, wake: Tick) {
        let epoch = if wake > self.tick {
            self.delayed_current
        } else {
            self.delayed_current ^ 1
        };
        let list: *mut List = &mut self.tasks_delayed[epoch];
        let sentinel = (*list).sentinel_ptr();
        let mut pos = (*list).first();
        while pos != sentinel && self.tasks[(*pos).owner().0].wake_tick <= wake {
            pos = (*pos).next();
        }
        (*list).insert_before(pos, node);
    }
}

static mut KERNEL: Kernel = Kernel::new();

/// Access the kernel singleton.
///
/// # Safety
///
/// Caller must hold the critical section (or be in single-threaded
/// startup before any interrupt is enabled), and must not let the
/// reference escape that region.
pub(crate) unsafe fn kernel() -> &'static mut Kernel {
    &mut *addr_of_mut!(KERNEL)
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the kernel state.
///
/// Must be called before any other kernel function and before the tick
/// timer interrupt is enabled.
pub fn init() {
    sync::critical_section(|| unsafe { kernel().reset() });
    trace!("kernel initialized");
}

/// Create a task and append it to the ready list of its priority.
///
/// Safe from any context, including task bodies. Fails when all
/// `MAX_TASKS` slots are taken.
///
/// # Panics
///
/// Panics if `priority` is outside `LOW_PRIORITY..=HIGH_PRIORITY`.
pub fn create_task(
    priority: u8,
    func: TaskFunction,
    param: TaskParameter,
) -> Result<TaskId, ()> {
    assert!(
        priority >= LOW_PRIORITY && priority <= HIGH_PRIORITY,
        "create_task(): invalid priority {}",
        priority
    );
    let id = sync::critical_section(|| unsafe {
        let k = kernel();
        if k.task_count >= MAX_TASKS {
            return Err(());
        }
        let id = TaskId(k.task_count);
        k.task_count += 1;
        let t: *mut Task = &mut k.tasks[id.0];
        *t = Task::empty();
        (*t).func = func;
        (*t).param = param;
        (*t).priority = priority;
        (*t).active = true;
        (*t).sched_node.set_owner(id);
        (*t).event_node.set_owner(id);
        let sn: *mut Node = &mut (*t).sched_node;
        k.tasks_ready[priority as usize].insert_last(sn);
        Ok(id)
    })?;
    trace!("task {} created at priority {}", id.0, priority);
    Ok(id)
}

/// Run one scheduled task.
///
/// Picks the highest-priority ready task strictly above the priority of
/// the task this call interrupts (any task when idle), rotates it to
/// the back of its ready list, and runs it to completion with
/// interrupts enabled. Returns without dispatching when the scheduler
/// is locked, when no such task exists, or — in cooperative mode —
/// whenever a task is already running. Each call rescans from the top,
/// so work that became ready while a task ran is picked up by the next
/// call.
pub fn sched() {
    let restore = unsafe { sync::enter() };
    let k = unsafe { kernel() };

    if k.sched_lock_depth > 0 {
        unsafe { sync::exit(restore) };
        return;
    }

    let prev = k.current_task;
    let floor: i16 = match prev {
        Some(id) => k.tasks[id.0].priority as i16,
        None => -1,
    };

    if KERNEL_MODE == KernelMode::Cooperative && floor >= 0 {
        // A task is already running; cooperative mode never nests.
        unsafe { sync::exit(restore) };
        return;
    }

    let mut priority = HIGH_PRIORITY as i16;
    while priority > floor {
        let list = &mut k.tasks_ready[priority as usize];
        if list.is_empty() {
            priority -= 1;
            continue;
        }

        let node = list.first();
        let id = unsafe { (*node).owner() };
        // Round robin within the level: rotate to the back before
        // running, so equal-priority tasks take turns.
        unsafe {
            List::remove(node);
            list.insert_last(node);
        }

        let (func, param) = {
            let t = &k.tasks[id.0];
            (t.func, t.param)
        };
        k.current_task = Some(id);

        // Interrupts enabled while the task runs.
        unsafe { sync::exit(restore) };
        func(param);
        let restore = unsafe { sync::enter() };

        unsafe { kernel() }.current_task = prev;

        // One dispatch per call: a higher-priority task may have become
        // ready while this one ran, and the next call rescans for it
        // from the top.
        unsafe { sync::exit(restore) };
        return;
    }

    unsafe { sync::exit(restore) };
}

/// Prevent `sched()` from dispatching until the matching
/// [`sched_unlock`]. Nests; interrupts stay enabled.
pub fn sched_lock() {
    sync::critical_section(|| unsafe { kernel().sched_lock_depth += 1 });
}

/// Release one level of the scheduler lock. When the count reaches zero
/// in preemptive mode, runs the scheduler to dispatch any work made
/// ready while the lock was held.
pub fn sched_unlock() {
    let dispatch = sync::critical_section(|| unsafe {
        let k = kernel();
        debug_assert!(k.sched_lock_depth > 0);
        k.sched_lock_depth -= 1;
        k.sched_lock_depth == 0
    });
    if dispatch && KERNEL_MODE == KernelMode::Preemptive {
        sched();
    }
}

/// Process one tick timer interrupt.
///
/// Advances the tick and moves every timed-out pended task back to its
/// ready list, costing O(expired) thanks to the deadline-sorted delayed
/// lists. In preemptive mode, dispatches the scheduler on the way out
/// so a woken higher-priority task preempts the interrupted one.
pub fn tick_interrupt() {
    let restore = unsafe { sync::enter() };
    let k = unsafe { kernel() };
    k.sched_lock_depth += 1;

    k.tick = k.tick.wrapping_add(1);
    if k.tick == 0 {
        // The counter wrapped: deadlines parked in the overflow epoch
        // are current now.
        k.delayed_current ^= 1;
    }

    loop {
        let list = &mut k.tasks_delayed[k.delayed_current];
        if list.is_empty() {
            break;
        }
        let node = list.first();
        let id = unsafe { (*node).owner() };
        if k.tasks[id.0].wake_tick > k.tick {
            break;
        }
        unsafe { k.make_ready(id) };
        trace!("task {} wake deadline expired", id.0);
    }

    k.sched_lock_depth -= 1;
    let dispatch = k.sched_lock_depth == 0;
    unsafe { sync::exit(restore) };

    if dispatch && KERNEL_MODE == KernelMode::Preemptive {
        sched();
    }
}

/// Tick count since [`init`]. Wraps.
pub fn get_tick() -> Tick {
    sync::critical_section(|| unsafe { kernel().tick })
}

/// The currently running task, `None` when idle.
pub fn get_current_task() -> Option<TaskId> {
    sync::critical_section(|| unsafe { kernel().current_task })
}

/// Move a task to the suspended list. `None` suspends the current task.
///
/// A running task keeps executing until its function returns; the
/// suspension only takes it out of the scheduler's view. Any in-flight
/// pend is cancelled.
pub fn suspend(task: Option<TaskId>) {
    sync::critical_section(|| unsafe {
        let k = kernel();
        let id = match task.or(k.current_task) {
            Some(id) => id,
            None => panic!("suspend(): no task to suspend"),
        };
        let t: *mut Task = &mut k.tasks[id.0];
        let ev: *mut Node = &mut (*t).event_node;
        if (*ev).is_attached() {
            List::remove(ev);
        }
        let sn: *mut Node = &mut (*t).sched_node;
        if (*sn).is_attached() {
            List::remove(sn);
        }
        k.tasks_suspended.insert_first(sn);
        trace!("task {} suspended", id.0);
    });
}

/// Make a task ready again. No-op if it already sits on its priority's
/// ready list. In preemptive mode a resumed higher-priority task runs
/// before this returns.
pub fn resume(task: TaskId) {
    sched_lock();
    sync::critical_section(|| unsafe {
        let k = kernel();
        let t: *mut Task = &mut k.tasks[task.0];
        debug_assert!((*t).active);
        let priority = (*t).priority as usize;
        let ready: *mut List = &mut k.tasks_ready[priority];
        let sn: *mut Node = &mut (*t).sched_node;
        if !(*sn).is_on(ready) {
            let ev: *mut Node = &mut (*t).event_node;
            if (*ev).is_attached() {
                List::remove(ev);
            }
            if (*sn).is_attached() {
                List::remove(sn);
            }
            (*ready).insert_last(sn);
            trace!("task {} resumed", task.0);
        }
    });
    sched_unlock();
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_util {
    extern crate std;
    use std::sync::{Mutex, MutexGuard};

    static SERIAL: Mutex<()> = Mutex::new(());

    /// Kernel state is process-global; tests that touch it hold this
    /// guard and start from a freshly initialized kernel.
    pub(crate) fn fresh_kernel() -> MutexGuard<'static, ()> {
        let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        super::init();
        guard
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    extern crate std;
    use std::boxed::Box;
    use std::sync::Mutex as StdMutex;
    use std::vec::Vec;

    use super::test_util::fresh_kernel;
    use super::*;

    /// Dispatch-order log shared with task bodies through the opaque
    /// task parameter.
    #[derive(Default)]
    struct RunLog {
        entries: StdMutex<Vec<&'static str>>,
    }

    impl RunLog {
        fn leak() -> &'static RunLog {
            Box::leak(Box::new(RunLog::default()))
        }

        fn push(&self, entry: &'static str) {
            self.entries.lock().unwrap().push(entry);
        }

        fn snapshot(&self) -> Vec<&'static str> {
            self.entries.lock().unwrap().clone()
        }

        fn param(&'static self) -> TaskParameter {
            self as *const RunLog as *mut ()
        }

        fn from_param(param: TaskParameter) -> &'static RunLog {
            unsafe { &*(param as *const RunLog) }
        }
    }

    fn run_once_low(param: TaskParameter) {
        RunLog::from_param(param).push("low");
        suspend(None);
    }

    fn run_once_high(param: TaskParameter) {
        RunLog::from_param(param).push("high");
        suspend(None);
    }

    fn keep_running_a(param: TaskParameter) {
        RunLog::from_param(param).push("a");
    }

    fn keep_running_b(param: TaskParameter) {
        RunLog::from_param(param).push("b");
    }

    #[test]
    fn higher_priority_dispatches_first() {
        let _guard = fresh_kernel();
        let log = RunLog::leak();
        create_task(0, run_once_low, log.param()).unwrap();
        create_task(1, run_once_high, log.param()).unwrap();

        sched();
        assert_eq!(log.snapshot(), ["high"]);
        sched();
        assert_eq!(log.snapshot(), ["high", "low"]);
        // Both suspended themselves; nothing left to run.
        sched();
        assert_eq!(log.snapshot(), ["high", "low"]);
    }

    #[test]
    fn equal_priority_round_robins() {
        let _guard = fresh_kernel();
        let log = RunLog::leak();
        create_task(0, keep_running_a, log.param()).unwrap();
        create_task(0, keep_running_b, log.param()).unwrap();

        sched();
        sched();
        sched();
        sched();
        assert_eq!(log.snapshot(), ["a", "b", "a", "b"]);
    }

    // In preemptive mode `resume`/`sched_unlock` dispatch immediately,
    // so the call-by-call assertions below hold only cooperatively.
    #[cfg(not(feature = "preemptive"))]
    #[test]
    fn suspend_and_resume_control_dispatch() {
        let _guard = fresh_kernel();
        let log = RunLog::leak();
        let task = create_task(0, keep_running_a, log.param()).unwrap();

        suspend(Some(task));
        sched();
        assert_eq!(log.snapshot(), [] as [&str; 0]);

        resume(task);
        sched();
        assert_eq!(log.snapshot(), ["a"]);
    }

    #[cfg(not(feature = "preemptive"))]
    #[test]
    fn resume_of_ready_task_keeps_queue_position() {
        let _guard = fresh_kernel();
        let log = RunLog::leak();
        create_task(0, keep_running_a, log.param()).unwrap();
        let task_b = create_task(0, keep_running_b, log.param()).unwrap();

        // b is already ready; resuming must not move it ahead of a.
        resume(task_b);
        sched();
        assert_eq!(log.snapshot(), ["a"]);
    }

    fn nested_sched_low(param: TaskParameter) {
        let log = RunLog::from_param(param);
        log.push("low-start");
        create_task(1, run_once_high, log.param()).unwrap();
        sched();
        log.push("low-end");
        suspend(None);
    }

    #[cfg(not(feature = "preemptive"))]
    #[test]
    fn cooperative_sched_does_not_nest() {
        let _guard = fresh_kernel();
        let log = RunLog::leak();
        create_task(0, nested_sched_low, log.param()).unwrap();

        sched();
        assert_eq!(log.snapshot(), ["low-start", "low-end"]);
        // The task created mid-run is dispatched by the next call.
        sched();
        assert_eq!(log.snapshot(), ["low-start", "low-end", "high"]);
    }

    #[cfg(feature = "preemptive")]
    #[test]
    fn preemptive_sched_nests_on_higher_priority() {
        let _guard = fresh_kernel();
        let log = RunLog::leak();
        create_task(0, nested_sched_low, log.param()).unwrap();

        sched();
        assert_eq!(log.snapshot(), ["low-start", "high", "low-end"]);
    }

    #[cfg(not(feature = "preemptive"))]
    #[test]
    fn sched_lock_defers_dispatch() {
        let _guard = fresh_kernel();
        let log = RunLog::leak();
        create_task(0, keep_running_a, log.param()).unwrap();

        sched_lock();
        sched();
        assert_eq!(log.snapshot(), [] as [&str; 0]);
        sched_unlock();

        sched();
        assert_eq!(log.snapshot(), ["a"]);
    }

    fn record_current(param: TaskParameter) {
        let log = RunLog::from_param(param);
        match get_current_task() {
            Some(TaskId(0)) => log.push("current-is-first-slot"),
            _ => log.push("unexpected"),
        }
        suspend(None);
    }

    #[test]
    fn current_task_visible_only_while_running() {
        let _guard = fresh_kernel();
        let log = RunLog::leak();
        assert_eq!(get_current_task(), None);
        create_task(0, record_current, log.param()).unwrap();
        sched();
        assert_eq!(log.snapshot(), ["current-is-first-slot"]);
        assert_eq!(get_current_task(), None);
    }

    #[test]
    fn tick_interrupt_advances_tick() {
        let _guard = fresh_kernel();
        assert_eq!(get_tick(), 0);
        tick_interrupt();
        tick_interrupt();
        tick_interrupt();
        assert_eq!(get_tick(), 3);
    }

    #[test]
    fn create_task_fails_when_slots_exhausted() {
        let _guard = fresh_kernel();
        for _ in 0..MAX_TASKS {
            create_task(0, keep_running_a, core::ptr::null_mut()).unwrap();
        }
        assert_eq!(
            create_task(0, keep_running_a, core::ptr::null_mut()),
            Err(())
        );
    }

    #[test]
    #[should_panic(expected = "invalid priority")]
    fn create_task_rejects_out_of_range_priority() {
        let _guard = fresh_kernel();
        let _ = create_task(HIGH_PRIORITY + 1, keep_running_a, core::ptr::null_mut());
    }
}
