//! # MonOS — Mono-stack Operating System
//!
//! A portable single-stack real-time operating system kernel for
//! microcontrollers.
//!
//! ## Overview
//!
//! MonOS multiplexes a fixed set of tasks over a single hardware stack.
//! Tasks are plain functions that run to completion every time the
//! scheduler dispatches them — there is no per-task stack, no context
//! switch, and no heap. Blocking primitives (a bounded byte queue and a
//! binary mutex) let tasks park on wait lists with a tick-based timeout;
//! a "blocked" task simply is not dispatched again until its event fires
//! or its deadline passes.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Application Tasks                     │
//! ├────────────────────────────────────────────────────────┤
//! │              Kernel API (kernel.rs)                    │
//! │  init · create_task · sched · tick_interrupt ·         │
//! │  suspend · resume · sched_lock/unlock                  │
//! ├───────────────┬───────────────────┬────────────────────┤
//! │  Queue        │  Mutex            │  Event wait lists  │
//! │  queue.rs     │  mutex.rs         │  event.rs          │
//! │  ─ two-phase  │  ─ lock/unlock    │  ─ pre_pend/pend   │
//! │    locking    │                   │  ─ unblock         │
//! ├───────────────┴───────────────────┴────────────────────┤
//! │           Intrusive lists + TCBs (list.rs, task.rs)    │
//! ├────────────────────────────────────────────────────────┤
//! │      Critical sections (sync.rs, critical-section)     │
//! ├────────────────────────────────────────────────────────┤
//! │          Port (arch/) — PRIMASK on bare-metal ARM      │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! Strict priority between levels, round robin within a level. In the
//! default cooperative mode a dispatched task runs to completion before
//! anything else runs. With the `preemptive` feature, the scheduler may
//! nest: the tick interrupt can run a freshly woken higher-priority
//! task on top of the interrupted one, on the same stack, and the
//! interrupted task resumes when it returns.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed TCB array**: `[Task; MAX_TASKS]` inside the kernel singleton
//! - **Intrusive lists**: ready/suspended/delayed/wait lists link nodes
//!   embedded in the TCBs — membership changes never allocate
//! - **Critical sections**: the `critical-section` facade; short,
//!   non-blocking, no data copies inside

#![no_std]

pub mod arch;
pub mod config;
mod event;
pub mod kernel;
mod list;
mod log;
pub mod mutex;
pub mod queue;
pub mod sync;
pub mod task;

pub use config::{KernelMode, Tick, HIGH_PRIORITY, KERNEL_MODE, LOW_PRIORITY, MAX_DELAY};
pub use kernel::{
    create_task, get_current_task, get_tick, init, resume, sched, sched_lock, sched_unlock,
    suspend, tick_interrupt,
};
pub use mutex::Mutex;
pub use queue::Queue;
pub use task::{TaskFunction, TaskId, TaskParameter};
