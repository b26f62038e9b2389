//! # Port Layer
//!
//! Platform glue the kernel consumes through the `critical-section`
//! facade. Bare-metal ARM targets get a PRIMASK-based single-core
//! implementation here; hosted builds (tests) rely on the
//! `critical-section/std` implementation supplied by the dev-dependency.
//!
//! Wiring the tick source is the platform's job: the timer interrupt
//! handler calls `kernel::tick_interrupt()` on every period, after
//! `kernel::init()` has run.

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod cortex_m;
