//! Single-core Cortex-M critical section: disable interrupts via
//! PRIMASK, restoring the previous state on release so sections nest.

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{set_impl, Impl, RawRestoreState};

struct SingleCoreCriticalSection;
set_impl!(SingleCoreCriticalSection);

unsafe impl Impl for SingleCoreCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let was_active = primask::read().is_active();
        interrupt::disable();
        was_active
    }

    unsafe fn release(was_active: RawRestoreState) {
        if was_active {
            interrupt::enable()
        }
    }
}
