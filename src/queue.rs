//! # Queue
//!
//! Bounded circular queue of fixed-size items with data copies performed
//! outside the critical section.
//!
//! ## Two-phase protocol
//!
//! A successful write first *reserves* its slot under the critical
//! section: capture the tail position, advance the tail, decrement
//! `free`, and take a ticket from the `w_lock` in-flight counter. The
//! byte copy then runs with interrupts enabled — an interrupting writer
//! reserves the next slot and cannot touch this one. On completion the
//! ticket decides who *publishes*: the first reserver of the in-flight
//! batch moves the whole `w_lock` count into `used`. Nested writers
//! finish before the task they interrupted resumes, so by the time the
//! first reserver commits, every later reservation has already been
//! copied. Readers mirror the scheme with `used`, `r_lock` and the head
//! pointer.
//!
//! Readers therefore never observe a partially written slot, and items
//! dequeue in reservation order — the order of successful `write`
//! calls. At every critical-section boundary
//! `used + free + w_lock + r_lock == capacity`.
//!
//! ## Blocking
//!
//! The `_pend` variants retry nothing themselves: they perform the
//! non-blocking operation once, and on failure park the calling task on
//! the queue's wait list. The task's next invocation calls again.

use core::cell::UnsafeCell;
use core::ptr;

use crate::config::Tick;
use crate::event::{self, EventRw};
use crate::kernel::{self, kernel};
use crate::log::trace;
use crate::sync;

/// Bounded multi-task byte queue. See the module docs for the locking
/// protocol.
pub struct Queue {
    inner: UnsafeCell<Inner>,
}

struct Inner {
    buff: *mut u8,
    /// Buffer length in bytes; head/tail wrap here.
    end: usize,
    /// Read position (byte offset).
    head: usize,
    /// Write position (byte offset).
    tail: usize,
    item_size: usize,
    /// Slots available to writers.
    free: usize,
    /// Items available to readers.
    used: usize,
    /// Writes in flight (reserved, not yet published).
    w_lock: usize,
    /// Reads in flight.
    r_lock: usize,
    event: EventRw,
}

// Safety: all state mutations happen inside the critical section; the
// buffer copies outside it touch only slots reserved to exactly one
// operation at a time.
unsafe impl Send for Queue {}
unsafe impl Sync for Queue {}

impl Queue {
    /// An unwired queue; [`Queue::init`] must run before use.
    pub const fn new() -> Self {
        Queue {
            inner: UnsafeCell::new(Inner {
                buff: ptr::null_mut(),
                end: 0,
                head: 0,
                tail: 0,
                item_size: 0,
                free: 0,
                used: 0,
                w_lock: 0,
                r_lock: 0,
                event: EventRw::new(),
            }),
        }
    }

    /// Bind the queue to its storage. Capacity is
    /// `buffer.len() / item_size` items.
    ///
    /// # Safety
    ///
    /// `buffer` must outlive the queue, and the queue must not move
    /// after this call: pended tasks and wait-list sentinels point into
    /// it.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` does not hold a whole number of items.
    pub unsafe fn init(&self, buffer: &mut [u8], item_size: usize) {
        assert!(
            item_size > 0 && buffer.len() % item_size == 0,
            "queue_init(): buffer is not a whole number of items"
        );
        sync::critical_section(|| unsafe {
            let q = &mut *self.inner.get();
            q.buff = buffer.as_mut_ptr();
            q.end = buffer.len();
            q.head = 0;
            q.tail = 0;
            q.item_size = item_size;
            q.free = buffer.len() / item_size;
            q.used = 0;
            q.w_lock = 0;
            q.r_lock = 0;
            q.event.init();
        });
        trace!("queue initialized: {} items of {} bytes", self.length(), item_size);
    }

    /// Pop the front item into `buf`. Fails when the queue is empty.
    /// Wakes one task waiting to write.
    pub fn read(&self, buf: &mut [u8]) -> bool {
        let restore = unsafe { sync::enter() };
        let q = unsafe { &mut *self.inner.get() };

        if q.used == 0 {
            unsafe { sync::exit(restore) };
            return false;
        }
        debug_assert!(buf.len() >= q.item_size);

        // Reserve the head slot.
        let pos = q.head;
        q.head += q.item_size;
        if q.head >= q.end {
            q.head = 0;
        }
        let my_lock = q.r_lock;
        q.r_lock += 1;
        q.used -= 1;

        kernel::sched_lock();
        unsafe { sync::exit(restore) };

        // Copy with interrupts enabled; the reservation protects the slot.
        unsafe { ptr::copy_nonoverlapping(q.buff.add(pos), buf.as_mut_ptr(), q.item_size) };

        // Deterministic concurrent-access point for tests.
        #[cfg(test)]
        test_interleave::fire();

        let restore = unsafe { sync::enter() };
        if my_lock == 0 {
            // First reserver publishes the whole in-flight batch.
            q.free += q.r_lock;
            q.r_lock = 0;
        }
        if q.event.list_write.length() != 0 {
            unsafe { event::unblock_tasks(&mut q.event.list_write) };
        }
        unsafe { sync::exit(restore) };
        kernel::sched_unlock();

        true
    }

    /// Push an item copied from `buf` onto the back. Fails when the
    /// queue is full. Wakes one task waiting to read.
    pub fn write(&self, buf: &[u8]) -> bool {
        let restore = unsafe { sync::enter() };
        let q = unsafe { &mut *self.inner.get() };

        if q.free == 0 {
            unsafe { sync::exit(restore) };
            return false;
        }
        debug_assert!(buf.len() >= q.item_size);

        // Reserve the tail slot.
        let pos = q.tail;
        q.tail += q.item_size;
        if q.tail >= q.end {
            q.tail = 0;
        }
        let my_lock = q.w_lock;
        q.w_lock += 1;
        q.free -= 1;

        kernel::sched_lock();
        unsafe { sync::exit(restore) };

        unsafe { ptr::copy_nonoverlapping(buf.as_ptr(), q.buff.add(pos), q.item_size) };

        // Deterministic concurrent-access point for tests.
        #[cfg(test)]
        test_interleave::fire();

        let restore = unsafe { sync::enter() };
        if my_lock == 0 {
            q.used += q.w_lock;
            q.w_lock = 0;
        }
        if q.event.list_read.length() != 0 {
            unsafe { event::unblock_tasks(&mut q.event.list_read) };
        }
        unsafe { sync::exit(restore) };
        kernel::sched_unlock();

        true
    }

    /// Non-blocking read; on failure, pend the calling task until the
    /// queue is written or the timeout expires. Returns the read
    /// result — a pended task retries when it is invoked again.
    pub fn read_pend(&self, buf: &mut [u8], ticks_to_wait: Tick) -> bool {
        let ok = self.read(buf);
        if !ok {
            self.pend_read(ticks_to_wait);
        }
        ok
    }

    /// Non-blocking write; on failure, pend the calling task until the
    /// queue is read or the timeout expires. Returns the write result.
    pub fn write_pend(&self, buf: &[u8], ticks_to_wait: Tick) -> bool {
        let ok = self.write(buf);
        if !ok {
            self.pend_write(ticks_to_wait);
        }
        ok
    }

    /// Park the calling task until the queue has data to read or the
    /// timeout expires. `MAX_DELAY` waits indefinitely; zero returns
    /// immediately. Task context only.
    pub fn pend_read(&self, ticks_to_wait: Tick) {
        if ticks_to_wait == 0 {
            return;
        }
        kernel::sched_lock();
        let restore = unsafe { sync::enter() };
        let q = unsafe { &mut *self.inner.get() };
        if q.used == 0 {
            let id = match unsafe { kernel() }.current_task {
                Some(id) => id,
                None => panic!("pend_read(): no running task"),
            };
            unsafe {
                event::pre_pend(&mut q.event.list_read, id);
                // Interrupts back on for the deadline arming; a wake in
                // the window is caught by `pend` finding the event node
                // already detached.
                sync::exit(restore);
                event::pend(&mut q.event.list_read, id, ticks_to_wait);
            }
        } else {
            unsafe { sync::exit(restore) };
        }
        kernel::sched_unlock();
    }

    /// Park the calling task until the queue has space to write or the
    /// timeout expires. `MAX_DELAY` waits indefinitely; zero returns
    /// immediately. Task context only.
    pub fn pend_write(&self, ticks_to_wait: Tick) {
        if ticks_to_wait == 0 {
            return;
        }
        kernel::sched_lock();
        let restore = unsafe { sync::enter() };
        let q = unsafe { &mut *self.inner.get() };
        if q.free == 0 {
            let id = match unsafe { kernel() }.current_task {
                Some(id) => id,
                None => panic!("pend_write(): no running task"),
            };
            unsafe {
                event::pre_pend(&mut q.event.list_write, id);
                sync::exit(restore);
                event::pend(&mut q.event.list_write, id, ticks_to_wait);
            }
        } else {
            unsafe { sync::exit(restore) };
        }
        kernel::sched_unlock();
    }

    /// Items available to readers.
    pub fn used(&self) -> usize {
        sync::critical_section(|| unsafe { (*self.inner.get()).used })
    }

    /// Slots available to writers.
    pub fn free(&self) -> usize {
        sync::critical_section(|| unsafe { (*self.inner.get()).free })
    }

    /// Total capacity in items, counting in-flight reservations.
    pub fn length(&self) -> usize {
        sync::critical_section(|| unsafe {
            let q = &*self.inner.get();
            q.free + q.used + q.w_lock + q.r_lock
        })
    }

    /// Size of each item in bytes. Constant after init.
    pub fn item_size(&self) -> usize {
        unsafe { (*self.inner.get()).item_size }
    }

    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Deterministic stand-in for an interrupt arriving between a queue
/// copy and its commit. The scheduler lock is held across the copy, so
/// only interrupt-context operations can overlap it; tests arm a
/// one-shot action here to create that overlap on demand.
#[cfg(test)]
mod test_interleave {
    extern crate std;
    use std::boxed::Box;
    use std::cell::RefCell;

    std::thread_local! {
        static HOOK: RefCell<Option<Box<dyn FnOnce()>>> = RefCell::new(None);
    }

    /// Arm a one-shot action for the next copy window on this thread.
    pub(super) fn arm(hook: Box<dyn FnOnce()>) {
        HOOK.with(|slot| *slot.borrow_mut() = Some(hook));
    }

    pub(super) fn fire() {
        let hook = HOOK.with(|slot| slot.borrow_mut().take());
        if let Some(hook) = hook {
            hook();
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
