//! tickos - a preemptive real-time kernel for single-core targets
//!
//! A real-time operating system kernel providing:
//! - Priority-based preemptive scheduling with round-robin among equals
//! - Counting semaphores, priority-inheriting mutexes and wait queues
//! - Delta-list timers driven by a periodic tick
//! - Context switching for ARM Cortex-M, and a hosted port that runs every
//!   task on a host thread for testing

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(not(target_arch = "arm"))]
extern crate std;

#[cfg(not(target_arch = "arm"))]
#[doc(hidden)]
pub use ::log as __log;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
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
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use self::core::config;
pub use self::core::config::*;
pub use self::core::critical;
pub use self::core::error;
pub use self::core::error::{Fatal, OsError, OsResult};
pub use self::core::kernel;
pub use self::core::kernel::{IdleHook, Kernel};
pub use self::core::prio;
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::task;
pub use self::core::task::{Task, TaskEntry};
pub use self::core::sched;
pub use self::core::time;
pub use self::core::time::{Timer, TimerProc};

#[cfg(feature = "sem")]
pub use sync::sem::{self, Semaphore};
#[cfg(feature = "mutex")]
pub use sync::mutex::{self, Mutex};
#[cfg(feature = "waitqueue")]
pub use sync::waitqueue::{self, WaitPrepared, WaitQueue};
