//! Port layer - CPU-specific implementations
//!
//! The kernel reaches the processor only through [`Port`]. The
//! implementation is picked by target: `cortex_m4` on ARM, `hosted` (tasks
//! backed by host threads) everywhere else.

use crate::error::Fatal;
use crate::kernel::Kernel;
use crate::task::Task;
use crate::types::StackWord;

/// Architecture capabilities required by the kernel
pub trait Port: Sync {
    /// Interrupt mask state saved on critical-section entry
    type CriticalState: Copy;

    /// Mask interrupts, returning the previous state. Nestable.
    fn critical_enter(&self) -> Self::CriticalState;

    /// Restore the state returned by the matching `critical_enter`.
    ///
    /// # Safety
    /// Must pair with `critical_enter` in LIFO order.
    unsafe fn critical_exit(&self, state: Self::CriticalState);

    /// Interrupts are currently masked
    fn is_critical(&self) -> bool;

    /// Prepare `task` so that its first dispatch runs
    /// [`Kernel::task_run`] on `stack`.
    ///
    /// # Safety
    /// `task` must not be running or queued for a switch.
    unsafe fn task_init(&self, kernel: &'static Kernel, task: &'static Task, stack: &'static mut [StackWord]);

    /// Hand the CPU to the first task.
    ///
    /// # Safety
    /// Called once, outside any critical section.
    unsafe fn start_first(&self, first: &'static Task);

    /// Save the context of `from` and resume `to`. Returns when `from` is
    /// dispatched again. A `from` that has terminated is never resumed.
    ///
    /// # Safety
    /// Called inside a critical section with `to` already made current.
    unsafe fn context_switch(&self, from: &'static Task, to: &'static Task, from_exited: bool);

    /// Wait for the next interrupt (idle task body)
    fn idle(&self);

    /// Every application task has terminated
    fn quiescent(&self) {}

    /// Stop the system
    fn halt(&self, reason: Fatal) -> !;
}

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::{systick_init, CortexM4 as Arch, TaskContext};

#[cfg(not(target_arch = "arm"))]
pub mod hosted;

#[cfg(not(target_arch = "arm"))]
pub use hosted::{Hosted as Arch, TaskContext};
