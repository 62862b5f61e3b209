//! Hosted port
//!
//! Every task runs on its own host thread. A task thread only makes
//! progress while it holds its baton, and a context switch hands the baton
//! from one thread to the next, so exactly one task thread runs at a time.
//! Interrupts are simulated: [`Kernel::isr`] called from a task thread is an
//! interrupt taken by that task, and a critical section is a per-thread
//! nesting count (each task carries its own mask state, as a CPU context
//! would).

use std::any::Any;
use std::boxed::Box;
use std::cell::Cell;
use std::format;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;

use super::Port;
use crate::error::Fatal;
use crate::kernel::Kernel;
use crate::task::Task;
use crate::types::StackWord;

std::thread_local! {
    static CS_NESTING: Cell<usize> = const { Cell::new(0) };
}

/// Binary semaphore parking one host thread
struct Baton {
    held: Mutex<bool>,
    cond: Condvar,
}

impl Baton {
    const fn new() -> Self {
        Baton {
            held: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn give(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = true;
        self.cond.notify_one();
    }

    fn take(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while !*held {
            held = self.cond.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
        *held = false;
    }

    fn reset(&self) {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }
}

/// Per-task CPU context: the baton of the task's thread
pub struct TaskContext {
    baton: Baton,
}

impl TaskContext {
    pub const fn new() -> Self {
        TaskContext { baton: Baton::new() }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

type Failure = Box<dyn Any + Send>;

pub struct Hosted {
    /// Held by the thread that called [`Kernel::start`]
    boot: Baton,
    /// Panic payload of a task thread, re-raised on the boot thread
    failure: Mutex<Option<Failure>>,
}

impl Hosted {
    pub const fn new() -> Self {
        Hosted {
            boot: Baton::new(),
            failure: Mutex::new(None),
        }
    }

    /// A task thread panicked: wake the boot thread to report it
    fn fail(&self, payload: Failure) {
        crate::warn!("task thread panicked, stopping the kernel");
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(payload);
        }
        drop(failure);
        self.boot.give();
    }
}

impl Default for Hosted {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for Hosted {
    type CriticalState = ();

    #[inline]
    fn critical_enter(&self) -> Self::CriticalState {
        CS_NESTING.with(|n| n.set(n.get() + 1));
    }

    #[inline]
    unsafe fn critical_exit(&self, _state: Self::CriticalState) {
        CS_NESTING.with(|n| n.set(n.get().saturating_sub(1)));
    }

    #[inline]
    fn is_critical(&self) -> bool {
        CS_NESTING.with(|n| n.get() > 0)
    }

    unsafe fn task_init(&self, kernel: &'static Kernel, task: &'static Task, _stack: &'static mut [StackWord]) {
        task.ctx.baton.reset();

        let spawned = thread::Builder::new()
            .name(format!("task@{:p}", task))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    task.ctx.baton.take();
                    kernel.task_run(task);
                }));
                if let Err(payload) = result {
                    kernel.port.fail(payload);
                }
            });

        if spawned.is_err() {
            kernel.halt(Fatal::Port);
        }
    }

    unsafe fn start_first(&self, first: &'static Task) {
        first.ctx.baton.give();
        self.boot.take();

        let failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(payload) = failure {
            panic::resume_unwind(payload);
        }
    }

    unsafe fn context_switch(&self, from: &'static Task, to: &'static Task, from_exited: bool) {
        to.ctx.baton.give();
        if !from_exited {
            from.ctx.baton.take();
        }
    }

    fn idle(&self) {
        thread::yield_now();
    }

    fn quiescent(&self) {
        self.boot.give();
        loop {
            thread::park();
        }
    }

    fn halt(&self, reason: Fatal) -> ! {
        panic!("kernel halted: {}", reason)
    }
}
