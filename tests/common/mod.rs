//! Harness shared by the kernel scenario tests
//!
//! Every test builds its own [`Kernel`] on the hosted port. Kernel objects,
//! tasks and task bodies are leaked to get the `'static` lifetimes the
//! kernel requires. Simulated time only advances while the idle task runs,
//! so timeouts are observed to the exact tick.

#![allow(dead_code)]

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tickos::{Kernel, Prio, StackWord, Task, TaskEntry, CFG_STK_SIZE_MIN};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

pub fn kernel() -> &'static Kernel {
    init_logger();
    leak(Kernel::new())
}

pub fn task() -> &'static Task {
    leak(Task::new())
}

pub fn stack() -> &'static mut [StackWord] {
    Box::leak(vec![0; CFG_STK_SIZE_MIN].into_boxed_slice())
}

pub fn entry(body: impl Fn() -> i32 + Sync + 'static) -> TaskEntry {
    Box::leak(Box::new(body))
}

/// Create a task running `body` at `prio`
pub fn spawn(kernel: &'static Kernel, prio: Prio, body: impl Fn() -> i32 + Sync + 'static) -> &'static Task {
    let task = task();
    kernel.task_create(task, prio, stack(), entry(body));
    task
}

/// Idle hook: one tick interrupt per idle pass
pub fn tick_on_idle(kernel: &Kernel) {
    kernel.isr(|| kernel.tick());
}

/// Start `kernel` and return once every task has terminated
pub fn run(kernel: &'static Kernel, init: impl FnOnce(&'static Kernel)) {
    kernel.start(init, Some(tick_on_idle));
}

/// Ordered record of events observed by tasks
#[derive(Clone, Default)]
pub struct Trace(Arc<StdMutex<Vec<String>>>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
