//! Task management module
//!
//! Provides task creation, termination and joining.

mod tcb;

pub use tcb::{Task, TaskEntry};
pub(crate) use tcb::{tcb, Entry, TaskRef};

use crate::config::{CFG_PRIO_CNT, CFG_PRIO_IDLE, CFG_STK_SIZE_MIN};
use crate::error::Fatal;
use crate::kernel::Kernel;
use crate::port::Port;
use crate::types::{BlockType, PendStatus, Prio, StackWord, TaskState};

impl Kernel {
    /// Create a task
    ///
    /// # Arguments
    /// * `task` - Task object, unused or already joined
    /// * `prio` - Priority in `1..CFG_PRIO_CNT`
    /// * `stack` - Stack of at least `CFG_STK_SIZE_MIN` words
    /// * `entry` - Task body; its return value terminates the task
    ///
    /// The task becomes ready at once and preempts the caller if it is
    /// more urgent.
    pub fn task_create(
        &'static self,
        task: &'static Task,
        prio: Prio,
        stack: &'static mut [StackWord],
        entry: TaskEntry,
    ) {
        crate::api_check!(self, !self.in_isr(), Fatal::IsrContext);
        crate::api_check!(
            self,
            prio != CFG_PRIO_IDLE && (prio as usize) < CFG_PRIO_CNT,
            Fatal::PrioInvalid
        );
        self.task_spawn(task, prio, stack, Entry::App(entry));
    }

    pub(crate) fn task_spawn(
        &'static self,
        task: &'static Task,
        prio: Prio,
        stack: &'static mut [StackWord],
        entry: Entry,
    ) {
        crate::api_check!(self, stack.len() >= CFG_STK_SIZE_MIN, Fatal::StackTooSmall);

        self.critical_section(|cs| {
            let t = task.tcb.get(cs);
            crate::api_check!(self, t.state == TaskState::Unused, Fatal::TaskBusy);
            t.init(prio, entry);

            // SAFETY: the task is unused, so no CPU context refers to it
            unsafe { self.port.task_init(self, task, stack) };

            if matches!(entry, Entry::App(_)) {
                self.flags.live_inc();
            }
            crate::debug!("task created, prio {}", prio);

            self.make_ready(cs, task.link());
            self.schedule(cs, true);
        });
    }

    /// Wait for `task` to terminate and return its exit value.
    ///
    /// Afterwards the task object is unused and may be created again.
    pub fn task_join(&self, task: &'static Task) -> i32 {
        self.critical_section(|cs| {
            self.check_blocking(cs);
            let cur = self.current(cs);
            crate::api_check!(self, cur != task.link(), Fatal::JoinSelf);
            crate::api_check!(self, !tcb(cur, cs).is_prepared(), Fatal::WaitQueuePrepared);

            let t = task.tcb.get(cs);
            crate::api_check!(self, t.state != TaskState::Unused, Fatal::TaskInvalid);
            if t.state != TaskState::Terminated {
                crate::api_check!(self, t.joiner.is_none(), Fatal::JoinBusy);
                t.joiner = Some(cur);
                self.block_switch(cs, None, BlockType::Join);
            }

            let t = task.tcb.get(cs);
            t.state = TaskState::Unused;
            t.ret_value
        })
    }

    /// Body of every task, entered by the port on first dispatch
    pub(crate) fn task_run(&'static self, task: &'static Task) {
        let entry = self.critical_section(|cs| task.tcb.get(cs).entry);
        match entry {
            Some(Entry::App(body)) => {
                let ret = body();
                self.task_exit(task, ret);
            }
            Some(Entry::Idle) => self.idle_loop(),
            None => self.halt(Fatal::SelfCheck),
        }
    }

    fn task_exit(&self, task: &'static Task, ret: i32) {
        self.critical_section(|cs| {
            let t = task.tcb.get(cs);
            crate::api_check!(self, !t.owns_mutex(), Fatal::MutexHeld);
            crate::api_check!(self, !t.is_prepared(), Fatal::WaitQueuePrepared);

            t.ret_value = ret;
            t.state = TaskState::Terminated;
            let joiner = t.joiner.take();
            self.flags.live_dec();
            crate::debug!("task exited with {}", ret);

            if let Some(joiner) = joiner {
                tcb(joiner, cs).block_code = PendStatus::Ok;
                self.make_ready(cs, joiner);
            }
            // never returns here on hardware
            self.schedule(cs, false);
        });
    }
}
