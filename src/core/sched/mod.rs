//! Scheduler core
//!
//! Decides which task owns the CPU. The running task is never a member of
//! any queue; every other live task is in exactly one (the ready queue, an
//! object's wait queue, or none while delayed or joining).

mod task_queue;

pub use task_queue::TaskQueue;

use core::ptr::NonNull;

use crate::critical::CriticalSection;
use crate::error::Fatal;
use crate::kernel::Kernel;
use crate::port::Port;
use crate::task::{tcb, TaskRef};
use crate::types::{BlockType, PendStatus, Prio, TaskState};

impl Kernel {
    /// Make `task` runnable.
    ///
    /// A task with an outstanding, unsignaled wait-queue prepare is put on
    /// that wait queue instead, so a wakeup issued before it calls `wait`
    /// still reaches it.
    pub(crate) fn make_ready(&self, cs: &CriticalSection<'_>, task: TaskRef) {
        let t = tcb(task, cs);
        t.state = TaskState::Ready;

        #[cfg(feature = "waitqueue")]
        if let Some(wq) = t.wait_queue {
            if !t.wait_signaled {
                crate::sync::waitqueue::park(cs, wq, task);
                return;
            }
        }

        self.sched.get(cs).ready.enqueue(cs, task);
    }

    /// Give the CPU to the most urgent ready task if the rules allow it.
    ///
    /// With `higher_only` a running task only yields to a strictly more
    /// urgent one, otherwise also to an equally urgent one. A task that is
    /// no longer running always yields. In interrupt context the request is
    /// recorded and carried out by [`Kernel::isr_exit`].
    pub(crate) fn schedule(&self, cs: &CriticalSection<'_>, higher_only: bool) {
        if !self.flags.is_running() {
            return;
        }

        let sched = self.sched.get(cs);
        if self.in_isr() {
            sched.isr_request = Some(sched.isr_request.map_or(higher_only, |h| h && higher_only));
            return;
        }
        if self.flags.sched_lock_nesting() > 0 {
            return;
        }

        let cur = self.current(cs);
        let cur_tcb = tcb(cur, cs);
        if cur_tcb.state == TaskState::Running {
            let Some(best) = sched.ready.peek_prio() else {
                return;
            };
            let preempt = if higher_only {
                best > cur_tcb.prio_current
            } else {
                best >= cur_tcb.prio_current
            };
            if !preempt {
                return;
            }
            self.make_ready(cs, cur);
        }

        let sched = self.sched.get(cs);
        let Some(next) = sched.ready.dequeue(cs) else {
            // idle is always ready when nothing else is
            self.halt(Fatal::SelfCheck)
        };
        tcb(next, cs).state = TaskState::Running;
        sched.current = Some(next);

        let exited = tcb(cur, cs).state == TaskState::Terminated;
        crate::trace!(
            "switch prio {} -> {}",
            tcb(cur, cs).prio_current,
            tcb(next, cs).prio_current
        );

        // SAFETY: tasks are 'static; we are inside a critical section
        unsafe { self.port.context_switch(cur.as_ref(), next.as_ref(), exited) };
    }

    /// Contract shared by every call that may block the caller. The
    /// scheduler lock is checked by `block_switch`, since the non-blocking
    /// paths of these calls are allowed while it is held.
    pub(crate) fn check_blocking(&self, cs: &CriticalSection<'_>) {
        crate::api_check!(self, !self.in_isr(), Fatal::IsrContext);
        crate::api_check!(self, !self.is_idle(self.current(cs)), Fatal::IdleBlock);
    }

    /// Block the current task and switch away.
    ///
    /// `queue` is the object queue to wait in, if any. Returns once the
    /// task has been made ready again and dispatched.
    pub(crate) fn block_switch(
        &self,
        cs: &CriticalSection<'_>,
        queue: Option<NonNull<TaskQueue>>,
        block_type: BlockType,
    ) {
        crate::api_check!(self, self.flags.sched_lock_nesting() == 0, Fatal::SchedLocked);
        let cur = self.current(cs);
        let t = tcb(cur, cs);
        t.state = TaskState::Wait;
        t.block_type = block_type;
        t.block_code = PendStatus::Ok;

        if let Some(queue) = queue {
            // SAFETY: object queues outlive the waits on them
            unsafe { &mut *queue.as_ptr() }.enqueue(cs, cur);
        }

        self.schedule(cs, false);

        tcb(cur, cs).block_type = BlockType::Nothing;
    }

    /// Change the effective priority of `task`, keeping its queue position
    /// consistent with the new level.
    pub(crate) fn reprio(&self, cs: &CriticalSection<'_>, task: TaskRef, prio: Prio) {
        match tcb(task, cs).queue {
            Some(queue) => {
                TaskQueue::unlink(cs, task);
                tcb(task, cs).prio_current = prio;
                // SAFETY: the queue held the task a moment ago
                unsafe { &mut *queue.as_ptr() }.enqueue(cs, task);
            }
            None => tcb(task, cs).prio_current = prio,
        }
    }

    /// Offer the CPU to another ready task of equal or higher priority
    pub fn yield_now(&self) {
        crate::api_check!(self, !self.in_isr(), Fatal::IsrContext);
        self.critical_section(|cs| self.schedule(cs, false));
    }
}
