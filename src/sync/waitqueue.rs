//! Wait queue with lost-wakeup-free prepare/wait protocol
//!
//! A task first announces interest with [`WaitQueue::prepare`], then checks
//! its condition, and finally either gives up with
//! [`WaitPrepared::break_`] or sleeps with [`WaitPrepared::wait`]. A wakeup
//! issued anywhere between prepare and wait is remembered, so `wait`
//! returns at once instead of sleeping through it.
//!
//! ```ignore
//! loop {
//!     let prepared = WQ.prepare(&KERNEL);
//!     if condition() {
//!         prepared.break_();
//!         break;
//!     }
//!     prepared.wait(TIMEOUT_INFINITE)?;
//! }
//! ```

use core::ptr::NonNull;

use crate::config::{TIMEOUT_TRY, WAITQUEUE_ALL};
use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;
use crate::error::{Fatal, OsError, OsResult};
use crate::kernel::Kernel;
use crate::sched::TaskQueue;
use crate::task::{tcb, TaskRef};
use crate::time::Timer;
use crate::types::{BlockType, PendStatus, Ticks};

pub(crate) struct WaitQueueCb {
    waiters: TaskQueue,
    destroyed: bool,
}

impl WaitQueueCb {
    const fn new() -> Self {
        WaitQueueCb {
            waiters: TaskQueue::new(),
            destroyed: false,
        }
    }
}

/// Queue a preempted, prepared task on its wait queue
pub(crate) fn park(cs: &CriticalSection<'_>, wq: NonNull<WaitQueueCb>, task: TaskRef) {
    // SAFETY: a prepare keeps the wait queue borrowed until wait or break_
    unsafe { &mut *wq.as_ptr() }.waiters.enqueue(cs, task);
}

pub struct WaitQueue {
    cb: CsCell<WaitQueueCb>,
}

/// Outstanding prepare on a [`WaitQueue`]
///
/// Must be consumed by [`wait`](Self::wait) or [`break_`](Self::break_).
/// Dropping it has the effect of `break_`.
#[must_use = "a prepare must be followed by wait or break_"]
pub struct WaitPrepared<'a> {
    kernel: &'a Kernel,
    queue: &'a WaitQueue,
}

impl WaitQueue {
    pub const fn new() -> Self {
        WaitQueue {
            cb: CsCell::new(WaitQueueCb::new()),
        }
    }

    /// (Re)initialize, also reviving a destroyed queue
    pub fn create(&self, kernel: &Kernel) {
        kernel.critical_section(|cs| {
            let cb = self.cb.get(cs);
            crate::self_check!(kernel, cb.waiters.is_empty());
            *cb = WaitQueueCb::new();
        });
    }

    fn link(&self, cs: &CriticalSection<'_>) -> NonNull<WaitQueueCb> {
        NonNull::from(&mut *self.cb.get(cs))
    }

    /// Announce that the calling task is about to wait on this queue.
    pub fn prepare<'a>(&'a self, kernel: &'a Kernel) -> WaitPrepared<'a> {
        crate::api_check!(kernel, !kernel.in_isr(), Fatal::IsrContext);
        kernel.critical_section(|cs| {
            crate::api_check!(kernel, !self.cb.get(cs).destroyed, Fatal::WaitQueueDestroyed);
            let cur = kernel.current(cs);
            let t = tcb(cur, cs);
            crate::api_check!(kernel, t.wait_queue.is_none(), Fatal::WaitQueuePrepared);
            crate::api_check!(kernel, !t.owns_mutex(), Fatal::MutexHeld);

            t.wait_queue = Some(self.link(cs));
            t.wait_signaled = false;
            t.block_code = PendStatus::Ok;
        });
        WaitPrepared { kernel, queue: self }
    }

    /// Wake up to `n` waiters (`WAITQUEUE_ALL` for every one), most urgent
    /// first.
    ///
    /// From interrupt context, a task interrupted between its prepare on
    /// this queue and its wait counts as one of the `n`.
    pub fn wakeup(&self, kernel: &Kernel, n: usize) {
        let in_isr = kernel.in_isr();
        kernel.critical_section(|cs| {
            let me = self.link(cs);
            let mut remaining = n;

            let cur = kernel.current(cs);
            let t = tcb(cur, cs);
            if in_isr {
                if remaining > 0 && t.wait_queue == Some(me) && !t.wait_signaled {
                    t.wait_signaled = true;
                    t.block_code = PendStatus::Ok;
                    remaining -= 1;
                }
            } else {
                crate::api_check!(kernel, t.wait_queue.is_none(), Fatal::WaitQueuePrepared);
            }

            while remaining > 0 {
                let Some(task) = self.cb.get(cs).waiters.dequeue(cs) else {
                    break;
                };
                signal(kernel, cs, task, PendStatus::Ok);
                if n != WAITQUEUE_ALL {
                    remaining -= 1;
                }
            }

            kernel.schedule(cs, true);
        });
    }

    /// Wake every waiter with `Destroyed`. Further prepares are fatal until
    /// the queue is created again.
    pub fn destroy(&self, kernel: &Kernel) {
        crate::api_check!(kernel, !kernel.in_isr(), Fatal::IsrContext);
        kernel.critical_section(|cs| {
            let cur = kernel.current(cs);
            crate::api_check!(kernel, !tcb(cur, cs).is_prepared(), Fatal::WaitQueuePrepared);

            let cb = self.cb.get(cs);
            while let Some(task) = cb.waiters.dequeue(cs) {
                signal(kernel, cs, task, PendStatus::Destroyed);
            }
            cb.destroyed = true;

            kernel.schedule(cs, true);
        });
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitPrepared<'_> {
    /// Sleep until woken, for at most `timeout` ticks.
    ///
    /// Returns at once if a wakeup already arrived after the prepare.
    ///
    /// # Returns
    /// * `Ok(())` - Woken up
    /// * `Err(OsError::WouldBlock)` - `timeout` was `TIMEOUT_TRY` and no wakeup had arrived
    /// * `Err(OsError::Timeout)` - Timeout expired
    /// * `Err(OsError::Destroyed)` - Queue destroyed
    pub fn wait(self, timeout: Ticks) -> OsResult<()> {
        let (kernel, queue) = (self.kernel, self.queue);
        core::mem::forget(self);
        crate::api_check!(kernel, !kernel.in_isr(), Fatal::IsrContext);

        let timer = Timer::new();
        kernel.critical_section(|cs| {
            let cur = kernel.current(cs);
            let t = tcb(cur, cs);
            crate::api_check!(kernel, t.wait_queue == Some(queue.link(cs)), Fatal::WaitQueueNotPrepared);

            let result = if t.wait_signaled {
                t.block_code.into_result()
            } else if timeout == TIMEOUT_TRY {
                Err(OsError::WouldBlock)
            } else {
                kernel.check_blocking(cs);
                let waiters = NonNull::from(&mut queue.cb.get(cs).waiters);
                let guard = kernel.blocktimer_arm(cs, &timer, timeout);
                kernel.block_switch(cs, Some(waiters), BlockType::WaitQueue);
                drop(guard);
                tcb(cur, cs).block_code.into_result()
            };

            finish(cs, cur);
            result
        })
    }

    /// Give up the prepare without sleeping
    pub fn break_(self) {
        let kernel = self.kernel;
        core::mem::forget(self);
        kernel.critical_section(|cs| {
            let cur = kernel.current(cs);
            crate::api_check!(kernel, tcb(cur, cs).is_prepared(), Fatal::WaitQueueNotPrepared);
            finish(cs, cur);
        });
    }
}

impl Drop for WaitPrepared<'_> {
    fn drop(&mut self) {
        let kernel = self.kernel;
        kernel.critical_section(|cs| finish(cs, kernel.current(cs)));
    }
}

fn finish(cs: &CriticalSection<'_>, task: TaskRef) {
    let t = tcb(task, cs);
    t.wait_queue = None;
    t.wait_signaled = false;
}

/// Deliver a wakeup to a dequeued waiter
fn signal(kernel: &Kernel, cs: &CriticalSection<'_>, task: TaskRef, code: PendStatus) {
    kernel.blocktimer_cancel(cs, task);
    let t = tcb(task, cs);
    t.block_code = code;
    t.wait_signaled = true;
    kernel.make_ready(cs, task);
}
