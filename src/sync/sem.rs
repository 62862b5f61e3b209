//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.
//! Waiters are released most urgent first, FIFO within a priority.

use core::ptr::NonNull;

use crate::config::TIMEOUT_TRY;
use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;
use crate::error::{Fatal, OsError, OsResult};
use crate::kernel::Kernel;
use crate::sched::TaskQueue;
use crate::task::{tcb, TaskRef};
use crate::time::Timer;
use crate::types::{BlockType, PendStatus, SemCtr, Ticks};

pub(crate) struct SemCb {
    count: SemCtr,
    waiters: TaskQueue,
}

impl SemCb {
    const fn new(count: SemCtr) -> Self {
        SemCb {
            count,
            waiters: TaskQueue::new(),
        }
    }
}

pub struct Semaphore {
    cb: CsCell<SemCb>,
}

impl Semaphore {
    pub const fn new(count: SemCtr) -> Self {
        Semaphore {
            cb: CsCell::new(SemCb::new(count)),
        }
    }

    /// (Re)initialize with `count`. Nobody may be waiting.
    pub fn create(&self, kernel: &Kernel, count: SemCtr) {
        crate::api_check!(kernel, count < SemCtr::MAX, Fatal::SemInitInvalid);
        kernel.critical_section(|cs| {
            let cb = self.cb.get(cs);
            crate::self_check!(kernel, cb.waiters.is_empty());
            *cb = SemCb::new(count);
        });
    }

    /// Take one unit, waiting up to `timeout` ticks for it.
    ///
    /// # Returns
    /// * `Ok(())` - Unit taken
    /// * `Err(OsError::WouldBlock)` - `timeout` was `TIMEOUT_TRY` and the count was zero
    /// * `Err(OsError::Timeout)` - Timeout expired
    /// * `Err(OsError::Destroyed)` - Semaphore destroyed while waiting
    pub fn down(&self, kernel: &Kernel, timeout: Ticks) -> OsResult<()> {
        let timer = Timer::new();
        kernel.critical_section(|cs| {
            kernel.check_blocking(cs);
            let cur = kernel.current(cs);
            let t = tcb(cur, cs);
            crate::api_check!(kernel, !t.is_prepared(), Fatal::WaitQueuePrepared);
            crate::api_check!(kernel, !t.owns_mutex(), Fatal::MutexHeld);

            let cb = self.cb.get(cs);
            if cb.count > 0 {
                cb.count -= 1;
                return Ok(());
            }
            if timeout == TIMEOUT_TRY {
                return Err(OsError::WouldBlock);
            }

            let waiters = NonNull::from(&mut cb.waiters);
            let guard = kernel.blocktimer_arm(cs, &timer, timeout);
            kernel.block_switch(cs, Some(waiters), BlockType::Sem);
            drop(guard);

            tcb(cur, cs).block_code.into_result()
        })
    }

    /// Release one unit, waking the most urgent waiter if there is one.
    pub fn up(&self, kernel: &Kernel) {
        self.up_sync(kernel, false);
    }

    /// Release one unit.
    ///
    /// With `sync` the woken waiter is queued but the caller keeps the CPU
    /// until its next scheduling point. Not allowed from interrupt context.
    pub fn up_sync(&self, kernel: &Kernel, sync: bool) {
        let in_isr = kernel.in_isr();
        crate::api_check!(kernel, !(in_isr && sync), Fatal::IsrContext);

        kernel.critical_section(|cs| {
            if !in_isr {
                let cur = kernel.current(cs);
                crate::api_check!(kernel, !tcb(cur, cs).is_prepared(), Fatal::WaitQueuePrepared);
            }

            let cb = self.cb.get(cs);
            crate::api_check!(kernel, cb.count < SemCtr::MAX - 1, Fatal::SemOverflow);

            match cb.waiters.dequeue(cs) {
                Some(task) => {
                    wake(kernel, cs, task, PendStatus::Ok);
                    if !sync {
                        kernel.schedule(cs, true);
                    }
                }
                None => cb.count += 1,
            }
        });
    }

    /// Wake every waiter with `Destroyed` and reset the count to zero.
    pub fn destroy(&self, kernel: &Kernel) {
        crate::api_check!(kernel, !kernel.in_isr(), Fatal::IsrContext);

        kernel.critical_section(|cs| {
            let cur = kernel.current(cs);
            crate::api_check!(kernel, !tcb(cur, cs).is_prepared(), Fatal::WaitQueuePrepared);

            let cb = self.cb.get(cs);
            while let Some(task) = cb.waiters.dequeue(cs) {
                wake(kernel, cs, task, PendStatus::Destroyed);
            }
            *cb = SemCb::new(0);

            kernel.schedule(cs, true);
        });
    }

    #[inline]
    pub fn count(&self, kernel: &Kernel) -> SemCtr {
        kernel.critical_section(|cs| self.cb.get(cs).count)
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

/// End the wait of a dequeued waiter with `code`
fn wake(kernel: &Kernel, cs: &CriticalSection<'_>, task: TaskRef, code: PendStatus) {
    kernel.blocktimer_cancel(cs, task);
    tcb(task, cs).block_code = code;
    kernel.make_ready(cs, task);
}
