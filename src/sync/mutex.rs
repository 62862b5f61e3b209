//! Mutex implementation with priority inheritance
//!
//! While a task waits for a mutex, the owner runs at no less than the
//! waiter's priority. The boost follows the chain of owners when the owner
//! is itself waiting on another mutex. On unlock the owner drops back to the
//! highest of its base priority and the waiters of the mutexes it still
//! holds, and ownership passes straight to the most urgent waiter.

use core::ptr::NonNull;

use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;
use crate::error::{Fatal, OsResult};
use crate::kernel::Kernel;
use crate::task::{tcb, TaskRef};
use crate::sched::TaskQueue;
use crate::types::{BlockType, PendStatus, Prio, TaskState};

pub(crate) struct MutexCb {
    owner: Option<TaskRef>,
    waiters: TaskQueue,
    /// Next mutex owned by the same task
    next_owned: Option<NonNull<MutexCb>>,
}

impl MutexCb {
    const fn new() -> Self {
        MutexCb {
            owner: None,
            waiters: TaskQueue::new(),
            next_owned: None,
        }
    }
}

#[inline(always)]
fn mutex_cb<'a>(mtx: NonNull<MutexCb>, _cs: &'a CriticalSection<'_>) -> &'a mut MutexCb {
    // SAFETY: a mutex cannot be destroyed while owned or contended, so every
    // link to it is live
    unsafe { &mut *mtx.as_ptr() }
}

/// Mutex with priority inheritance
pub struct Mutex {
    cb: CsCell<MutexCb>,
}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            cb: CsCell::new(MutexCb::new()),
        }
    }

    /// (Re)initialize an unused mutex
    pub fn create(&self, kernel: &Kernel) {
        kernel.critical_section(|cs| {
            let cb = self.cb.get(cs);
            crate::api_check!(kernel, cb.owner.is_none(), Fatal::MutexBusy);
            *cb = MutexCb::new();
        });
    }

    /// Release an unused mutex. Destroying an owned or contended mutex is fatal.
    pub fn destroy(&self, kernel: &Kernel) {
        crate::api_check!(kernel, !kernel.in_isr(), Fatal::IsrContext);
        kernel.critical_section(|cs| {
            let cb = self.cb.get(cs);
            crate::api_check!(
                kernel,
                cb.owner.is_none() && cb.waiters.is_empty(),
                Fatal::MutexBusy
            );
            *cb = MutexCb::new();
        });
    }

    /// Acquire the mutex, waiting as long as it takes.
    ///
    /// A lower-priority owner (and every owner it is transitively waiting
    /// on) is boosted to the caller's priority while the caller waits.
    pub fn lock(&self, kernel: &Kernel) -> OsResult<()> {
        kernel.critical_section(|cs| {
            kernel.check_blocking(cs);
            let cur = kernel.current(cs);
            crate::api_check!(kernel, !tcb(cur, cs).is_prepared(), Fatal::WaitQueuePrepared);

            let link = NonNull::from(&mut *self.cb.get(cs));
            let cb = self.cb.get(cs);
            match cb.owner {
                None => {
                    take_ownership(cs, link, cur);
                    Ok(())
                }
                Some(owner) if owner == cur => kernel.halt(Fatal::MutexRelock),
                Some(_) => {
                    let prio = tcb(cur, cs).prio_current;
                    tcb(cur, cs).mtx_blocked = Some(link);
                    inherit_priority(kernel, cs, link, prio);

                    let waiters = NonNull::from(&mut cb.waiters);
                    kernel.block_switch(cs, Some(waiters), BlockType::Mutex);

                    // unlock handed the mutex over before waking us
                    crate::self_check!(kernel, self.cb.get(cs).owner == Some(cur));
                    tcb(cur, cs).block_code.into_result()
                }
            }
        })
    }

    /// Release the mutex. Only the owner may call this.
    pub fn unlock(&self, kernel: &Kernel) {
        crate::api_check!(kernel, !kernel.in_isr(), Fatal::IsrContext);
        kernel.critical_section(|cs| {
            let cur = kernel.current(cs);
            crate::api_check!(kernel, !tcb(cur, cs).is_prepared(), Fatal::WaitQueuePrepared);

            let link = NonNull::from(&mut *self.cb.get(cs));
            let cb = self.cb.get(cs);
            crate::api_check!(kernel, cb.owner == Some(cur), Fatal::MutexNotOwner);

            release_ownership(cs, link, cur);
            let owed = owed_priority(cs, cur);
            if owed != tcb(cur, cs).prio_current {
                kernel.reprio(cs, cur, owed);
            }

            let cb = self.cb.get(cs);
            match cb.waiters.dequeue(cs) {
                Some(next) => {
                    take_ownership(cs, link, next);
                    let t = tcb(next, cs);
                    t.mtx_blocked = None;
                    t.block_code = PendStatus::Ok;
                    // the new owner inherits from whoever still waits
                    if let Some(prio) = self.cb.get(cs).waiters.peek_prio() {
                        let t = tcb(next, cs);
                        if prio > t.prio_current {
                            t.prio_current = prio;
                        }
                    }
                    kernel.make_ready(cs, next);
                    kernel.schedule(cs, true);
                }
                None => cb.owner = None,
            }
        });
    }

    /// Current owner is `task`
    pub fn is_owned_by(&self, kernel: &Kernel, task: &crate::task::Task) -> bool {
        kernel.critical_section(|cs| self.cb.get(cs).owner == Some(task.link()))
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

fn take_ownership(cs: &CriticalSection<'_>, mtx: NonNull<MutexCb>, task: TaskRef) {
    let t = tcb(task, cs);
    let cb = mutex_cb(mtx, cs);
    cb.owner = Some(task);
    cb.next_owned = t.mtx_owned;
    t.mtx_owned = Some(mtx);
}

fn release_ownership(cs: &CriticalSection<'_>, mtx: NonNull<MutexCb>, task: TaskRef) {
    let t = tcb(task, cs);
    let next = mutex_cb(mtx, cs).next_owned.take();

    if t.mtx_owned == Some(mtx) {
        t.mtx_owned = next;
        return;
    }
    let mut cur = t.mtx_owned;
    while let Some(m) = cur {
        let m_cb = mutex_cb(m, cs);
        if m_cb.next_owned == Some(mtx) {
            m_cb.next_owned = next;
            return;
        }
        cur = m_cb.next_owned;
    }
}

/// Priority `task` is entitled to: its base priority or the most urgent
/// waiter on any mutex it still owns
fn owed_priority(cs: &CriticalSection<'_>, task: TaskRef) -> Prio {
    let t = tcb(task, cs);
    let mut prio = t.prio_base;
    let mut cur = t.mtx_owned;
    while let Some(m) = cur {
        let m_cb = mutex_cb(m, cs);
        if let Some(waiter) = m_cb.waiters.peek_prio() {
            prio = prio.max(waiter);
        }
        cur = m_cb.next_owned;
    }
    prio
}

/// Raise the owner of `mtx` to `prio`, following the chain of owners that
/// are themselves blocked on a mutex
fn inherit_priority(kernel: &Kernel, cs: &CriticalSection<'_>, mtx: NonNull<MutexCb>, prio: Prio) {
    let mut mtx = mtx;
    loop {
        let Some(owner) = mutex_cb(mtx, cs).owner else {
            kernel.halt(Fatal::SelfCheck)
        };
        let t = tcb(owner, cs);
        if t.prio_current >= prio {
            return;
        }
        kernel.reprio(cs, owner, prio);

        let t = tcb(owner, cs);
        match (t.state, t.block_type, t.mtx_blocked) {
            (TaskState::Wait, BlockType::Mutex, Some(next)) => mtx = next,
            _ => return,
        }
    }
}
