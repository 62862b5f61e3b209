//! Time management
//!
//! Timers sit in a delta list: each linked timer stores the ticks remaining
//! after its predecessor fires, so a tick only touches the head. Timers that
//! expire on the same tick fire in the order they were armed.

use core::ptr::NonNull;

use crate::config::TIMEOUT_INFINITE;
use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;
use crate::error::Fatal;
use crate::kernel::Kernel;
use crate::sched::TaskQueue;
use crate::task::{tcb, TaskRef};
use crate::types::{BlockType, PendStatus, TaskState, Ticks};

/// Application timer callback. Runs in tick (interrupt) context with the
/// scheduler locked, so it may wake tasks but must not block.
pub type TimerProc = &'static (dyn Fn(&Kernel) + Sync);

#[derive(Clone, Copy)]
pub(crate) enum TimerCallback {
    Unset,
    /// Guard timer of a blocked task
    BlockTimeout(TaskRef),
    Proc(TimerProc),
}

pub(crate) struct TimerCb {
    next: Option<NonNull<Timer>>,
    prev: Option<NonNull<Timer>>,
    /// Ticks after the predecessor fires
    delta: Ticks,
    reload: Ticks,
    linked: bool,
    callback: TimerCallback,
}

/// Caller-allocated timer
pub struct Timer {
    cb: CsCell<TimerCb>,
}

impl Timer {
    pub const fn new() -> Self {
        Timer {
            cb: CsCell::new(TimerCb {
                next: None,
                prev: None,
                delta: 0,
                reload: 0,
                linked: false,
                callback: TimerCallback::Unset,
            }),
        }
    }

    /// Arm the timer: `callback` runs `timeout` ticks from now and then
    /// every `reload` ticks if `reload` is nonzero. Re-arms a running timer.
    pub fn create(&'static self, kernel: &Kernel, timeout: Ticks, reload: Ticks, callback: TimerProc) {
        let link = NonNull::from(self);
        kernel.critical_section(|cs| {
            let timers = &mut kernel.sched.get(cs).timers;
            timers.remove(cs, link);

            let t = self.cb.get(cs);
            t.callback = TimerCallback::Proc(callback);
            t.reload = reload;
            timers.insert(cs, link, timeout);
        });
    }

    /// Disarm the timer. Destroying an unarmed or fired timer is a no-op.
    pub fn destroy(&self, kernel: &Kernel) {
        kernel.critical_section(|cs| {
            kernel.sched.get(cs).timers.remove(cs, NonNull::from(self));
            self.cb.get(cs).callback = TimerCallback::Unset;
        });
    }

    pub fn is_armed(&self, kernel: &Kernel) -> bool {
        kernel.critical_section(|cs| self.cb.get(cs).linked)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[inline(always)]
fn timer_cb<'a>(timer: NonNull<Timer>, cs: &'a CriticalSection<'_>) -> &'a mut TimerCb {
    // SAFETY: linked timers outlive their membership in the list
    unsafe { timer.as_ref() }.cb.get(cs)
}

/// Delta-ordered list of armed timers
pub(crate) struct TimerList {
    head: Option<NonNull<Timer>>,
}

impl TimerList {
    pub(crate) const fn new() -> Self {
        TimerList { head: None }
    }

    /// Link `timer` to expire `ticks` ticks from now
    pub(crate) fn insert(&mut self, cs: &CriticalSection<'_>, timer: NonNull<Timer>, ticks: Ticks) {
        let mut remaining = ticks;
        let mut prev = None;
        let mut cur = self.head;

        while let Some(c) = cur {
            let c_cb = timer_cb(c, cs);
            if remaining < c_cb.delta {
                c_cb.delta -= remaining;
                break;
            }
            remaining -= c_cb.delta;
            prev = cur;
            cur = c_cb.next;
        }

        let t = timer_cb(timer, cs);
        t.delta = remaining;
        t.prev = prev;
        t.next = cur;
        t.linked = true;

        if let Some(c) = cur {
            timer_cb(c, cs).prev = Some(timer);
        }
        match prev {
            Some(p) => timer_cb(p, cs).next = Some(timer),
            None => self.head = Some(timer),
        }
    }

    /// Unlink `timer`, handing its remaining ticks to its successor
    pub(crate) fn remove(&mut self, cs: &CriticalSection<'_>, timer: NonNull<Timer>) {
        let t = timer_cb(timer, cs);
        if !t.linked {
            return;
        }
        let (prev, next, delta) = (t.prev, t.next, t.delta);
        t.prev = None;
        t.next = None;
        t.linked = false;

        if let Some(n) = next {
            let n_cb = timer_cb(n, cs);
            n_cb.delta += delta;
            n_cb.prev = prev;
        }
        match prev {
            Some(p) => timer_cb(p, cs).next = next,
            None => self.head = next,
        }
    }

    /// Count one tick against the first timer not yet due. Leading
    /// zero-delta timers are already due and fire on this tick regardless.
    pub(crate) fn advance(&mut self, cs: &CriticalSection<'_>) {
        let mut cur = self.head;
        while let Some(c) = cur {
            let c_cb = timer_cb(c, cs);
            if c_cb.delta > 0 {
                c_cb.delta -= 1;
                return;
            }
            cur = c_cb.next;
        }
    }

    /// Unlink the head timer if it is due, re-arming it if periodic, and
    /// return its callback
    pub(crate) fn pop_expired(&mut self, cs: &CriticalSection<'_>) -> Option<TimerCallback> {
        let head = self.head?;
        if timer_cb(head, cs).delta > 0 {
            return None;
        }
        self.remove(cs, head);

        let h = timer_cb(head, cs);
        let (callback, reload) = (h.callback, h.reload);
        if reload > 0 {
            self.insert(cs, head, reload);
        }
        Some(callback)
    }

    pub(crate) fn len(&self, cs: &CriticalSection<'_>) -> usize {
        let mut count = 0;
        let mut cur = self.head;
        while let Some(c) = cur {
            count += 1;
            cur = timer_cb(c, cs).next;
        }
        count
    }
}

/// Guard timer of a blocking call, disarmed on every exit path
pub(crate) struct BlockTimer<'a> {
    kernel: &'a Kernel,
    task: TaskRef,
}

impl Drop for BlockTimer<'_> {
    fn drop(&mut self) {
        self.kernel
            .critical_section(|cs| self.kernel.blocktimer_cancel(cs, self.task));
    }
}

impl Kernel {
    /// Process one system tick. Must be called from interrupt context.
    ///
    /// Fires every due timer with the scheduler locked, then asks for one
    /// preemption check, which also rotates tasks of equal priority.
    pub fn tick(&self) {
        crate::api_check!(self, self.in_isr(), Fatal::NotIsrContext);
        self.flags.tick_increment();

        self.scheduler_lock();
        self.critical_section(|cs| {
            self.sched.get(cs).timers.advance(cs);
            while let Some(callback) = self.sched.get(cs).timers.pop_expired(cs) {
                match callback {
                    TimerCallback::BlockTimeout(task) => self.block_timeout(cs, task),
                    TimerCallback::Proc(f) => f(self),
                    TimerCallback::Unset => {}
                }
            }
        });
        self.scheduler_unlock();

        self.critical_section(|cs| self.schedule(cs, false));
    }

    /// Suspend the calling task for `ticks` ticks
    pub fn delay(&self, ticks: Ticks) {
        if ticks == 0 {
            return;
        }
        let timer = Timer::new();
        self.critical_section(|cs| {
            self.check_blocking(cs);
            crate::api_check!(
                self,
                !tcb(self.current(cs), cs).is_prepared(),
                Fatal::WaitQueuePrepared
            );
            let _guard = self.blocktimer_arm(cs, &timer, ticks);
            self.block_switch(cs, None, BlockType::Delay);
        });
    }

    /// Number of armed timers
    pub fn timers_armed(&self) -> usize {
        self.critical_section(|cs| self.sched.get(cs).timers.len(cs))
    }

    /// Arm a guard timer for the current task. `TIMEOUT_INFINITE` arms
    /// nothing. The timer must stay in place until the guard drops.
    pub(crate) fn blocktimer_arm<'a>(
        &'a self,
        cs: &CriticalSection<'_>,
        timer: &'a Timer,
        timeout: Ticks,
    ) -> Option<BlockTimer<'a>> {
        if timeout == TIMEOUT_INFINITE {
            return None;
        }
        let cur = self.current(cs);
        crate::self_check!(self, tcb(cur, cs).timer.is_none());

        let link = NonNull::from(timer);
        let t = timer.cb.get(cs);
        t.callback = TimerCallback::BlockTimeout(cur);
        t.reload = 0;
        self.sched.get(cs).timers.insert(cs, link, timeout);
        tcb(cur, cs).timer = Some(link);

        Some(BlockTimer { kernel: self, task: cur })
    }

    /// Disarm the guard timer of `task`, if any. Idempotent.
    pub(crate) fn blocktimer_cancel(&self, cs: &CriticalSection<'_>, task: TaskRef) {
        if let Some(timer) = tcb(task, cs).timer.take() {
            self.sched.get(cs).timers.remove(cs, timer);
        }
    }

    /// Guard timer expiry: end the wait of `task` with a timeout
    fn block_timeout(&self, cs: &CriticalSection<'_>, task: TaskRef) {
        let t = tcb(task, cs);
        t.timer = None;
        crate::self_check!(self, t.state == TaskState::Wait);

        TaskQueue::unlink(cs, task);
        let t = tcb(task, cs);
        t.block_code = PendStatus::Timeout;
        #[cfg(feature = "waitqueue")]
        if t.block_type == BlockType::WaitQueue {
            t.wait_signaled = true;
        }

        self.make_ready(cs, task);
    }
}

#[cfg(test)]
mod tests {
    use std::boxed::Box;
    use std::vec::Vec;

    use quickcheck_macros::quickcheck;

    use super::*;

    fn timer() -> NonNull<Timer> {
        NonNull::from(Box::leak(Box::new(Timer::new())))
    }

    /// Tick `list` until empty, returning `(tick, timer)` for every expiry
    fn run_out(kernel: &Kernel, list: &mut TimerList, max_ticks: u32) -> Vec<(u32, NonNull<Timer>)> {
        let mut fired = Vec::new();
        kernel.critical_section(|cs| {
            for now in 1..=max_ticks {
                list.advance(cs);
                while list.head.map_or(false, |h| timer_cb(h, cs).delta == 0) {
                    let head = list.head.unwrap();
                    list.pop_expired(cs);
                    fired.push((now, head));
                }
            }
        });
        fired
    }

    #[test]
    fn equal_deadlines_fire_in_arming_order() {
        let kernel = Kernel::new();
        let mut list = TimerList::new();
        let (a, b, c) = (timer(), timer(), timer());

        kernel.critical_section(|cs| {
            list.insert(cs, a, 3);
            list.insert(cs, b, 1);
            list.insert(cs, c, 3);
            assert_eq!(list.len(cs), 3);
        });

        assert_eq!(run_out(&kernel, &mut list, 5), [(1, b), (3, a), (3, c)]);
    }

    #[test]
    fn zero_timeout_does_not_delay_later_timers() {
        let kernel = Kernel::new();
        let mut list = TimerList::new();
        let (a, b, c) = (timer(), timer(), timer());

        kernel.critical_section(|cs| {
            list.insert(cs, a, 0);
            list.insert(cs, b, 1);
            list.insert(cs, c, 2);
        });

        assert_eq!(run_out(&kernel, &mut list, 3), [(1, a), (1, b), (2, c)]);
    }

    #[test]
    fn remove_hands_delta_to_successor() {
        let kernel = Kernel::new();
        let mut list = TimerList::new();
        let (a, b) = (timer(), timer());

        kernel.critical_section(|cs| {
            list.insert(cs, a, 2);
            list.insert(cs, b, 5);
            list.remove(cs, a);
            // second removal is a no-op
            list.remove(cs, a);
            assert_eq!(list.len(cs), 1);
        });

        assert_eq!(run_out(&kernel, &mut list, 6), [(5, b)]);
    }

    #[test]
    fn periodic_timer_rearms() {
        let kernel = Kernel::new();
        let mut list = TimerList::new();
        let t = timer();

        kernel.critical_section(|cs| {
            timer_cb(t, cs).reload = 2;
            list.insert(cs, t, 3);
        });

        let ticks: Vec<u32> = run_out(&kernel, &mut list, 9).into_iter().map(|(n, _)| n).collect();
        assert_eq!(ticks, [3, 5, 7, 9]);
    }

    #[quickcheck]
    fn every_timer_fires_at_its_deadline(deadlines: Vec<u8>) -> bool {
        let kernel = Kernel::new();
        let mut list = TimerList::new();
        let timers: Vec<(u32, NonNull<Timer>)> = deadlines
            .iter()
            .map(|&d| (u32::from(d) + 1, timer()))
            .collect();

        kernel.critical_section(|cs| {
            for &(deadline, t) in &timers {
                list.insert(cs, t, deadline);
            }
        });

        let fired = run_out(&kernel, &mut list, 257);
        let mut expected = timers.clone();
        // stable sort keeps arming order among equal deadlines
        expected.sort_by_key(|&(deadline, _)| deadline);
        fired == expected
    }
}
