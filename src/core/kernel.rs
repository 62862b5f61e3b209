//! Kernel state, start-up and interrupt bracketing
//!
//! A [`Kernel`] owns the scheduler state of one system. Applications keep it
//! in a `static` and pass `&Kernel` to every call.

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::config::{CFG_IDLE_STK_SIZE, CFG_PRIO_IDLE};
use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;
use crate::error::Fatal;
use crate::port::{Arch, Port};
use crate::sched::TaskQueue;
use crate::task::{tcb, Entry, Task, TaskRef};
use crate::time::TimerList;
use crate::types::{NestingCtr, StackWord, TaskState, Ticks};

/// Called by the idle task on every pass of its loop
pub type IdleHook = fn(&Kernel);

// ============ Kernel State Structures ============

/// Atomic kernel flags
pub struct KernelFlags {
    running: AtomicBool,
    int_nesting: AtomicU8,
    sched_lock_nesting: AtomicU8,
    tick_counter: AtomicU32,
    live_tasks: AtomicUsize,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            sched_lock_nesting: AtomicU8::new(0),
            tick_counter: AtomicU32::new(0),
            live_tasks: AtomicUsize::new(0),
        }
    }

    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn tick_get(&self) -> Ticks {
        self.tick_counter.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn int_nesting(&self) -> NestingCtr {
        self.int_nesting.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn sched_lock_nesting(&self) -> NestingCtr {
        self.sched_lock_nesting.load(Ordering::SeqCst)
    }

    /// Application tasks created and not yet terminated
    #[inline(always)]
    pub fn live_tasks(&self) -> usize {
        self.live_tasks.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub(crate) fn tick_increment(&self) -> Ticks {
        self.tick_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn int_enter(&self) -> NestingCtr {
        self.int_nesting.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Leave one interrupt level, returning the remaining depth
    #[inline(always)]
    pub(crate) fn int_exit(&self) -> NestingCtr {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        if nesting > 0 {
            self.int_nesting.store(nesting - 1, Ordering::Relaxed);
        }
        nesting.saturating_sub(1)
    }

    pub(crate) fn sched_lock(&self) -> Option<NestingCtr> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        let next = nesting.checked_add(1)?;
        self.sched_lock_nesting.store(next, Ordering::SeqCst);
        Some(next)
    }

    pub(crate) fn sched_unlock(&self) -> Option<NestingCtr> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        let next = nesting.checked_sub(1)?;
        self.sched_lock_nesting.store(next, Ordering::SeqCst);
        Some(next)
    }

    #[inline(always)]
    pub(crate) fn live_inc(&self) {
        self.live_tasks.fetch_add(1, Ordering::AcqRel);
    }

    #[inline(always)]
    pub(crate) fn live_dec(&self) {
        self.live_tasks.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Scheduler state
pub(crate) struct SchedState {
    pub(crate) ready: TaskQueue,
    /// Task owning the CPU. `None` until [`Kernel::start`] dispatches.
    pub(crate) current: Option<TaskRef>,
    pub(crate) timers: TimerList,
    /// Scheduling request raised in interrupt context, carried out by
    /// [`Kernel::isr_exit`]. The flag is `higher_only`.
    pub(crate) isr_request: Option<bool>,
    pub(crate) idle_hook: Option<IdleHook>,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            ready: TaskQueue::new(),
            current: None,
            timers: TimerList::new(),
            isr_request: None,
            idle_hook: None,
        }
    }
}

/// Kernel context object
pub struct Kernel {
    pub(crate) port: Arch,
    pub(crate) flags: KernelFlags,
    pub(crate) sched: CsCell<SchedState>,
    idle_task: Task,
    idle_stack: CsCell<[StackWord; CFG_IDLE_STK_SIZE]>,
}

impl Kernel {
    pub const fn new() -> Self {
        Kernel {
            port: Arch::new(),
            flags: KernelFlags::new(),
            sched: CsCell::new(SchedState::new()),
            idle_task: Task::new(),
            idle_stack: CsCell::new([0; CFG_IDLE_STK_SIZE]),
        }
    }

    /// Execute a closure with interrupts masked
    ///
    /// The closure receives the guard, which is the key to every
    /// [`CsCell`] protected piece of kernel state.
    #[inline]
    pub fn critical_section<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&CriticalSection<'_>) -> R,
    {
        let cs = CriticalSection::enter(&self.port);
        f(&cs)
    }

    /// Stop the system after a broken contract
    #[cold]
    pub fn halt(&self, reason: Fatal) -> ! {
        crate::error!("kernel halted: {}", reason);
        self.port.halt(reason)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.flags.is_running()
    }

    #[inline]
    pub fn in_isr(&self) -> bool {
        self.flags.int_nesting() > 0
    }

    /// Start multitasking.
    ///
    /// Creates the idle task, runs `init` with the scheduler locked so the
    /// tasks it creates stay queued, then dispatches the most urgent one.
    /// `idle_hook` runs on every pass of the idle loop.
    ///
    /// Does not return on hardware. The hosted port returns once every
    /// application task has terminated.
    pub fn start<F>(&'static self, init: F, idle_hook: Option<IdleHook>)
    where
        F: FnOnce(&'static Kernel),
    {
        crate::api_check!(self, !self.is_running(), Fatal::AlreadyRunning);

        self.critical_section(|cs| self.sched.get(cs).idle_hook = idle_hook);

        // SAFETY: the kernel is 'static and the idle stack is handed out once
        let idle_stack = unsafe { &mut *self.idle_stack.as_ptr() };
        self.task_spawn(&self.idle_task, CFG_PRIO_IDLE, idle_stack, Entry::Idle);

        self.scheduler_lock();
        init(self);
        self.scheduler_unlock();

        let first = self.critical_section(|cs| {
            let sched = self.sched.get(cs);
            let Some(first) = sched.ready.dequeue(cs) else {
                self.halt(Fatal::SelfCheck)
            };
            tcb(first, cs).state = TaskState::Running;
            sched.current = Some(first);
            self.flags.set_running(true);
            first
        });

        crate::info!("kernel started, {} task(s)", self.flags.live_tasks());

        // SAFETY: `first` was just made current and owns no CPU context yet
        unsafe { self.port.start_first(first.as_ref()) };

        self.flags.set_running(false);
    }

    // ============ Interrupt bracketing ============

    /// Mark entry into an interrupt handler
    #[inline]
    pub fn isr_enter(&self) {
        self.flags.int_enter();
    }

    /// Mark exit from an interrupt handler.
    ///
    /// Leaving the outermost level carries out the scheduling requests that
    /// kernel calls made while the handler ran.
    pub fn isr_exit(&self) {
        if self.flags.int_exit() > 0 {
            return;
        }
        self.critical_section(|cs| {
            let request = self.sched.get(cs).isr_request.take();
            if let Some(higher_only) = request {
                self.schedule(cs, higher_only);
            }
        });
    }

    /// Run `f` as an interrupt handler
    pub fn isr<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        crate::api_check!(self, !self.port.is_critical(), Fatal::InterruptsMasked);
        self.isr_enter();
        let ret = f();
        self.isr_exit();
        ret
    }

    // ============ Scheduler lock ============

    /// Defer all rescheduling until the matching unlock. Nestable.
    pub fn scheduler_lock(&self) {
        crate::api_check!(self, self.flags.sched_lock().is_some(), Fatal::SelfCheck);
    }

    /// Release one level of [`scheduler_lock`](Self::scheduler_lock).
    ///
    /// Reaching zero does not reschedule: a task made ready meanwhile runs
    /// at the next scheduling point.
    pub fn scheduler_unlock(&self) {
        crate::api_check!(self, self.flags.sched_unlock().is_some(), Fatal::SchedNotLocked);
    }

    // ============ Queries ============

    pub fn current_task(&self) -> Option<&'static Task> {
        self.critical_section(|cs| self.sched.get(cs).current)
            // SAFETY: tasks are 'static
            .map(|task| unsafe { task.as_ref() })
    }

    /// Ticks since start, wrapping
    #[inline]
    pub fn ticks_now(&self) -> Ticks {
        self.flags.tick_get()
    }

    /// Ticks elapsed from `start` to `now`, tolerant of wraparound
    #[inline]
    pub const fn ticks_diff(start: Ticks, now: Ticks) -> Ticks {
        now.wrapping_sub(start)
    }

    #[inline]
    pub(crate) fn current(&self, cs: &CriticalSection<'_>) -> TaskRef {
        match self.sched.get(cs).current {
            Some(task) => task,
            None => self.halt(Fatal::SelfCheck),
        }
    }

    #[inline]
    pub(crate) fn is_idle(&self, task: TaskRef) -> bool {
        task == self.idle_task.link()
    }

    pub(crate) fn idle_loop(&self) -> ! {
        loop {
            if self.flags.live_tasks() == 0 {
                crate::info!("all tasks terminated");
                self.port.quiescent();
            }
            let hook = self.critical_section(|cs| self.sched.get(cs).idle_hook);
            if let Some(hook) = hook {
                hook(self);
            }
            self.port.idle();
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
