//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task.

use core::ptr::NonNull;

use crate::core::cs_cell::CsCell;
use crate::critical::CriticalSection;
use crate::kernel::Kernel;
use crate::port::TaskContext;
use crate::sched::TaskQueue;
use crate::time::Timer;
use crate::types::{BlockType, PendStatus, Prio, TaskState};

#[cfg(feature = "mutex")]
use crate::sync::mutex::MutexCb;
#[cfg(feature = "waitqueue")]
use crate::sync::waitqueue::WaitQueueCb;

/// Task body. Its return value is handed to [`Kernel::task_join`].
pub type TaskEntry = &'static (dyn Fn() -> i32 + Sync);

/// Link to a task as stored in queues and timer callbacks
pub(crate) type TaskRef = NonNull<Task>;

#[derive(Clone, Copy)]
pub(crate) enum Entry {
    App(TaskEntry),
    Idle,
}

/// Caller-allocated task object
///
/// Lives in a `static` (or leaked allocation) because queues, timers and the
/// port keep pointers to it for as long as the task exists.
pub struct Task {
    pub(crate) ctx: TaskContext,
    pub(crate) tcb: CsCell<Tcb>,
}

/// Task Control Block
pub(crate) struct Tcb {
    // ============ State ============
    pub state: TaskState,
    pub entry: Option<Entry>,
    pub ret_value: i32,

    // ============ Priority ============
    /// Priority given at creation
    pub prio_base: Prio,
    /// Effective priority, raised by mutex inheritance
    pub prio_current: Prio,

    // ============ Queue links ============
    pub next: Option<TaskRef>,
    pub prev: Option<TaskRef>,
    /// Queue currently holding this task (ready queue or an object's queue)
    pub queue: Option<NonNull<TaskQueue>>,

    // ============ Blocking ============
    pub block_type: BlockType,
    pub block_code: PendStatus,
    /// Guard timer armed by the blocking call, if any
    pub timer: Option<NonNull<Timer>>,
    pub joiner: Option<TaskRef>,

    // ============ Mutex ============
    /// Head of the list of mutexes owned by this task
    #[cfg(feature = "mutex")]
    pub mtx_owned: Option<NonNull<MutexCb>>,
    /// Mutex this task is blocked on
    #[cfg(feature = "mutex")]
    pub mtx_blocked: Option<NonNull<MutexCb>>,

    // ============ Wait queue ============
    /// Wait queue named by an outstanding prepare
    #[cfg(feature = "waitqueue")]
    pub wait_queue: Option<NonNull<WaitQueueCb>>,
    /// Set once a wakeup (or timeout) has been delivered for the prepare
    #[cfg(feature = "waitqueue")]
    pub wait_signaled: bool,
}

impl Tcb {
    const fn new() -> Self {
        Tcb {
            state: TaskState::Unused,
            entry: None,
            ret_value: 0,
            prio_base: 0,
            prio_current: 0,
            next: None,
            prev: None,
            queue: None,
            block_type: BlockType::Nothing,
            block_code: PendStatus::Ok,
            timer: None,
            joiner: None,
            #[cfg(feature = "mutex")]
            mtx_owned: None,
            #[cfg(feature = "mutex")]
            mtx_blocked: None,
            #[cfg(feature = "waitqueue")]
            wait_queue: None,
            #[cfg(feature = "waitqueue")]
            wait_signaled: false,
        }
    }

    /// Reset for a fresh run of `entry` at `prio`
    pub(crate) fn init(&mut self, prio: Prio, entry: Entry) {
        *self = Tcb::new();
        self.entry = Some(entry);
        self.prio_base = prio;
        self.prio_current = prio;
    }

    #[inline]
    pub(crate) fn owns_mutex(&self) -> bool {
        #[cfg(feature = "mutex")]
        {
            self.mtx_owned.is_some()
        }
        #[cfg(not(feature = "mutex"))]
        {
            false
        }
    }

    #[inline]
    pub(crate) fn is_prepared(&self) -> bool {
        #[cfg(feature = "waitqueue")]
        {
            self.wait_queue.is_some()
        }
        #[cfg(not(feature = "waitqueue"))]
        {
            false
        }
    }
}

impl Task {
    pub const fn new() -> Self {
        Task {
            ctx: TaskContext::new(),
            tcb: CsCell::new(Tcb::new()),
        }
    }

    #[inline(always)]
    pub(crate) fn link(&self) -> TaskRef {
        NonNull::from(self)
    }

    pub fn state(&self, kernel: &Kernel) -> TaskState {
        kernel.critical_section(|cs| self.tcb.get(cs).state)
    }

    /// Effective priority, including any inherited boost
    pub fn prio_current(&self, kernel: &Kernel) -> Prio {
        kernel.critical_section(|cs| self.tcb.get(cs).prio_current)
    }

    pub fn prio_base(&self, kernel: &Kernel) -> Prio {
        kernel.critical_section(|cs| self.tcb.get(cs).prio_base)
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrow the TCB behind a task link
#[inline(always)]
pub(crate) fn tcb<'a>(task: TaskRef, cs: &'a CriticalSection<'_>) -> &'a mut Tcb {
    // SAFETY: tasks outlive every link to them and the critical section
    // serializes access
    unsafe { task.as_ref() }.tcb.get(cs)
}
