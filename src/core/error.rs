//! Error types
//!
//! Recoverable outcomes of blocking calls are returned as [`OsError`].
//! Broken caller contracts are [`Fatal`] and stop the system through
//! [`Kernel::halt`](crate::kernel::Kernel::halt).

use core::fmt;

/// Result code of a blocking call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    /// Resource unavailable and the caller asked not to block
    WouldBlock = 1,
    /// Guard timer expired before the wait was satisfied
    Timeout = 2,
    /// Object destroyed while the caller was waiting on it
    Destroyed = 3,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OsError::WouldBlock => "would block",
            OsError::Timeout => "timeout",
            OsError::Destroyed => "destroyed",
        })
    }
}

/// Unrecoverable contract violation or internal inconsistency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fatal {
    // ============ Context errors ============
    /// Blocking or task-only call made from interrupt context
    IsrContext,
    /// Interrupt-only call made from task context
    NotIsrContext,
    /// Idle task attempted to block
    IdleBlock,
    /// Blocking call made with the scheduler locked
    SchedLocked,
    /// Scheduler unlocked more times than locked
    SchedNotLocked,
    /// Simulated interrupt raised while interrupts are masked
    InterruptsMasked,
    /// Kernel started twice
    AlreadyRunning,

    // ============ Task errors ============
    /// Priority out of range or reserved for idle
    PrioInvalid,
    /// Stack smaller than the configured minimum
    StackTooSmall,
    /// Task object is still live
    TaskBusy,
    /// Task object was never created
    TaskInvalid,
    /// Task tried to join itself
    JoinSelf,
    /// Task already has a joiner
    JoinBusy,

    // ============ Synchronization errors ============
    /// Blocking on a semaphore or wait queue while owning a mutex
    MutexHeld,
    /// Owner locked its own mutex again
    MutexRelock,
    /// Unlock by a task that does not own the mutex
    MutexNotOwner,
    /// Destroy of an owned or contended mutex
    MutexBusy,
    /// Semaphore counter would overflow
    SemOverflow,
    /// Semaphore created with a count at the representable maximum
    SemInitInvalid,
    /// Call not allowed while a wait-queue prepare is outstanding
    WaitQueuePrepared,
    /// wait or break_ without a matching prepare
    WaitQueueNotPrepared,
    /// Use of a destroyed wait queue
    WaitQueueDestroyed,

    // ============ Internal ============
    /// Kernel self-check failed
    SelfCheck,
    /// Architecture port failure
    Port,
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Fatal::IsrContext => "blocking call from interrupt context",
            Fatal::NotIsrContext => "interrupt-only call from task context",
            Fatal::IdleBlock => "idle task must not block",
            Fatal::SchedLocked => "blocking call with scheduler locked",
            Fatal::SchedNotLocked => "scheduler not locked",
            Fatal::InterruptsMasked => "interrupt raised while masked",
            Fatal::AlreadyRunning => "kernel already running",
            Fatal::PrioInvalid => "invalid priority",
            Fatal::StackTooSmall => "stack too small",
            Fatal::TaskBusy => "task still live",
            Fatal::TaskInvalid => "task not created",
            Fatal::JoinSelf => "task joins itself",
            Fatal::JoinBusy => "task already joined",
            Fatal::MutexHeld => "blocking while owning a mutex",
            Fatal::MutexRelock => "mutex relock by owner",
            Fatal::MutexNotOwner => "mutex unlock by non-owner",
            Fatal::MutexBusy => "mutex destroyed while in use",
            Fatal::SemOverflow => "semaphore overflow",
            Fatal::SemInitInvalid => "semaphore initial count too large",
            Fatal::WaitQueuePrepared => "wait queue prepare outstanding",
            Fatal::WaitQueueNotPrepared => "wait queue not prepared",
            Fatal::WaitQueueDestroyed => "wait queue destroyed",
            Fatal::SelfCheck => "kernel self-check failed",
            Fatal::Port => "port failure",
        })
    }
}

/// Halt the kernel with `$fatal` unless `$cond` holds. Always compiled.
#[doc(hidden)]
#[macro_export]
macro_rules! api_check {
    ($kernel:expr, $cond:expr, $fatal:expr) => {
        if !($cond) {
            $kernel.halt($fatal)
        }
    };
}

/// Internal consistency check, compiled out without the `selfcheck` feature.
#[doc(hidden)]
#[macro_export]
macro_rules! self_check {
    ($kernel:expr, $cond:expr) => {
        #[cfg(feature = "selfcheck")]
        {
            if !($cond) {
                $kernel.halt($crate::error::Fatal::SelfCheck)
            }
        }
    };
}
