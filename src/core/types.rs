//! Core type definitions
//!
//! These types provide strong typing for kernel primitives.

/// Task priority (larger number = more urgent, idle is 0)
pub type Prio = u8;

/// Tick counter and timeout type
pub type Ticks = u32;

/// Semaphore counter type
pub type SemCtr = u32;

/// Nesting counter
pub type NestingCtr = u8;

/// Stack element type
pub type StackWord = u32;

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskState {
    /// Not created, or terminated and already joined
    Unused = 0,
    /// Runnable, waiting in a queue for the CPU
    Ready = 1,
    /// Owns the CPU
    Running = 2,
    /// Blocked on a kernel object or a timer
    Wait = 3,
    /// Entry returned; waiting to be joined
    Terminated = 4,
}

/// What a waiting task is blocked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BlockType {
    Nothing = 0,
    Sem = 1,
    Mutex = 2,
    WaitQueue = 3,
    Join = 4,
    Delay = 5,
}

/// Outcome recorded on a task by whoever ends its wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PendStatus {
    /// Woken by a signal
    Ok = 0,
    /// Guard timer expired
    Timeout = 1,
    /// Object destroyed while waiting
    Destroyed = 2,
}

impl PendStatus {
    #[inline]
    pub fn into_result(self) -> crate::error::OsResult<()> {
        use crate::error::OsError;

        match self {
            PendStatus::Ok => Ok(()),
            PendStatus::Timeout => Err(OsError::Timeout),
            PendStatus::Destroyed => Err(OsError::Destroyed),
        }
    }
}
