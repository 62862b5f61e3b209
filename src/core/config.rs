//! Compile-time configuration
//!
//! These constants control the behavior and resource limits of the kernel.

use crate::types::{Prio, Ticks};

/// Number of priority levels. Larger numbers are more urgent.
pub const CFG_PRIO_CNT: usize = 16;

/// Idle task priority. Reserved: application tasks use `1..CFG_PRIO_CNT`.
pub const CFG_PRIO_IDLE: Prio = 0;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Minimum task stack size in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Idle task stack size in words
pub const CFG_IDLE_STK_SIZE: usize = 128;

/// Timeout meaning "do not block at all"
pub const TIMEOUT_TRY: Ticks = 0;

/// Timeout meaning "block until signaled"
pub const TIMEOUT_INFINITE: Ticks = Ticks::MAX;

/// Wake count meaning "every waiter"
pub const WAITQUEUE_ALL: usize = usize::MAX;
