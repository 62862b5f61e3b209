//! Kernel core
//!
//! Everything that does not depend on which synchronization objects are
//! enabled: the kernel context, scheduling, tasks and time.

pub mod config;
pub mod types;
pub mod error;
pub mod cs_cell;
pub mod critical;
pub mod prio;
pub mod kernel;
pub mod sched;
pub mod task;
pub mod time;
