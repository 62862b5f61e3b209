//! Synchronization primitives

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "mutex")]
pub mod mutex;

#[cfg(feature = "waitqueue")]
pub mod waitqueue;
