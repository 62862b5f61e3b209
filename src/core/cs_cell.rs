//! Kernel state cell
//!
//! Every piece of shared kernel state sits in a [`CsCell`]; borrowing it
//! takes a `&CriticalSection` as proof that interrupts are masked.

use core::cell::UnsafeCell;
use crate::critical::CriticalSection;

/// A cell that can only be accessed within a critical section.
pub struct CsCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Borrow the inner value for the duration of a critical section.
    ///
    /// Callers must not hold two borrows of the same cell at once.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub fn get<'a>(&'a self, _cs: &CriticalSection<'_>) -> &'a mut T {
        unsafe { &mut *self.0.get() }
    }

    #[inline(always)]
    pub const fn as_ptr(&self) -> *mut T {
        self.0.get()
    }
}
