//! Critical sections
//!
//! A [`CriticalSection`] masks interrupts for as long as it lives. Nesting is
//! allowed: each guard restores the mask state it found on entry.

use crate::port::{Arch, Port};

/// RAII guard for critical sections
///
/// Possession of a `&CriticalSection` is the capability required to touch
/// any [`CsCell`](crate::core::cs_cell::CsCell) protected kernel state.
pub struct CriticalSection<'a> {
    port: &'a Arch,
    state: <Arch as Port>::CriticalState,
}

impl<'a> CriticalSection<'a> {
    /// Mask interrupts. They are restored when the guard is dropped.
    #[inline(always)]
    pub fn enter(port: &'a Arch) -> Self {
        let state = port.critical_enter();
        CriticalSection { port, state }
    }
}

impl Drop for CriticalSection<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        unsafe { self.port.critical_exit(self.state) };
    }
}
