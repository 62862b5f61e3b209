//! Priority bitmap for O(1) highest-level lookup
//!
//! One bit per priority level. The most urgent non-empty level is found with
//! a leading-zero count, which maps to a single CLZ instruction on Cortex-M.

use crate::config::CFG_PRIO_CNT;
use crate::types::Prio;

/// Number of words needed for the priority bitmap
const PRIO_TBL_SIZE: usize = (CFG_PRIO_CNT + 31) / 32;

/// Priority bitmap table
///
/// Bit `p % 32` of word `p / 32` is set while level `p` is non-empty.
/// Larger levels are more urgent, so lookup scans from the last word down.
#[derive(Clone, Copy)]
pub struct PrioTable {
    bitmap: [u32; PRIO_TBL_SIZE],
}

impl PrioTable {
    pub const fn new() -> Self {
        PrioTable {
            bitmap: [0; PRIO_TBL_SIZE],
        }
    }

    #[inline]
    pub fn insert(&mut self, prio: Prio) {
        debug_assert!((prio as usize) < CFG_PRIO_CNT);
        self.bitmap[prio as usize / 32] |= 1 << (prio % 32);
    }

    #[inline]
    pub fn remove(&mut self, prio: Prio) {
        debug_assert!((prio as usize) < CFG_PRIO_CNT);
        self.bitmap[prio as usize / 32] &= !(1 << (prio % 32));
    }

    /// Most urgent level with its bit set
    #[inline]
    pub fn get_highest(&self) -> Option<Prio> {
        self.bitmap
            .iter()
            .enumerate()
            .rev()
            .find(|&(_, &word)| word != 0)
            .map(|(idx, &word)| (idx * 32 + 31 - word.leading_zeros() as usize) as Prio)
    }

    #[inline]
    pub fn is_set(&self, prio: Prio) -> bool {
        (self.bitmap[prio as usize / 32] & (1 << (prio % 32))) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }
}

impl Default for PrioTable {
    fn default() -> Self {
        Self::new()
    }
}
