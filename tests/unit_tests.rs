//! Unit tests for core RTOS modules
//!
//! These tests run on the host (not embedded target) to verify
//! the core algorithms work correctly.

#[cfg(test)]
mod prio_tests {
    use tickos::config::CFG_PRIO_CNT;
    use tickos::prio::PrioTable;

    #[test]
    fn test_empty_table() {
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.get_highest(), None);
    }

    #[test]
    fn test_single_priority() {
        let mut table = PrioTable::new();

        table.insert(5);
        assert!(!table.is_empty());
        assert!(table.is_set(5));
        assert!(!table.is_set(4));
        assert_eq!(table.get_highest(), Some(5));

        table.remove(5);
        assert!(table.is_empty());
    }

    #[test]
    fn test_multiple_priorities() {
        let mut table = PrioTable::new();

        // Insert in random order
        table.insert(2);
        table.insert(9);
        table.insert(0);
        table.insert(15);
        table.insert(7);

        // Highest (largest number) wins
        assert_eq!(table.get_highest(), Some(15));

        table.remove(15);
        assert_eq!(table.get_highest(), Some(9));

        table.remove(9);
        assert_eq!(table.get_highest(), Some(7));

        table.remove(7);
        assert_eq!(table.get_highest(), Some(2));

        table.remove(2);
        assert_eq!(table.get_highest(), Some(0));

        table.remove(0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_all_priorities() {
        let mut table = PrioTable::new();

        for i in 0..CFG_PRIO_CNT {
            table.insert(i as u8);
        }

        // Remove from most to least urgent
        for i in (0..CFG_PRIO_CNT).rev() {
            assert_eq!(table.get_highest(), Some(i as u8));
            table.remove(i as u8);
        }

        assert!(table.is_empty());
    }

    #[test]
    fn test_boundary_priorities() {
        let mut table = PrioTable::new();
        let top = (CFG_PRIO_CNT - 1) as u8;

        table.insert(0);
        assert_eq!(table.get_highest(), Some(0));

        table.insert(top);
        assert_eq!(table.get_highest(), Some(top));

        table.remove(top);
        assert_eq!(table.get_highest(), Some(0));
    }

    #[test]
    fn test_duplicate_insert_remove() {
        let mut table = PrioTable::new();

        // The table tracks occupancy, not a count per level
        table.insert(10);
        table.insert(10);
        assert_eq!(table.get_highest(), Some(10));

        table.remove(10);
        assert!(table.is_empty());
    }
}

#[cfg(test)]
mod error_tests {
    use tickos::error::{Fatal, OsError};
    use tickos::types::PendStatus;

    #[test]
    fn test_pend_status_maps_to_result() {
        assert_eq!(PendStatus::Ok.into_result(), Ok(()));
        assert_eq!(PendStatus::Timeout.into_result(), Err(OsError::Timeout));
        assert_eq!(PendStatus::Destroyed.into_result(), Err(OsError::Destroyed));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(OsError::WouldBlock.to_string(), "would block");
        assert_eq!(OsError::Timeout.to_string(), "timeout");
        assert_eq!(Fatal::MutexRelock.to_string(), "mutex relock by owner");
        assert_eq!(Fatal::IsrContext.to_string(), "blocking call from interrupt context");
    }
}

#[cfg(test)]
mod types_tests {
    use tickos::types::*;

    #[test]
    fn test_task_state_enum() {
        let state = TaskState::Ready;
        assert_eq!(state, TaskState::Ready);
        assert_ne!(state, TaskState::Wait);
    }

    #[test]
    fn test_fresh_task_is_unused() {
        let kernel = tickos::Kernel::new();
        let task = tickos::Task::new();
        assert_eq!(task.state(&kernel), TaskState::Unused);
        assert!(kernel.current_task().is_none());
        assert!(!kernel.is_running());
    }

    #[test]
    fn test_ticks_diff_wraps() {
        assert_eq!(tickos::Kernel::ticks_diff(Ticks::MAX - 1, 3), 5);
        assert_eq!(tickos::Kernel::ticks_diff(10, 10), 0);
    }
}

#[cfg(test)]
mod config_tests {
    use tickos::config::*;

    #[test]
    fn test_config_values() {
        assert!(CFG_PRIO_CNT >= 8, "Need at least 8 priority levels");
        assert!(CFG_PRIO_CNT <= 256, "Too many priority levels");

        assert!(CFG_STK_SIZE_MIN >= 32, "Stack too small");
        assert!(CFG_IDLE_STK_SIZE >= CFG_STK_SIZE_MIN);

        assert!(CFG_TICK_RATE_HZ >= 10, "Tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "Tick rate too fast");

        // Idle priority should be least urgent
        assert_eq!(CFG_PRIO_IDLE, 0);
        assert_ne!(TIMEOUT_TRY, TIMEOUT_INFINITE);
    }
}
