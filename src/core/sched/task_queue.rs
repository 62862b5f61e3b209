//! Priority-ordered task queue
//!
//! One FIFO list per priority level plus a bitmap of non-empty levels. The
//! same structure is used for the ready queue and for the waiters of every
//! kernel object, so a task can move between them without reallocation.

use core::ptr::NonNull;

use crate::config::CFG_PRIO_CNT;
use crate::critical::CriticalSection;
use crate::prio::PrioTable;
use crate::task::{tcb, TaskRef};
use crate::types::Prio;

/// Tasks of a single priority level, oldest at the head
#[derive(Clone, Copy)]
struct TaskList {
    head: Option<TaskRef>,
    tail: Option<TaskRef>,
}

impl TaskList {
    const fn new() -> Self {
        TaskList { head: None, tail: None }
    }
}

pub struct TaskQueue {
    prio_tbl: PrioTable,
    lists: [TaskList; CFG_PRIO_CNT],
}

impl TaskQueue {
    pub const fn new() -> Self {
        TaskQueue {
            prio_tbl: PrioTable::new(),
            lists: [TaskList::new(); CFG_PRIO_CNT],
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prio_tbl.is_empty()
    }

    /// Most urgent priority present
    #[inline]
    pub fn peek_prio(&self) -> Option<Prio> {
        self.prio_tbl.get_highest()
    }

    /// Oldest task at the most urgent priority, left in place
    pub fn peek(&self) -> Option<TaskRef> {
        self.peek_prio().and_then(|prio| self.lists[prio as usize].head)
    }

    /// Append `task` behind every task of its current priority.
    ///
    /// The task must not be a member of any queue.
    pub fn enqueue(&mut self, cs: &CriticalSection<'_>, task: TaskRef) {
        let this = NonNull::from(&mut *self);
        let t = tcb(task, cs);
        let prio = t.prio_current;
        let list = &mut self.lists[prio as usize];

        t.queue = Some(this);
        t.next = None;
        t.prev = list.tail;

        match list.tail {
            Some(tail) => tcb(tail, cs).next = Some(task),
            None => list.head = Some(task),
        }
        list.tail = Some(task);

        self.prio_tbl.insert(prio);
    }

    /// Remove the oldest task of the most urgent priority
    pub fn dequeue(&mut self, cs: &CriticalSection<'_>) -> Option<TaskRef> {
        let prio = self.peek_prio()?;
        self.dequeue_prio(cs, prio)
    }

    /// Remove the oldest task of exactly `prio`
    pub fn dequeue_prio(&mut self, cs: &CriticalSection<'_>, prio: Prio) -> Option<TaskRef> {
        let task = self.lists[prio as usize].head?;
        self.remove(cs, task);
        Some(task)
    }

    /// Take `task` out of whichever queue holds it. No-op if it is in none.
    pub fn unlink(cs: &CriticalSection<'_>, task: TaskRef) {
        if let Some(queue) = tcb(task, cs).queue {
            // SAFETY: queues live inside kernel objects that outlive their members
            unsafe { &mut *queue.as_ptr() }.remove(cs, task);
        }
    }

    fn remove(&mut self, cs: &CriticalSection<'_>, task: TaskRef) {
        let t = tcb(task, cs);
        let (prev, next, prio) = (t.prev, t.next, t.prio_current);
        t.prev = None;
        t.next = None;
        t.queue = None;

        let list = &mut self.lists[prio as usize];
        match prev {
            Some(p) => tcb(p, cs).next = next,
            None => list.head = next,
        }
        match next {
            Some(n) => tcb(n, cs).prev = prev,
            None => list.tail = prev,
        }

        if list.head.is_none() {
            self.prio_tbl.remove(prio);
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::boxed::Box;
    use std::vec::Vec;

    use super::*;
    use crate::kernel::Kernel;
    use crate::task::Task;

    fn task_at(kernel: &Kernel, prio: Prio) -> TaskRef {
        let task: &'static Task = Box::leak(Box::new(Task::new()));
        kernel.critical_section(|cs| {
            let t = task.tcb.get(cs);
            t.prio_base = prio;
            t.prio_current = prio;
        });
        task.link()
    }

    fn drain(kernel: &Kernel, queue: &mut TaskQueue) -> Vec<TaskRef> {
        kernel.critical_section(|cs| core::iter::from_fn(|| queue.dequeue(cs)).collect())
    }

    #[test]
    fn dequeues_most_urgent_first_and_fifo_within_level() {
        let kernel = Kernel::new();
        let mut queue = TaskQueue::new();
        let a = task_at(&kernel, 2);
        let b = task_at(&kernel, 5);
        let c = task_at(&kernel, 2);
        let d = task_at(&kernel, 5);

        kernel.critical_section(|cs| {
            for t in [a, b, c, d] {
                queue.enqueue(cs, t);
            }
        });

        assert_eq!(queue.peek_prio(), Some(5));
        assert_eq!(queue.peek(), Some(b));
        assert_eq!(drain(&kernel, &mut queue), [b, d, a, c]);
        assert!(queue.is_empty());
    }

    #[test]
    fn unlink_from_middle_keeps_order() {
        let kernel = Kernel::new();
        let mut queue = TaskQueue::new();
        let a = task_at(&kernel, 3);
        let b = task_at(&kernel, 3);
        let c = task_at(&kernel, 3);

        kernel.critical_section(|cs| {
            for t in [a, b, c] {
                queue.enqueue(cs, t);
            }
            TaskQueue::unlink(cs, b);
            assert!(tcb(b, cs).queue.is_none());
            // unlinking twice is harmless
            TaskQueue::unlink(cs, b);
        });

        assert_eq!(drain(&kernel, &mut queue), [a, c]);
    }

    #[test]
    fn dequeue_prio_pulls_only_that_level() {
        let kernel = Kernel::new();
        let mut queue = TaskQueue::new();
        let low = task_at(&kernel, 1);
        let high = task_at(&kernel, 7);

        kernel.critical_section(|cs| {
            queue.enqueue(cs, low);
            queue.enqueue(cs, high);
            assert_eq!(queue.dequeue_prio(cs, 4), None);
            assert_eq!(queue.dequeue_prio(cs, 1), Some(low));
        });

        assert_eq!(queue.peek_prio(), Some(7));
        assert_eq!(drain(&kernel, &mut queue), [high]);
    }
}
