//! Task identifier type

use core::fmt;

/// Identifier of a top-level submission.
///
/// Combines the index of the processor that owns the task with a sequence
/// number handed out by that processor's submission queue. A task never
/// migrates, so the processor part stays valid for its whole lifetime.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    processor: u32,
    seq: u64,
}

impl TaskId {
    /// Create a task id from its parts
    #[inline]
    pub const fn new(processor: u32, seq: u64) -> Self {
        TaskId { processor, seq }
    }

    /// Index of the owning processor
    #[inline]
    pub const fn processor(self) -> usize {
        self.processor as usize
    }

    /// Per-processor sequence number
    #[inline]
    pub const fn seq(self) -> u64 {
        self.seq
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId(p{}:{})", self.processor, self.seq)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}:{}", self.processor, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_parts() {
        let id = TaskId::new(3, 42);
        assert_eq!(id.processor(), 3);
        assert_eq!(id.seq(), 42);
    }

    #[test]
    fn test_task_id_display() {
        let id = TaskId::new(1, 7);
        assert_eq!(format!("{}", id), "p1:7");
        assert_eq!(format!("{:?}", id), "TaskId(p1:7)");
    }

    #[test]
    fn test_task_id_ordering() {
        assert!(TaskId::new(0, 1) < TaskId::new(0, 2));
        assert!(TaskId::new(0, 9) < TaskId::new(1, 0));
    }
}
