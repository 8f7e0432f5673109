use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Start the named job and re-arm it for the next cron instant.
    Start,
    /// A withdrawn event; drained on its due time and discarded.
    Cancel,
    /// Stop the scheduler task.
    Exit,
}

/// An entry of the scheduler's event queue.
#[derive(Debug, Clone)]
pub struct SchedulerEvent {
    pub kind: EventKind,
    /// Instant at which the event becomes due.
    pub due: DateTime<Utc>,
    /// Name of the affected job; unused for `Exit`.
    pub job: String,
}

impl SchedulerEvent {
    pub fn start(due: DateTime<Utc>, job: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Start,
            due,
            job: job.into(),
        }
    }

    pub fn exit() -> Self {
        Self {
            kind: EventKind::Exit,
            due: Utc::now(),
            job: String::new(),
        }
    }
}

// Ordered by due time only, reversed so that `BinaryHeap` pops the earliest
// event first. Events due at the same instant fire in arbitrary order.
impl PartialEq for SchedulerEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}

impl Eq for SchedulerEvent {}

impl PartialOrd for SchedulerEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchedulerEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.due.cmp(&self.due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_heap_pops_earliest_first() {
        let now = Utc::now();
        let mut heap = BinaryHeap::new();
        heap.push(SchedulerEvent::start(now + chrono::Duration::seconds(30), "late"));
        heap.push(SchedulerEvent::start(now, "immediate"));
        heap.push(SchedulerEvent::start(now + chrono::Duration::seconds(5), "soon"));

        assert_eq!(heap.pop().unwrap().job, "immediate");
        assert_eq!(heap.pop().unwrap().job, "soon");
        assert_eq!(heap.pop().unwrap().job, "late");
    }
}
