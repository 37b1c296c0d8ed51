use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Priority queue of pending transitions, ordered by `(fire_at, seq)`.
///
/// The sequence number makes tasks due at the same instant pop in the order
/// they were scheduled.
#[derive(Debug)]
pub struct TaskQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
}

#[derive(Debug)]
struct Entry<T> {
    fire_at: DateTime<Utc>,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.fire_at, self.seq).cmp(&(other.fire_at, other.seq))
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `task` at `fire_at`. Returns its sequence number.
    pub fn push(&mut self, fire_at: DateTime<Utc>, task: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { fire_at, seq, task }));
        seq
    }

    /// Fire time of the earliest pending task.
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(e)| e.fire_at)
    }

    /// Pop the earliest task if it is due at `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, T)> {
        if self.next_fire_at()? > now {
            return None;
        }
        self.heap.pop().map(|Reverse(e)| (e.fire_at, e.task))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
