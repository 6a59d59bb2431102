//! FIFO record buffers (C3): append-at-tail, take-from-head, `len` inspection.
//!
//! Mutated by producers (append) and the flush loop (take). A `parking_lot`
//! mutex gives exclusive-access discipline without ever being held across an
//! `.await` point — the same discipline the teacher crate's producer batching
//! uses for `ProducerState` (see `send_batch_locked`).

use parking_lot::Mutex;
use std::collections::VecDeque;

pub struct RecordBuffer<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> RecordBuffer<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn append(&self, item: T) {
        self.inner.lock().push_back(item);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drain a single byte-budgeted batch from the head of the buffer.
    ///
    /// Implements `MakeBatch` (C4 §4.2): peek, drop-if-oversize with a
    /// breadcrumb via `on_drop`, stop before exceeding `max_bytes`, otherwise
    /// pop into the batch. Every record removed from the buffer ends up
    /// either in the returned batch or passed to `on_drop` — never silently
    /// vanishes.
    pub fn take_batch(
        &self,
        max_bytes: usize,
        size_of: impl Fn(&T) -> usize,
        mut on_drop: impl FnMut(&T, usize),
    ) -> Vec<T> {
        let mut guard = self.inner.lock();
        let mut batch = Vec::new();
        let mut current_bytes = 0usize;

        loop {
            let Some(head) = guard.front() else {
                break;
            };
            let n = size_of(head);

            if n > max_bytes {
                let dropped = guard.pop_front().expect("front just peeked");
                on_drop(&dropped, n);
                continue;
            }

            if current_bytes + n > max_bytes {
                break;
            }

            let item = guard.pop_front().expect("front just peeked");
            current_bytes += n;
            batch.push(item);
        }

        batch
    }
}

impl<T> Default for RecordBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_of_usize(v: &usize) -> usize {
        *v
    }

    #[test]
    fn batch_stops_before_exceeding_budget() {
        let buf = RecordBuffer::new();
        buf.append(30usize);
        buf.append(40usize);
        buf.append(40usize);

        let mut dropped = Vec::new();
        let batch = buf.take_batch(60, size_of_usize, |item, n| dropped.push((*item, n)));

        assert_eq!(batch, vec![30, 40]);
        assert!(dropped.is_empty());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn oversize_record_is_dropped_not_batched() {
        let buf = RecordBuffer::new();
        buf.append(5usize);
        buf.append(101usize);
        buf.append(5usize);

        let mut dropped = Vec::new();
        let batch = buf.take_batch(100, size_of_usize, |item, n| dropped.push((*item, n)));

        assert_eq!(batch, vec![5, 5]);
        assert_eq!(dropped, vec![(101, 101)]);
        assert!(buf.is_empty());
    }

    #[test]
    fn record_exactly_at_budget_is_batched_alone() {
        let buf = RecordBuffer::new();
        buf.append(100usize);
        buf.append(1usize);

        let batch = buf.take_batch(100, size_of_usize, |_, _| panic!("no drops expected"));
        assert_eq!(batch, vec![100]);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn empty_buffer_yields_empty_batch() {
        let buf: RecordBuffer<usize> = RecordBuffer::new();
        let batch = buf.take_batch(100, size_of_usize, |_, _| panic!("no drops expected"));
        assert!(batch.is_empty());
    }
}
