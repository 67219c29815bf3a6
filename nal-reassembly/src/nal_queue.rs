/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! The bounded handoff queue between the reassembly engine and the decoder.
//!
//! A single mutex guards the units and the closed flag; one condition variable
//! is broadcast on every push and on shutdown so that no waiter misses a
//! wakeup when several decoder threads share the queue.
//!
//! The producer never blocks. When the queue is full the *new* unit is
//! dropped, so the units already queued keep their order and the decoder sees
//! the oldest data first.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::frame::CompletedUnit;

/// Return codes for [`NalQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    DroppedFull,
    DroppedClosed,
}

/// Result of [`NalQueue::wait_timeout`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Unit(CompletedUnit),
    TimedOut,
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    units: VecDeque<CompletedUnit>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
pub struct NalQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl NalQueue {
    /// Create an open queue holding at most `capacity` units.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                units: VecDeque::with_capacity(capacity),
                ..Default::default()
            }),
            not_empty: Condvar::new(),
        }
    }

    // A consumer that panicked while holding the lock cannot leave the deque
    // half-modified, so the poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `unit` at the tail and wake all waiters, or drop it if the
    /// queue is full or shut down.
    pub fn push(&self, unit: CompletedUnit) -> PushOutcome {
        let mut state = self.lock();
        if state.closed {
            state.dropped += 1;
            log::debug!(
                "NAL queue is closed. Discarding unit of frame {}",
                unit.frame_index()
            );
            return PushOutcome::DroppedClosed;
        }
        if state.units.len() >= self.capacity {
            state.dropped += 1;
            log::warn!(
                "NAL queue is too large. Discard. Size={} Limit={}",
                state.units.len(),
                self.capacity
            );
            return PushOutcome::DroppedFull;
        }
        state.units.push_back(unit);
        self.not_empty.notify_all();
        PushOutcome::Queued
    }

    /// Block until a unit is available and remove it.
    ///
    /// Returns `None` once the queue has been shut down; every later call
    /// returns `None` immediately.
    pub fn wait(&self) -> Option<CompletedUnit> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(unit) = state.units.pop_front() {
                return Some(unit);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let state = self.lock();
        let (mut state, _) = self
            .not_empty
            .wait_timeout_while(state, timeout, |s| !s.closed && s.units.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return WaitOutcome::Closed;
        }
        match state.units.pop_front() {
            Some(unit) => WaitOutcome::Unit(unit),
            None => WaitOutcome::TimedOut,
        }
    }

    /// Remove the head without blocking.
    pub fn try_pop(&self) -> Option<CompletedUnit> {
        self.lock().units.pop_front()
    }

    /// The head of the queue without removing it.
    ///
    /// The returned unit shares its payload with the queued entry, so a
    /// concurrent `try_pop` or `clear` from another consumer cannot invalidate
    /// it. It is still only a view: the queued entry is delivered normally to
    /// whichever consumer removes it.
    pub fn peek(&self) -> Option<CompletedUnit> {
        self.lock().units.front().cloned()
    }

    pub fn size(&self) -> usize {
        self.lock().units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Units refused by `push` since the queue was created.
    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped
    }

    /// Remove and release every queued unit.
    pub fn clear(&self) {
        let mut state = self.lock();
        let flushed = state.units.len();
        state.units.clear();
        if flushed > 0 {
            log::debug!("Flushed {flushed} units from NAL queue");
        }
    }

    /// Clear the queue, close it for good and release every blocked waiter.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.units.clear();
        if !state.closed {
            log::info!("NAL queue shut down");
        }
        state.closed = true;
        self.not_empty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn unit(frame_index: u64) -> CompletedUnit {
        CompletedUnit::new(vec![frame_index as u8; 4], frame_index * 1000, frame_index)
    }

    #[test]
    fn test_fifo_order() {
        let queue = NalQueue::new(10);
        for i in 0..3 {
            assert_eq!(queue.push(unit(i)), PushOutcome::Queued);
        }
        assert_eq!(queue.size(), 3);
        for i in 0..3 {
            assert_eq!(queue.try_pop().unwrap().frame_index(), i);
        }
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_overflow_drops_newest() {
        let queue = NalQueue::new(10);
        for i in 0..10 {
            assert_eq!(queue.push(unit(i)), PushOutcome::Queued);
        }
        assert_eq!(queue.push(unit(10)), PushOutcome::DroppedFull);

        assert_eq!(queue.size(), 10);
        assert_eq!(queue.dropped_count(), 1);
        let kept: Vec<u64> = std::iter::from_fn(|| queue.try_pop())
            .map(|u| u.frame_index())
            .collect();
        assert_eq!(kept, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let queue = NalQueue::new(4);
        assert!(queue.peek().is_none());
        queue.push(unit(5));
        queue.push(unit(6));

        let peeked = queue.peek().unwrap();
        assert_eq!(queue.size(), 2);
        let popped = queue.try_pop().unwrap();
        assert_eq!(peeked, popped);
    }

    #[test]
    fn test_peeked_unit_survives_removal() {
        let queue = NalQueue::new(4);
        queue.push(unit(1));

        let peeked = queue.peek().unwrap();
        queue.clear();

        assert!(queue.is_empty());
        assert_eq!(peeked.data().as_ref(), &[1, 1, 1, 1]);
    }

    #[test]
    fn test_round_trip_preserves_unit() {
        let queue = NalQueue::new(2);
        let original = CompletedUnit::new(vec![0, 0, 0, 1, 0x65, 0xAB, 0xCD], 16_666_667, 77);
        queue.push(original.clone());

        let received = queue.wait().unwrap();
        assert_eq!(received.data(), original.data());
        assert_eq!(received.presentation_time(), 16_666_667);
        assert_eq!(received.frame_index(), 77);
    }

    #[test]
    fn test_shutdown_is_permanent() {
        let queue = NalQueue::new(4);
        queue.push(unit(1));
        queue.shutdown();
        queue.shutdown();

        assert!(queue.is_closed());
        assert_eq!(queue.size(), 0);
        assert_eq!(queue.wait(), None);
        assert_eq!(queue.wait_timeout(Duration::from_secs(5)), WaitOutcome::Closed);
        assert_eq!(queue.push(unit(2)), PushOutcome::DroppedClosed);
        assert_eq!(queue.wait(), None);
    }

    #[test]
    fn test_wait_timeout_expires_on_empty_queue() {
        let queue = NalQueue::new(4);
        assert_eq!(
            queue.wait_timeout(Duration::from_millis(10)),
            WaitOutcome::TimedOut
        );
        queue.push(unit(3));
        assert_eq!(
            queue.wait_timeout(Duration::from_millis(10)),
            WaitOutcome::Unit(unit(3))
        );
    }

    #[test]
    fn test_wait_wakes_on_push() {
        let queue = Arc::new(NalQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait())
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(unit(9));

        let received = consumer.join().unwrap();
        assert_eq!(received.map(|u| u.frame_index()), Some(9));
    }

    #[test]
    fn test_shutdown_releases_all_waiters() {
        let queue = Arc::new(NalQueue::new(4));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        queue.shutdown();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), None);
        }
    }
}
