/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The common interface a decoder uses to pull NAL units.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::frame::{CompletedUnit, NAL_TYPE_IDR, NAL_TYPE_MASK, NAL_TYPE_SLICE};
use crate::nal_queue::NalQueue;
use crate::start_code::start_codes;

/// A trait that abstracts over where completed units come from
/// (the live reassembly queue, or a canned stream for decoder testing).
pub trait NalSource: Send + Sync {
    /// Number of units currently available.
    fn size(&self) -> usize;

    /// Block until a unit is available. `None` means the source is finished
    /// and will never yield again.
    fn wait(&self) -> Option<CompletedUnit>;

    /// Take the next unit if one is available right now.
    fn try_pop(&self) -> Option<CompletedUnit>;

    /// Look at the next unit without taking it.
    fn peek(&self) -> Option<CompletedUnit>;

    /// Drop every pending unit.
    fn flush(&self);

    /// Finish the source and release every thread blocked in `wait`.
    fn notify_waiting_thread(&self);
}

impl NalSource for NalQueue {
    fn size(&self) -> usize {
        NalQueue::size(self)
    }

    fn wait(&self) -> Option<CompletedUnit> {
        NalQueue::wait(self)
    }

    fn try_pop(&self) -> Option<CompletedUnit> {
        NalQueue::try_pop(self)
    }

    fn peek(&self) -> Option<CompletedUnit> {
        NalQueue::peek(self)
    }

    fn flush(&self) {
        self.clear()
    }

    fn notify_waiting_thread(&self) {
        self.shutdown()
    }
}

#[derive(Debug, Default)]
struct ReplayState {
    units: VecDeque<CompletedUnit>,
    stopped: bool,
}

/// Serves a fixed list of units, as if they had been reassembled from the
/// network. `wait` never blocks: it returns `None` once the list is exhausted.
#[derive(Debug, Default)]
pub struct ReplaySource {
    state: Mutex<ReplayState>,
}

impl ReplaySource {
    pub fn new(units: impl IntoIterator<Item = CompletedUnit>) -> Self {
        Self {
            state: Mutex::new(ReplayState {
                units: units.into_iter().collect(),
                stopped: false,
            }),
        }
    }

    /// Split an Annex-B byte stream on 4-byte start codes.
    ///
    /// Units keep their leading start code. Parameter sets share the frame
    /// index of the slice that follows them; the index advances after each
    /// coded slice. `frame_interval` is added to the presentation time per
    /// frame. Bytes before the first start code are ignored.
    pub fn from_annex_b(stream: &[u8], frame_interval: u64) -> Self {
        let mut boundaries: Vec<usize> = start_codes(stream, 0).collect();
        boundaries.push(stream.len());

        let mut frame_index = 0u64;
        let mut units = Vec::with_capacity(boundaries.len());
        for window in boundaries.windows(2) {
            let nal = &stream[window[0]..window[1]];
            units.push(CompletedUnit::new(
                nal.to_vec(),
                frame_index * frame_interval,
                frame_index,
            ));
            let nal_type = nal.get(4).map(|b| b & NAL_TYPE_MASK);
            if matches!(nal_type, Some(NAL_TYPE_SLICE) | Some(NAL_TYPE_IDR)) {
                frame_index += 1;
            }
        }
        Self::new(units)
    }

    fn lock(&self) -> MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NalSource for ReplaySource {
    fn size(&self) -> usize {
        self.lock().units.len()
    }

    fn wait(&self) -> Option<CompletedUnit> {
        let mut state = self.lock();
        if state.stopped {
            return None;
        }
        state.units.pop_front()
    }

    fn try_pop(&self) -> Option<CompletedUnit> {
        self.wait()
    }

    fn peek(&self) -> Option<CompletedUnit> {
        self.lock().units.front().cloned()
    }

    fn flush(&self) {
        self.lock().units.clear();
    }

    fn notify_waiting_thread(&self) {
        let mut state = self.lock();
        state.units.clear();
        state.stopped = true;
    }
}
