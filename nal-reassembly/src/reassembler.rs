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

//! The ReassemblyEngine, which turns lossy datagrams into complete NAL units.
//!
//! Each unit starts with a `FrameStart` datagram that declares its total size,
//! followed by `FrameContinuation` datagrams whose sequence numbers must be
//! contiguous. Loss is never repaired: a gap abandons the rest of the frame and
//! the next `FrameStart` replaces whatever was left unfinished.
//!
//! Keyframes arrive as SPS + PPS + IDR in one access unit. The parameter sets
//! are short enough to always fit in the first fragment, so they are split out
//! of it and queued as units of their own before the IDR is assembled.

use std::sync::Arc;

use crate::config::ReassemblyConfig;
use crate::frame::{AssemblyBuffer, CompletedUnit, NAL_TYPE_MASK, NAL_TYPE_SPS};
use crate::nal_queue::{NalQueue, PushOutcome};
use crate::packet::{PacketHeader, PacketKind};
use crate::start_code::find_parameter_set_boundaries;
use crate::statistics::ReassemblyStats;
use crate::{ReassemblyError, Result};

/// Offset of the NAL header byte from the start of a frame start's payload,
/// i.e. just past the leading 4-byte start code.
const NAL_HEADER_OFFSET: usize = 4;

/// What a successfully handled datagram did to the unit in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The unit reached its declared size and was handed to the queue.
    Completed,
    /// Bytes were appended; more datagrams are needed.
    Pending,
}

pub struct ReassemblyEngine {
    /// The unit being assembled. `None` after completion or a discard.
    current: Option<AssemblyBuffer>,

    /// Sequence number of the last accepted datagram of the current frame.
    last_accepted: u32,

    /// Set once a gap has been reported for the current frame, so the rest of
    /// its continuations are dropped quietly.
    discarding: bool,

    max_unit_size: usize,
    stats: ReassemblyStats,
    queue: Arc<NalQueue>,
}

impl ReassemblyEngine {
    pub fn new(queue: Arc<NalQueue>, config: &ReassemblyConfig) -> Self {
        Self {
            current: None,
            last_accepted: 0,
            discarding: false,
            max_unit_size: config.max_unit_size,
            stats: ReassemblyStats::default(),
            queue,
        }
    }

    /// The main entry point for a datagram arriving from the network.
    ///
    /// Returns `true` when the datagram completed a unit. Rejected datagrams
    /// are logged and reported as `false`; they never poison later frames.
    pub fn process_datagram(&mut self, datagram: &[u8]) -> bool {
        match self.process(datagram) {
            Ok(Progress::Completed) => true,
            Ok(Progress::Pending) => false,
            Err(ReassemblyError::SequenceGap { .. }) | Err(ReassemblyError::NoActiveUnit) => false,
            Err(e) => {
                log::warn!("Ignoring datagram: {e}");
                false
            }
        }
    }

    /// Same as [`process_datagram`](Self::process_datagram) but reports why a
    /// datagram was rejected.
    ///
    /// A datagram that carries no payload never fails for lack of a unit in
    /// progress: it has nothing to append, so it only updates the sequence
    /// tracker and reports [`Progress::Pending`]. Payload with nowhere to go
    /// is rejected, as [`ReassemblyError::BufferOverflow`] on a frame start
    /// with a zero-byte target and as [`ReassemblyError::NoActiveUnit`] on a
    /// continuation.
    pub fn process(&mut self, datagram: &[u8]) -> Result<Progress> {
        self.stats.datagrams_received += 1;
        let result = self.handle(datagram);
        if let Err(e) = &result {
            self.record_rejection(e);
        }
        result
    }

    fn handle(&mut self, datagram: &[u8]) -> Result<Progress> {
        let header = PacketHeader::parse(datagram)?;
        let mut pos = header.encoded_len();
        let is_start = header.kind() == PacketKind::FrameStart;

        match header {
            PacketHeader::FrameStart {
                sequence_number,
                frame_index,
                presentation_time,
                frame_byte_size,
            } => {
                self.last_accepted = sequence_number;

                let declared = frame_byte_size as usize;
                if declared > self.max_unit_size {
                    self.abandon_unit();
                    return Err(ReassemblyError::UnitTooLarge {
                        declared,
                        limit: self.max_unit_size,
                    });
                }

                let nal_type = datagram
                    .get(pos + NAL_HEADER_OFFSET)
                    .map(|b| b & NAL_TYPE_MASK);

                let target_size = if nal_type == Some(NAL_TYPE_SPS) {
                    let boundaries =
                        find_parameter_set_boundaries(datagram, pos + NAL_HEADER_OFFSET + 1)
                            .ok_or(ReassemblyError::MissingParameterSets)?;
                    let parameter_sets = boundaries.pps_end - pos;
                    let Some(idr_size) = declared.checked_sub(parameter_sets) else {
                        self.abandon_unit();
                        return Err(ReassemblyError::DeclaredSizeTooSmall {
                            declared,
                            parameter_sets,
                        });
                    };

                    let sps = &datagram[pos..boundaries.sps_end];
                    let pps = &datagram[boundaries.sps_end..boundaries.pps_end];
                    log::debug!(
                        "Frame {frame_index}: split SPS ({} bytes) and PPS ({} bytes)",
                        sps.len(),
                        pps.len()
                    );
                    self.emit(CompletedUnit::new(
                        sps.to_vec(),
                        presentation_time,
                        frame_index,
                    ));
                    self.emit(CompletedUnit::new(
                        pps.to_vec(),
                        presentation_time,
                        frame_index,
                    ));
                    self.stats.parameter_sets_split += 1;

                    pos = boundaries.pps_end;
                    idr_size
                } else {
                    declared
                };

                self.begin_unit(target_size, frame_index, presentation_time);
                self.discarding = false;
            }
            PacketHeader::FrameContinuation {
                sequence_number, ..
            } => {
                let expected = self.last_accepted.wrapping_add(1);
                if sequence_number != 1 && sequence_number != expected {
                    // last_accepted stays stale, so every later continuation of
                    // this frame fails here too until the next frame start.
                    return Err(ReassemblyError::SequenceGap {
                        expected,
                        actual: sequence_number,
                    });
                }
                self.last_accepted = sequence_number;
                self.discarding = false;
            }
        }

        let payload = &datagram[pos..];
        let Some(mut buffer) = self.current.take() else {
            if payload.is_empty() {
                return Ok(Progress::Pending);
            }
            if is_start {
                return Err(ReassemblyError::BufferOverflow {
                    pos: 0,
                    target: 0,
                    incoming: payload.len(),
                });
            }
            return Err(ReassemblyError::NoActiveUnit);
        };

        // On overflow the buffer is dropped here; the next frame start
        // establishes a fresh one.
        buffer.push(payload)?;

        if buffer.is_complete() {
            self.emit(buffer.into_unit());
            Ok(Progress::Completed)
        } else {
            self.current = Some(buffer);
            Ok(Progress::Pending)
        }
    }

    /// Replace the unit in progress with a fresh one of `target_size` bytes.
    fn begin_unit(&mut self, target_size: usize, frame_index: u64, presentation_time: u64) {
        self.discard_unfinished();

        // An IDR with no bytes after the parameter sets leaves nothing to assemble.
        if target_size > 0 {
            self.current = Some(AssemblyBuffer::new(
                target_size,
                frame_index,
                presentation_time,
            ));
        }
    }

    /// Drop the unit in progress for a frame start that was rejected after
    /// it claimed the sequence position. The rejected frame's continuations
    /// then find no unit instead of landing in the previous one.
    fn abandon_unit(&mut self) {
        self.discard_unfinished();
        self.discarding = true;
    }

    fn discard_unfinished(&mut self) {
        if let Some(previous) = self.current.take() {
            if !self.discarding {
                self.stats.incomplete_units_discarded += 1;
                log::debug!(
                    "Discarding unfinished unit of frame {} ({}/{} bytes)",
                    previous.frame_index(),
                    previous.pos(),
                    previous.target_size()
                );
            }
        }
    }

    fn emit(&mut self, unit: CompletedUnit) {
        self.stats.units_completed += 1;
        if self.queue.push(unit) != PushOutcome::Queued {
            self.stats.queue_drops += 1;
        }
    }

    fn record_rejection(&mut self, error: &ReassemblyError) {
        match error {
            ReassemblyError::MissingParameterSets
            | ReassemblyError::DeclaredSizeTooSmall { .. } => {
                self.stats.malformed_fragments += 1;
            }
            ReassemblyError::SequenceGap { expected, actual } => {
                self.stats.continuations_discarded += 1;
                if !self.discarding {
                    self.discarding = true;
                    self.stats.sequence_gaps += 1;
                    log::warn!(
                        "Ignore this frame because of packet loss. expected={expected} got={actual}"
                    );
                } else {
                    log::debug!("Dropping continuation {actual} of abandoned frame");
                }
            }
            ReassemblyError::NoActiveUnit => {
                self.stats.continuations_discarded += 1;
                log::debug!("Dropping continuation with no unit in progress");
            }
            ReassemblyError::BufferOverflow { .. } => {
                self.stats.buffer_overflows += 1;
            }
            ReassemblyError::Truncated { .. }
            | ReassemblyError::UnknownPacketType(_)
            | ReassemblyError::UnitTooLarge { .. }
            | ReassemblyError::InvalidConfig(_)
            | ReassemblyError::Spawn(_) => {
                self.stats.parse_errors += 1;
            }
        }
    }

    /// Drop the unit in progress and forget the sequence position.
    pub fn reset(&mut self) {
        self.current = None;
        self.last_accepted = 0;
        self.discarding = false;
    }

    /// Bytes written / declared for the unit in progress, if any.
    pub fn pending_unit(&self) -> Option<(usize, usize)> {
        self.current.as_ref().map(|b| (b.pos(), b.target_size()))
    }

    pub fn last_accepted_sequence(&self) -> u32 {
        self.last_accepted
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats.clone()
    }

    pub fn queue(&self) -> &Arc<NalQueue> {
        &self.queue
    }
}
