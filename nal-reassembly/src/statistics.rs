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

use serde::{Deserialize, Serialize};

/// Counters kept by the reassembly engine for the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassemblyStats {
    /// Every datagram handed to the engine, accepted or not.
    pub datagrams_received: u64,
    /// Units reassembled, including SPS/PPS split out of keyframes, whether
    /// or not the queue accepted them.
    pub units_completed: u64,
    /// Keyframe first fragments split into SPS + PPS + IDR.
    pub parameter_sets_split: u64,
    /// Keyframe first fragments rejected because SPS/PPS could not be found.
    pub malformed_fragments: u64,
    /// Frames abandoned because a sequence gap was detected.
    pub sequence_gaps: u64,
    /// Continuations ignored while waiting for the next frame start.
    pub continuations_discarded: u64,
    /// Units discarded because a fragment overflowed the declared size.
    pub buffer_overflows: u64,
    /// Unfinished units replaced by a new frame start.
    pub incomplete_units_discarded: u64,
    /// Datagrams whose header could not be parsed or was out of bounds.
    pub parse_errors: u64,
    /// Completed units the queue refused because it was full or closed.
    pub queue_drops: u64,
}

impl ReassemblyStats {
    /// Units lost to any discard path, not counting individual continuations.
    pub fn frames_lost(&self) -> u64 {
        self.malformed_fragments
            + self.sequence_gaps
            + self.buffer_overflows
            + self.incomplete_units_discarded
            + self.queue_drops
    }
}
