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

//! # NAL reassembly
//!
//! Rebuilds H.264 NAL units from video datagrams that may be lost or
//! truncated, and hands completed units to decoder threads through a bounded,
//! thread-safe queue.
//!
//! Each datagram carries a small header followed by a slice of one unit. The
//! first fragment of a keyframe carries SPS, PPS and the start of the IDR
//! slice back to back; those are split into three units. A gap in sequence
//! numbers abandons the frame in progress until the next frame start.

pub mod config;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod nal_queue;
pub mod packet;
pub mod packetizer;
pub mod reassembler;
pub mod session;
pub mod source;
pub mod start_code;
pub mod statistics;

pub use config::ReassemblyConfig;
pub use consumer::NalConsumer;
pub use error::{ReassemblyError, Result};
pub use frame::CompletedUnit;
pub use nal_queue::{NalQueue, PushOutcome, WaitOutcome};
pub use packet::PacketHeader;
pub use packetizer::FramePacketizer;
pub use reassembler::{Progress, ReassemblyEngine};
pub use session::NalSession;
pub use source::{NalSource, ReplaySource};
pub use statistics::ReassemblyStats;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_functionality() {
        let session = NalSession::init(ReassemblyConfig::default()).unwrap();

        assert_eq!(session.stats(), ReassemblyStats::default());
        assert!(session.queue().is_empty());
    }
}
