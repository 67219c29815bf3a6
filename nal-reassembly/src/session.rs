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

//! One streaming session: a reassembly engine and the queue it feeds.

use std::sync::Arc;

use crate::config::ReassemblyConfig;
use crate::nal_queue::NalQueue;
use crate::reassembler::{Progress, ReassemblyEngine};
use crate::statistics::ReassemblyStats;
use crate::Result;

/// Created when a stream starts and destroyed when it ends.
///
/// The network thread owns the session and feeds it datagrams. Decoder
/// threads hold clones of [`queue`](Self::queue). Ending the session shuts
/// the queue down, so those threads see `None` from `wait` and never block
/// again on this session's queue.
pub struct NalSession {
    config: ReassemblyConfig,
    queue: Arc<NalQueue>,
    engine: ReassemblyEngine,
}

impl NalSession {
    pub fn init(config: ReassemblyConfig) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(NalQueue::new(config.queue_capacity));
        let engine = ReassemblyEngine::new(queue.clone(), &config);
        log::info!(
            "NAL session started: queue_capacity={} max_unit_size={}",
            config.queue_capacity,
            config.max_unit_size
        );
        Ok(Self {
            config,
            queue,
            engine,
        })
    }

    /// Feed one datagram. Returns `true` if it completed a unit.
    pub fn process_datagram(&mut self, datagram: &[u8]) -> bool {
        self.engine.process_datagram(datagram)
    }

    pub fn process(&mut self, datagram: &[u8]) -> Result<Progress> {
        self.engine.process(datagram)
    }

    /// The queue decoder threads pull from.
    pub fn queue(&self) -> Arc<NalQueue> {
        self.queue.clone()
    }

    /// Drop queued units and the unit in progress, e.g. after a seek. The
    /// session stays open and resynchronizes on the next frame start.
    pub fn flush(&mut self) {
        self.queue.clear();
        self.engine.reset();
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.engine.stats()
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    /// End the session. Equivalent to dropping it.
    pub fn destroy(self) {}
}

impl Drop for NalSession {
    fn drop(&mut self) {
        let stats = self.engine.stats();
        log::info!(
            "NAL session ended: datagrams={} units={} lost={}",
            stats.datagrams_received,
            stats.units_completed,
            stats.frames_lost()
        );
        self.queue.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketHeader;
    use crate::ReassemblyError;

    fn frame_start(seq: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        PacketHeader::FrameStart {
            sequence_number: seq,
            frame_index: 0,
            presentation_time: 0,
            frame_byte_size: payload.len() as u32,
        }
        .encode(&mut out);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn init_rejects_invalid_config() {
        let config = ReassemblyConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            NalSession::init(config),
            Err(ReassemblyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn destroy_shuts_the_queue_down() {
        let session = NalSession::init(ReassemblyConfig::default()).unwrap();
        let queue = session.queue();
        assert_eq!(queue.capacity(), 10);

        session.destroy();
        assert!(queue.is_closed());
        assert_eq!(queue.wait(), None);
    }

    #[test]
    fn flush_clears_queue_and_pending_unit() {
        let mut session = NalSession::init(ReassemblyConfig::default()).unwrap();
        let queue = session.queue();

        assert!(session.process_datagram(&frame_start(1, &[0, 0, 0, 1, 0x41, 0x9A])));
        let mut partial = Vec::new();
        PacketHeader::FrameStart {
            sequence_number: 2,
            frame_index: 1,
            presentation_time: 0,
            frame_byte_size: 100,
        }
        .encode(&mut partial);
        partial.extend_from_slice(&[0, 0, 0, 1, 0x41]);
        assert!(!session.process_datagram(&partial));

        session.flush();
        assert!(queue.is_empty());
        assert!(!queue.is_closed());
        assert_eq!(session.stats().datagrams_received, 2);
    }
}
