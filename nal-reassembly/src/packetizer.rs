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

//! Sender side: split encoded access units into datagrams the
//! [`ReassemblyEngine`](crate::reassembler::ReassemblyEngine) accepts.

use bytes::{BufMut, Bytes, BytesMut};

use crate::frame::{NAL_TYPE_MASK, NAL_TYPE_SPS};
use crate::packet::PacketHeader;
use crate::start_code::find_parameter_set_boundaries;
use crate::{ReassemblyError, Result};

/// Splits Annex-B access units into one frame start plus continuations.
///
/// Sequence numbers are global across frames and start at 1. A keyframe's
/// first datagram always carries the whole SPS and PPS plus the IDR start
/// code, even if that exceeds `max_payload`.
#[derive(Debug)]
pub struct FramePacketizer {
    max_payload: usize,
    next_sequence: u32,
    next_frame_index: u64,
}

impl FramePacketizer {
    /// `max_payload` is the number of access unit bytes carried per datagram,
    /// not counting the header.
    pub fn new(max_payload: usize) -> Result<Self> {
        if max_payload == 0 {
            return Err(ReassemblyError::InvalidConfig(
                "max_payload must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_payload,
            next_sequence: 1,
            next_frame_index: 0,
        })
    }

    pub fn packetize(&mut self, access_unit: &[u8], presentation_time: u64) -> Result<Vec<Bytes>> {
        let frame_byte_size =
            u32::try_from(access_unit.len()).map_err(|_| ReassemblyError::UnitTooLarge {
                declared: access_unit.len(),
                limit: u32::MAX as usize,
            })?;
        let frame_index = self.next_frame_index;
        self.next_frame_index += 1;

        let first_len = self.first_fragment_len(access_unit);
        let (first, mut rest) = access_unit.split_at(first_len);

        let mut datagrams = Vec::with_capacity(1 + rest.len().div_ceil(self.max_payload));
        let header = PacketHeader::FrameStart {
            sequence_number: self.take_sequence(),
            frame_index,
            presentation_time,
            frame_byte_size,
        };
        datagrams.push(Self::datagram(header, first));

        while !rest.is_empty() {
            let (chunk, tail) = rest.split_at(self.max_payload.min(rest.len()));
            let header = PacketHeader::FrameContinuation {
                sequence_number: self.take_sequence(),
                frame_index,
            };
            datagrams.push(Self::datagram(header, chunk));
            rest = tail;
        }

        log::trace!(
            "Frame {frame_index}: {} bytes in {} datagrams",
            access_unit.len(),
            datagrams.len()
        );
        Ok(datagrams)
    }

    /// Sequence number the next datagram will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    fn first_fragment_len(&self, access_unit: &[u8]) -> usize {
        let is_keyframe = access_unit
            .get(4)
            .is_some_and(|b| b & NAL_TYPE_MASK == NAL_TYPE_SPS);
        let minimum = if is_keyframe {
            find_parameter_set_boundaries(access_unit, 5)
                .map(|b| b.pps_end + 4)
                .unwrap_or(0)
        } else {
            0
        };
        self.max_payload.max(minimum).min(access_unit.len())
    }

    fn take_sequence(&mut self) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    fn datagram(header: PacketHeader, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(header.encoded_len() + payload.len());
        header.encode(&mut out);
        out.put_slice(payload);
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FRAME_START_HEADER_SIZE;

    fn keyframe() -> Vec<u8> {
        let mut au = vec![0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F, 0xAB];
        au.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80]);
        au.extend_from_slice(&[0, 0, 0, 1, 0x65]);
        au.extend(std::iter::repeat(0x5A).take(40));
        au
    }

    #[test]
    fn zero_payload_is_rejected() {
        assert!(matches!(
            FramePacketizer::new(0),
            Err(ReassemblyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn splits_into_start_and_continuations() {
        let mut packetizer = FramePacketizer::new(10).unwrap();
        let au: Vec<u8> = (0..25).collect();
        let datagrams = packetizer.packetize(&au, 3000).unwrap();

        assert_eq!(datagrams.len(), 3);
        let headers: Vec<PacketHeader> = datagrams
            .iter()
            .map(|d| PacketHeader::parse(d).unwrap())
            .collect();
        assert_eq!(
            headers[0],
            PacketHeader::FrameStart {
                sequence_number: 1,
                frame_index: 0,
                presentation_time: 3000,
                frame_byte_size: 25,
            }
        );
        assert_eq!(headers[1].sequence_number(), 2);
        assert_eq!(headers[2].sequence_number(), 3);
        assert_eq!(datagrams[2].len() - headers[2].encoded_len(), 5);
    }

    #[test]
    fn sequence_continues_across_frames() {
        let mut packetizer = FramePacketizer::new(4).unwrap();
        packetizer.packetize(&[1; 8], 0).unwrap();
        let second = packetizer.packetize(&[2; 3], 1).unwrap();

        let header = PacketHeader::parse(&second[0]).unwrap();
        assert_eq!(header.sequence_number(), 3);
        assert_eq!(header.frame_index(), 1);
        assert_eq!(packetizer.next_sequence(), 4);
    }

    #[test]
    fn keyframe_first_fragment_holds_parameter_sets() {
        let au = keyframe();
        let mut packetizer = FramePacketizer::new(6).unwrap();
        let datagrams = packetizer.packetize(&au, 0).unwrap();

        // SPS (9) + PPS (8) + IDR start code (4)
        assert_eq!(datagrams[0].len(), FRAME_START_HEADER_SIZE + 21);
        let total: usize = datagrams
            .iter()
            .map(|d| d.len() - PacketHeader::parse(d).unwrap().encoded_len())
            .sum();
        assert_eq!(total, au.len());
    }
}
