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

//! Fixed-layout headers at the front of every video datagram.
//!
//! All fields are little-endian and packed:
//!
//! ```text
//! FrameStart (28 bytes)
//! [type u32 = 9][sequence u32][presentation_time u64][frame_index u64][frame_byte_size u32]
//!
//! FrameContinuation (16 bytes)
//! [type u32 = 10][sequence u32][frame_index u64]
//! ```

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::{ReassemblyError, Result};

/// Packet type of the first fragment of a unit.
pub const PACKET_TYPE_VIDEO_FRAME_START: u32 = 9;
/// Packet type of every following fragment.
pub const PACKET_TYPE_VIDEO_FRAME: u32 = 10;

/// Encoded size of a FrameStart header.
pub const FRAME_START_HEADER_SIZE: usize = 28;
/// Encoded size of a FrameContinuation header.
pub const FRAME_CONTINUATION_HEADER_SIZE: usize = 16;

/// The two datagram kinds carried by the video channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketKind {
    FrameStart,
    FrameContinuation,
}

/// Parsed datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketHeader {
    /// First fragment of a unit; carries the unit's metadata and total size.
    FrameStart {
        sequence_number: u32,
        frame_index: u64,
        presentation_time: u64,
        /// Total payload bytes of the unit assembled from this point on.
        frame_byte_size: u32,
    },
    /// Subsequent fragment; payload follows with no further framing.
    FrameContinuation {
        sequence_number: u32,
        frame_index: u64,
    },
}

impl PacketHeader {
    /// Parse the header at the front of `datagram`.
    pub fn parse(datagram: &[u8]) -> Result<Self> {
        if datagram.len() < 4 {
            return Err(ReassemblyError::Truncated {
                needed: 4,
                actual: datagram.len(),
            });
        }

        let mut buf = datagram;
        let packet_type = buf.get_u32_le();
        let needed = match packet_type {
            PACKET_TYPE_VIDEO_FRAME_START => FRAME_START_HEADER_SIZE,
            PACKET_TYPE_VIDEO_FRAME => FRAME_CONTINUATION_HEADER_SIZE,
            other => return Err(ReassemblyError::UnknownPacketType(other)),
        };
        if datagram.len() < needed {
            return Err(ReassemblyError::Truncated {
                needed,
                actual: datagram.len(),
            });
        }

        let sequence_number = buf.get_u32_le();
        if packet_type == PACKET_TYPE_VIDEO_FRAME_START {
            let presentation_time = buf.get_u64_le();
            let frame_index = buf.get_u64_le();
            let frame_byte_size = buf.get_u32_le();
            Ok(PacketHeader::FrameStart {
                sequence_number,
                frame_index,
                presentation_time,
                frame_byte_size,
            })
        } else {
            let frame_index = buf.get_u64_le();
            Ok(PacketHeader::FrameContinuation {
                sequence_number,
                frame_index,
            })
        }
    }

    /// Append the encoded header to `out`.
    pub fn encode<B: BufMut>(&self, out: &mut B) {
        match *self {
            PacketHeader::FrameStart {
                sequence_number,
                frame_index,
                presentation_time,
                frame_byte_size,
            } => {
                out.put_u32_le(PACKET_TYPE_VIDEO_FRAME_START);
                out.put_u32_le(sequence_number);
                out.put_u64_le(presentation_time);
                out.put_u64_le(frame_index);
                out.put_u32_le(frame_byte_size);
            }
            PacketHeader::FrameContinuation {
                sequence_number,
                frame_index,
            } => {
                out.put_u32_le(PACKET_TYPE_VIDEO_FRAME);
                out.put_u32_le(sequence_number);
                out.put_u64_le(frame_index);
            }
        }
    }

    pub fn kind(&self) -> PacketKind {
        match self {
            PacketHeader::FrameStart { .. } => PacketKind::FrameStart,
            PacketHeader::FrameContinuation { .. } => PacketKind::FrameContinuation,
        }
    }

    pub fn sequence_number(&self) -> u32 {
        match *self {
            PacketHeader::FrameStart {
                sequence_number, ..
            }
            | PacketHeader::FrameContinuation {
                sequence_number, ..
            } => sequence_number,
        }
    }

    pub fn frame_index(&self) -> u64 {
        match *self {
            PacketHeader::FrameStart { frame_index, .. }
            | PacketHeader::FrameContinuation { frame_index, .. } => frame_index,
        }
    }

    /// Number of bytes this header occupies on the wire; the payload starts here.
    pub fn encoded_len(&self) -> usize {
        match self {
            PacketHeader::FrameStart { .. } => FRAME_START_HEADER_SIZE,
            PacketHeader::FrameContinuation { .. } => FRAME_CONTINUATION_HEADER_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_header() -> PacketHeader {
        PacketHeader::FrameStart {
            sequence_number: 41,
            frame_index: 7,
            presentation_time: 123_456_789,
            frame_byte_size: 5000,
        }
    }

    #[test]
    fn test_frame_start_layout() {
        let mut out = Vec::new();
        start_header().encode(&mut out);

        assert_eq!(out.len(), FRAME_START_HEADER_SIZE);
        assert_eq!(&out[0..4], &9u32.to_le_bytes());
        assert_eq!(&out[4..8], &41u32.to_le_bytes());
        assert_eq!(&out[8..16], &123_456_789u64.to_le_bytes());
        assert_eq!(&out[16..24], &7u64.to_le_bytes());
        assert_eq!(&out[24..28], &5000u32.to_le_bytes());
    }

    #[test]
    fn test_parse_reads_fields_and_ignores_payload() {
        let mut datagram = Vec::new();
        start_header().encode(&mut datagram);
        datagram.extend_from_slice(&[0xAA; 32]);

        let header = PacketHeader::parse(&datagram).unwrap();
        assert_eq!(header, start_header());
        assert_eq!(header.kind(), PacketKind::FrameStart);
        assert_eq!(header.sequence_number(), 41);
        assert_eq!(header.frame_index(), 7);
        assert_eq!(header.encoded_len(), FRAME_START_HEADER_SIZE);
    }

    #[test]
    fn test_parse_continuation() {
        let mut datagram = Vec::new();
        datagram.extend_from_slice(&10u32.to_le_bytes());
        datagram.extend_from_slice(&3u32.to_le_bytes());
        datagram.extend_from_slice(&99u64.to_le_bytes());

        let header = PacketHeader::parse(&datagram).unwrap();
        assert_eq!(
            header,
            PacketHeader::FrameContinuation {
                sequence_number: 3,
                frame_index: 99
            }
        );
        assert_eq!(header.encoded_len(), FRAME_CONTINUATION_HEADER_SIZE);
    }

    #[test]
    fn test_truncated_header_is_rejected() {
        let mut datagram = Vec::new();
        start_header().encode(&mut datagram);
        datagram.truncate(FRAME_START_HEADER_SIZE - 1);

        assert_eq!(
            PacketHeader::parse(&datagram),
            Err(ReassemblyError::Truncated {
                needed: FRAME_START_HEADER_SIZE,
                actual: FRAME_START_HEADER_SIZE - 1
            })
        );
        assert!(matches!(
            PacketHeader::parse(&[9, 0]),
            Err(ReassemblyError::Truncated { needed: 4, .. })
        ));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let mut datagram = vec![0u8; 32];
        datagram[0] = 6;
        assert_eq!(
            PacketHeader::parse(&datagram),
            Err(ReassemblyError::UnknownPacketType(6))
        );
    }
}
