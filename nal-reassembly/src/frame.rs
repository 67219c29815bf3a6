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

//! Contains the fundamental data structures for NAL units in flight.

use bytes::{Bytes, BytesMut};

use crate::{ReassemblyError, Result};

/// H.264 `nal_unit_type` of a sequence parameter set.
pub const NAL_TYPE_SPS: u8 = 7;
/// H.264 `nal_unit_type` of a picture parameter set.
pub const NAL_TYPE_PPS: u8 = 8;
/// H.264 `nal_unit_type` of a non-IDR slice.
pub const NAL_TYPE_SLICE: u8 = 1;
/// H.264 `nal_unit_type` of an IDR slice.
pub const NAL_TYPE_IDR: u8 = 5;

/// Mask selecting `nal_unit_type` from a NAL header byte.
pub const NAL_TYPE_MASK: u8 = 0x1F;

/// The unit currently being assembled from datagrams.
///
/// Owned exclusively by the reassembly engine. Storage is reserved up front
/// for `target_size` bytes and never grows past it.
#[derive(Debug)]
pub struct AssemblyBuffer {
    data: BytesMut,
    target_size: usize,
    frame_index: u64,
    presentation_time: u64,
}

impl AssemblyBuffer {
    pub fn new(target_size: usize, frame_index: u64, presentation_time: u64) -> Self {
        Self {
            data: BytesMut::with_capacity(target_size),
            target_size,
            frame_index,
            presentation_time,
        }
    }

    /// Append `bytes`, failing without writing anything if they would not fit.
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(ReassemblyError::BufferOverflow {
                pos: self.pos(),
                target: self.target_size,
                incoming: bytes.len(),
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Write cursor: number of bytes appended so far.
    pub fn pos(&self) -> usize {
        self.data.len()
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn remaining(&self) -> usize {
        self.target_size - self.data.len()
    }

    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.target_size
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Freeze the written bytes into an immutable unit.
    pub fn into_unit(self) -> CompletedUnit {
        CompletedUnit {
            data: self.data.freeze(),
            presentation_time: self.presentation_time,
            frame_index: self.frame_index,
        }
    }
}

/// A fully reassembled NAL unit, ready for the decoder.
///
/// The payload is reference counted, so clones are cheap and never alias
/// mutable memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUnit {
    data: Bytes,
    presentation_time: u64,
    frame_index: u64,
}

impl CompletedUnit {
    pub fn new(data: impl Into<Bytes>, presentation_time: u64, frame_index: u64) -> Self {
        Self {
            data: data.into(),
            presentation_time,
            frame_index,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn presentation_time(&self) -> u64 {
        self.presentation_time
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// `nal_unit_type` of the unit, read after its leading 4-byte start code.
    ///
    /// Returns `None` when the payload does not begin with `00 00 00 01`.
    pub fn nal_type(&self) -> Option<u8> {
        match self.data.as_ref() {
            [0, 0, 0, 1, header, ..] => Some(header & NAL_TYPE_MASK),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_tracks_cursor_until_complete() {
        let mut buffer = AssemblyBuffer::new(10, 3, 900);
        assert_eq!(buffer.pos(), 0);
        assert!(!buffer.is_complete());

        buffer.push(&[1; 4]).unwrap();
        buffer.push(&[2; 6]).unwrap();

        assert_eq!(buffer.pos(), 10);
        assert_eq!(buffer.remaining(), 0);
        assert!(buffer.is_complete());
    }

    #[test]
    fn overflow_is_rejected_without_writing() {
        let mut buffer = AssemblyBuffer::new(8, 0, 0);
        buffer.push(&[0; 5]).unwrap();

        let err = buffer.push(&[0; 4]).unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::BufferOverflow {
                pos: 5,
                target: 8,
                incoming: 4
            }
        );
        assert_eq!(buffer.pos(), 5);
    }

    #[test]
    fn into_unit_keeps_metadata() {
        let mut buffer = AssemblyBuffer::new(6, 42, 1234);
        buffer.push(&[0, 0, 0, 1, 0x65, 0x88]).unwrap();

        let unit = buffer.into_unit();
        assert_eq!(unit.len(), 6);
        assert_eq!(unit.frame_index(), 42);
        assert_eq!(unit.presentation_time(), 1234);
        assert_eq!(unit.nal_type(), Some(NAL_TYPE_IDR));
    }

    #[test]
    fn nal_type_requires_start_code() {
        let unit = CompletedUnit::new(vec![0x67, 0x42], 0, 0);
        assert_eq!(unit.nal_type(), None);

        let sps = CompletedUnit::new(vec![0, 0, 0, 1, 0x67, 0x42], 0, 0);
        assert_eq!(sps.nal_type(), Some(NAL_TYPE_SPS));
    }
}
