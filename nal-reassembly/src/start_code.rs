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

//! Annex-B start code scanning.
//!
//! Only the 4-byte form `00 00 00 01` is recognised, and only when exactly
//! three zero bytes precede the `01`. A 3-byte `00 00 01` or a longer zero run
//! such as `00 00 00 00 01` is not a boundary.

/// Iterator over 4-byte start code boundaries in a byte range.
///
/// Each item is the absolute offset (in the slice passed to [`start_codes`])
/// of the first `0x00` of a start code.
pub struct StartCodes<'a> {
    data: &'a [u8],
    pos: usize,
    zeroes: usize,
}

impl Iterator for StartCodes<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.pos < self.data.len() {
            let i = self.pos;
            self.pos += 1;
            match self.data[i] {
                0x00 => self.zeroes += 1,
                0x01 => {
                    let matched = self.zeroes == 3;
                    self.zeroes = 0;
                    if matched {
                        return Some(i - 3);
                    }
                }
                _ => self.zeroes = 0,
            }
        }
        None
    }
}

/// Scan `data[from..]` for 4-byte start codes.
pub fn start_codes(data: &[u8], from: usize) -> StartCodes<'_> {
    StartCodes {
        data,
        pos: from.min(data.len()),
        zeroes: 0,
    }
}

/// Ends of the SPS and PPS units inside a keyframe's first fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSetBoundaries {
    /// Offset of the start code that terminates the SPS.
    pub sps_end: usize,
    /// Offset of the start code that terminates the PPS.
    pub pps_end: usize,
}

/// Find the first two start codes in `data[from..]`.
///
/// Returns `None` unless both are present.
pub fn find_parameter_set_boundaries(data: &[u8], from: usize) -> Option<ParameterSetBoundaries> {
    let mut codes = start_codes(data, from);
    let sps_end = codes.next()?;
    let pps_end = codes.next()?;
    Some(ParameterSetBoundaries { sps_end, pps_end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_four_byte_codes() {
        let data = [0x67, 0xAA, 0, 0, 0, 1, 0x68, 0xBB, 0, 0, 0, 1, 0x65];
        let found: Vec<usize> = start_codes(&data, 0).collect();
        assert_eq!(found, vec![2, 8]);
    }

    #[test]
    fn test_three_byte_code_is_not_matched() {
        let data = [0x67, 0, 0, 1, 0x68, 0, 0, 0, 1];
        let found: Vec<usize> = start_codes(&data, 0).collect();
        assert_eq!(found, vec![5]);
    }

    #[test]
    fn test_four_zeroes_is_not_matched() {
        let data = [0x67, 0, 0, 0, 0, 1, 0x68];
        assert_eq!(start_codes(&data, 0).next(), None);
    }

    #[test]
    fn test_nonzero_byte_resets_zero_run() {
        let data = [0, 0, 0x05, 0, 1, 0, 0, 0, 1];
        let found: Vec<usize> = start_codes(&data, 0).collect();
        assert_eq!(found, vec![5]);
    }

    #[test]
    fn test_scan_starts_at_offset() {
        let data = [0, 0, 0, 1, 0x67, 0, 0, 0, 1, 0x68, 0, 0, 0, 1];
        let boundaries = find_parameter_set_boundaries(&data, 5).unwrap();
        assert_eq!(
            boundaries,
            ParameterSetBoundaries {
                sps_end: 5,
                pps_end: 10
            }
        );
    }

    #[test]
    fn test_missing_second_code() {
        let data = [0x67, 0xAA, 0, 0, 0, 1, 0x68, 0xBB];
        assert_eq!(find_parameter_set_boundaries(&data, 0), None);
        assert_eq!(find_parameter_set_boundaries(&[], 0), None);
        assert_eq!(find_parameter_set_boundaries(&data, 100), None);
    }
}
