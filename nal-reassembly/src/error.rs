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

use thiserror::Error;

/// Result type for reassembly operations
pub type Result<T> = std::result::Result<T, ReassemblyError>;

/// Reasons a datagram or configuration was rejected.
///
/// None of these are fatal: the engine discards the affected state and keeps
/// going with the next datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Datagram too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Unknown packet type: {0}")]
    UnknownPacketType(u32),

    #[error("SPS/PPS boundaries not found in first fragment")]
    MissingParameterSets,

    #[error("Declared frame size {declared} is smaller than the parameter sets ({parameter_sets} bytes)")]
    DeclaredSizeTooSmall { declared: usize, parameter_sets: usize },

    #[error("Declared unit size {declared} exceeds limit of {limit} bytes")]
    UnitTooLarge { declared: usize, limit: usize },

    #[error("Packet loss: expected sequence {expected}, got {actual}")]
    SequenceGap { expected: u32, actual: u32 },

    #[error("No unit is being assembled")]
    NoActiveUnit,

    #[error("Failed to spawn consumer thread: {0}")]
    Spawn(String),

    #[error("Unit overflow: pos={pos} target={target} incoming={incoming}")]
    BufferOverflow {
        pos: usize,
        target: usize,
        incoming: usize,
    },
}
