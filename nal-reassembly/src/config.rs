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

use crate::{ReassemblyError, Result};

/// Number of completed units the handoff queue holds before dropping new ones.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Largest unit a frame start may declare. Keyframes at 4K with high bitrate
/// stay well below this.
pub const DEFAULT_MAX_UNIT_SIZE: usize = 16 * 1024 * 1024;

/// Reassembly session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Maximum number of completed units waiting for the decoder
    pub queue_capacity: usize,
    /// Upper bound on `frame_byte_size` accepted from a frame start
    pub max_unit_size: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_unit_size: DEFAULT_MAX_UNIT_SIZE,
        }
    }
}

impl ReassemblyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ReassemblyError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_unit_size == 0 {
            return Err(ReassemblyError::InvalidConfig(
                "max_unit_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
