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

//! A decoder-side thread draining a [`NalSource`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::frame::CompletedUnit;
use crate::source::NalSource;
use crate::{ReassemblyError, Result};

/// Owns a thread that blocks on a source and hands every unit to a callback.
///
/// The thread exits when the source reports it is finished. Dropping the
/// consumer finishes the source and joins the thread.
pub struct NalConsumer {
    source: Arc<dyn NalSource>,
    thread_handle: Option<JoinHandle<u64>>,
}

impl NalConsumer {
    pub fn spawn<F>(source: Arc<dyn NalSource>, mut on_unit: F) -> Result<Self>
    where
        F: FnMut(CompletedUnit) + Send + 'static,
    {
        let thread_source = source.clone();
        let thread_handle = thread::Builder::new()
            .name("nal-consumer".to_string())
            .spawn(move || {
                let mut delivered = 0u64;
                // This is the consumer thread loop.
                while let Some(unit) = thread_source.wait() {
                    log::trace!(
                        "Delivering unit of frame {} ({} bytes)",
                        unit.frame_index(),
                        unit.len()
                    );
                    on_unit(unit);
                    delivered += 1;
                }
                log::debug!("NAL consumer finished after {delivered} units");
                delivered
            })
            .map_err(|e| ReassemblyError::Spawn(e.to_string()))?;

        Ok(Self {
            source,
            thread_handle: Some(thread_handle),
        })
    }

    /// Wait for the thread to run out of units on its own and return how
    /// many it delivered. Only returns for sources that finish by themselves,
    /// such as a replay.
    pub fn join(mut self) -> u64 {
        self.join_thread()
    }

    /// Finish the source, release the thread and return how many units it
    /// delivered.
    pub fn shutdown(mut self) -> u64 {
        self.source.notify_waiting_thread();
        self.join_thread()
    }

    fn join_thread(&mut self) -> u64 {
        match self.thread_handle.take().map(JoinHandle::join) {
            Some(Ok(delivered)) => delivered,
            Some(Err(_)) => {
                log::error!("NAL consumer thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for NalConsumer {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            log::debug!("Dropping NAL consumer. Signaling shutdown.");
            self.source.notify_waiting_thread();
            self.join_thread();
        }
    }
}
