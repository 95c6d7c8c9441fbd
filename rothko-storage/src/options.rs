// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use rothko_core::{RothkoError, RothkoResult};

use crate::file::MIN_SLOT_SIZE;
use crate::metric_log::LogOptions;

/// Descriptors kept free for sockets and everything else.
const RESERVED_HANDLES: u64 = 512;

/// Used when the descriptor limit cannot be read.
const FALLBACK_HANDLES: usize = 1024;

/// Storage engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Slot size in bytes.
    pub size: usize,
    /// Value slots per data file.
    pub cap: usize,
    /// Data files retained per metric. Zero disables reclamation.
    pub files: usize,
    pub tuning: Tuning,
}

/// Concurrency and resource knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    /// Write queue depth.
    pub buffer: usize,
    /// Drop writes when the queue is full instead of blocking.
    pub drop: bool,
    /// Worker threads. Zero picks a default from the CPU count.
    pub workers: usize,
    /// Open file handles cached. Zero picks a default from the rlimit.
    pub handles: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            buffer: 20_000,
            drop: false,
            workers: 0,
            handles: 0,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            size: 256,
            cap: 400,
            files: 2,
            tuning: Tuning::default(),
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> RothkoResult<()> {
        if self.size < MIN_SLOT_SIZE {
            return Err(RothkoError::InvalidParameters(format!(
                "size must be at least {}, got {}",
                MIN_SLOT_SIZE, self.size
            )));
        }
        if self.cap == 0 {
            return Err(RothkoError::InvalidParameters(
                "cap must be at least 1".to_string(),
            ));
        }
        match self.size.checked_mul(self.cap + 1) {
            Some(len) if len <= i32::MAX as usize => {}
            _ => {
                return Err(RothkoError::InvalidParameters(format!(
                    "size {} with cap {} does not fit in 31 bits",
                    self.size, self.cap
                )))
            }
        }
        if self.tuning.buffer == 0 {
            return Err(RothkoError::InvalidParameters(
                "buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            size: self.size,
            cap: self.cap,
            files: self.files,
        }
    }

    /// Configured worker count, or one less than the CPU count. Page faults
    /// on the mappings block a whole thread, so one core is left over.
    pub fn workers(&self) -> usize {
        if self.tuning.workers > 0 {
            return self.tuning.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }

    /// Configured handle count, or the soft descriptor limit minus a
    /// reserve.
    pub fn handles(&self) -> usize {
        if self.tuning.handles > 0 {
            return self.tuning.handles;
        }
        default_handles()
    }
}

#[cfg(unix)]
fn default_handles() -> usize {
    use nix::sys::resource::{getrlimit, Resource};

    match getrlimit(Resource::RLIMIT_NOFILE) {
        Ok((soft, _)) if (soft as u64) > RESERVED_HANDLES => {
            (soft as u64 - RESERVED_HANDLES).min(usize::MAX as u64) as usize
        }
        _ => FALLBACK_HANDLES,
    }
}

#[cfg(not(unix))]
fn default_handles() -> usize {
    FALLBACK_HANDLES
}
