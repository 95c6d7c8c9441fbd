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

//! Error types shared by every rothko crate.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the storage engine, the sketches and the query pipeline.
#[derive(Debug, Error)]
pub enum RothkoError {
    /// Bad configuration or arguments.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A single slot failed to decode. Readers skip it and move on.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// A whole data file is unusable.
    #[error("corrupt file {}: {reason}", path.display())]
    CorruptFile { path: PathBuf, reason: String },

    #[error("value too large: {0}")]
    ValueTooLarge(String),

    #[error("rotation failed: {0}")]
    Rotation(String),

    #[error("allocation failed: {0}")]
    Allocation(String),

    /// A record's sketch kind cannot be folded into a T-Digest.
    #[error("unsupported merge: {0}")]
    UnsupportedMerge(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("already running")]
    AlreadyRunning,

    #[error("sketch error: {0}")]
    Sketch(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RothkoError {
    /// Build a `CorruptFile` error for `path`.
    pub fn corrupt_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RothkoError::CorruptFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that only affect one slot or file and can be
    /// skipped by a reader.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RothkoError::CorruptRecord(_) | RothkoError::CorruptFile { .. } | RothkoError::Decode(_)
        )
    }
}

pub type RothkoResult<T> = Result<T, RothkoError>;
