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

//! Rothko Core
//!
//! Shared types for the rothko distribution store: the error type, the
//! aggregated [`Record`], and the quantile [`Sketch`] abstraction.
//!
//! ## Architecture
//!
//! ```text
//! listener ──► writer (sketch per metric) ──► dumper ──► storage engine
//!                                                            │
//! render ◄── heatmap ◄── merger (resample into tdigest) ◄────┘
//! ```
//!
//! Everything here is dependency-light so the storage engine can treat
//! records as opaque bytes while the query side decodes them.

pub mod error;
pub mod record;
pub mod sketch;

pub use error::{RothkoError, RothkoResult};
pub use record::Record;
pub use sketch::{
    RandomBuffer, RandomSample, Sketch, SketchParams, TDigestSketch, RANDOM_KIND, TDIGEST_KIND,
};

/// Current wall-clock time as unix nanoseconds.
pub fn unix_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
