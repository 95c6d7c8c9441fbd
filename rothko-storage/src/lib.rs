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


//! Rothko Storage
//!
//! Per-metric reverse chronological logs over fixed-size memory-mapped
//! files.
//!
//! ## On-disk layout
//!
//! ```text
//! <root>/
//! ├── foo/
//! │   └── bar/              metric "foo.bar"
//! │       ├── 1.data
//! │       └── 2.data
//! └── %2e/
//!     └── 1.data            metric "."
//!
//! N.data = [metadata slot][slot 0][slot 1] ... [slot cap-1]
//! slot   = version u8 | kind u8 | start i64 | end i64 | size u16 | crc u32 | payload
//! ```
//!
//! The engine owns a bounded handle cache, a lock per metric name, a write
//! queue drained by a worker pool, and the set of known metric names.

pub mod codec;
pub mod engine;
pub mod file;
pub mod file_cache;
pub mod lock_pool;
pub mod metric_log;
pub mod name_set;
pub mod options;
pub mod path_codec;

pub use codec::{Slot, SlotKind, HEADER_SIZE};
pub use engine::{Completion, DoneFn, Engine};
pub use file::{DataFile, Metadata, MIN_SLOT_SIZE};
pub use file_cache::{FileCache, FileParams, Handle};
pub use lock_pool::LockPool;
pub use metric_log::{LogOptions, MetricLog};
pub use name_set::NameSet;
pub use options::{EngineOptions, Tuning};
pub use path_codec::{dir_to_metric, metric_dir_path, metric_file_path, metric_to_dir};
