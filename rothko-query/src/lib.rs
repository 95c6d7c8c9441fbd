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

//! Rothko Query
//!
//! Everything between a listener and a rendered heatmap, apart from storage.
//!
//! ```text
//!  listener ──► Writer::observe ──► Dumper ──► Engine::queue
//!
//!  Engine::query ──► Merger::push ──► Merger::finish ──► Heatmap::draw ──► PNG
//! ```

pub mod colors;
pub mod dumper;
pub mod heatmap;
pub mod merge;
pub mod merger;
pub mod search;
pub mod writer;

pub use colors::{Color, VIRIDIS};
pub use dumper::{DumpReport, Dumper};
pub use heatmap::{Canvas, Heatmap};
pub use merge::merge_records;
pub use merger::{Column, Merger, MergerOptions};
pub use search::{glob, Search, Spec};
pub use writer::Writer;
