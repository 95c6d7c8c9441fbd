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

//! Quantile sketches
//!
//! The set of sketch kinds is closed, so a sketch is a tagged enum rather
//! than a trait object. [`SketchParams`] is the factory the writer is built
//! with; [`Sketch::load`] reopens persisted bytes by kind name.
//!
//! ## Kinds
//!
//! - `tdigest`: the only kind that is written and rendered.
//! - `random`: legacy weighted reservoir, read-only, and only ever folded
//!   into a T-Digest by the merger.

mod random;
mod tdigest;

pub use self::random::{RandomBuffer, RandomSample};
pub use self::tdigest::TDigestSketch;

use crate::error::{RothkoError, RothkoResult};

pub const TDIGEST_KIND: &str = "tdigest";
pub const RANDOM_KIND: &str = "random";

/// Parameters for constructing fresh sketches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SketchParams {
    TDigest { compression: f64 },
}

impl SketchParams {
    pub fn tdigest(compression: f64) -> Self {
        SketchParams::TDigest { compression }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SketchParams::TDigest { .. } => TDIGEST_KIND,
        }
    }

    /// Construct an empty sketch. Fails on a non-positive compression.
    pub fn new_sketch(&self) -> RothkoResult<Sketch> {
        match *self {
            SketchParams::TDigest { compression } => {
                Ok(Sketch::TDigest(TDigestSketch::new(compression)?))
            }
        }
    }
}

impl Default for SketchParams {
    fn default() -> Self {
        SketchParams::tdigest(5.0)
    }
}

/// A distribution sketch.
#[derive(Debug, Clone)]
pub enum Sketch {
    TDigest(TDigestSketch),
}

impl Sketch {
    /// Reopen a sketch from its persisted bytes.
    pub fn load(kind: &str, data: &[u8]) -> RothkoResult<Self> {
        match kind {
            TDIGEST_KIND => Ok(Sketch::TDigest(TDigestSketch::from_bytes(data)?)),
            other => Err(RothkoError::Sketch(format!(
                "unknown distribution kind: {:?}",
                other
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Sketch::TDigest(_) => TDIGEST_KIND,
        }
    }

    pub fn observe(&mut self, value: f64) {
        match self {
            Sketch::TDigest(d) => d.observe(value),
        }
    }

    /// Value at quantile `q` in `[0, 1]`.
    pub fn query(&mut self, q: f64) -> f64 {
        match self {
            Sketch::TDigest(d) => d.quantile(q),
        }
    }

    /// Fraction of observations at or below `x`.
    pub fn cdf(&mut self, x: f64) -> f64 {
        match self {
            Sketch::TDigest(d) => d.cdf(x),
        }
    }

    /// Number of observations folded in.
    pub fn len(&self) -> f64 {
        match self {
            Sketch::TDigest(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0.0
    }

    pub fn marshal(&mut self) -> RothkoResult<Vec<u8>> {
        match self {
            Sketch::TDigest(d) => d.to_bytes(),
        }
    }
}
