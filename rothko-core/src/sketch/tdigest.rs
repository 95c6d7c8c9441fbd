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

//! T-Digest wrapper
//!
//! The underlying digest is immutable: every merge builds a new one. Single
//! observations are buffered and folded in batches so `observe` stays cheap.

use tdigest::{Centroid, TDigest};

use crate::error::{RothkoError, RothkoResult};

/// Centroid budget per unit of configured compression (5.0 gives 100).
const CENTROIDS_PER_COMPRESSION: f64 = 20.0;

/// Observations buffered before they are folded into the digest.
const PENDING_LIMIT: usize = 256;

/// Bisection probes used by [`TDigestSketch::cdf`]. 2^8 resolves a
/// 256-entry palette.
const CDF_PROBES: usize = 8;

#[derive(Debug, Clone)]
pub struct TDigestSketch {
    digest: TDigest,
    pending: Vec<f64>,
}

impl TDigestSketch {
    pub fn new(compression: f64) -> RothkoResult<Self> {
        if !compression.is_finite() || compression <= 0.0 {
            return Err(RothkoError::InvalidParameters(format!(
                "tdigest compression must be positive, got {}",
                compression
            )));
        }
        let max_size = (compression * CENTROIDS_PER_COMPRESSION).ceil() as usize;
        Ok(Self {
            digest: TDigest::new_with_size(max_size.max(1)),
            pending: Vec::new(),
        })
    }

    pub fn from_bytes(data: &[u8]) -> RothkoResult<Self> {
        let digest: TDigest = bincode::deserialize(data)
            .map_err(|e| RothkoError::Sketch(format!("invalid tdigest: {}", e)))?;
        Ok(Self {
            digest,
            pending: Vec::new(),
        })
    }

    pub fn to_bytes(&mut self) -> RothkoResult<Vec<u8>> {
        self.flush();
        bincode::serialize(&self.digest).map_err(|e| RothkoError::Sketch(e.to_string()))
    }

    pub fn observe(&mut self, value: f64) {
        self.pending.push(value);
        if self.pending.len() >= PENDING_LIMIT {
            self.flush();
        }
    }

    /// Fold another digest into this one.
    pub fn merge(&mut self, other: &TDigestSketch) {
        let mut other = other.clone();
        other.flush();
        self.merge_digest(other.digest);
    }

    /// Fold `(value, weight)` pairs into the digest.
    pub fn add_weighted(&mut self, values: &[(f64, f64)]) {
        let mut values: Vec<(f64, f64)> = values
            .iter()
            .copied()
            .filter(|(v, w)| v.is_finite() && w.is_finite() && *w > 0.0)
            .collect();
        if values.is_empty() {
            return;
        }
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let count: f64 = values.iter().map(|(_, w)| w).sum();
        let sum: f64 = values.iter().map(|(v, w)| v * w).sum();
        let min = values[0].0;
        let max = values[values.len() - 1].0;
        let centroids = values
            .into_iter()
            .map(|(v, w)| Centroid::new(v, w))
            .collect();

        let weighted = TDigest::new(centroids, sum, count, max, min, self.digest.max_size());
        self.merge_digest(weighted);
    }

    pub fn len(&self) -> f64 {
        self.digest.count() + self.pending.len() as f64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0.0
    }

    pub fn quantile(&mut self, q: f64) -> f64 {
        self.flush();
        if self.digest.count() == 0.0 {
            return 0.0;
        }
        if q <= 0.0 {
            return self.digest.min();
        }
        if q >= 1.0 {
            return self.digest.max();
        }
        self.digest.estimate_quantile(q)
    }

    /// Approximate CDF by bisecting over the quantile function. The digest
    /// has no direct CDF, so this trades a few quantile estimates for one.
    pub fn cdf(&mut self, x: f64) -> f64 {
        self.flush();
        if self.digest.count() == 0.0 {
            return 0.0;
        }
        if x <= self.digest.min() {
            return 0.0;
        }
        if x >= self.digest.max() {
            return 1.0;
        }

        let (mut lo, mut hi) = (0.0f64, 1.0f64);
        for _ in 0..CDF_PROBES {
            let mid = (lo + hi) / 2.0;
            if self.digest.estimate_quantile(mid) < x {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        (lo + hi) / 2.0
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let values = std::mem::take(&mut self.pending);
        self.digest = self.digest.merge_unsorted(values);
    }

    fn merge_digest(&mut self, other: TDigest) {
        self.flush();
        if other.count() == 0.0 {
            return;
        }
        if self.digest.count() == 0.0 {
            // keep our own centroid budget
            let max_size = self.digest.max_size();
            self.digest = TDigest::merge_digests(vec![TDigest::new_with_size(max_size), other]);
            return;
        }
        let current = std::mem::replace(&mut self.digest, TDigest::new_with_size(1));
        self.digest = TDigest::merge_digests(vec![current, other]);
    }
}
