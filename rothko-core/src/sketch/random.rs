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

use serde::{Deserialize, Serialize};

use crate::error::{RothkoError, RothkoResult};

/// Highest buffer level whose weight `2^level` still fits a u32.
const MAX_LEVEL: u32 = 31;

/// One reservoir buffer. Every value stands for `2^level` observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomBuffer {
    pub level: u32,
    pub data: Vec<f64>,
}

/// Legacy `random` sketch. Only read back so older records can be merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomSample {
    pub buffers: Vec<RandomBuffer>,
}

impl RandomSample {
    pub fn from_bytes(data: &[u8]) -> RothkoResult<Self> {
        bincode::deserialize(data)
            .map_err(|e| RothkoError::Sketch(format!("invalid random sample: {}", e)))
    }

    pub fn to_bytes(&self) -> RothkoResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| RothkoError::Sketch(e.to_string()))
    }

    /// Flatten into `(value, weight)` pairs.
    pub fn weighted(&self) -> RothkoResult<Vec<(f64, f64)>> {
        let mut out = Vec::new();
        for buf in &self.buffers {
            if buf.level > MAX_LEVEL {
                return Err(RothkoError::UnsupportedMerge(format!(
                    "random buffer level too large: {}",
                    buf.level
                )));
            }
            let weight = (1u64 << buf.level) as f64;
            out.extend(buf.data.iter().map(|&v| (v, weight)));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_follow_levels() {
        let sample = RandomSample {
            buffers: vec![
                RandomBuffer { level: 0, data: vec![1.0, 2.0] },
                RandomBuffer { level: 3, data: vec![5.0] },
            ],
        };
        let back = RandomSample::from_bytes(&sample.to_bytes().unwrap()).unwrap();
        assert_eq!(back, sample);
        assert_eq!(
            back.weighted().unwrap(),
            vec![(1.0, 1.0), (2.0, 1.0), (5.0, 8.0)]
        );
    }

    #[test]
    fn test_level_overflow_rejected() {
        let sample = RandomSample {
            buffers: vec![RandomBuffer { level: 32, data: vec![1.0] }],
        };
        assert!(sample.weighted().is_err());
    }
}
