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

//! Records to pixel columns
//!
//! The merger maps a stream of records, newest first, onto `width` pixels
//! covering `[now - duration, now]`. Each run of pixels covered by the same
//! set of records becomes one column whose samples come from the merged
//! distribution of that set.
//!
//! ```text
//!  px:    0 1 2 3 4 5 6 7 8 9
//!  rec A:             [=====]     (pushed first, newest)
//!  rec B:       [=====]
//!  rec C:   [=]
//!
//!  cols:    [C] [B  ] [A    ]     x/w per run, samples per column
//! ```
//!
//! Because ends arrive in decreasing order, pushing a record proves every
//! pixel right of its end is final, so those columns are emitted right away
//! and the records that only cover them are dropped.

use half::f16;
use rothko_core::{Record, RothkoError, RothkoResult, Sketch};
use serde::{Deserialize, Serialize};

use crate::merge::merge_records;

/// One vertical stripe of the heatmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Leftmost pixel.
    pub x: usize,
    /// Width in pixels, at least 1.
    pub w: usize,
    /// `samples + 1` quantile values from q=0 to q=1.
    pub data: Vec<f64>,
    /// Mean observations per second over the merged records.
    pub obs_sec: f64,
}

/// Parameters of one merge pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergerOptions {
    pub width: usize,
    /// Right edge of the window in unix nanoseconds.
    pub now: i64,
    /// Window length in nanoseconds.
    pub duration: i64,
    /// Quantile samples per column, the column holds one more value.
    pub samples: usize,
    /// Compression of the t-digest records are resampled into.
    pub compression: f64,
}

struct Pending {
    start_px: i64,
    end_px: i64,
    record: Record,
}

/// Accumulates records and emits columns.
pub struct Merger {
    opts: MergerOptions,
    pixel_size: i64,
    completed_px: i64,
    records: Vec<Pending>,
    columns: Vec<Column>,
}

impl Merger {
    pub fn new(opts: MergerOptions) -> RothkoResult<Self> {
        if opts.width == 0 {
            return Err(RothkoError::InvalidParameters(
                "width must be at least 1".to_string(),
            ));
        }
        if opts.samples == 0 {
            return Err(RothkoError::InvalidParameters(
                "samples must be at least 1".to_string(),
            ));
        }
        let pixel_size = opts.duration / opts.width as i64;
        if pixel_size <= 0 {
            return Err(RothkoError::InvalidParameters(format!(
                "duration {}ns is too short for {} pixels",
                opts.duration, opts.width
            )));
        }

        Ok(Self {
            opts,
            pixel_size,
            completed_px: opts.width as i64,
            records: Vec::new(),
            columns: Vec::new(),
        })
    }

    /// Pixel holding time `t`, clamped to the canvas.
    pub fn time_to_pixel(&self, t: i64) -> i64 {
        let delta = self
            .opts
            .now
            .saturating_sub(t)
            .saturating_add(self.pixel_size - 1);
        let px = self.opts.width as i64 - delta.div_euclid(self.pixel_size);
        px.clamp(0, self.opts.width as i64 - 1)
    }

    /// Add a record. Records must arrive with non-increasing end times.
    pub fn push(&mut self, record: Record) -> RothkoResult<()> {
        let start_px = self.time_to_pixel(record.start_time);
        let end_px = self.time_to_pixel(record.end_time);
        self.completed(end_px + 1)?;
        self.records.push(Pending {
            start_px,
            end_px,
            record,
        });
        Ok(())
    }

    /// Emit everything left and return the columns ordered left to right.
    pub fn finish(mut self) -> RothkoResult<Vec<Column>> {
        self.completed(0)?;
        let mut columns = self.columns;
        columns.reverse();
        Ok(columns)
    }

    /// Every pixel at or right of `limit` is final: emit the columns for
    /// them and drop records that cannot cover anything further left.
    fn completed(&mut self, limit: i64) -> RothkoResult<()> {
        let mut to_emit: Vec<usize> = Vec::new();
        let mut to_emit_end = 0i64;
        let mut candidates: Vec<usize> = Vec::new();

        let mut px = self.completed_px - 1;
        while px >= limit {
            candidates.clear();
            candidates.extend(
                self.records
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.start_px <= px && px <= r.end_px)
                    .map(|(i, _)| i),
            );

            if candidates != to_emit {
                if !to_emit.is_empty() {
                    self.emit(px + 1, to_emit_end, &to_emit)?;
                }
                to_emit_end = px;
                std::mem::swap(&mut to_emit, &mut candidates);
            }
            px -= 1;
        }

        if !to_emit.is_empty() {
            self.emit(limit, to_emit_end, &to_emit)?;
        }

        self.records
            .retain(|r| !(r.start_px > limit && r.end_px > limit));
        self.completed_px = self.completed_px.min(limit);
        Ok(())
    }

    fn emit(&mut self, start_px: i64, end_px: i64, indices: &[usize]) -> RothkoResult<()> {
        let records: Vec<Record> = indices
            .iter()
            .map(|&i| self.records[i].record.clone())
            .collect();

        let obs_sec = records
            .iter()
            .map(|r| {
                let secs = r.duration_secs();
                if secs > 0.0 {
                    r.observations as f64 / r.merged_count() as f64 / secs
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            / records.len() as f64;

        let merged = merge_records(self.opts.compression, &records)?;
        let mut sketch = Sketch::load(&merged.kind, &merged.distribution)?;

        let samples = self.opts.samples as f64;
        let data = (0..=self.opts.samples)
            .map(|i| round_half(sketch.query(i as f64 / samples)))
            .collect();

        self.columns.push(Column {
            x: start_px as usize,
            w: (end_px - start_px + 1) as usize,
            data,
            obs_sec,
        });
        Ok(())
    }
}

/// Round through half precision so tiny sketch jitter does not change the
/// rendered colour. Values half precision cannot hold pass through.
fn round_half(v: f64) -> f64 {
    let back = f16::from_f64(v).to_f64();
    let overflowed = back.is_infinite() && v.is_finite();
    let underflowed = back == 0.0 && v != 0.0;
    if overflowed || underflowed {
        v
    } else {
        back
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rothko_core::{TDigestSketch, TDIGEST_KIND};

    const SECOND: i64 = 1_000_000_000;

    fn record(start: i64, end: i64, values: &[f64]) -> Record {
        let mut sketch = TDigestSketch::new(5.0).unwrap();
        for v in values {
            sketch.observe(*v);
        }
        Record {
            start_time: start,
            end_time: end,
            observations: values.len() as i64,
            kind: TDIGEST_KIND.to_string(),
            distribution: sketch.to_bytes().unwrap(),
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            merged: 1,
            ..Default::default()
        }
    }

    fn opts(width: usize, samples: usize) -> MergerOptions {
        MergerOptions {
            width,
            now: 10 * SECOND,
            duration: 10 * SECOND,
            samples,
            compression: 5.0,
        }
    }

    fn covered(cols: &[Column]) -> Vec<usize> {
        let mut px: Vec<usize> = cols.iter().flat_map(|c| c.x..c.x + c.w).collect();
        px.sort_unstable();
        px
    }

    #[test]
    fn test_time_to_pixel() {
        let m = Merger::new(opts(10, 4)).unwrap();
        assert_eq!(m.time_to_pixel(10 * SECOND), 9);
        assert_eq!(m.time_to_pixel(9 * SECOND), 9);
        assert_eq!(m.time_to_pixel(9 * SECOND - 1), 8);
        assert_eq!(m.time_to_pixel(0), 0);
        assert_eq!(m.time_to_pixel(-100 * SECOND), 0);
        assert_eq!(m.time_to_pixel(100 * SECOND), 9);
    }

    #[test]
    fn test_columns_tile_the_window() {
        let mut m = Merger::new(opts(10, 30)).unwrap();
        m.push(record(7 * SECOND, 9 * SECOND, &[1.0, 2.0])).unwrap();
        m.push(record(2 * SECOND, 7 * SECOND, &[3.0])).unwrap();
        m.push(record(0, 2 * SECOND, &[4.0, 5.0, 6.0])).unwrap();
        m.push(record(0, 0, &[7.0])).unwrap();
        let cols = m.finish().unwrap();

        assert_eq!(covered(&cols), (0..10).collect::<Vec<_>>());
        for pair in cols.windows(2) {
            assert_eq!(pair[0].x + pair[0].w, pair[1].x);
        }
        for col in &cols {
            assert!(col.w >= 1);
            assert_eq!(col.data.len(), 31);
        }
    }

    #[test]
    fn test_disjoint_records_leave_gaps() {
        let mut m = Merger::new(opts(10, 2)).unwrap();
        m.push(record(8 * SECOND, 9 * SECOND, &[1.0])).unwrap();
        m.push(record(SECOND, 2 * SECOND, &[2.0])).unwrap();
        let cols = m.finish().unwrap();

        assert_eq!(covered(&cols), vec![1, 2, 8, 9]);
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].data, vec![2.0, 2.0, 2.0]);
        assert_eq!(cols[1].data, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_overlap_gets_its_own_column() {
        let mut m = Merger::new(opts(10, 2)).unwrap();
        m.push(record(5 * SECOND, 9 * SECOND, &[10.0])).unwrap();
        m.push(record(2 * SECOND, 6 * SECOND, &[20.0])).unwrap();
        let cols = m.finish().unwrap();

        let spans: Vec<(usize, usize)> = cols.iter().map(|c| (c.x, c.w)).collect();
        assert_eq!(spans, vec![(2, 3), (5, 2), (7, 3)]);
        // the overlap mixes both distributions
        assert_eq!(cols[1].data[0], 10.0);
        assert_eq!(cols[1].data[2], 20.0);
    }

    #[test]
    fn test_obs_sec() {
        let mut m = Merger::new(opts(10, 1)).unwrap();
        m.push(record(0, 10 * SECOND, &[1.0; 20])).unwrap();
        let cols = m.finish().unwrap();
        assert_eq!(cols.len(), 1);
        assert!((cols[0].obs_sec - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unsupported_kind_fails() {
        let mut m = Merger::new(opts(10, 1)).unwrap();
        let mut rec = record(0, 9 * SECOND, &[1.0]);
        rec.kind = "mystery".to_string();
        m.push(rec).unwrap();
        assert!(matches!(
            m.finish(),
            Err(RothkoError::UnsupportedMerge(_))
        ));
    }

    #[test]
    fn test_invalid_options() {
        assert!(Merger::new(opts(0, 1)).is_err());
        assert!(Merger::new(opts(10, 0)).is_err());
        let mut o = opts(10, 1);
        o.duration = 5;
        assert!(Merger::new(o).is_err());
    }

    #[test]
    fn test_round_half() {
        assert_eq!(round_half(1.0), 1.0);
        assert_eq!(round_half(0.1), f16::from_f64(0.1).to_f64());
        // beyond half precision range
        assert_eq!(round_half(1e10), 1e10);
        assert_eq!(round_half(1e-12), 1e-12);
    }

    proptest! {
        #[test]
        fn prop_pixel_coverage(spans in proptest::collection::vec((0i64..100, 0i64..20), 1..8)) {
            let o = MergerOptions {
                width: 20,
                now: 100 * SECOND,
                duration: 100 * SECOND,
                samples: 1,
                compression: 5.0,
            };
            let mut m = Merger::new(o).unwrap();

            // decreasing ends
            let mut recs: Vec<(i64, i64)> = spans
                .into_iter()
                .map(|(end, len)| ((end - len).max(0) * SECOND, end * SECOND))
                .collect();
            recs.sort_by(|a, b| b.1.cmp(&a.1));

            let mut expected = std::collections::BTreeSet::new();
            for (start, end) in &recs {
                let (s, e) = (m.time_to_pixel(*start), m.time_to_pixel(*end));
                expected.extend((s..=e).map(|p| p as usize));
            }
            for (start, end) in recs {
                m.push(record(start, end, &[1.0])).unwrap();
            }
            let cols = m.finish().unwrap();
            let got = covered(&cols);

            let mut dedup = got.clone();
            dedup.dedup();
            prop_assert_eq!(dedup.len(), got.len());
            prop_assert_eq!(got, expected.into_iter().collect::<Vec<_>>());
        }
    }
}
