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


//! Folding several records into one.
//!
//! Records may carry different sketch kinds, so every input is resampled
//! into one fresh t-digest. Legacy random samples are re-added as weighted
//! values.

use rothko_core::{
    RandomSample, Record, RothkoError, RothkoResult, TDigestSketch, RANDOM_KIND, TDIGEST_KIND,
};

/// Merge `records` into a single record whose sketch is a t-digest with the
/// given compression.
pub fn merge_records(compression: f64, records: &[Record]) -> RothkoResult<Record> {
    let (first, rest) = records
        .split_first()
        .ok_or_else(|| RothkoError::InvalidParameters("no records to merge".to_string()))?;

    let mut out = Record {
        start_time: first.start_time,
        end_time: first.end_time,
        kind: TDIGEST_KIND.to_string(),
        min: first.min,
        max: first.max,
        min_id: first.min_id.clone(),
        max_id: first.max_id.clone(),
        ..Default::default()
    };

    for rec in rest {
        out.start_time = out.start_time.min(rec.start_time);
        out.end_time = out.end_time.max(rec.end_time);
        if rec.min < out.min {
            out.min = rec.min;
            out.min_id = rec.min_id.clone();
        }
        if rec.max > out.max {
            out.max = rec.max;
            out.max_id = rec.max_id.clone();
        }
    }

    let mut digest = TDigestSketch::new(compression)?;
    for rec in records {
        out.observations += rec.observations;
        out.merged += rec.merged_count();
        resample(&mut digest, rec)?;
    }
    out.distribution = digest.to_bytes()?;
    Ok(out)
}

fn resample(digest: &mut TDigestSketch, rec: &Record) -> RothkoResult<()> {
    match rec.kind.as_str() {
        TDIGEST_KIND => {
            let other = TDigestSketch::from_bytes(&rec.distribution)?;
            digest.merge(&other);
        }
        RANDOM_KIND => {
            let sample = RandomSample::from_bytes(&rec.distribution)?;
            digest.add_weighted(&sample.weighted()?);
        }
        other => {
            return Err(RothkoError::UnsupportedMerge(format!(
                "unknown distribution kind: {:?}",
                other
            )))
        }
    }
    Ok(())
}
