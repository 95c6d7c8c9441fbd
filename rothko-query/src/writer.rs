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

//! In-memory aggregation
//!
//! The writer keeps one page mapping metric names to aggregators. Listeners
//! call [`Writer::observe`] concurrently; the dumper periodically calls
//! [`Writer::capture`], which swaps in an empty page and turns every
//! aggregator of the old one into a [`Record`].
//!
//! ```text
//!  observe ──► page ──► DashMap<metric, Aggregator>
//!                ▲
//!  capture ──────┘ swap for a fresh page, then drain the old one
//! ```
//!
//! An observe that loaded the page just before a capture swapped it may
//! land in an aggregator that is never captured. Callers that care do not
//! observe while capturing.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;
use rothko_core::{unix_nanos, Record, Sketch, SketchParams};
use tracing::warn;

/// Per-metric accumulator for the current interval.
struct Aggregator {
    start: i64,
    state: Mutex<AggregatorState>,
}

#[derive(Default)]
struct AggregatorState {
    sketch: Option<Sketch>,
    observations: i64,
    min: f64,
    max: f64,
    min_id: Vec<u8>,
    max_id: Vec<u8>,
}

impl Aggregator {
    fn new(start: i64) -> Self {
        Self {
            start,
            state: Mutex::new(AggregatorState::default()),
        }
    }

    fn observe(&self, params: &SketchParams, value: f64, id: Option<&[u8]>) {
        let mut state = self.state.lock();
        if state.sketch.is_none() {
            match params.new_sketch() {
                Ok(sketch) => state.sketch = Some(sketch),
                Err(e) => {
                    warn!(error = %e, "unable to construct sketch");
                    return;
                }
            }
        }
        if let Some(sketch) = state.sketch.as_mut() {
            sketch.observe(value);
        }

        // the first observation is both extremes
        let first = state.observations == 0;
        state.observations += 1;
        let id = id.unwrap_or_default();
        if first || value < state.min {
            state.min = value;
            state.min_id.clear();
            state.min_id.extend_from_slice(id);
        }
        if first || value > state.max {
            state.max = value;
            state.max_id.clear();
            state.max_id.extend_from_slice(id);
        }
    }

    /// Snapshot into a record ending at `end`. `None` if nothing was
    /// observed.
    fn to_record(&self, end: i64) -> Option<Record> {
        let mut state = self.state.lock();
        let (observations, min, max) = (state.observations, state.min, state.max);
        let (min_id, max_id) = (state.min_id.clone(), state.max_id.clone());
        let sketch = state.sketch.as_mut()?;
        let distribution = match sketch.marshal() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "unable to marshal sketch");
                return None;
            }
        };

        Some(Record {
            start_time: self.start,
            end_time: end,
            observations,
            kind: sketch.kind().to_string(),
            distribution,
            min,
            max,
            min_id,
            max_id,
            merged: 1,
        })
    }
}

/// One interval of aggregators.
struct Page {
    created: i64,
    metrics: DashMap<String, Arc<Aggregator>>,
}

impl Page {
    fn new(created: i64) -> Self {
        Self {
            created,
            metrics: DashMap::new(),
        }
    }
}

/// Fans observations into per-metric sketches.
pub struct Writer {
    params: SketchParams,
    page: ArcSwapOption<Page>,
}

impl Writer {
    pub fn new(params: SketchParams) -> Self {
        Self {
            params,
            page: ArcSwapOption::empty(),
        }
    }

    pub fn params(&self) -> &SketchParams {
        &self.params
    }

    /// Record `value` for `metric`. NaN and infinities are dropped. `id` is
    /// kept if the value becomes the interval's minimum or maximum.
    pub fn observe(&self, metric: &str, value: f64, id: Option<&[u8]>) {
        if !value.is_finite() {
            return;
        }

        let page = self.current_page();
        let aggregator = match page.metrics.get(metric) {
            Some(agg) => agg.value().clone(),
            None => page
                .metrics
                .entry(metric.to_string())
                .or_insert_with(|| Arc::new(Aggregator::new(unix_nanos())))
                .value()
                .clone(),
        };
        aggregator.observe(&self.params, value, id);
    }

    /// Swap in an empty page and hand every aggregated metric of the old
    /// one to `cb` until it returns false. Does nothing if a concurrent
    /// capture won the swap.
    pub fn capture<F>(&self, mut cb: F)
    where
        F: FnMut(&str, Record) -> bool,
    {
        let now = unix_nanos();
        let current = self.page.load_full();
        let previous = self
            .page
            .compare_and_swap(&current, Some(Arc::new(Page::new(now))));

        let swapped = match (&*previous, &current) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !swapped {
            return;
        }

        if let Some(page) = current {
            for entry in page.metrics.iter() {
                if let Some(record) = entry.value().to_record(now) {
                    if !cb(entry.key(), record) {
                        return;
                    }
                }
            }
        }
    }

    /// Like [`Writer::capture`] but leaves the page in place. Aggregators
    /// may change while they are visited.
    pub fn iterate<F>(&self, mut cb: F)
    where
        F: FnMut(&str, Record) -> bool,
    {
        let now = unix_nanos();
        if let Some(page) = self.page.load_full() {
            for entry in page.metrics.iter() {
                if let Some(record) = entry.value().to_record(now) {
                    if !cb(entry.key(), record) {
                        return;
                    }
                }
            }
        }
    }

    /// Creation time and metric count of the current page.
    pub fn pending(&self) -> Option<(i64, usize)> {
        self.page
            .load_full()
            .map(|page| (page.created, page.metrics.len()))
    }

    fn current_page(&self) -> Arc<Page> {
        if let Some(page) = self.page.load_full() {
            return page;
        }
        let fresh = Arc::new(Page::new(unix_nanos()));
        let previous = self
            .page
            .compare_and_swap(&None::<Arc<Page>>, Some(fresh.clone()));
        match &*previous {
            Some(page) => page.clone(),
            None => fresh,
        }
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new(SketchParams::default())
    }
}
