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

//! Periodic flush of the writer into the storage engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use rothko_storage::Engine;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::writer::Writer;

/// Outcome counts of one or more dumps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DumpReport {
    pub writes: u64,
    pub skips: u64,
    pub errors: u64,
}

impl DumpReport {
    pub fn total(&self) -> u64 {
        self.writes + self.skips + self.errors
    }
}

#[derive(Default)]
struct DumpStats {
    writes: AtomicU64,
    skips: AtomicU64,
    errors: AtomicU64,
}

impl DumpStats {
    fn add(&self, report: DumpReport) {
        self.writes.fetch_add(report.writes, Ordering::Relaxed);
        self.skips.fetch_add(report.skips, Ordering::Relaxed);
        self.errors.fetch_add(report.errors, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DumpReport {
        DumpReport {
            writes: self.writes.load(Ordering::Relaxed),
            skips: self.skips.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Captures the writer every `period` and queues each record into the
/// engine.
#[derive(Clone)]
pub struct Dumper {
    writer: Arc<Writer>,
    engine: Arc<Engine>,
    period: Duration,
    stats: Arc<DumpStats>,
}

impl Dumper {
    pub fn new(writer: Arc<Writer>, engine: Arc<Engine>, period: Duration) -> Self {
        Self {
            writer,
            engine,
            period,
            stats: Arc::new(DumpStats::default()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Totals across every dump so far.
    pub fn stats(&self) -> DumpReport {
        self.stats.snapshot()
    }

    /// Dump every period until `token` is cancelled. The first dump happens
    /// one period after start.
    pub async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately on the first tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let this = self.clone();
                    let dump_token = token.clone();
                    match tokio::task::spawn_blocking(move || this.dump_once(&dump_token)).await {
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "dump task failed"),
                    }
                }
            }
        }
        debug!("dumper stopped");
    }

    /// Capture the writer and queue every record, blocking until the engine
    /// has settled all of them.
    pub fn dump_once(&self, token: &CancellationToken) -> DumpReport {
        let started = Instant::now();
        let (tx, rx) = unbounded::<(bool, bool)>();
        let mut buf = Vec::new();
        let mut queued = 0u64;
        let mut report = DumpReport::default();

        self.writer.capture(|metric, record| {
            if token.is_cancelled() {
                return false;
            }
            record.write_to(&mut buf);

            let tx = tx.clone();
            self.engine.queue(
                token,
                metric,
                record.start_time,
                record.end_time,
                &buf,
                move |written, err| {
                    let _ = tx.send((written, err.is_some()));
                },
            );
            queued += 1;
            true
        });
        drop(tx);

        for (written, failed) in rx.iter() {
            if failed {
                report.errors += 1;
            } else if written {
                report.writes += 1;
            } else {
                report.skips += 1;
            }
        }

        self.stats.add(report);
        if queued > 0 || report.errors > 0 {
            info!(
                writes = report.writes,
                skips = report.skips,
                errors = report.errors,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "dumped metrics"
            );
        }
        report
    }
}
