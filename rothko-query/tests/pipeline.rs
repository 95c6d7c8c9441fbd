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

//! Ingest to render: writer, dumper, engine, merger and heatmap together.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rothko_core::{unix_nanos, Record, RothkoError, Sketch, SketchParams};
use rothko_query::{Canvas, Dumper, Heatmap, Merger, MergerOptions, Writer, VIRIDIS};
use rothko_storage::{Engine, EngineOptions, Tuning};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

const SECOND: i64 = 1_000_000_000;

fn options() -> EngineOptions {
    EngineOptions {
        size: 512,
        cap: 16,
        files: 2,
        tuning: Tuning {
            buffer: 64,
            drop: false,
            workers: 2,
            handles: 16,
        },
    }
}

struct Running {
    engine: Arc<Engine>,
    token: CancellationToken,
    handle: Option<thread::JoinHandle<Result<(), RothkoError>>>,
}

impl Running {
    fn start(dir: &std::path::Path) -> Self {
        let engine = Arc::new(Engine::new(dir, options()).unwrap());
        let token = CancellationToken::new();
        let handle = {
            let engine = engine.clone();
            let token = token.clone();
            thread::spawn(move || engine.run(token))
        };
        Self {
            engine,
            token,
            handle: Some(handle),
        }
    }

    fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap().unwrap();
        }
    }
}

fn stored(engine: &Engine, metric: &str) -> Vec<Record> {
    let mut out = Vec::new();
    let mut scratch = Vec::new();
    engine
        .query(
            &CancellationToken::new(),
            metric,
            i64::MAX,
            &mut scratch,
            |_, _, data| {
                out.push(Record::from_bytes(data)?);
                Ok(true)
            },
        )
        .unwrap();
    out
}

#[test]
fn test_dump_writes_every_metric() {
    let dir = tempdir().unwrap();
    let running = Running::start(dir.path());
    let writer = Arc::new(Writer::new(SketchParams::tdigest(5.0)));
    let dumper = Dumper::new(writer.clone(), running.engine.clone(), Duration::from_secs(60));

    for i in 0..100 {
        writer.observe("web.latency", i as f64, Some(format!("req{}", i).as_bytes()));
        writer.observe("web.errors", 1.0, None);
    }
    writer.observe("web.errors", f64::NAN, None);

    let report = dumper.dump_once(&running.token);
    assert_eq!(report.writes, 2);
    assert_eq!(report.skips, 0);
    assert_eq!(report.errors, 0);

    // nothing observed since the last dump
    let report = dumper.dump_once(&running.token);
    assert_eq!(report.total(), 0);
    assert_eq!(dumper.stats().writes, 2);

    let latency = stored(&running.engine, "web.latency");
    assert_eq!(latency.len(), 1);
    let rec = &latency[0];
    assert_eq!(rec.observations, 100);
    assert_eq!((rec.min, rec.max), (0.0, 99.0));
    assert_eq!(rec.min_id, b"req0".to_vec());
    assert_eq!(rec.max_id, b"req99".to_vec());

    let errors = stored(&running.engine, "web.errors");
    assert_eq!(errors[0].observations, 100);

    let mut names = Vec::new();
    running.engine.metrics(|name| {
        names.push(name.to_string());
        true
    });
    assert_eq!(names, vec!["web.errors", "web.latency"]);

    running.stop();
}

#[test]
fn test_successive_dumps_read_newest_first() {
    let dir = tempdir().unwrap();
    let running = Running::start(dir.path());
    let writer = Arc::new(Writer::default());
    let dumper = Dumper::new(writer.clone(), running.engine.clone(), Duration::from_secs(60));

    for round in 0..3 {
        writer.observe("m", round as f64, None);
        assert_eq!(dumper.dump_once(&running.token).writes, 1);
        // ends must strictly increase between dumps
        thread::sleep(Duration::from_millis(2));
    }

    let records = stored(&running.engine, "m");
    let mins: Vec<f64> = records.iter().map(|r| r.min).collect();
    assert_eq!(mins, vec![2.0, 1.0, 0.0]);
    for pair in records.windows(2) {
        assert!(pair[0].end_time > pair[1].end_time);
    }

    running.stop();
}

#[tokio::test]
async fn test_dumper_run_stops_on_cancel() {
    let dir = tempdir().unwrap();
    let running = Running::start(dir.path());
    let writer = Arc::new(Writer::default());
    writer.observe("m", 1.0, None);

    let dumper = Dumper::new(writer, running.engine.clone(), Duration::from_millis(20));
    let token = CancellationToken::new();
    let task = {
        let dumper = dumper.clone();
        let token = token.clone();
        tokio::spawn(async move { dumper.run(token).await })
    };

    let mut waited = 0;
    while dumper.stats().writes == 0 && waited < 200 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
    token.cancel();
    task.await.unwrap();
    assert_eq!(dumper.stats().writes, 1);

    running.stop();
}

#[test]
fn test_stored_records_render() {
    let dir = tempdir().unwrap();
    let running = Running::start(dir.path());
    let writer = Arc::new(Writer::default());
    let dumper = Dumper::new(writer.clone(), running.engine.clone(), Duration::from_secs(60));

    for round in 0..4 {
        for i in 0..50 {
            writer.observe("render.me", (round * 50 + i) as f64, None);
        }
        dumper.dump_once(&running.token);
        thread::sleep(Duration::from_millis(2));
    }

    let now = unix_nanos() + SECOND;
    let opts = MergerOptions {
        width: 40,
        now,
        duration: 60 * SECOND,
        samples: 10,
        compression: 5.0,
    };
    let mut merger = Merger::new(opts).unwrap();
    let mut reference: Option<Sketch> = None;
    let mut scratch = Vec::new();
    running
        .engine
        .query(
            &CancellationToken::new(),
            "render.me",
            i64::MAX,
            &mut scratch,
            |_, _, data| {
                let rec = Record::from_bytes(data)?;
                if reference.is_none() {
                    reference = Some(Sketch::load(&rec.kind, &rec.distribution)?);
                }
                merger.push(rec)?;
                Ok(true)
            },
        )
        .unwrap();
    let columns = merger.finish().unwrap();
    assert!(!columns.is_empty());
    for col in &columns {
        assert_eq!(col.data.len(), 11);
        assert!(col.x + col.w <= 40);
    }

    let mut reference = reference.unwrap();
    let mut canvas = Canvas::new(40, 16);
    Heatmap::new(&VIRIDIS, |v| reference.cdf(v))
        .unwrap()
        .draw_all(&mut canvas, &columns);

    // the drawn columns are opaque
    let col = &columns[0];
    assert_eq!(canvas.get(col.x, 0).map(|p| p[3]), Some(255));
    let png = canvas.to_png().unwrap();
    assert_eq!(&png[..4], b"\x89PNG");

    running.stop();
}
