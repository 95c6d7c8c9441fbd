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

//! Storage engine
//!
//! ```text
//!  queue() ──► bounded channel ──► worker 0 ─┐
//!                              ├─► worker 1 ─┼─► metric lock ─► MetricLog::write
//!                              └─► worker N ─┘                        │
//!                                                  names_w[i] ◄── new metric
//!
//!  metrics() ── merge names_w[*] into a copy of names ── iterate
//!  query()   ── metric read lock ── MetricLog::read (read-only)
//! ```
//!
//! Every queued value carries a completion callback that runs exactly once:
//! after the write, when the value is dropped from a full queue, when the
//! send is cancelled, or when the engine shuts down with the value still
//! queued.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use rothko_core::{RothkoError, RothkoResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::file::DataFile;
use crate::file_cache::{FileCache, FileParams};
use crate::lock_pool::LockPool;
use crate::metric_log::{data_file_number, MetricLog};
use crate::name_set::NameSet;
use crate::options::EngineOptions;
use crate::path_codec::{dir_to_metric, metric_dir_path};

/// How often a blocked send rechecks cancellation.
const SEND_POLL: Duration = Duration::from_millis(50);

/// Idle buffers kept for reuse.
const MAX_POOLED_BUFFERS: usize = 1024;

/// Callback invoked with `(written, error)` once a queued value is settled.
pub type DoneFn = Box<dyn FnOnce(bool, Option<RothkoError>) + Send>;

/// Owns a completion callback and guarantees it runs exactly once.
pub struct Completion(Option<DoneFn>);

impl Completion {
    pub fn new(done: impl FnOnce(bool, Option<RothkoError>) + Send + 'static) -> Self {
        Self(Some(Box::new(done)))
    }

    pub fn finish(mut self, written: bool, err: Option<RothkoError>) {
        if let Some(done) = self.0.take() {
            done(written, err);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(done) = self.0.take() {
            done(false, None);
        }
    }
}

struct QueuedValue {
    metric: String,
    start: i64,
    end: i64,
    data: Vec<u8>,
    done: Completion,
}

struct Queue {
    tx: Sender<QueuedValue>,
    rx: Receiver<QueuedValue>,
}

impl Queue {
    fn new(depth: usize) -> Self {
        let (tx, rx) = bounded(depth);
        Self { tx, rx }
    }
}

/// Metric store over a root directory.
pub struct Engine {
    dir: PathBuf,
    opts: EngineOptions,
    cache: FileCache<DataFile>,
    locks: LockPool,
    bufs: Mutex<Vec<Vec<u8>>>,
    queue: ArcSwap<Queue>,

    names: ArcSwap<NameSet>,
    names_mu: Mutex<()>,
    names_w: Vec<Mutex<NameSet>>,

    running: AtomicBool,
}

impl Engine {
    /// Create an engine rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>, opts: EngineOptions) -> RothkoResult<Self> {
        opts.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let workers = opts.workers();
        let handles = opts.handles();
        info!(
            dir = %dir.display(),
            size = opts.size,
            cap = opts.cap,
            files = opts.files,
            workers,
            handles,
            "opening storage engine"
        );

        Ok(Self {
            cache: FileCache::new(
                FileParams {
                    size: opts.size,
                    cap: opts.cap,
                },
                handles,
            ),
            locks: LockPool::new(),
            bufs: Mutex::new(Vec::new()),
            queue: ArcSwap::from_pointee(Queue::new(opts.tuning.buffer)),
            names: ArcSwap::from_pointee(NameSet::new()),
            names_mu: Mutex::new(()),
            names_w: (0..workers).map(|_| Mutex::new(NameSet::new())).collect(),
            running: AtomicBool::new(false),
            dir,
            opts,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    /// Queue a value for writing. `done` is called exactly once with whether
    /// the value was written and any error.
    ///
    /// With `drop` tuning a full queue settles the value immediately as not
    /// written; otherwise this blocks until there is room or `token` is
    /// cancelled.
    pub fn queue(
        &self,
        token: &CancellationToken,
        metric: &str,
        start: i64,
        end: i64,
        data: &[u8],
        done: impl FnOnce(bool, Option<RothkoError>) + Send + 'static,
    ) {
        let mut buf = self.get_buf();
        buf.extend_from_slice(data);
        let mut value = QueuedValue {
            metric: metric.to_string(),
            start,
            end,
            data: buf,
            done: Completion::new(done),
        };

        let queue = self.queue.load_full();
        if self.opts.tuning.drop {
            match queue.tx.try_send(value) {
                Ok(()) => {}
                Err(TrySendError::Full(v)) | Err(TrySendError::Disconnected(v)) => {
                    debug!(metric = %v.metric, "write queue full, dropping value");
                    self.settle(v, false, None);
                }
            }
            return;
        }

        loop {
            match queue.tx.send_timeout(value, SEND_POLL) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(v)) => {
                    if token.is_cancelled() {
                        self.settle(v, false, Some(RothkoError::Cancelled));
                        return;
                    }
                    value = v;
                }
                Err(SendTimeoutError::Disconnected(v)) => {
                    self.settle(v, false, None);
                    return;
                }
            }
        }
    }

    /// Run the worker pool and the name populator until `token` is
    /// cancelled. May only be called once per engine.
    pub fn run(&self, token: CancellationToken) -> RothkoResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RothkoError::AlreadyRunning);
        }

        let queue = self.queue.load_full();
        let (stop_tx, stop_rx) = bounded::<()>(0);

        std::thread::scope(|scope| {
            for worker in 0..self.names_w.len() {
                let rx = queue.rx.clone();
                let stop = stop_rx.clone();
                scope.spawn(move || self.work(worker, rx, stop));
            }

            let populate_token = token.clone();
            scope.spawn(move || {
                if let Err(e) = self.populate_metrics(&populate_token) {
                    if !matches!(e, RothkoError::Cancelled) {
                        warn!(error = %e, "failed to cache metric names");
                    }
                }
            });

            futures::executor::block_on(token.cancelled());
            drop(stop_tx);
        });

        info!("storage engine stopping");
        self.cache.close();

        // later queue() calls land in a fresh queue; whatever was left in
        // the old one is settled as not written
        let old = self.queue.swap(Arc::new(Queue::new(self.opts.tuning.buffer)));
        let mut drained = 0usize;
        while let Ok(value) = old.rx.try_recv() {
            self.settle(value, false, None);
            drained += 1;
        }
        if drained > 0 {
            info!(drained, "settled queued values on shutdown");
        }
        Ok(())
    }

    /// Call `cb` with every known metric name in ascending order until it
    /// returns false.
    pub fn metrics<F>(&self, mut cb: F)
    where
        F: FnMut(&str) -> bool,
    {
        let names = {
            let _guard = self.names_mu.lock();
            let mut merged: Option<NameSet> = None;
            for pending in &self.names_w {
                let mut pending = pending.lock();
                if pending.is_empty() {
                    continue;
                }
                merged
                    .get_or_insert_with(|| NameSet::clone(&self.names.load()))
                    .merge(&pending);
                pending.clear();
            }
            if let Some(merged) = merged {
                self.names.store(Arc::new(merged));
            }
            self.names.load_full()
        };

        for name in names.iter() {
            if !cb(name) {
                break;
            }
        }
    }

    /// Rebuild the name set from the metric directories on disk.
    pub fn populate_metrics(&self, token: &CancellationToken) -> RothkoResult<()> {
        let started = Instant::now();
        let mut names = NameSet::new();
        walk(&self.dir, &self.dir, token, &mut names)?;

        let count = names.len();
        {
            let _guard = self.names_mu.lock();
            self.names.store(Arc::new(names));
        }
        info!(
            metrics = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "caching metric names"
        );
        Ok(())
    }

    /// Walk the values of `metric` newest first whose end is before
    /// `end_before`. `cb` returns false to stop.
    pub fn query<F>(
        &self,
        token: &CancellationToken,
        metric: &str,
        end_before: i64,
        scratch: &mut Vec<u8>,
        cb: F,
    ) -> RothkoResult<()>
    where
        F: FnMut(i64, i64, &[u8]) -> RothkoResult<bool>,
    {
        let _guard = self.locks.read(metric);
        let log = MetricLog::open(
            metric_dir_path(&self.dir, metric),
            &self.cache,
            self.opts.log_options(),
            true,
        )?;
        log.read(token, end_before, scratch, cb)
    }

    /// The most recent value of `metric`, if any.
    pub fn query_latest(
        &self,
        token: &CancellationToken,
        metric: &str,
        scratch: &mut Vec<u8>,
    ) -> RothkoResult<Option<(i64, i64, Vec<u8>)>> {
        let _guard = self.locks.read(metric);
        let log = MetricLog::open(
            metric_dir_path(&self.dir, metric),
            &self.cache,
            self.opts.log_options(),
            true,
        )?;
        log.read_last(token, scratch)
    }

    fn work(&self, worker: usize, rx: Receiver<QueuedValue>, stop: Receiver<()>) {
        debug!(worker, "storage worker started");
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(rx) -> msg => match msg {
                    Ok(value) => self.write(worker, value),
                    Err(_) => break,
                },
            }
        }
        debug!(worker, "storage worker stopped");
    }

    fn write(&self, worker: usize, value: QueuedValue) {
        let QueuedValue {
            metric,
            start,
            end,
            data,
            done,
        } = value;

        let result = {
            let _guard = self.locks.write(&metric);
            MetricLog::open(
                metric_dir_path(&self.dir, &metric),
                &self.cache,
                self.opts.log_options(),
                false,
            )
            .and_then(|mut log| log.write(start, end, &data))
        };
        self.put_buf(data);

        match result {
            Ok(written) => {
                if written && !self.names.load().contains(&metric) {
                    self.names_w[worker].lock().insert(&metric);
                }
                done.finish(written, None);
            }
            Err(e) => {
                warn!(metric = %metric, start, end, error = %e, "write failed");
                done.finish(false, Some(e));
            }
        }
    }

    fn settle(&self, value: QueuedValue, written: bool, err: Option<RothkoError>) {
        self.put_buf(value.data);
        value.done.finish(written, err);
    }

    fn get_buf(&self) -> Vec<u8> {
        self.bufs.lock().pop().unwrap_or_default()
    }

    fn put_buf(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut bufs = self.bufs.lock();
        if bufs.len() < MAX_POOLED_BUFFERS {
            bufs.push(buf);
        }
    }
}

/// Collect the metric of every directory under `root` holding data files.
fn walk(
    root: &Path,
    dir: &Path,
    token: &CancellationToken,
    names: &mut NameSet,
) -> RothkoResult<()> {
    if token.is_cancelled() {
        return Err(RothkoError::Cancelled);
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut has_data = false;
    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            subdirs.push(entry.path());
        } else if file_type.is_file()
            && data_file_number(&entry.file_name().to_string_lossy()).is_some()
        {
            has_data = true;
        }
    }

    if has_data {
        let rel = dir.strip_prefix(root).unwrap_or(dir);
        let encoded = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        match dir_to_metric(&encoded) {
            Ok(metric) => {
                names.insert(&metric);
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "skipping undecodable metric dir"),
        }
    }

    for sub in subdirs {
        walk(root, &sub, token, names)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Tuning;
    use std::sync::mpsc;
    use tempfile::tempdir;

    fn small_opts() -> EngineOptions {
        EngineOptions {
            size: 128,
            cap: 8,
            files: 2,
            tuning: Tuning {
                buffer: 16,
                drop: false,
                workers: 2,
                handles: 32,
            },
        }
    }

    #[test]
    fn test_completion_runs_once() {
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        Completion::new(move |w, e| tx.send((w, e.is_some())).unwrap()).finish(true, None);
        drop(Completion::new(move |w, e| tx2.send((w, e.is_some())).unwrap()));
        assert_eq!(rx.recv().unwrap(), (true, false));
        assert_eq!(rx.recv().unwrap(), (false, false));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_mode_settles_when_full() {
        let dir = tempdir().unwrap();
        let mut opts = small_opts();
        opts.tuning.buffer = 1;
        opts.tuning.drop = true;
        let engine = Engine::new(dir.path(), opts).unwrap();
        let token = CancellationToken::new();

        let (tx, rx) = mpsc::channel();
        for i in 0..3 {
            let tx = tx.clone();
            engine.queue(&token, "m", i, i + 1, b"v", move |w, e| {
                let _ = tx.send((i, w, e.is_some()));
            });
        }

        // nothing is running, so the first value sits in the queue and the
        // other two are dropped
        let settled: Vec<_> = rx.try_iter().collect();
        assert_eq!(settled, vec![(1, false, false), (2, false, false)]);
    }

    #[test]
    fn test_blocking_send_honours_cancellation() {
        let dir = tempdir().unwrap();
        let mut opts = small_opts();
        opts.tuning.buffer = 1;
        let engine = Engine::new(dir.path(), opts).unwrap();
        let token = CancellationToken::new();

        engine.queue(&token, "m", 0, 1, b"a", |_, _| {});
        token.cancel();

        let (tx, rx) = mpsc::channel();
        engine.queue(&token, "m", 1, 2, b"b", move |w, e| {
            tx.send((w, matches!(e, Some(RothkoError::Cancelled)))).unwrap()
        });
        assert_eq!(rx.recv().unwrap(), (false, true));
    }

    #[test]
    fn test_run_twice_fails() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(Engine::new(dir.path(), small_opts()).unwrap());
        let token = CancellationToken::new();

        let runner = {
            let engine = engine.clone();
            let token = token.clone();
            std::thread::spawn(move || engine.run(token))
        };

        // wait for the first run to take the guard
        while !engine.running.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        assert!(matches!(
            engine.run(CancellationToken::new()),
            Err(RothkoError::AlreadyRunning)
        ));

        token.cancel();
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn test_shutdown_settles_queued_values() {
        let dir = tempdir().unwrap();
        let mut opts = small_opts();
        opts.tuning.buffer = 8;
        let engine = Engine::new(dir.path(), opts).unwrap();

        let (tx, rx) = mpsc::channel();
        let token = CancellationToken::new();
        for i in 0..4 {
            let tx = tx.clone();
            engine.queue(&token, "m", i, i + 1, b"v", move |w, _| tx.send(w).unwrap());
        }

        // run with an already cancelled token: workers may take some values
        // before stopping, the rest are drained
        let stop = CancellationToken::new();
        stop.cancel();
        engine.run(stop).unwrap();

        let settled: Vec<bool> = rx.try_iter().collect();
        assert_eq!(settled.len(), 4);
    }

    #[test]
    fn test_walk_decodes_metric_dirs() {
        let dir = tempdir().unwrap();
        for rel in ["foo/bar", "foo/%2ebar", "baz"] {
            let d = dir.path().join(rel);
            fs::create_dir_all(&d).unwrap();
            fs::write(d.join("1.data"), b"").unwrap();
        }
        fs::create_dir_all(dir.path().join("empty/dir")).unwrap();
        fs::write(dir.path().join("foo/notes.txt"), b"").unwrap();

        let mut names = NameSet::new();
        walk(dir.path(), dir.path(), &CancellationToken::new(), &mut names).unwrap();
        assert_eq!(
            names.iter().collect::<Vec<_>>(),
            vec!["baz", "foo..bar", "foo.bar"]
        );
    }
}
