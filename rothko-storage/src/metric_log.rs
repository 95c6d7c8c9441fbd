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

//! Per-metric reverse chronological log
//!
//! A metric directory holds numbered data files. Values are appended to the
//! highest numbered file; when it cannot hold the next value a new file is
//! created and, if more than `files` are retained, the lowest numbered file
//! is deleted.
//!
//! ```text
//!   metric dir
//!   ├── 3.data   (first, oldest values)
//!   ├── 4.data
//!   └── 5.data   (last, receives writes)
//!
//!   5.data:  [meta][ free ... | head | v9 | v8 | v7 ]
//!                                   └── forward walk = newest first
//! ```
//!
//! Callers hold the metric lock for the lifetime of a `MetricLog`.

use std::fs;
use std::path::{Path, PathBuf};

use rothko_core::{RothkoError, RothkoResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{encode_slots, num_slots, SlotKind};
use crate::file::DataFile;
use crate::file_cache::FileCache;

/// Geometry and retention of a metric log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Slot size in bytes.
    pub size: usize,
    /// Value slots per file.
    pub cap: usize,
    /// Files kept before the oldest is deleted. Zero keeps everything.
    pub files: usize,
}

/// The data files of one metric.
pub struct MetricLog<'a> {
    dir: PathBuf,
    cache: &'a FileCache<DataFile>,
    opts: LogOptions,
    first: u64,
    last: u64,
}

impl<'a> MetricLog<'a> {
    /// Scan `dir` for data files. Unless `read_only`, the directory and an
    /// empty `1.data` are created when missing. A read-only log over a
    /// missing directory is empty.
    pub fn open(
        dir: impl Into<PathBuf>,
        cache: &'a FileCache<DataFile>,
        opts: LogOptions,
        read_only: bool,
    ) -> RothkoResult<Self> {
        let dir = dir.into();
        let mut log = Self {
            dir,
            cache,
            opts,
            first: 0,
            last: 0,
        };

        let numbers = log.scan()?;
        match (numbers.first(), numbers.last()) {
            (Some(&first), Some(&last)) => {
                log.first = first;
                log.last = last;
                if !read_only {
                    log.reclaim_empty_tail()?;
                }
            }
            _ if read_only => {}
            _ => {
                fs::create_dir_all(&log.dir)?;
                let path = log.file_path(1);
                let file = log.cache.acquire(&path, false)?;
                log.cache.release(&path, file);
                log.first = 1;
                log.last = 1;
            }
        }
        Ok(log)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lowest and highest file numbers in use, `(0, 0)` when empty.
    pub fn range(&self) -> (u64, u64) {
        (self.first, self.last)
    }

    pub fn is_empty(&self) -> bool {
        self.last == 0
    }

    pub fn file_path(&self, num: u64) -> PathBuf {
        self.dir.join(format!("{}.data", num))
    }

    /// Append a value. Returns `Ok(false)` without writing when `end` does
    /// not come after the end of the most recent value.
    pub fn write(&mut self, start: i64, end: i64, data: &[u8]) -> RothkoResult<bool> {
        if self.is_empty() {
            return Err(RothkoError::InvalidParameters(format!(
                "log {} was opened read-only",
                self.dir.display()
            )));
        }

        let n = num_slots(data.len(), self.opts.size).ok_or_else(|| {
            RothkoError::InvalidParameters(format!("slot size {} too small", self.opts.size))
        })?;

        let mut path = self.file_path(self.last);
        let mut file = self.cache.acquire(&path, false)?;
        let mut head = file.head();

        let last_written = head + 1;
        if last_written < file.capacity() as i64 && file.has_slot(last_written as usize) {
            let stored_end = match file.read_slot(last_written as usize) {
                Ok(slot) => slot.end,
                // an unreadable newest slot falls back to the metadata end
                Err(_) => file.metadata().end,
            };
            if stored_end >= end {
                self.cache.release(&path, file);
                return Ok(false);
            }
        }

        // checked before rotating so an impossible write never evicts a file
        if n > self.opts.cap {
            self.cache.release(&path, file);
            return Err(self.too_large(data.len(), n));
        }

        if n as i64 > head + 1 {
            self.cache.release(&path, file);
            self.rotate()?;

            path = self.file_path(self.last);
            file = self.cache.acquire(&path, false)?;
            head = file.head();
            if n as i64 > head + 1 {
                self.cache.release(&path, file);
                return Err(self.too_large(data.len(), n));
            }
        }

        let result = write_value(&mut file, head, n, start, end, data);
        self.cache.release(&path, file);
        result.map(|_| true)
    }

    fn too_large(&self, len: usize, slots: usize) -> RothkoError {
        RothkoError::ValueTooLarge(format!(
            "{} bytes need {} slots, file holds {}",
            len, slots, self.opts.cap
        ))
    }

    /// Walk values newest first, calling `emit(start, end, data)` for each
    /// whose end is before `end_before`. `emit` returns false to stop.
    ///
    /// `scratch` is reused to reassemble values split across slots.
    pub fn read<F>(
        &self,
        token: &CancellationToken,
        end_before: i64,
        scratch: &mut Vec<u8>,
        mut emit: F,
    ) -> RothkoResult<()>
    where
        F: FnMut(i64, i64, &[u8]) -> RothkoResult<bool>,
    {
        if self.is_empty() {
            return Ok(());
        }

        let mut num = self.last;
        while num >= self.first && num > 0 {
            if token.is_cancelled() {
                return Err(RothkoError::Cancelled);
            }

            let path = self.file_path(num);
            let file = match self.cache.acquire(&path, true) {
                Ok(file) => file,
                Err(e) if e.is_corruption() => {
                    warn!(path = %path.display(), error = %e, "skipping corrupt data file");
                    num -= 1;
                    continue;
                }
                Err(RothkoError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    // reclaimed by a concurrent rotation
                    num -= 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let result = if file.is_empty() || file.metadata().smallest_end >= end_before {
                Ok(true)
            } else {
                scan_file(&file, token, end_before, scratch, &mut emit)
            };
            self.cache.release(&path, file);

            if !result? {
                return Ok(());
            }
            num -= 1;
        }
        Ok(())
    }

    /// The most recent value, if any.
    pub fn read_last(
        &self,
        token: &CancellationToken,
        scratch: &mut Vec<u8>,
    ) -> RothkoResult<Option<(i64, i64, Vec<u8>)>> {
        let mut latest = None;
        self.read(token, i64::MAX, scratch, |start, end, data| {
            latest = Some((start, end, data.to_vec()));
            Ok(false)
        })?;
        Ok(latest)
    }

    /// Remove an empty highest numbered file left behind by an interrupted
    /// rotation so the monotonic end check sees the newest value.
    fn reclaim_empty_tail(&mut self) -> RothkoResult<()> {
        if self.first >= self.last {
            return Ok(());
        }
        let path = self.file_path(self.last);
        let file = match self.cache.acquire(&path, true) {
            Ok(file) => file,
            Err(e) if e.is_corruption() => return Ok(()),
            Err(e) => return Err(e),
        };
        let empty = file.is_empty();
        self.cache.release(&path, file);
        if empty {
            self.cache.evict(&path);
            fs::remove_file(&path)?;
            debug!(path = %path.display(), "removed empty trailing data file");
            self.last -= 1;
        }
        Ok(())
    }

    /// Start a new file, deleting the oldest when over the retention limit.
    fn rotate(&mut self) -> RothkoResult<()> {
        let files = self.opts.files as u64;
        if files > 0 && self.last - self.first + 1 >= files {
            let oldest = self.file_path(self.first);
            self.cache.evict(&oldest);
            match fs::remove_file(&oldest) {
                Ok(()) => debug!(path = %oldest.display(), "removed oldest data file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RothkoError::Rotation(format!(
                        "remove {}: {}",
                        oldest.display(),
                        e
                    )))
                }
            }
            self.first += 1;
        }

        self.last += 1;
        let path = self.file_path(self.last);
        let file = self.cache.acquire(&path, false).map_err(|e| match e {
            RothkoError::Io(io) => {
                RothkoError::Rotation(format!("create {}: {}", path.display(), io))
            }
            other => other,
        })?;
        self.cache.release(&path, file);
        Ok(())
    }

    /// List the numbers of `N.data` files in ascending order.
    fn scan(&self) -> RothkoResult<Vec<u64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut numbers = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(num) = data_file_number(&entry.file_name().to_string_lossy()) {
                numbers.push(num);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }
}

/// Parse `N` out of a `N.data` file name. Zero is not a valid number.
pub fn data_file_number(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".data")?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().filter(|n| *n > 0)
}

/// Write the `n` slots of a value below `head` and update the metadata.
fn write_value(
    file: &mut DataFile,
    head: i64,
    n: usize,
    start: i64,
    end: i64,
    data: &[u8],
) -> RothkoResult<()> {
    let was_empty = file.is_empty();
    let low = (head + 1) as usize - n;
    let slot_size = file.slot_size();

    // the first chunk lands at the lowest index so a forward walk meets
    // begin, continue, ..., end in order
    encode_slots(start, end, data, slot_size, |i, slot| {
        file.write_slot(low + i, &slot)
    })?;

    let mut meta = file.metadata().clone();
    meta.head = low as i64 - 1;
    meta.end = end;
    if was_empty {
        meta.start = start;
        meta.smallest_end = end;
    } else {
        meta.smallest_end = meta.smallest_end.min(end);
    }
    file.set_metadata(meta)?;
    file.sync_async()
}

/// Walk one file forward from its head. Returns false once `emit` asked
/// to stop.
fn scan_file<F>(
    file: &DataFile,
    token: &CancellationToken,
    end_before: i64,
    scratch: &mut Vec<u8>,
    emit: &mut F,
) -> RothkoResult<bool>
where
    F: FnMut(i64, i64, &[u8]) -> RothkoResult<bool>,
{
    let cap = file.capacity();
    let mut idx = (file.head() + 1) as usize;

    while idx < cap {
        let slot = match file.read_slot(idx) {
            Ok(slot) => slot,
            Err(e) => {
                warn!(path = %file.path().display(), slot = idx, error = %e, "skipping corrupt slot");
                idx += 1;
                continue;
            }
        };

        match slot.kind {
            SlotKind::Complete => {
                idx += 1;
                if slot.end < end_before {
                    if !emit(slot.start, slot.end, slot.data)? {
                        return Ok(false);
                    }
                    if token.is_cancelled() {
                        return Err(RothkoError::Cancelled);
                    }
                }
            }
            SlotKind::Begin => {
                let (start, end) = (slot.start, slot.end);
                scratch.clear();
                scratch.extend_from_slice(slot.data);
                idx += 1;

                match assemble(file, &mut idx, start, end, scratch) {
                    Ok(true) => {
                        if end < end_before {
                            if !emit(start, end, scratch)? {
                                return Ok(false);
                            }
                            if token.is_cancelled() {
                                return Err(RothkoError::Cancelled);
                            }
                        }
                    }
                    Ok(false) => {
                        warn!(
                            path = %file.path().display(),
                            slot = idx,
                            "incomplete value, resuming at next slot"
                        );
                    }
                    Err(e) => {
                        warn!(path = %file.path().display(), slot = idx, error = %e, "skipping corrupt slot");
                        idx += 1;
                    }
                }
            }
            kind => {
                warn!(
                    path = %file.path().display(),
                    slot = idx,
                    kind = ?kind,
                    "unexpected slot kind, resuming at next slot"
                );
                idx += 1;
            }
        }
    }
    Ok(true)
}

/// Append continue slots and the final end slot of a value to `scratch`.
/// Returns `Ok(false)` without consuming the offending slot when the value
/// is cut short, leaving `idx` on it.
fn assemble(
    file: &DataFile,
    idx: &mut usize,
    start: i64,
    end: i64,
    scratch: &mut Vec<u8>,
) -> RothkoResult<bool> {
    while *idx < file.capacity() {
        let slot = file.read_slot(*idx)?;
        if slot.start != start || slot.end != end {
            return Ok(false);
        }
        match slot.kind {
            SlotKind::Continue => {
                scratch.extend_from_slice(slot.data);
                *idx += 1;
            }
            SlotKind::End => {
                scratch.extend_from_slice(slot.data);
                *idx += 1;
                return Ok(true);
            }
            _ => return Ok(false),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_cache::FileParams;
    use tempfile::tempdir;

    fn opts(size: usize, cap: usize, files: usize) -> LogOptions {
        LogOptions { size, cap, files }
    }

    fn cache(o: &LogOptions) -> FileCache<DataFile> {
        FileCache::new(
            FileParams {
                size: o.size,
                cap: o.cap,
            },
            16,
        )
    }

    fn collect(log: &MetricLog<'_>, end_before: i64) -> Vec<(i64, i64, Vec<u8>)> {
        let mut out = Vec::new();
        let mut scratch = Vec::new();
        log.read(&CancellationToken::new(), end_before, &mut scratch, |s, e, d| {
            out.push((s, e, d.to_vec()));
            Ok(true)
        })
        .unwrap();
        out
    }

    #[test]
    fn test_data_file_number() {
        assert_eq!(data_file_number("1.data"), Some(1));
        assert_eq!(data_file_number("42.data"), Some(42));
        assert_eq!(data_file_number("0.data"), None);
        assert_eq!(data_file_number(".data"), None);
        assert_eq!(data_file_number("x.data"), None);
        assert_eq!(data_file_number("1.dat"), None);
        assert_eq!(data_file_number("-1.data"), None);
    }

    #[test]
    fn test_open_creates_first_file() {
        let dir = tempdir().unwrap();
        let o = opts(128, 4, 2);
        let c = cache(&o);
        let log = MetricLog::open(dir.path().join("m"), &c, o, false).unwrap();
        assert_eq!(log.range(), (1, 1));
        assert!(dir.path().join("m/1.data").exists());

        let ro = MetricLog::open(dir.path().join("missing"), &c, o, true).unwrap();
        assert!(ro.is_empty());
        assert!(collect(&ro, i64::MAX).is_empty());
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let o = opts(128, 8, 2);
        let c = cache(&o);
        let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();

        for i in 0..5i64 {
            assert!(log.write(i, i + 1, &[i as u8; 10]).unwrap());
        }

        let all = collect(&log, i64::MAX);
        let ends: Vec<i64> = all.iter().map(|v| v.1).collect();
        assert_eq!(ends, vec![5, 4, 3, 2, 1]);
        assert_eq!(all[0].2, vec![4u8; 10]);

        let before = collect(&log, 3);
        assert_eq!(before.iter().map(|v| v.1).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_non_monotonic_write_is_skipped() {
        let dir = tempdir().unwrap();
        let o = opts(128, 8, 2);
        let c = cache(&o);
        let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();

        assert!(log.write(10, 20, b"x").unwrap());
        assert!(!log.write(5, 15, b"y").unwrap());
        assert!(!log.write(5, 20, b"z").unwrap());

        let latest = log
            .read_last(&CancellationToken::new(), &mut Vec::new())
            .unwrap();
        assert_eq!(latest, Some((10, 20, b"x".to_vec())));
    }

    #[test]
    fn test_multi_slot_values() {
        let dir = tempdir().unwrap();
        let o = opts(128, 16, 2);
        let c = cache(&o);
        let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();

        let big: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        assert!(log.write(0, 1, b"small").unwrap());
        assert!(log.write(1, 2, &big).unwrap());
        assert!(log.write(2, 3, b"tail").unwrap());

        let all = collect(&log, i64::MAX);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].2, b"tail".to_vec());
        assert_eq!(all[1].2, big);
        assert_eq!(all[2].2, b"small".to_vec());
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = tempdir().unwrap();
        let o = opts(256, 1, 2);
        let c = cache(&o);
        let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();

        for i in 0..10i64 {
            assert!(log.write(i, i + 1, &[7u8; 200]).unwrap());
            let files = fs::read_dir(dir.path()).unwrap().count();
            assert!(files <= 3, "{} files after write {}", files, i);
        }

        let ends: Vec<i64> = collect(&log, i64::MAX).iter().map(|v| v.1).collect();
        assert_eq!(ends, vec![10, 9]);
        assert_eq!(log.range(), (9, 10));
    }

    #[test]
    fn test_value_too_large() {
        let dir = tempdir().unwrap();
        let o = opts(128, 2, 2);
        let c = cache(&o);
        let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();

        let err = log.write(0, 1, &[0u8; 1000]).unwrap_err();
        assert!(matches!(err, RothkoError::ValueTooLarge(_)));

        assert!(log.write(0, 1, b"a").unwrap());
        let err = log.write(1, 2, &[0u8; 1000]).unwrap_err();
        assert!(matches!(err, RothkoError::ValueTooLarge(_)));
        assert_eq!(log.range(), (1, 1));
    }

    #[test]
    fn test_value_too_large_keeps_retained_files() {
        let dir = tempdir().unwrap();
        let o = opts(128, 2, 3);
        let c = cache(&o);
        let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();

        for i in 0..6i64 {
            assert!(log.write(i, i + 1, b"v").unwrap());
        }
        let before: Vec<i64> = collect(&log, i64::MAX).iter().map(|v| v.1).collect();
        assert_eq!(before, vec![6, 5, 4, 3, 2, 1]);
        let range = log.range();

        for i in 6..9i64 {
            let err = log.write(i, i + 1, &[0u8; 1000]).unwrap_err();
            assert!(matches!(err, RothkoError::ValueTooLarge(_)));
        }

        let after: Vec<i64> = collect(&log, i64::MAX).iter().map(|v| v.1).collect();
        assert_eq!(after, before);
        assert_eq!(log.range(), range);
    }

    #[test]
    fn test_reopen_sees_existing_files() {
        let dir = tempdir().unwrap();
        let o = opts(128, 2, 0);
        {
            let c = cache(&o);
            let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();
            for i in 0..5i64 {
                log.write(i, i + 1, b"v").unwrap();
            }
            c.close();
        }

        let c = cache(&o);
        let log = MetricLog::open(dir.path(), &c, o, true).unwrap();
        assert_eq!(log.range(), (1, 3));
        assert_eq!(collect(&log, i64::MAX).len(), 5);
    }

    #[test]
    fn test_empty_tail_is_reclaimed() {
        let dir = tempdir().unwrap();
        let o = opts(128, 1, 0);
        {
            let c = cache(&o);
            let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();
            log.write(0, 5, b"a").unwrap();
            c.close();
        }
        DataFile::create(dir.path().join("2.data"), 128, 1).unwrap();

        let c = cache(&o);
        let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();
        assert_eq!(log.range(), (1, 1));
        assert!(!dir.path().join("2.data").exists());
        // the end check sees the value in 1.data again
        assert!(!log.write(0, 3, b"b").unwrap());
    }

    #[test]
    fn test_cancelled_read() {
        let dir = tempdir().unwrap();
        let o = opts(128, 4, 2);
        let c = cache(&o);
        let mut log = MetricLog::open(dir.path(), &c, o, false).unwrap();
        log.write(0, 1, b"a").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = log
            .read(&token, i64::MAX, &mut Vec::new(), |_, _, _| Ok(true))
            .unwrap_err();
        assert!(matches!(err, RothkoError::Cancelled));
    }
}
