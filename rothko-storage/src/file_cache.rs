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

//! Bounded cache of open file handles
//!
//! Handles are checked out with [`FileCache::acquire`] and checked back in
//! with [`FileCache::release`]. While checked out a handle is owned by the
//! caller, so two callers never share one. When the cache is full a
//! uniformly random entry is closed to make room: every metric is written
//! once per dump interval, which turns LRU into FIFO with extra bookkeeping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rand::Rng;
use rothko_core::{RothkoError, RothkoResult};
use tracing::warn;

use crate::file::DataFile;

/// A file type the cache can open, create and close.
pub trait Handle: Sized + Send {
    /// Parameters needed to create a new file.
    type Params: Send + Sync;

    fn open(path: &Path) -> RothkoResult<Self>;

    fn create(path: &Path, params: &Self::Params) -> RothkoResult<Self>;

    fn close(self) -> RothkoResult<()>;
}

/// Slot geometry for newly created data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileParams {
    pub size: usize,
    pub cap: usize,
}

impl Handle for DataFile {
    type Params = FileParams;

    fn open(path: &Path) -> RothkoResult<Self> {
        DataFile::open(path)
    }

    fn create(path: &Path, params: &FileParams) -> RothkoResult<Self> {
        DataFile::create(path, params.size, params.cap)
    }

    fn close(self) -> RothkoResult<()> {
        DataFile::close(self)
    }
}

struct Entries<H> {
    map: HashMap<PathBuf, (H, usize)>,
    // dense list of cached paths for uniform random eviction
    keys: Vec<PathBuf>,
}

impl<H> Entries<H> {
    fn take(&mut self, path: &Path) -> Option<H> {
        let (handle, idx) = self.map.remove(path)?;
        self.keys.swap_remove(idx);
        if let Some(moved) = self.keys.get(idx) {
            if let Some(entry) = self.map.get_mut(moved) {
                entry.1 = idx;
            }
        }
        Some(handle)
    }

    fn put(&mut self, path: PathBuf, handle: H) {
        let idx = self.keys.len();
        self.keys.push(path.clone());
        self.map.insert(path, (handle, idx));
    }
}

/// Path keyed cache of at most `capacity` idle handles.
pub struct FileCache<H: Handle = DataFile> {
    params: H::Params,
    capacity: usize,
    inner: Mutex<Entries<H>>,
}

impl<H: Handle> FileCache<H> {
    pub fn new(params: H::Params, capacity: usize) -> Self {
        Self {
            params,
            capacity: capacity.max(1),
            inner: Mutex::new(Entries {
                map: HashMap::new(),
                keys: Vec::new(),
            }),
        }
    }

    pub fn params(&self) -> &H::Params {
        &self.params
    }

    /// Check out the handle for `path`, opening it (or creating it unless
    /// `must_exist`) if it is not cached.
    pub fn acquire(&self, path: &Path, must_exist: bool) -> RothkoResult<H> {
        if let Some(handle) = self.inner.lock().take(path) {
            return Ok(handle);
        }

        if path.exists() {
            H::open(path)
        } else if must_exist {
            Err(RothkoError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )))
        } else {
            H::create(path, &self.params)
        }
    }

    /// Check a handle back in, closing a random entry if the cache is full.
    ///
    /// Concurrent readers of one metric may each hold a handle for the same
    /// path; the one released last replaces the other.
    pub fn release(&self, path: &Path, handle: H) {
        let (duplicate, evicted) = {
            let mut inner = self.inner.lock();
            let duplicate = inner.take(path);
            let evicted = if inner.keys.len() >= self.capacity {
                let idx = rand::thread_rng().gen_range(0..inner.keys.len());
                let victim = inner.keys[idx].clone();
                inner.take(&victim).map(|h| (victim, h))
            } else {
                None
            };
            inner.put(path.to_path_buf(), handle);
            (duplicate, evicted)
        };

        if let Some(handle) = duplicate {
            close_logged(path, handle);
        }
        if let Some((victim, handle)) = evicted {
            close_logged(&victim, handle);
        }
    }

    /// Drop and close any cached handle for `path`.
    pub fn evict(&self, path: &Path) {
        let handle = self.inner.lock().take(path);
        if let Some(handle) = handle {
            close_logged(path, handle);
        }
    }

    /// Close every cached handle.
    pub fn close(&self) {
        let drained: Vec<(PathBuf, H)> = {
            let mut inner = self.inner.lock();
            inner.keys.clear();
            inner.map.drain().map(|(p, (h, _))| (p, h)).collect()
        };
        for (path, handle) in drained {
            close_logged(&path, handle);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn close_logged<H: Handle>(path: &Path, handle: H) {
    if let Err(e) = handle.close() {
        warn!(path = %path.display(), error = %e, "failed to close data file");
    }
}
