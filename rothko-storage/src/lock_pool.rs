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

//! Per-key reader/writer locks that exist only while someone holds them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};

/// A map of named locks. Entries are created on first use and dropped when
/// the last guard for the key is released.
#[derive(Debug, Default)]
pub struct LockPool {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

enum Held {
    Read(ArcRwLockReadGuard<RawRwLock, ()>),
    Write(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// Guard returned by [`LockPool::read`] and [`LockPool::write`].
pub struct KeyGuard<'a> {
    pool: &'a LockPool,
    key: String,
    held: Option<Held>,
}

impl LockPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive lock on `key`.
    pub fn write(&self, key: &str) -> KeyGuard<'_> {
        let lock = self.entry(key);
        KeyGuard {
            pool: self,
            key: key.to_string(),
            held: Some(Held::Write(lock.write_arc())),
        }
    }

    /// Shared lock on `key`.
    pub fn read(&self, key: &str) -> KeyGuard<'_> {
        let lock = self.entry(key);
        KeyGuard {
            pool: self,
            key: key.to_string(),
            held: Some(Held::Read(lock.read_arc())),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(key) {
            return lock.clone();
        }
        let lock = Arc::new(RwLock::new(()));
        locks.insert(key.to_string(), lock.clone());
        lock
    }

    fn release(&self, key: &str) {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(key) {
            // the map holds the only reference once every guard and waiter
            // is gone
            if Arc::strong_count(lock) == 1 {
                locks.remove(key);
            }
        }
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        self.pool.release(&self.key);
    }
}
