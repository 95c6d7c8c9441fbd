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

//! Memory-mapped data files
//!
//! A data file is exactly `size * (cap + 1)` bytes, fully preallocated and
//! mapped shared read/write:
//!
//! ```text
//! ┌──────────────┬──────────┬──────────┬─────┬──────────────┐
//! │ metadata     │ slot 0   │ slot 1   │ ... │ slot cap-1   │
//! │ (size bytes) │          │          │     │              │
//! └──────────────┴──────────┴──────────┴─────┴──────────────┘
//!                  newest ◄─────────────────────── oldest
//! ```
//!
//! Slots fill from `cap - 1` down to 0, so walking the mapping forward from
//! the head visits values newest first. A slot whose first byte is zero has
//! never been written.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use prost::Message;
use rothko_core::{RothkoError, RothkoResult};

use crate::codec::{Slot, SlotKind, HEADER_SIZE};

/// Largest file length we are willing to map.
const MAX_FILE_LEN: usize = i32::MAX as usize;

/// Smallest slot that can hold the metadata record: five int64 fields of at
/// most eleven bytes each.
pub const MIN_SLOT_SIZE: usize = HEADER_SIZE + 5 * 11;

/// Per-file bookkeeping stored in the metadata slot.
#[derive(Clone, PartialEq, Message)]
pub struct Metadata {
    /// Slot size in bytes.
    #[prost(int64, tag = "1")]
    pub size: i64,

    /// Index of the next slot to fill. `cap - 1` when empty, -1 when full.
    #[prost(int64, tag = "2")]
    pub head: i64,

    /// Start time of the first value written into the file.
    #[prost(int64, tag = "3")]
    pub start: i64,

    /// End time of the most recent value.
    #[prost(int64, tag = "4")]
    pub end: i64,

    /// Smallest end time of any value, used to prune backward scans.
    #[prost(int64, tag = "5")]
    pub smallest_end: i64,
}

/// One memory-mapped `N.data` file.
#[derive(Debug)]
pub struct DataFile {
    path: PathBuf,
    // keeps the descriptor alive for the lifetime of the mapping
    _file: File,
    map: MmapMut,
    size: usize,
    cap: usize,
    meta: Metadata,
}

impl DataFile {
    /// Create a new file of `cap` slots of `size` bytes each. Fails if the
    /// file already exists.
    pub fn create(path: impl AsRef<Path>, size: usize, cap: usize) -> RothkoResult<Self> {
        let path = path.as_ref();
        let len = file_len(size, cap)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        preallocate(&file, len)?;

        // SAFETY: the file was just created by us and is only ever mutated
        // through this mapping while the owning metric lock is held.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };

        let mut data_file = Self {
            path: path.to_path_buf(),
            _file: file,
            map,
            size,
            cap,
            meta: Metadata {
                size: size as i64,
                head: cap as i64 - 1,
                start: 0,
                end: 0,
                smallest_end: 0,
            },
        };
        data_file.write_metadata()?;
        Ok(data_file)
    }

    /// Open an existing file and derive its capacity from its length.
    pub fn open(path: impl AsRef<Path>) -> RothkoResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE {
            return Err(RothkoError::corrupt_file(
                path,
                format!("file too small: {} bytes", len),
            ));
        }

        // SAFETY: see `create`.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };

        let meta = {
            let slot = Slot::decode(&map[..]).map_err(|e| {
                RothkoError::corrupt_file(path, format!("unreadable metadata: {}", e))
            })?;
            if slot.kind != SlotKind::Metadata {
                return Err(RothkoError::corrupt_file(
                    path,
                    format!("slot 0 has kind {:?}", slot.kind),
                ));
            }
            Metadata::decode(slot.data).map_err(|e| {
                RothkoError::corrupt_file(path, format!("invalid metadata: {}", e))
            })?
        };

        if meta.size <= HEADER_SIZE as i64 || meta.size as usize > len {
            return Err(RothkoError::corrupt_file(
                path,
                format!("invalid slot size: {}", meta.size),
            ));
        }
        let size = meta.size as usize;
        let cap = (len / size).saturating_sub(1);
        if cap == 0 {
            return Err(RothkoError::corrupt_file(path, "no room for any slot"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
            map,
            size,
            cap,
            meta,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn slot_size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// Replace the metadata and persist it into the metadata slot.
    pub fn set_metadata(&mut self, meta: Metadata) -> RothkoResult<()> {
        self.meta = meta;
        self.write_metadata()
    }

    /// Raw bytes of slot `n`.
    pub fn slot(&self, n: usize) -> RothkoResult<&[u8]> {
        self.check_bounds(n)?;
        let offset = (n + 1) * self.size;
        Ok(&self.map[offset..offset + self.size])
    }

    /// Whether slot `n` has ever been written.
    pub fn has_slot(&self, n: usize) -> bool {
        match self.slot(n) {
            Ok(bytes) => bytes[0] != 0,
            Err(_) => false,
        }
    }

    pub fn read_slot(&self, n: usize) -> RothkoResult<Slot<'_>> {
        Slot::decode(self.slot(n)?)
    }

    pub fn write_slot(&mut self, n: usize, slot: &Slot<'_>) -> RothkoResult<()> {
        self.check_bounds(n)?;
        let offset = (n + 1) * self.size;
        slot.encode_into(&mut self.map[offset..offset + self.size])?;
        Ok(())
    }

    /// Index of the next slot to fill, or -1 when the file is full.
    ///
    /// The stored head is only a hint: a crash between writing slots and
    /// rewriting the metadata leaves it stale, so it is checked against slot
    /// occupancy and walked until occupancy changes.
    pub fn head(&self) -> i64 {
        let mut head = self.meta.head.min(self.cap as i64 - 1);
        if head < 0 {
            return head;
        }

        if self.has_slot(head as usize) {
            while head >= 0 && self.has_slot(head as usize) {
                head -= 1;
            }
        } else {
            while head + 1 < self.cap as i64 && !self.has_slot(head as usize + 1) {
                head += 1;
            }
        }
        head
    }

    /// True when no value slot has been written.
    pub fn is_empty(&self) -> bool {
        self.head() == self.cap as i64 - 1
    }

    /// Flush dirty pages and wait for the write to complete.
    pub fn sync(&self) -> RothkoResult<()> {
        Ok(self.map.flush()?)
    }

    /// Schedule dirty pages to be written without waiting.
    pub fn sync_async(&self) -> RothkoResult<()> {
        Ok(self.map.flush_async()?)
    }

    /// Schedule outstanding writes and drop the mapping.
    pub fn close(self) -> RothkoResult<()> {
        self.sync_async()
    }

    fn check_bounds(&self, n: usize) -> RothkoResult<()> {
        if n >= self.cap {
            return Err(RothkoError::InvalidParameters(format!(
                "slot {} out of range for capacity {}",
                n, self.cap
            )));
        }
        Ok(())
    }

    fn write_metadata(&mut self) -> RothkoResult<()> {
        let payload = self.meta.encode_to_vec();
        let slot = Slot::new(SlotKind::Metadata, 0, 0, &payload);
        slot.encode_into(&mut self.map[..self.size])?;
        Ok(())
    }
}

/// Validate the geometry and compute the total file length.
fn file_len(size: usize, cap: usize) -> RothkoResult<usize> {
    if size < MIN_SLOT_SIZE {
        return Err(RothkoError::InvalidParameters(format!(
            "slot size {} is below the minimum of {}",
            size, MIN_SLOT_SIZE
        )));
    }
    if cap == 0 {
        return Err(RothkoError::InvalidParameters(
            "capacity must be at least 1".to_string(),
        ));
    }
    size.checked_mul(cap + 1)
        .filter(|len| *len <= MAX_FILE_LEN)
        .ok_or_else(|| {
            RothkoError::InvalidParameters(format!(
                "size {} with capacity {} does not fit in 31 bits",
                size, cap
            ))
        })
}

#[cfg(target_os = "linux")]
fn preallocate(file: &File, len: usize) -> RothkoResult<()> {
    use std::os::unix::io::AsRawFd;

    nix::fcntl::posix_fallocate(file.as_raw_fd(), 0, len as nix::libc::off_t)
        .map_err(|e| RothkoError::Allocation(format!("fallocate {} bytes: {}", len, e)))
}

#[cfg(not(target_os = "linux"))]
fn preallocate(file: &File, len: usize) -> RothkoResult<()> {
    file.set_len(len as u64)
        .map_err(|e| RothkoError::Allocation(format!("truncate to {} bytes: {}", len, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.data");
        let file = DataFile::create(&path, 128, 10).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 128 * 11);
        assert_eq!(file.capacity(), 10);
        assert_eq!(file.metadata().head, 9);
        assert!(file.is_empty());
        assert!(!file.has_slot(0));
        assert!(!file.has_slot(10));
    }

    #[test]
    fn test_create_fails_if_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.data");
        DataFile::create(&path, 128, 2).unwrap();
        assert!(DataFile::create(&path, 128, 2).is_err());
    }

    #[test]
    fn test_invalid_geometry() {
        let dir = tempdir().unwrap();
        assert!(DataFile::create(dir.path().join("a"), MIN_SLOT_SIZE - 1, 4).is_err());
        assert!(DataFile::create(dir.path().join("b"), 128, 0).is_err());
        assert!(DataFile::create(dir.path().join("c"), 1 << 20, 1 << 12).is_err());
    }

    #[test]
    fn test_write_read_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.data");

        {
            let mut file = DataFile::create(&path, 128, 4).unwrap();
            file.write_slot(3, &Slot::new(SlotKind::Complete, 1, 2, b"abc"))
                .unwrap();
            let mut meta = file.metadata().clone();
            meta.head = 2;
            meta.end = 2;
            file.set_metadata(meta).unwrap();
            file.sync().unwrap();
        }

        let file = DataFile::open(&path).unwrap();
        assert_eq!(file.capacity(), 4);
        assert_eq!(file.slot_size(), 128);
        assert_eq!(file.metadata().end, 2);
        assert_eq!(file.head(), 2);
        let slot = file.read_slot(3).unwrap();
        assert_eq!(slot.data, b"abc");
        assert!(file.read_slot(4).is_err());
    }

    #[test]
    fn test_stale_head_is_recovered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.data");
        let mut file = DataFile::create(&path, 128, 4).unwrap();

        // slots written but metadata never updated
        file.write_slot(3, &Slot::new(SlotKind::Complete, 1, 2, b"a"))
            .unwrap();
        file.write_slot(2, &Slot::new(SlotKind::Complete, 2, 3, b"b"))
            .unwrap();
        assert_eq!(file.metadata().head, 3);
        assert_eq!(file.head(), 1);

        // metadata claims more than was written
        let mut meta = file.metadata().clone();
        meta.head = 0;
        file.set_metadata(meta).unwrap();
        assert_eq!(file.head(), 1);
    }

    #[test]
    fn test_full_file_head() {
        let dir = tempdir().unwrap();
        let mut file = DataFile::create(dir.path().join("1.data"), 128, 2).unwrap();
        file.write_slot(1, &Slot::new(SlotKind::Complete, 1, 2, b"a"))
            .unwrap();
        file.write_slot(0, &Slot::new(SlotKind::Complete, 2, 3, b"b"))
            .unwrap();
        let mut meta = file.metadata().clone();
        meta.head = -1;
        file.set_metadata(meta).unwrap();
        assert_eq!(file.head(), -1);
    }

    #[test]
    fn test_open_rejects_short_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.data");
        std::fs::write(&path, [1u8; 10]).unwrap();
        let err = DataFile::open(&path).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_open_rejects_garbage_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.data");
        std::fs::write(&path, [7u8; 256]).unwrap();
        assert!(DataFile::open(&path).unwrap_err().is_corruption());
    }
}
