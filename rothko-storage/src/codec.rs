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

//! Slot record codec
//!
//! Every slot in a data file holds one fixed-header, variable-body record:
//!
//! ```text
//! ┌─────────┬──────┬─────────┬─────────┬──────────┬─────────┬──────────────┐
//! │ version │ kind │ start   │ end     │ size     │ crc32   │ data (size)  │
//! │ u8      │ u8   │ i64 BE  │ i64 BE  │ u16 BE   │ u32 BE  │              │
//! └─────────┴──────┴─────────┴─────────┴──────────┴─────────┴──────────────┘
//!   0         1      2         10        18         20        24
//! ```
//!
//! The checksum covers the first 20 header bytes followed by the data.
//!
//! A value longer than one slot body is split into a `Begin` slot, zero or
//! more `Continue` slots and one `End` slot. Every slot of a value carries
//! the value's start and end.

use byteorder::{BigEndian, ByteOrder};
use rothko_core::{RothkoError, RothkoResult};

/// Current slot format version.
pub const VERSION: u8 = 1;

/// Size of the fixed slot header in bytes.
pub const HEADER_SIZE: usize = 24;

/// Bytes of the header covered by the checksum.
const CHECKSUMMED_HEADER: usize = 20;

/// Role of a slot within a stored value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Metadata = 1,
    Complete = 2,
    Begin = 3,
    Continue = 4,
    End = 5,
}

impl SlotKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SlotKind::Metadata),
            2 => Some(SlotKind::Complete),
            3 => Some(SlotKind::Begin),
            4 => Some(SlotKind::Continue),
            5 => Some(SlotKind::End),
            _ => None,
        }
    }
}

/// A decoded slot borrowing its payload from the underlying buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<'a> {
    pub kind: SlotKind,
    pub start: i64,
    pub end: i64,
    pub data: &'a [u8],
}

impl<'a> Slot<'a> {
    pub fn new(kind: SlotKind, start: i64, end: i64, data: &'a [u8]) -> Self {
        Self {
            kind,
            start,
            end,
            data,
        }
    }

    /// Bytes needed to marshal this slot.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.data.len()
    }

    /// Marshal into the front of `buf`, returning the number of bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> RothkoResult<usize> {
        let total = self.encoded_len();
        if self.data.len() > u16::MAX as usize {
            return Err(RothkoError::ValueTooLarge(format!(
                "slot payload of {} bytes exceeds {}",
                self.data.len(),
                u16::MAX
            )));
        }
        if buf.len() < total {
            return Err(RothkoError::ValueTooLarge(format!(
                "slot needs {} bytes, buffer has {}",
                total,
                buf.len()
            )));
        }

        buf[0] = VERSION;
        buf[1] = self.kind as u8;
        BigEndian::write_i64(&mut buf[2..10], self.start);
        BigEndian::write_i64(&mut buf[10..18], self.end);
        BigEndian::write_u16(&mut buf[18..20], self.data.len() as u16);
        buf[HEADER_SIZE..total].copy_from_slice(self.data);

        let crc = checksum(&buf[..CHECKSUMMED_HEADER], self.data);
        BigEndian::write_u32(&mut buf[20..24], crc);
        Ok(total)
    }

    pub fn to_vec(&self) -> RothkoResult<Vec<u8>> {
        let mut buf = vec![0u8; self.encoded_len()];
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decode a slot from the front of `buf`. Trailing bytes are ignored.
    pub fn decode(buf: &'a [u8]) -> RothkoResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(RothkoError::CorruptRecord(format!(
                "buffer too small for header: {} bytes",
                buf.len()
            )));
        }
        if buf[0] != VERSION {
            return Err(RothkoError::CorruptRecord(format!(
                "unknown version: {}",
                buf[0]
            )));
        }
        let kind = SlotKind::from_u8(buf[1])
            .ok_or_else(|| RothkoError::CorruptRecord(format!("unknown kind: {}", buf[1])))?;

        let size = BigEndian::read_u16(&buf[18..20]) as usize;
        if buf.len() < HEADER_SIZE + size {
            return Err(RothkoError::CorruptRecord(format!(
                "buffer too small for data: need {}, have {}",
                HEADER_SIZE + size,
                buf.len()
            )));
        }
        let data = &buf[HEADER_SIZE..HEADER_SIZE + size];

        let expected = BigEndian::read_u32(&buf[20..24]);
        if checksum(&buf[..CHECKSUMMED_HEADER], data) != expected {
            return Err(RothkoError::CorruptRecord("checksum mismatch".to_string()));
        }

        Ok(Self {
            kind,
            start: BigEndian::read_i64(&buf[2..10]),
            end: BigEndian::read_i64(&buf[10..18]),
            data,
        })
    }
}

fn checksum(header: &[u8], data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(data);
    hasher.finalize()
}

/// Payload bytes available in one slot of `slot_size` bytes.
pub fn body_size(slot_size: usize) -> Option<usize> {
    if slot_size <= HEADER_SIZE {
        return None;
    }
    Some((slot_size - HEADER_SIZE).min(u16::MAX as usize))
}

/// Number of slots a value of `len` bytes occupies, or `None` if
/// `slot_size` cannot hold any payload.
pub fn num_slots(len: usize, slot_size: usize) -> Option<usize> {
    let body = body_size(slot_size)?;
    if len == 0 {
        return Some(1);
    }
    Some((len + body - 1) / body)
}

/// Split `data` into slots of at most `slot_size` marshaled bytes and hand
/// them to `emit` in order together with their index within the value.
pub fn encode_slots<F>(
    start: i64,
    end: i64,
    data: &[u8],
    slot_size: usize,
    mut emit: F,
) -> RothkoResult<()>
where
    F: FnMut(usize, Slot<'_>) -> RothkoResult<()>,
{
    let body = body_size(slot_size).ok_or_else(|| {
        RothkoError::InvalidParameters(format!(
            "slot size {} leaves no room past the {} byte header",
            slot_size, HEADER_SIZE
        ))
    })?;

    if data.len() <= body {
        return emit(0, Slot::new(SlotKind::Complete, start, end, data));
    }

    let mut index = 0;
    let mut rest = data;
    while !rest.is_empty() {
        let take = rest.len().min(body);
        let (chunk, tail) = rest.split_at(take);
        let kind = if index == 0 {
            SlotKind::Begin
        } else if tail.is_empty() {
            SlotKind::End
        } else {
            SlotKind::Continue
        };
        emit(index, Slot::new(kind, start, end, chunk))?;
        index += 1;
        rest = tail;
    }
    Ok(())
}
