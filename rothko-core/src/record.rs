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

//! Aggregated distribution records.
//!
//! A [`Record`] is what the writer produces for one metric and one flush
//! interval, and what the storage engine persists as an opaque value. The
//! byte form is a tag-prefixed varint message so old readers skip fields
//! they do not know about.

use prost::Message;

use crate::error::RothkoResult;

/// One aggregated interval of a single metric.
///
/// `merged == 0` is read as 1 for records written before the field existed.
#[derive(Clone, PartialEq, Message)]
pub struct Record {
    /// Inclusive start of the interval in unix nanoseconds.
    #[prost(int64, tag = "1")]
    pub start_time: i64,

    /// Inclusive end of the interval in unix nanoseconds.
    #[prost(int64, tag = "2")]
    pub end_time: i64,

    #[prost(int64, tag = "3")]
    pub observations: i64,

    /// Symbolic sketch kind, e.g. `"tdigest"`.
    #[prost(string, tag = "4")]
    pub kind: String,

    /// Opaque sketch bytes, interpreted according to `kind`.
    #[prost(bytes = "vec", tag = "5")]
    pub distribution: Vec<u8>,

    #[prost(double, tag = "6")]
    pub min: f64,

    #[prost(double, tag = "7")]
    pub max: f64,

    #[prost(bytes = "vec", tag = "8")]
    pub min_id: Vec<u8>,

    #[prost(bytes = "vec", tag = "9")]
    pub max_id: Vec<u8>,

    #[prost(int64, tag = "10")]
    pub merged: i64,
}

impl Record {
    /// Serialize into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Serialize into `buf`, replacing its contents. Lets callers reuse a
    /// pooled allocation.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.clear();
        buf.reserve(self.encoded_len());
        // Encoding into a Vec only fails when capacity is exhausted, and the
        // reserve above rules that out.
        let _ = self.encode(buf);
    }

    pub fn from_bytes(data: &[u8]) -> RothkoResult<Self> {
        Ok(Record::decode(data)?)
    }

    /// Number of source records folded into this one.
    pub fn merged_count(&self) -> i64 {
        if self.merged == 0 {
            1
        } else {
            self.merged
        }
    }

    /// Interval length in seconds.
    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time) as f64 / 1e9
    }
}
