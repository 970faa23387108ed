// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Append-only interned string storage.
//!
//! A [`StringTable`] is one byte buffer plus parallel start/end index
//! arrays; string `i` is the half-open byte range `starts[i]..ends[i]`.
//! Indices are handed out once and never renumbered, so a table index is
//! a stable reference for the lifetime of the table and of every stream
//! serialized from it.
//!
//! [`StringTableBuilder::add`] dedups aggressively: an exact match
//! returns the existing index, and text that occurs anywhere inside the
//! byte buffer gets a new index aliasing those bytes without storing a
//! copy. Adding "spawn" after "spawn_point" costs two indices and the
//! bytes of the longer string only.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Read-only interned string storage.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    starts: Vec<i64>,
    ends: Vec<i64>,
    bytes: Vec<u8>,
}

impl StringTable {
    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether the table holds no strings.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Total bytes of string data.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// The string at `index`.
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range; table indices always come
    /// from [`StringTableBuilder::add`] or a decoded stream, so a bad one
    /// is a bookkeeping bug.
    pub fn get(&self, index: i64) -> &str {
        assert!(
            index >= 0 && (index as usize) < self.starts.len(),
            "string table index {} out of range ({} strings)",
            index,
            self.starts.len()
        );
        let start = self.starts[index as usize] as usize;
        let end = self.ends[index as usize] as usize;
        // Ranges are validated as UTF-8 when they are recorded.
        std::str::from_utf8(&self.bytes[start..end]).expect("string table range holds UTF-8")
    }

    /// Iterates the interned strings in index order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        (0..self.len()).map(move |i| self.get(i as i64))
    }

    /// Serializes the table blob: byte size, string count, start indices,
    /// end indices, raw bytes. All integers little-endian.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), DataError> {
        writer.write_all(&(self.bytes.len() as i64).to_le_bytes())?;
        writer.write_all(&(self.starts.len() as i64).to_le_bytes())?;
        writer.write_all(bytemuck::cast_slice(&self.starts))?;
        writer.write_all(bytemuck::cast_slice(&self.ends))?;
        writer.write_all(&self.bytes)?;
        Ok(())
    }

    /// Deserializes a table blob, validating ranges and UTF-8.
    pub fn read_from(reader: &mut impl Read) -> Result<Self, DataError> {
        let size = read_i64(reader)?;
        let num_strings = read_i64(reader)?;
        if size < 0 {
            return Err(DataError::malformed(format!("negative byte size {size}")));
        }
        if num_strings < 0 {
            return Err(DataError::malformed(format!(
                "negative string count {num_strings}"
            )));
        }
        let count = num_strings as usize;
        let mut starts = Vec::with_capacity(count);
        for _ in 0..count {
            starts.push(read_i64(reader)?);
        }
        let mut ends = Vec::with_capacity(count);
        for _ in 0..count {
            ends.push(read_i64(reader)?);
        }
        let mut bytes = vec![0u8; size as usize];
        reader.read_exact(&mut bytes)?;

        for (i, (&start, &end)) in starts.iter().zip(&ends).enumerate() {
            if start < 0 || end < start || end > size {
                return Err(DataError::malformed(format!(
                    "string {i} has invalid range {start}..{end} over {size} bytes"
                )));
            }
            if std::str::from_utf8(&bytes[start as usize..end as usize]).is_err() {
                return Err(DataError::malformed(format!("string {i} is not UTF-8")));
            }
        }
        Ok(Self {
            starts,
            ends,
            bytes,
        })
    }

    fn push_range(&mut self, start: i64, end: i64) -> i64 {
        let index = self.starts.len() as i64;
        self.starts.push(start);
        self.ends.push(end);
        index
    }
}

/// Sizing and limits for a [`StringTableBuilder`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StringTableConfig {
    /// Byte capacity reserved up front.
    pub initial_bytes: usize,
    /// Index capacity reserved up front.
    pub initial_strings: usize,
    /// Hard cap on stored bytes. `None` grows without bound.
    pub max_bytes: Option<usize>,
    /// Hard cap on string count. `None` grows without bound.
    pub max_strings: Option<usize>,
}

impl Default for StringTableConfig {
    fn default() -> Self {
        Self {
            initial_bytes: 256,
            initial_strings: 16,
            max_bytes: None,
            max_strings: None,
        }
    }
}

/// Growable [`StringTable`] with dedup and optional limits.
#[derive(Debug, Default)]
pub struct StringTableBuilder {
    table: StringTable,
    max_bytes: Option<usize>,
    max_strings: Option<usize>,
}

impl StringTableBuilder {
    /// Creates a builder with the given sizing.
    pub fn new(config: StringTableConfig) -> Self {
        let mut table = StringTable::default();
        table.bytes.reserve(config.initial_bytes);
        table.starts.reserve(config.initial_strings);
        table.ends.reserve(config.initial_strings);
        Self {
            table,
            max_bytes: config.max_bytes,
            max_strings: config.max_strings,
        }
    }

    /// Interns `text` and returns its stable index.
    ///
    /// Exact matches return the original index. Text found inside the
    /// existing bytes gets a fresh index aliasing that range. Only novel
    /// text appends bytes.
    ///
    /// # Panics
    ///
    /// Panics when a configured limit would be exceeded; table limits
    /// exist to catch content that outgrew its budget.
    pub fn add(&mut self, text: &str) -> i64 {
        for index in 0..self.table.len() as i64 {
            if self.table.get(index) == text {
                return index;
            }
        }
        if let Some(position) = find_bytes(&self.table.bytes, text.as_bytes()) {
            self.check_string_limit();
            let start = position as i64;
            return self.table.push_range(start, start + text.len() as i64);
        }

        self.check_string_limit();
        if let Some(max) = self.max_bytes {
            assert!(
                self.table.bytes.len() + text.len() <= max,
                "string table byte limit exceeded: {} + {} bytes over max {}",
                self.table.bytes.len(),
                text.len(),
                max
            );
        }
        let start = self.table.bytes.len() as i64;
        self.table.bytes.extend_from_slice(text.as_bytes());
        self.table.push_range(start, start + text.len() as i64)
    }

    /// The string at `index`.
    pub fn get(&self, index: i64) -> &str {
        self.table.get(index)
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the builder holds no strings.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Read-only view of the table being built.
    pub fn table(&self) -> &StringTable {
        &self.table
    }

    /// Snapshot of the current table contents.
    pub fn to_table(&self) -> StringTable {
        self.table.clone()
    }

    /// Consumes the builder, keeping the built table.
    pub fn into_table(self) -> StringTable {
        self.table
    }

    fn check_string_limit(&self) {
        if let Some(max) = self.max_strings {
            assert!(
                self.table.len() < max,
                "string table index limit exceeded: max {} strings",
                max
            );
        }
    }
}

/// First occurrence of `needle` inside `haystack`.
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_i64(reader: &mut impl Read) -> Result<i64, DataError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}
