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

//! Tree stream wire format.
//!
//! All integers are little-endian. A node is written as:
//!
//! ```text
//! owns_header: u8            1 when the node serializes its own header
//! [header stream]            only when owns_header
//! has_branch_header: u8
//! [header stream]            only when has_branch_header
//! ints:           u64 count, then i32 values
//! floats:         u64 count, then f32 values
//! bits:           u64 count, then packed bool bytes
//! string_indices: u64 count, then u64 table indices
//! hashes:         u64 count, then (hash: u32, name_index: i32) pairs
//! key_map:        index map
//! branch_maps:    u64 count, then index maps
//! branches:       u64 count, then child nodes
//! ```
//!
//! A header stream is an `owns_table` byte, the string table blob when
//! set, then five index maps (ints, floats, bools, strings, hashes). An
//! index map is a `u64` count followed by `(hash: u32, name_index: i32,
//! slot: i32)` entries in ascending hash order; `name_index` is `-1`
//! when no debug name was interned. Only the root header embeds the
//! string table; every other node resolves indices through it.
//!
//! Writing bulk columns goes through [`bytemuck::cast_slice`]; reading
//! reassembles values from explicit little-endian bytes so alignment of
//! the input buffer never matters.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::rc::Rc;

use arbor_core::hash::StringHash;

use crate::error::DataError;
use crate::string_table::{StringTable, StringTableBuilder};
use crate::tree::header::DataTreeHeader;
use crate::tree::sapling::DataSapling;
use crate::tree::{DataTree, HeaderRef, TableRef};

/// Serializes a build, root header and string table included when the
/// sapling owns them.
pub(crate) fn write_sapling<W: Write>(
    sapling: &DataSapling,
    writer: &mut W,
) -> Result<(), DataError> {
    write_node(sapling, writer)
}

/// Deserializes a stream written by [`write_sapling`] from the root.
pub(crate) fn read_tree_root<R: Read>(reader: &mut R) -> Result<DataTree, DataError> {
    read_node(reader, None, None)
}

fn write_node<W: Write>(node: &DataSapling, writer: &mut W) -> Result<(), DataError> {
    let owns_header = node.header.is_owned();
    write_bool(writer, owns_header)?;
    if owns_header {
        write_header(
            &node.header.get().borrow(),
            node.table.is_owned().then(|| node.table.get()),
            writer,
        )?;
    }
    match &node.branch_header {
        Some(header) => {
            write_bool(writer, true)?;
            write_header(&header.borrow(), None, writer)?;
        }
        None => write_bool(writer, false)?,
    }

    write_u64(writer, node.ints.len() as u64)?;
    writer.write_all(bytemuck::cast_slice(&node.ints))?;
    write_u64(writer, node.floats.len() as u64)?;
    writer.write_all(bytemuck::cast_slice(&node.floats))?;
    write_u64(writer, node.bits.len() as u64)?;
    writer.write_all(&node.bits)?;
    write_u64(writer, node.string_indices.len() as u64)?;
    writer.write_all(bytemuck::cast_slice(&node.string_indices))?;
    write_u64(writer, node.hashes.len() as u64)?;
    for hash in &node.hashes {
        writer.write_all(&hash.hash.to_le_bytes())?;
        writer.write_all(&name_index(hash).to_le_bytes())?;
    }

    write_index_map(&node.key_map, writer)?;
    write_u64(writer, node.branch_maps.len() as u64)?;
    for map in &node.branch_maps {
        write_index_map(map, writer)?;
    }

    write_u64(writer, node.branches.len() as u64)?;
    for branch in &node.branches {
        write_node(branch, writer)?;
    }
    Ok(())
}

fn write_header<W: Write>(
    header: &DataTreeHeader,
    owned_table: Option<&Rc<RefCell<StringTableBuilder>>>,
    writer: &mut W,
) -> Result<(), DataError> {
    write_bool(writer, owned_table.is_some())?;
    if let Some(table) = owned_table {
        table.borrow().table().write_to(writer)?;
    }
    write_index_map(&header.ints, writer)?;
    write_index_map(&header.floats, writer)?;
    write_index_map(&header.bools, writer)?;
    write_index_map(&header.strings, writer)?;
    write_index_map(&header.hashes, writer)?;
    Ok(())
}

fn write_index_map<W: Write>(
    map: &BTreeMap<StringHash, u32>,
    writer: &mut W,
) -> Result<(), DataError> {
    write_u64(writer, map.len() as u64)?;
    for (id, &slot) in map {
        writer.write_all(&id.hash.to_le_bytes())?;
        writer.write_all(&name_index(id).to_le_bytes())?;
        writer.write_all(&(slot as i32).to_le_bytes())?;
    }
    Ok(())
}

fn read_node<R: Read>(
    reader: &mut R,
    parent_branch_header: Option<&Rc<DataTreeHeader>>,
    shared_table: Option<&Rc<StringTable>>,
) -> Result<DataTree, DataError> {
    let owns_header = read_bool(reader)?;
    let (owned_header, embedded_table) = if owns_header {
        let (header, embedded) = read_header(reader, shared_table)?;
        (Some(header), embedded)
    } else {
        (None, None)
    };

    let header = match owned_header {
        Some(header) => HeaderRef::Owned(Rc::new(header)),
        None => match parent_branch_header {
            Some(shared) => HeaderRef::Shared(Rc::clone(shared)),
            None if shared_table.is_none() => {
                return Err(DataError::malformed("stream root does not own its header"))
            }
            None => {
                return Err(DataError::malformed(
                    "node shares a header but its parent declares no branch schema",
                ))
            }
        },
    };
    let table = match (shared_table, embedded_table) {
        (None, Some(embedded)) => TableRef::Owned(Rc::new(embedded)),
        (Some(shared), None) => TableRef::Shared(Rc::clone(shared)),
        (Some(_), Some(_)) => {
            return Err(DataError::malformed("string table embedded below the root"))
        }
        (None, None) => {
            return Err(DataError::malformed("stream root carries no string table"))
        }
    };

    let branch_header = if read_bool(reader)? {
        let (schema, embedded) = read_header(reader, Some(table.rc()))?;
        if embedded.is_some() {
            return Err(DataError::malformed("branch schema embeds a string table"));
        }
        Some(Rc::new(schema))
    } else {
        None
    };

    let mut ints = Vec::new();
    for _ in 0..read_len(reader)? {
        ints.push(read_i32(reader)?);
    }
    let mut floats = Vec::new();
    for _ in 0..read_len(reader)? {
        floats.push(read_f32(reader)?);
    }
    let mut bits = Vec::new();
    for _ in 0..read_len(reader)? {
        bits.push(read_u8(reader)?);
    }
    let mut string_indices = Vec::new();
    for _ in 0..read_len(reader)? {
        let index = read_u64(reader)?;
        if index as usize >= table.get().len() {
            return Err(DataError::malformed(format!(
                "string index {index} out of table range ({} strings)",
                table.get().len()
            )));
        }
        string_indices.push(index);
    }
    let mut hashes = Vec::new();
    for _ in 0..read_len(reader)? {
        let hash = read_u32(reader)?;
        let name = read_i32(reader)?;
        hashes.push(checked_id(hash, name, table.get())?);
    }

    let key_map = read_index_map(reader, table.get())?;
    let branch_map_count = read_len(reader)?;
    let mut branch_maps = Vec::new();
    for _ in 0..branch_map_count {
        branch_maps.push(read_index_map(reader, table.get())?);
    }
    for &key_index in key_map.values() {
        if key_index as usize >= branch_maps.len() {
            return Err(DataError::malformed(format!(
                "branch key routes to map {key_index} of {branch_map_count}"
            )));
        }
    }

    let branch_count = read_len(reader)?;
    let mut branches = Vec::new();
    for _ in 0..branch_count {
        branches.push(read_node(
            reader,
            branch_header.as_ref(),
            Some(table.rc()),
        )?);
    }
    for map in &branch_maps {
        for &branch_index in map.values() {
            if branch_index as usize >= branches.len() {
                return Err(DataError::malformed(format!(
                    "branch map routes to branch {branch_index} of {branch_count}"
                )));
            }
        }
    }

    Ok(DataTree {
        header,
        branch_header,
        table,
        ints,
        floats,
        bits,
        string_indices,
        hashes,
        key_map,
        branch_maps,
        branches,
    })
}

fn read_header<R: Read>(
    reader: &mut R,
    shared_table: Option<&Rc<StringTable>>,
) -> Result<(DataTreeHeader, Option<StringTable>), DataError> {
    let owns_table = read_bool(reader)?;
    let embedded = if owns_table {
        Some(StringTable::read_from(reader)?)
    } else {
        None
    };
    {
        let table = match (&embedded, shared_table) {
            (Some(table), _) => table,
            (None, Some(shared)) => shared.as_ref(),
            (None, None) => {
                return Err(DataError::malformed("stream root carries no string table"))
            }
        };
        let mut header = DataTreeHeader::new();
        header.ints = read_index_map(reader, table)?;
        header.floats = read_index_map(reader, table)?;
        header.bools = read_index_map(reader, table)?;
        header.strings = read_index_map(reader, table)?;
        header.hashes = read_index_map(reader, table)?;
        Ok((header, embedded))
    }
}

fn read_index_map<R: Read>(
    reader: &mut R,
    table: &StringTable,
) -> Result<BTreeMap<StringHash, u32>, DataError> {
    let count = read_len(reader)?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let hash = read_u32(reader)?;
        let name = read_i32(reader)?;
        let slot = read_i32(reader)?;
        if slot < 0 {
            return Err(DataError::malformed(format!("field slot {slot} is negative")));
        }
        map.insert(checked_id(hash, name, table)?, slot as u32);
    }
    Ok(map)
}

/// Rebuilds an id from its wire pair, rejecting name indices the string
/// table cannot resolve. `-1` means no name was interned.
fn checked_id(hash: u32, name_index: i32, table: &StringTable) -> Result<StringHash, DataError> {
    if name_index < -1 {
        return Err(DataError::malformed(format!(
            "name index {name_index} is negative"
        )));
    }
    if name_index >= 0 && name_index as usize >= table.len() {
        return Err(DataError::malformed(format!(
            "name index {name_index} out of string table range ({} strings)",
            table.len()
        )));
    }
    Ok(with_name_index(hash, name_index))
}

#[cfg(feature = "hash-names")]
fn name_index(hash: &StringHash) -> i32 {
    match hash.table_index() {
        Some(index) => index as i32,
        None => -1,
    }
}

/// Name payloads are compiled out; every id serializes as unnamed.
#[cfg(not(feature = "hash-names"))]
fn name_index(_hash: &StringHash) -> i32 {
    -1
}

#[cfg(feature = "hash-names")]
fn with_name_index(hash: u32, name_index: i32) -> StringHash {
    use arbor_core::hash::HashName;
    StringHash {
        hash,
        name: if name_index < 0 {
            HashName::None
        } else {
            HashName::Tabulated(name_index as u32)
        },
    }
}

#[cfg(not(feature = "hash-names"))]
fn with_name_index(hash: u32, _name_index: i32) -> StringHash {
    StringHash::raw(hash)
}

fn write_bool<W: Write>(writer: &mut W, value: bool) -> Result<(), DataError> {
    writer.write_all(&[value as u8])?;
    Ok(())
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), DataError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_bool<R: Read>(reader: &mut R) -> Result<bool, DataError> {
    match read_u8(reader)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DataError::malformed(format!("boolean byte holds {other}"))),
    }
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, DataError> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, DataError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32, DataError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32<R: Read>(reader: &mut R) -> Result<f32, DataError> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, DataError> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_len<R: Read>(reader: &mut R) -> Result<usize, DataError> {
    let value = read_u64(reader)?;
    usize::try_from(value).map_err(|_| DataError::malformed("length does not fit in memory"))
}
