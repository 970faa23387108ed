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

//! Record trees.
//!
//! A [`DataTree`] is a read-only record: columns of ints, floats, packed
//! bools, string-table indices, and hashes, addressed through a
//! [`DataTreeHeader`] schema, plus child branches. Sibling branches share
//! one branch header declared by their parent, so a thousand identical
//! records cost a thousand slim column sets and a single schema.
//!
//! Trees are built through the append-only [`DataSapling`] builder and
//! either frozen in memory ([`DataSapling::harvest`]) or serialized with
//! [`DataSapling::write_to`] and loaded back with [`DataTree::read_from`].
//!
//! Ownership of shared pieces is explicit in the types: [`HeaderRef`] and
//! [`TableRef`] distinguish the node that owns (and serializes) a header
//! or table from the nodes that merely reference it.

pub mod header;
pub mod sapling;

pub(crate) mod codec;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Read;
use std::rc::Rc;

use arbor_core::hash::StringHash;

pub use header::DataTreeHeader;
pub use sapling::DataSapling;

use crate::error::DataError;
use crate::string_table::{StringTable, StringTableBuilder};

/// Interns a hash's debug name into `table`, rewriting the payload to the
/// table index so serialized ids can name themselves.
#[cfg(feature = "hash-names")]
pub(crate) fn tabulate(table: &RefCell<StringTableBuilder>, hash: StringHash) -> StringHash {
    use arbor_core::hash::HashName;
    match hash.name {
        HashName::Static(text) => {
            let index = table.borrow_mut().add(text);
            StringHash {
                hash: hash.hash,
                name: HashName::Tabulated(index as u32),
            }
        }
        _ => hash,
    }
}

/// Name payloads are compiled out; ids pass through untouched.
#[cfg(not(feature = "hash-names"))]
pub(crate) fn tabulate(_table: &RefCell<StringTableBuilder>, hash: StringHash) -> StringHash {
    hash
}

/// A tree node's relationship to its schema header.
#[derive(Debug, Clone)]
pub enum HeaderRef {
    /// This node owns the header and serializes it.
    Owned(Rc<DataTreeHeader>),
    /// The header belongs to an ancestor's branch schema.
    Shared(Rc<DataTreeHeader>),
}

impl HeaderRef {
    /// The header itself, however it is owned.
    pub fn get(&self) -> &DataTreeHeader {
        match self {
            HeaderRef::Owned(header) | HeaderRef::Shared(header) => header,
        }
    }

    /// Whether this node is the owner.
    pub fn is_owned(&self) -> bool {
        matches!(self, HeaderRef::Owned(_))
    }

    pub(crate) fn rc(&self) -> &Rc<DataTreeHeader> {
        match self {
            HeaderRef::Owned(header) | HeaderRef::Shared(header) => header,
        }
    }
}

/// A tree node's relationship to its string table.
#[derive(Debug, Clone)]
pub enum TableRef {
    /// This node's header owns the table and serializes its blob.
    Owned(Rc<StringTable>),
    /// The table belongs to the root.
    Shared(Rc<StringTable>),
}

impl TableRef {
    /// The table itself, however it is owned.
    pub fn get(&self) -> &StringTable {
        match self {
            TableRef::Owned(table) | TableRef::Shared(table) => table,
        }
    }

    /// Whether this node is the owner.
    pub fn is_owned(&self) -> bool {
        matches!(self, TableRef::Owned(_))
    }

    pub(crate) fn rc(&self) -> &Rc<StringTable> {
        match self {
            TableRef::Owned(table) | TableRef::Shared(table) => table,
        }
    }
}

/// A read-only record tree.
///
/// Field reads panic when the id was never declared in the schema;
/// callers probing uncertain data guard with the `has_*` methods. A
/// schema mismatch on a loaded tree is a bug in the content pipeline, not
/// a runtime condition.
#[derive(Debug)]
pub struct DataTree {
    pub(crate) header: HeaderRef,
    pub(crate) branch_header: Option<Rc<DataTreeHeader>>,
    pub(crate) table: TableRef,
    pub(crate) ints: Vec<i32>,
    pub(crate) floats: Vec<f32>,
    pub(crate) bits: Vec<u8>,
    pub(crate) string_indices: Vec<u64>,
    pub(crate) hashes: Vec<StringHash>,
    pub(crate) key_map: BTreeMap<StringHash, u32>,
    pub(crate) branch_maps: Vec<BTreeMap<StringHash, u32>>,
    pub(crate) branches: Vec<DataTree>,
}

impl DataTree {
    /// Deserializes a tree stream. The stream must carry its own header
    /// (and that header its own string table); branch streams cannot be
    /// loaded standalone.
    pub fn read_from(reader: &mut impl Read) -> Result<Self, DataError> {
        codec::read_tree_root(reader)
    }

    /// Whether an int field with this id exists.
    pub fn has_int(&self, id: StringHash) -> bool {
        self.header.get().has_int(id)
    }

    /// Reads an int field. Panics when the id is not declared.
    pub fn get_int(&self, id: StringHash) -> i32 {
        let slot = self
            .header
            .get()
            .int_slot(id)
            .unwrap_or_else(|| panic!("data tree has no int field {id:?}"));
        self.ints[slot as usize]
    }

    /// Whether a float field with this id exists.
    pub fn has_float(&self, id: StringHash) -> bool {
        self.header.get().has_float(id)
    }

    /// Reads a float field. Panics when the id is not declared.
    pub fn get_float(&self, id: StringHash) -> f32 {
        let slot = self
            .header
            .get()
            .float_slot(id)
            .unwrap_or_else(|| panic!("data tree has no float field {id:?}"));
        self.floats[slot as usize]
    }

    /// Whether a bool field with this id exists.
    pub fn has_bool(&self, id: StringHash) -> bool {
        self.header.get().has_bool(id)
    }

    /// Reads a bool field. Panics when the id is not declared.
    pub fn get_bool(&self, id: StringHash) -> bool {
        let slot = self
            .header
            .get()
            .bool_slot(id)
            .unwrap_or_else(|| panic!("data tree has no bool field {id:?}"));
        self.bits[slot as usize / 8] & (1 << (slot as usize % 8)) != 0
    }

    /// Whether a string field with this id exists.
    pub fn has_string(&self, id: StringHash) -> bool {
        self.header.get().has_string(id)
    }

    /// Reads a string field. Panics when the id is not declared.
    pub fn get_string(&self, id: StringHash) -> &str {
        let slot = self
            .header
            .get()
            .string_slot(id)
            .unwrap_or_else(|| panic!("data tree has no string field {id:?}"));
        self.table.get().get(self.string_indices[slot as usize] as i64)
    }

    /// Whether a hash field with this id exists.
    pub fn has_hash(&self, id: StringHash) -> bool {
        self.header.get().has_hash(id)
    }

    /// Reads a hash field. Panics when the id is not declared.
    pub fn get_hash(&self, id: StringHash) -> StringHash {
        let slot = self
            .header
            .get()
            .hash_slot(id)
            .unwrap_or_else(|| panic!("data tree has no hash field {id:?}"));
        self.hashes[slot as usize]
    }

    /// Whether branches can be looked up by this key.
    pub fn has_key(&self, id: StringHash) -> bool {
        self.key_map.contains_key(&id)
    }

    /// Number of child branches.
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// The child at `index`. Panics out of range.
    pub fn branch(&self, index: usize) -> &DataTree {
        &self.branches[index]
    }

    /// All children in creation order.
    pub fn branches(&self) -> &[DataTree] {
        &self.branches
    }

    /// Whether a branch is registered under `key` with value `id`.
    pub fn has_branch(&self, key: StringHash, id: StringHash) -> bool {
        self.key_map
            .get(&key)
            .map(|&key_index| self.branch_maps[key_index as usize].contains_key(&id))
            .unwrap_or(false)
    }

    /// Keyed branch lookup. Panics when the key or the id is absent;
    /// guard with [`DataTree::has_branch`] when probing.
    pub fn branch_by(&self, key: StringHash, id: StringHash) -> &DataTree {
        let key_index = self
            .key_map
            .get(&key)
            .unwrap_or_else(|| panic!("data tree has no branch key {key:?}"));
        let branch_index = self.branch_maps[*key_index as usize]
            .get(&id)
            .unwrap_or_else(|| panic!("data tree has no branch {id:?} under key {key:?}"));
        &self.branches[*branch_index as usize]
    }

    /// The string table backing this tree's string fields.
    pub fn table(&self) -> &StringTable {
        self.table.get()
    }

    /// Debug rendering of the whole tree as JSON, resolving field names
    /// through the string table when debug payloads are available. For
    /// pipeline diffing and logs; never a load format.
    pub fn to_json(&self) -> serde_json::Value {
        let header = self.header.get();
        let mut object = serde_json::Map::new();
        // Shared-schema branches may leave trailing slots unset; those
        // fields are simply absent from the rendering.
        for (id, &slot) in &header.ints {
            if let Some(&value) = self.ints.get(slot as usize) {
                object.insert(self.display_name(id), value.into());
            }
        }
        for (id, &slot) in &header.floats {
            if let Some(&value) = self.floats.get(slot as usize) {
                object.insert(self.display_name(id), value.into());
            }
        }
        for (id, &slot) in &header.bools {
            if let Some(&byte) = self.bits.get(slot as usize / 8) {
                let value = byte & (1 << (slot as usize % 8)) != 0;
                object.insert(self.display_name(id), value.into());
            }
        }
        for (id, &slot) in &header.strings {
            if let Some(&index) = self.string_indices.get(slot as usize) {
                let value = self.table.get().get(index as i64);
                object.insert(self.display_name(id), value.into());
            }
        }
        for (id, &slot) in &header.hashes {
            if let Some(value) = self.hashes.get(slot as usize) {
                object.insert(self.display_name(id), self.display_name(value).into());
            }
        }
        if !self.branches.is_empty() {
            let children: Vec<serde_json::Value> =
                self.branches.iter().map(DataTree::to_json).collect();
            object.insert("branches".to_string(), children.into());
        }
        serde_json::Value::Object(object)
    }

    fn display_name(&self, id: &StringHash) -> String {
        #[cfg(feature = "hash-names")]
        {
            use arbor_core::hash::HashName;
            match id.name {
                HashName::Tabulated(index) => return self.table.get().get(index as i64).to_string(),
                HashName::Static(text) => return text.to_string(),
                HashName::None => {}
            }
        }
        format!("{:#010x}", id.hash)
    }
}
