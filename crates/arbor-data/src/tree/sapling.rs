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

//! Append-only tree construction.
//!
//! A root [`DataSapling`] owns a fresh header and string table. Writing a
//! field the header has not seen declares it (schema-on-write) and
//! appends the column slot; writing an existing field overwrites in
//! place. Branches grown from a parent share the parent's branch header,
//! declared once with [`DataSapling::create_branch_header`], so sibling
//! records reuse one schema; a branch grown without a branch header owns
//! a schema of its own.
//!
//! Branch construction is append-only: only the most recently grown
//! branch may be declared finished with [`DataSapling::branch_ready`],
//! which back-fills the parent's keyed lookup maps from the branch's
//! hash fields.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write;
use std::rc::Rc;

use arbor_core::hash::StringHash;

use crate::error::DataError;
use crate::string_table::{StringTableBuilder, StringTableConfig};
use crate::tree::codec;
use crate::tree::header::DataTreeHeader;
use crate::tree::{tabulate, DataTree, HeaderRef, TableRef};

/// A building node's relationship to its schema header.
#[derive(Debug, Clone)]
pub enum HeaderHandle {
    /// This node owns the header; writes may declare new fields.
    Owned(Rc<RefCell<DataTreeHeader>>),
    /// The header is an ancestor's branch schema; writes must target
    /// fields it already declares.
    Shared(Rc<RefCell<DataTreeHeader>>),
}

impl HeaderHandle {
    /// The header cell, however it is owned.
    pub fn get(&self) -> &Rc<RefCell<DataTreeHeader>> {
        match self {
            HeaderHandle::Owned(header) | HeaderHandle::Shared(header) => header,
        }
    }

    /// Whether this node is the owner.
    pub fn is_owned(&self) -> bool {
        matches!(self, HeaderHandle::Owned(_))
    }
}

/// A building node's relationship to its string table.
#[derive(Debug, Clone)]
pub enum TableHandle {
    /// This node's header owns the table; the root of a build.
    Owned(Rc<RefCell<StringTableBuilder>>),
    /// The table belongs to the root.
    Shared(Rc<RefCell<StringTableBuilder>>),
}

impl TableHandle {
    /// The table cell, however it is owned.
    pub fn get(&self) -> &Rc<RefCell<StringTableBuilder>> {
        match self {
            TableHandle::Owned(table) | TableHandle::Shared(table) => table,
        }
    }

    /// Whether this node is the owner.
    pub fn is_owned(&self) -> bool {
        matches!(self, TableHandle::Owned(_))
    }
}

/// An in-construction record tree.
#[derive(Debug)]
pub struct DataSapling {
    pub(crate) header: HeaderHandle,
    pub(crate) branch_header: Option<Rc<RefCell<DataTreeHeader>>>,
    pub(crate) table: TableHandle,
    pub(crate) ints: Vec<i32>,
    pub(crate) floats: Vec<f32>,
    pub(crate) bits: Vec<u8>,
    pub(crate) string_indices: Vec<u64>,
    pub(crate) hashes: Vec<StringHash>,
    pub(crate) key_map: BTreeMap<StringHash, u32>,
    pub(crate) branch_maps: Vec<BTreeMap<StringHash, u32>>,
    pub(crate) branches: Vec<DataSapling>,
}

impl Default for DataSapling {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSapling {
    /// Creates a root sapling owning a fresh header and string table.
    pub fn new() -> Self {
        Self::with_config(StringTableConfig::default())
    }

    /// Creates a root sapling whose string table uses the given sizing.
    pub fn with_config(config: StringTableConfig) -> Self {
        let table = Rc::new(RefCell::new(StringTableBuilder::new(config)));
        let header = Rc::new(RefCell::new(DataTreeHeader::with_table(Rc::clone(&table))));
        Self::node(HeaderHandle::Owned(header), TableHandle::Owned(table))
    }

    /// Creates a branch node: shares the given header when present, owns
    /// a fresh one otherwise. The table is always shared downward.
    fn branch_node(
        header: Option<Rc<RefCell<DataTreeHeader>>>,
        table: Rc<RefCell<StringTableBuilder>>,
    ) -> Self {
        let header = match header {
            Some(shared) => HeaderHandle::Shared(shared),
            None => HeaderHandle::Owned(Rc::new(RefCell::new(DataTreeHeader::with_table(
                Rc::clone(&table),
            )))),
        };
        Self::node(header, TableHandle::Shared(table))
    }

    fn node(header: HeaderHandle, table: TableHandle) -> Self {
        Self {
            header,
            branch_header: None,
            table,
            ints: Vec::new(),
            floats: Vec::new(),
            bits: Vec::new(),
            string_indices: Vec::new(),
            hashes: Vec::new(),
            key_map: BTreeMap::new(),
            branch_maps: Vec::new(),
            branches: Vec::new(),
        }
    }

    /// Writes an int field, declaring it when this node owns its header.
    ///
    /// # Panics
    ///
    /// Panics when the header is shared and does not declare the field.
    pub fn set_int(&mut self, id: StringHash, value: i32) {
        let slot = self.field_slot(id, FieldClass::Int) as usize;
        if self.ints.len() <= slot {
            self.ints.resize(slot + 1, 0);
        }
        self.ints[slot] = value;
    }

    /// Writes a float field, declaring it when this node owns its header.
    pub fn set_float(&mut self, id: StringHash, value: f32) {
        let slot = self.field_slot(id, FieldClass::Float) as usize;
        if self.floats.len() <= slot {
            self.floats.resize(slot + 1, 0.0);
        }
        self.floats[slot] = value;
    }

    /// Writes a bool field, declaring it when this node owns its header.
    /// Bools pack eight to a byte in declaration order.
    pub fn set_bool(&mut self, id: StringHash, value: bool) {
        let slot = self.field_slot(id, FieldClass::Bool) as usize;
        let byte = slot / 8;
        let bit = 1u8 << (slot % 8);
        if self.bits.len() <= byte {
            self.bits.resize(byte + 1, 0);
        }
        if value {
            self.bits[byte] |= bit;
        } else {
            self.bits[byte] &= !bit;
        }
    }

    /// Writes a string field. The text is interned in the shared table
    /// and the node stores its table index.
    pub fn set_string(&mut self, id: StringHash, value: &str) {
        let string_index = self.table.get().borrow_mut().add(value) as u64;
        let slot = self.field_slot(id, FieldClass::String) as usize;
        if self.string_indices.len() <= slot {
            self.string_indices.resize(slot + 1, 0);
        }
        self.string_indices[slot] = string_index;
    }

    /// Writes a hash field. Both the id and the value have their debug
    /// names interned.
    pub fn set_hash(&mut self, id: StringHash, value: StringHash) {
        let value = tabulate(self.table.get(), value);
        let slot = self.field_slot(id, FieldClass::Hash) as usize;
        if self.hashes.len() <= slot {
            self.hashes.resize(slot + 1, StringHash::raw(0));
        }
        self.hashes[slot] = value;
    }

    /// Declares the schema shared by branches grown from this node.
    /// Returns the header cell so fields can be declared on it directly.
    ///
    /// # Panics
    ///
    /// Panics when called twice on the same node.
    pub fn create_branch_header(&mut self) -> Rc<RefCell<DataTreeHeader>> {
        assert!(
            self.branch_header.is_none(),
            "branch header already created for this node"
        );
        let header = Rc::new(RefCell::new(DataTreeHeader::with_table(Rc::clone(
            self.table.get(),
        ))));
        self.branch_header = Some(Rc::clone(&header));
        header
    }

    /// Registers a hash field id as a branch lookup key. Branches readied
    /// afterwards are indexed by their value for that field.
    ///
    /// # Panics
    ///
    /// Panics when the key was already added.
    pub fn add_key(&mut self, id: StringHash) {
        let id = tabulate(self.table.get(), id);
        assert!(
            !self.key_map.contains_key(&id),
            "branch key {id:?} already added"
        );
        self.key_map.insert(id, self.branch_maps.len() as u32);
        self.branch_maps.push(BTreeMap::new());
    }

    /// Grows an empty branch and returns its index. The branch shares
    /// this node's branch header when one was created.
    pub fn grow_branch(&mut self) -> usize {
        let child = Self::branch_node(
            self.branch_header.clone(),
            Rc::clone(self.table.get()),
        );
        self.branches.push(child);
        self.branches.len() - 1
    }

    /// Mutable access to a grown branch. Panics out of range.
    pub fn branch_mut(&mut self, index: usize) -> &mut DataSapling {
        &mut self.branches[index]
    }

    /// Read access to a grown branch. Panics out of range.
    pub fn branch(&self, index: usize) -> &DataSapling {
        &self.branches[index]
    }

    /// Number of grown branches.
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Declares a branch finished, registering it in every key map whose
    /// key field the branch defines.
    ///
    /// # Panics
    ///
    /// Panics unless `index` names the most recently grown branch.
    /// Branch construction is strictly append-ready-append.
    pub fn branch_ready(&mut self, index: usize) {
        assert!(
            index + 1 == self.branches.len(),
            "branch {index} readied out of order: only the most recently grown branch may be readied"
        );
        let mut registrations = Vec::new();
        {
            let branch = &self.branches[index];
            for (&key, &key_index) in &self.key_map {
                if branch.has_hash(key) {
                    registrations.push((key_index, branch.get_hash(key)));
                }
            }
        }
        for (key_index, value) in registrations {
            self.branch_maps[key_index as usize].insert(value, index as u32);
        }
    }

    /// Grows a branch, builds it with `build`, and readies it.
    pub fn grow_branch_with(&mut self, build: impl FnOnce(&mut DataSapling)) -> usize {
        let index = self.grow_branch();
        build(self.branch_mut(index));
        self.branch_ready(index);
        index
    }

    /// Whether an int field with this id is declared.
    pub fn has_int(&self, id: StringHash) -> bool {
        self.header.get().borrow().has_int(id)
    }

    /// Reads back an int field. Panics when undeclared or unset.
    pub fn get_int(&self, id: StringHash) -> i32 {
        let slot = self.require_slot(id, FieldClass::Int);
        self.ints[slot as usize]
    }

    /// Whether a float field with this id is declared.
    pub fn has_float(&self, id: StringHash) -> bool {
        self.header.get().borrow().has_float(id)
    }

    /// Reads back a float field. Panics when undeclared or unset.
    pub fn get_float(&self, id: StringHash) -> f32 {
        let slot = self.require_slot(id, FieldClass::Float);
        self.floats[slot as usize]
    }

    /// Whether a bool field with this id is declared.
    pub fn has_bool(&self, id: StringHash) -> bool {
        self.header.get().borrow().has_bool(id)
    }

    /// Reads back a bool field. Panics when undeclared or unset.
    pub fn get_bool(&self, id: StringHash) -> bool {
        let slot = self.require_slot(id, FieldClass::Bool) as usize;
        self.bits[slot / 8] & (1 << (slot % 8)) != 0
    }

    /// Whether a string field with this id is declared.
    pub fn has_string(&self, id: StringHash) -> bool {
        self.header.get().borrow().has_string(id)
    }

    /// Reads back a string field as an owned copy. Panics when
    /// undeclared or unset.
    pub fn get_string(&self, id: StringHash) -> String {
        let slot = self.require_slot(id, FieldClass::String);
        let index = self.string_indices[slot as usize] as i64;
        self.table.get().borrow().get(index).to_string()
    }

    /// Whether a hash field with this id is declared.
    pub fn has_hash(&self, id: StringHash) -> bool {
        self.header.get().borrow().has_hash(id)
    }

    /// Reads back a hash field. Panics when undeclared or unset.
    pub fn get_hash(&self, id: StringHash) -> StringHash {
        let slot = self.require_slot(id, FieldClass::Hash);
        self.hashes[slot as usize]
    }

    /// Serializes the whole build as a tree stream. Only the root (which
    /// owns its table) produces a stream that loads standalone.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), DataError> {
        codec::write_sapling(self, writer)
    }

    /// Freezes the finished build into its read-only form. Shared
    /// headers become plain shared references; the string table is
    /// snapshot once for the whole tree.
    ///
    /// # Panics
    ///
    /// Panics on a non-root sapling; harvesting starts at the owner of
    /// the string table.
    pub fn harvest(self) -> DataTree {
        let table = match &self.table {
            TableHandle::Owned(cell) => Rc::new(cell.borrow().to_table()),
            TableHandle::Shared(_) => panic!("harvest must start at the root sapling"),
        };
        self.freeze(None, TableRef::Owned(table))
    }

    fn freeze(self, parent_branch_header: Option<&Rc<DataTreeHeader>>, table: TableRef) -> DataTree {
        let header = match &self.header {
            HeaderHandle::Owned(cell) => HeaderRef::Owned(Rc::new(cell.borrow().snapshot())),
            HeaderHandle::Shared(_) => HeaderRef::Shared(Rc::clone(
                parent_branch_header.expect("shared header requires the parent's branch header"),
            )),
        };
        let branch_header = self
            .branch_header
            .as_ref()
            .map(|cell| Rc::new(cell.borrow().snapshot()));
        let shared_table = Rc::clone(table.rc());
        let branches = self
            .branches
            .into_iter()
            .map(|child| {
                child.freeze(
                    branch_header.as_ref(),
                    TableRef::Shared(Rc::clone(&shared_table)),
                )
            })
            .collect();
        DataTree {
            header,
            branch_header,
            table,
            ints: self.ints,
            floats: self.floats,
            bits: self.bits,
            string_indices: self.string_indices,
            hashes: self.hashes,
            key_map: self.key_map,
            branch_maps: self.branch_maps,
            branches,
        }
    }

    /// Resolves a field slot, declaring the field when this node owns
    /// its header.
    fn field_slot(&mut self, id: StringHash, class: FieldClass) -> u32 {
        let id = tabulate(self.table.get(), id);
        let owns = self.header.is_owned();
        let mut header = self.header.get().borrow_mut();
        let existing = class.slot(&header, id);
        match existing {
            Some(slot) => slot,
            None if owns => class.add(&mut header, id),
            None => panic!(
                "field {id:?} is not declared in this branch's shared {} schema",
                class.name()
            ),
        }
    }

    fn require_slot(&self, id: StringHash, class: FieldClass) -> u32 {
        let header = self.header.get().borrow();
        match class.slot(&header, id) {
            Some(slot) => slot,
            None => panic!("sapling has no {} field {id:?}", class.name()),
        }
    }
}

#[derive(Clone, Copy)]
enum FieldClass {
    Int,
    Float,
    Bool,
    String,
    Hash,
}

impl FieldClass {
    fn slot(self, header: &DataTreeHeader, id: StringHash) -> Option<u32> {
        match self {
            FieldClass::Int => header.int_slot(id),
            FieldClass::Float => header.float_slot(id),
            FieldClass::Bool => header.bool_slot(id),
            FieldClass::String => header.string_slot(id),
            FieldClass::Hash => header.hash_slot(id),
        }
    }

    fn add(self, header: &mut DataTreeHeader, id: StringHash) -> u32 {
        match self {
            FieldClass::Int => header.add_int(id),
            FieldClass::Float => header.add_float(id),
            FieldClass::Bool => header.add_bool(id),
            FieldClass::String => header.add_string(id),
            FieldClass::Hash => header.add_hash(id),
        }
    }

    fn name(self) -> &'static str {
        match self {
            FieldClass::Int => "int",
            FieldClass::Float => "float",
            FieldClass::Bool => "bool",
            FieldClass::String => "string",
            FieldClass::Hash => "hash",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEALTH: StringHash = StringHash::from_static("health");
    const SPEED: StringHash = StringHash::from_static("speed");
    const NAME: StringHash = StringHash::from_static("name");
    const KIND: StringHash = StringHash::from_static("kind");
    const ALIVE: StringHash = StringHash::from_static("alive");

    #[test]
    fn schema_declares_on_first_write() {
        let mut sapling = DataSapling::new();
        sapling.set_int(HEALTH, 100);
        sapling.set_float(SPEED, 2.5);
        sapling.set_bool(ALIVE, true);
        sapling.set_string(NAME, "grunt");
        sapling.set_hash(KIND, StringHash::from_static("enemy"));

        assert_eq!(sapling.get_int(HEALTH), 100);
        assert_eq!(sapling.get_float(SPEED), 2.5);
        assert!(sapling.get_bool(ALIVE));
        assert_eq!(sapling.get_string(NAME), "grunt");
        assert_eq!(sapling.get_hash(KIND), StringHash::from_static("enemy"));
    }

    #[test]
    fn overwrites_reuse_the_declared_slot() {
        let mut sapling = DataSapling::new();
        sapling.set_int(HEALTH, 100);
        sapling.set_int(SPEED, 7);
        sapling.set_int(HEALTH, 25);
        assert_eq!(sapling.get_int(HEALTH), 25);
        assert_eq!(sapling.get_int(SPEED), 7);
        assert_eq!(sapling.header.get().borrow().int_count(), 2);
    }

    #[test]
    fn bools_pack_eight_per_byte() {
        let mut sapling = DataSapling::new();
        let ids: Vec<StringHash> = (0..10)
            .map(|i| StringHash::from_text(&format!("flag_{i}")))
            .collect();
        for (i, &id) in ids.iter().enumerate() {
            sapling.set_bool(id, i % 3 == 0);
        }
        assert_eq!(sapling.bits.len(), 2);
        for (i, &id) in ids.iter().enumerate() {
            assert_eq!(sapling.get_bool(id), i % 3 == 0, "flag_{i}");
        }
    }

    #[test]
    fn branches_share_the_declared_branch_header() {
        let mut root = DataSapling::new();
        {
            let header = root.create_branch_header();
            let mut header = header.borrow_mut();
            header.add_int(HEALTH);
            header.add_hash(KIND);
        }
        let first = root.grow_branch();
        root.branch_mut(first).set_int(HEALTH, 10);
        root.branch_mut(first)
            .set_hash(KIND, StringHash::from_static("grunt"));
        root.branch_ready(first);

        let second = root.grow_branch();
        root.branch_mut(second).set_int(HEALTH, 99);
        root.branch_ready(second);

        assert_eq!(root.branch(first).get_int(HEALTH), 10);
        assert_eq!(root.branch(second).get_int(HEALTH), 99);
        assert!(!root.branch(first).header.is_owned());
    }

    #[test]
    #[should_panic(expected = "not declared in this branch's shared")]
    fn shared_header_rejects_novel_fields() {
        let mut root = DataSapling::new();
        root.create_branch_header();
        let index = root.grow_branch();
        root.branch_mut(index).set_int(HEALTH, 1);
    }

    #[test]
    fn branches_without_branch_header_own_their_schema() {
        let mut root = DataSapling::new();
        let index = root.grow_branch();
        root.branch_mut(index).set_int(HEALTH, 5);
        assert!(root.branch(index).header.is_owned());
        assert_eq!(root.branch(index).get_int(HEALTH), 5);
    }

    #[test]
    fn keyed_branches_resolve_after_ready() {
        let mut root = DataSapling::new();
        {
            let header = root.create_branch_header();
            header.borrow_mut().add_hash(KIND);
            header.borrow_mut().add_int(HEALTH);
        }
        root.add_key(KIND);

        root.grow_branch_with(|b| {
            b.set_hash(KIND, StringHash::from_static("grunt"));
            b.set_int(HEALTH, 10);
        });
        root.grow_branch_with(|b| {
            b.set_hash(KIND, StringHash::from_static("boss"));
            b.set_int(HEALTH, 500);
        });

        let tree = root.harvest();
        assert!(tree.has_key(KIND));
        assert!(tree.has_branch(KIND, StringHash::from_static("boss")));
        assert_eq!(
            tree.branch_by(KIND, StringHash::from_static("boss"))
                .get_int(HEALTH),
            500
        );
        assert_eq!(
            tree.branch_by(KIND, StringHash::from_static("grunt"))
                .get_int(HEALTH),
            10
        );
        assert!(!tree.has_branch(KIND, StringHash::from_static("absent")));
    }

    #[test]
    #[should_panic(expected = "readied out of order")]
    fn branch_ready_rejects_older_branches() {
        let mut root = DataSapling::new();
        let first = root.grow_branch();
        let _second = root.grow_branch();
        root.branch_ready(first);
    }

    #[test]
    #[should_panic(expected = "already created")]
    fn second_branch_header_is_rejected() {
        let mut root = DataSapling::new();
        root.create_branch_header();
        root.create_branch_header();
    }

    #[test]
    #[should_panic(expected = "already added")]
    fn duplicate_key_is_rejected() {
        let mut root = DataSapling::new();
        root.add_key(KIND);
        root.add_key(KIND);
    }

    #[test]
    fn harvest_freezes_values_and_structure() {
        let mut root = DataSapling::new();
        root.set_int(HEALTH, 42);
        root.set_string(NAME, "root");
        let index = root.grow_branch();
        root.branch_mut(index).set_float(SPEED, 1.5);
        root.branch_ready(index);

        let tree = root.harvest();
        assert_eq!(tree.get_int(HEALTH), 42);
        assert_eq!(tree.get_string(NAME), "root");
        assert_eq!(tree.branch_count(), 1);
        assert_eq!(tree.branch(0).get_float(SPEED), 1.5);
        assert!(tree.header.is_owned());
        assert!(tree.table.is_owned());
        assert!(!tree.branch(0).table.is_owned());
    }

    #[test]
    fn string_fields_share_table_entries_across_branches() {
        let mut root = DataSapling::new();
        root.set_string(NAME, "shared_value");
        let index = root.grow_branch();
        root.branch_mut(index).set_string(NAME, "shared_value");
        root.branch_ready(index);
        assert_eq!(
            root.string_indices[0],
            root.branch(index).string_indices[0]
        );
    }
}
