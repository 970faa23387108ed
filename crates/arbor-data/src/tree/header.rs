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

//! Tree schemas.
//!
//! A [`DataTreeHeader`] maps field ids to dense column slots, one
//! independent map per field class (int, float, bool, string, hash).
//! Slots are assigned in declaration order and never move, so every node
//! sharing a header indexes its columns identically. The header is built
//! as fields are first written (schema-on-write) or declared up front for
//! schemas shared across sibling branches.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use arbor_core::hash::StringHash;

use crate::string_table::StringTableBuilder;
use crate::tree::tabulate;

/// Field-id to column-slot maps for one tree schema.
#[derive(Debug, Clone, Default)]
pub struct DataTreeHeader {
    pub(crate) ints: BTreeMap<StringHash, u32>,
    pub(crate) floats: BTreeMap<StringHash, u32>,
    pub(crate) bools: BTreeMap<StringHash, u32>,
    pub(crate) strings: BTreeMap<StringHash, u32>,
    pub(crate) hashes: BTreeMap<StringHash, u32>,
    /// Table used to intern debug names of declared ids, when one is
    /// attached.
    pub(crate) table: Option<Rc<RefCell<StringTableBuilder>>>,
}

macro_rules! field_class {
    ($map:ident, $add:ident, $has:ident, $slot:ident, $count:ident, $doc:literal) => {
        #[doc = concat!("Declares ", $doc, " field, returning its slot.")]
        /// Redeclaring an existing id returns the slot it already has.
        pub fn $add(&mut self, id: StringHash) -> u32 {
            let id = self.intern(id);
            if let Some(&slot) = self.$map.get(&id) {
                return slot;
            }
            let slot = self.$map.len() as u32;
            self.$map.insert(id, slot);
            slot
        }

        #[doc = concat!("Whether ", $doc, " field with this id exists.")]
        pub fn $has(&self, id: StringHash) -> bool {
            self.$map.contains_key(&id)
        }

        #[doc = concat!("Column slot of ", $doc, " field, if declared.")]
        pub fn $slot(&self, id: StringHash) -> Option<u32> {
            self.$map.get(&id).copied()
        }

        #[doc = concat!("Number of declared ", $doc, " fields.")]
        pub fn $count(&self) -> usize {
            self.$map.len()
        }
    };
}

impl DataTreeHeader {
    /// Creates an empty header with no name table attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty header that interns declared ids' debug names
    /// into `table`.
    pub fn with_table(table: Rc<RefCell<StringTableBuilder>>) -> Self {
        Self {
            table: Some(table),
            ..Self::default()
        }
    }

    field_class!(ints, add_int, has_int, int_slot, int_count, "an int");
    field_class!(floats, add_float, has_float, float_slot, float_count, "a float");
    field_class!(bools, add_bool, has_bool, bool_slot, bool_count, "a bool");
    field_class!(strings, add_string, has_string, string_slot, string_count, "a string");
    field_class!(hashes, add_hash, has_hash, hash_slot, hash_count, "a hash");

    /// Copy of the maps alone, with no table attached. Used when a
    /// finished build is frozen into its read-only form.
    pub fn snapshot(&self) -> Self {
        Self {
            ints: self.ints.clone(),
            floats: self.floats.clone(),
            bools: self.bools.clone(),
            strings: self.strings.clone(),
            hashes: self.hashes.clone(),
            table: None,
        }
    }

    fn intern(&self, id: StringHash) -> StringHash {
        match &self.table {
            Some(table) => tabulate(table, id),
            None => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEALTH: StringHash = StringHash::from_static("health");
    const SPEED: StringHash = StringHash::from_static("speed");
    const ALIVE: StringHash = StringHash::from_static("alive");

    #[test]
    fn slots_assign_in_declaration_order_and_stay_stable() {
        let mut header = DataTreeHeader::new();
        assert_eq!(header.add_int(HEALTH), 0);
        assert_eq!(header.add_int(SPEED), 1);
        assert_eq!(header.add_int(ALIVE), 2);

        // Redeclaration keeps the original slot.
        assert_eq!(header.add_int(SPEED), 1);
        assert_eq!(header.int_slot(HEALTH), Some(0));
        assert_eq!(header.int_slot(ALIVE), Some(2));
        assert_eq!(header.int_count(), 3);
    }

    #[test]
    fn field_classes_are_independent() {
        let mut header = DataTreeHeader::new();
        header.add_int(HEALTH);
        header.add_float(HEALTH);
        header.add_bool(HEALTH);
        header.add_string(HEALTH);
        header.add_hash(HEALTH);

        // The same id gets slot 0 in all five classes.
        assert_eq!(header.int_slot(HEALTH), Some(0));
        assert_eq!(header.float_slot(HEALTH), Some(0));
        assert_eq!(header.bool_slot(HEALTH), Some(0));
        assert_eq!(header.string_slot(HEALTH), Some(0));
        assert_eq!(header.hash_slot(HEALTH), Some(0));

        assert!(!header.has_float(SPEED));
        assert_eq!(header.float_count(), 1);
    }

    #[cfg(feature = "hash-names")]
    #[test]
    fn attached_table_interns_declared_names() {
        let table = Rc::new(RefCell::new(StringTableBuilder::default()));
        let mut header = DataTreeHeader::with_table(Rc::clone(&table));
        header.add_int(HEALTH);
        assert_eq!(table.borrow().len(), 1);
        assert_eq!(table.borrow().get(0), "health");
    }
}
