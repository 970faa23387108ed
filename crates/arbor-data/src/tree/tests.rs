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

use std::io::Cursor;

use arbor_core::hash::StringHash;

use crate::error::DataError;
use crate::tree::sapling::DataSapling;
use crate::tree::{DataTree, HeaderRef, TableRef};

const HEALTH: StringHash = StringHash::from_static("health");
const SPEED: StringHash = StringHash::from_static("speed");
const NAME: StringHash = StringHash::from_static("name");
const KIND: StringHash = StringHash::from_static("kind");
const ALIVE: StringHash = StringHash::from_static("alive");
const GRUNT: StringHash = StringHash::from_static("grunt");
const BOSS: StringHash = StringHash::from_static("boss");

fn encode(sapling: &DataSapling) -> Vec<u8> {
    let mut stream = Vec::new();
    sapling.write_to(&mut stream).unwrap();
    stream
}

fn decode(stream: &[u8]) -> DataTree {
    DataTree::read_from(&mut Cursor::new(stream)).unwrap()
}

#[test]
fn empty_root_stream_has_a_fixed_shape() {
    let stream = encode(&DataSapling::new());
    // owns_header, owns_table, empty table blob (two i64 sizes), five
    // empty header maps, no branch header, five empty columns, empty key
    // map, no branch maps, no branches.
    assert_eq!(stream.len(), 123);
    assert_eq!(&stream[..2], &[1, 1]);
    assert!(stream[2..].iter().all(|&byte| byte == 0));
}

#[test]
fn values_survive_a_round_trip() {
    let mut sapling = DataSapling::new();
    sapling.set_int(HEALTH, 100);
    sapling.set_float(SPEED, 2.5);
    sapling.set_bool(ALIVE, true);
    sapling.set_string(NAME, "grunt leader");
    sapling.set_hash(KIND, GRUNT);

    let tree = decode(&encode(&sapling));
    assert_eq!(tree.get_int(HEALTH), 100);
    assert_eq!(tree.get_float(SPEED), 2.5);
    assert!(tree.get_bool(ALIVE));
    assert_eq!(tree.get_string(NAME), "grunt leader");
    assert_eq!(tree.get_hash(KIND), GRUNT);
    assert!(!tree.has_int(SPEED));
}

#[test]
fn keyed_branches_survive_a_round_trip() {
    let mut root = DataSapling::new();
    root.set_string(NAME, "spawn table");
    {
        let header = root.create_branch_header();
        header.borrow_mut().add_hash(KIND);
        header.borrow_mut().add_int(HEALTH);
        header.borrow_mut().add_string(NAME);
    }
    root.add_key(KIND);
    root.grow_branch_with(|branch| {
        branch.set_hash(KIND, GRUNT);
        branch.set_int(HEALTH, 10);
        branch.set_string(NAME, "grunt");
    });
    root.grow_branch_with(|branch| {
        branch.set_hash(KIND, BOSS);
        branch.set_int(HEALTH, 500);
        branch.set_string(NAME, "boss");
    });

    let tree = decode(&encode(&root));
    assert_eq!(tree.branch_count(), 2);
    assert!(tree.has_key(KIND));
    assert!(tree.has_branch(KIND, BOSS));
    assert_eq!(tree.branch_by(KIND, BOSS).get_int(HEALTH), 500);
    assert_eq!(tree.branch_by(KIND, GRUNT).get_string(NAME), "grunt");
    assert!(!tree.has_branch(KIND, StringHash::from_static("absent")));
}

#[test]
fn loaded_branches_share_one_header_and_table() {
    let mut root = DataSapling::new();
    {
        let header = root.create_branch_header();
        header.borrow_mut().add_int(HEALTH);
    }
    for health in [1, 2, 3] {
        root.grow_branch_with(|branch| branch.set_int(HEALTH, health));
    }

    let tree = decode(&encode(&root));
    assert!(matches!(tree.header, HeaderRef::Owned(_)));
    assert!(matches!(tree.table, TableRef::Owned(_)));
    for branch in tree.branches() {
        assert!(matches!(branch.header, HeaderRef::Shared(_)));
        assert!(matches!(branch.table, TableRef::Shared(_)));
    }
}

#[test]
fn branches_with_their_own_schema_round_trip() {
    let mut root = DataSapling::new();
    root.set_int(HEALTH, 1);
    let index = root.grow_branch();
    root.branch_mut(index).set_float(SPEED, 9.5);
    root.branch_ready(index);

    let tree = decode(&encode(&root));
    assert!(matches!(tree.branch(0).header, HeaderRef::Owned(_)));
    assert_eq!(tree.branch(0).get_float(SPEED), 9.5);
    assert!(!tree.branch(0).has_int(HEALTH));
}

#[test]
fn partial_columns_round_trip() {
    let mut root = DataSapling::new();
    {
        let header = root.create_branch_header();
        header.borrow_mut().add_int(HEALTH);
        header.borrow_mut().add_int(SPEED);
    }
    let index = root.grow_branch();
    root.branch_mut(index).set_int(HEALTH, 7);
    root.branch_ready(index);

    let tree = decode(&encode(&root));
    let branch = tree.branch(0);
    assert!(branch.has_int(SPEED));
    assert_eq!(branch.ints.len(), 1);
    assert_eq!(branch.get_int(HEALTH), 7);
}

#[test]
fn harvest_and_stream_load_agree() {
    let builder = || {
        let mut root = DataSapling::new();
        root.set_int(HEALTH, 12);
        root.set_string(NAME, "twin");
        root.grow_branch_with(|branch| branch.set_bool(ALIVE, false));
        root
    };
    let harvested = builder().harvest();
    let loaded = decode(&encode(&builder()));

    assert_eq!(harvested.get_int(HEALTH), loaded.get_int(HEALTH));
    assert_eq!(harvested.get_string(NAME), loaded.get_string(NAME));
    assert_eq!(
        harvested.branch(0).get_bool(ALIVE),
        loaded.branch(0).get_bool(ALIVE)
    );
}

#[cfg(feature = "hash-names")]
#[test]
fn field_names_survive_a_round_trip() {
    let mut sapling = DataSapling::new();
    sapling.set_int(HEALTH, 100);
    sapling.set_hash(KIND, GRUNT);

    let tree = decode(&encode(&sapling));
    let json = tree.to_json();
    assert_eq!(json.get("health"), Some(&serde_json::json!(100)));
    assert_eq!(json.get("kind"), Some(&serde_json::json!("grunt")));
}

#[test]
fn root_sharing_a_header_is_rejected() {
    let err = DataTree::read_from(&mut Cursor::new(&[0u8][..])).unwrap_err();
    assert!(matches!(err, DataError::Malformed { .. }));
    assert!(err.to_string().contains("does not own its header"));
}

#[test]
fn mangled_bool_byte_is_rejected() {
    let err = DataTree::read_from(&mut Cursor::new(&[7u8][..])).unwrap_err();
    assert!(err.to_string().contains("boolean byte holds 7"));
}

#[test]
fn truncated_stream_is_an_io_error() {
    let mut sapling = DataSapling::new();
    sapling.set_int(HEALTH, 100);
    let stream = encode(&sapling);
    let err = DataTree::read_from(&mut Cursor::new(&stream[..stream.len() / 2])).unwrap_err();
    assert!(matches!(err, DataError::Io(_)));
}

#[test]
fn out_of_range_string_index_is_rejected() {
    let mut sapling = DataSapling::new();
    sapling.set_string(NAME, "abc");
    let mut stream = encode(&sapling);
    // Four empty eight-byte counts trail the index value: the hash
    // column, the key map, the branch maps, and the branches.
    let position = stream.len() - 40;
    stream[position..position + 8].copy_from_slice(&99u64.to_le_bytes());
    let err = DataTree::read_from(&mut Cursor::new(&stream[..])).unwrap_err();
    assert!(err.to_string().contains("string index 99"));
}

#[test]
fn nested_branches_round_trip() {
    let mut root = DataSapling::new();
    root.set_int(HEALTH, 1);
    let outer = root.grow_branch();
    root.branch_mut(outer).set_int(HEALTH, 2);
    let inner = root.branch_mut(outer).grow_branch();
    root.branch_mut(outer)
        .branch_mut(inner)
        .set_int(HEALTH, 3);
    root.branch_mut(outer).branch_ready(inner);
    root.branch_ready(outer);

    let tree = decode(&encode(&root));
    assert_eq!(tree.get_int(HEALTH), 1);
    assert_eq!(tree.branch(0).get_int(HEALTH), 2);
    assert_eq!(tree.branch(0).branch(0).get_int(HEALTH), 3);
}
