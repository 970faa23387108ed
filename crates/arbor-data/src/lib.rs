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

//! # Arbor Data
//!
//! The record-tree data format: interned string tables, schema-on-write
//! tree headers, the append-only [`DataSapling`] builder, the read-only
//! [`DataTree`], and the little-endian binary streams that carry them.
//!
//! Content pipelines build saplings field by field, write them to disk
//! with [`DataSapling::write_to`], and ship the bytes; the runtime loads
//! them back with [`DataTree::read_from`] and reads fields by
//! [`StringHash`] id in O(log n).

#![warn(missing_docs)]

// Bulk columns are written with `bytemuck::cast_slice`, so the in-memory
// byte order is the on-disk byte order.
#[cfg(target_endian = "big")]
compile_error!("arbor-data streams are little-endian; big-endian targets are unsupported");

pub mod error;
pub mod file;
pub mod string_table;
pub mod tree;

pub use arbor_core::hash::StringHash;
pub use error::DataError;
pub use string_table::{StringTable, StringTableBuilder, StringTableConfig};
pub use tree::{DataSapling, DataTree, DataTreeHeader};
