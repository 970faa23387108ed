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

//! File-backed loading and saving.
//!
//! Thin wrappers over the stream codec plus the raw loaders content
//! pipelines lean on (whole-file bytes and text). All of them surface
//! failures as [`DataError`] so callers report one error type for
//! "asset would not load" regardless of which layer failed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::DataError;
use crate::tree::{DataSapling, DataTree};

/// Writes a finished build to `path` as a tree stream.
pub fn save_tree_file(path: impl AsRef<Path>, sapling: &DataSapling) -> Result<(), DataError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    sapling.write_to(&mut writer)?;
    writer.flush()?;
    log::debug!("saved tree stream to {}", path.display());
    Ok(())
}

/// Loads a tree stream from `path`.
pub fn load_tree_file(path: impl AsRef<Path>) -> Result<DataTree, DataError> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let tree = DataTree::read_from(&mut reader)?;
    log::debug!("loaded tree stream from {}", path.display());
    Ok(tree)
}

/// Loads a whole file as bytes.
pub fn load_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>, DataError> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    log::trace!("loaded {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Loads a whole file as UTF-8 text.
pub fn load_text(path: impl AsRef<Path>) -> Result<String, DataError> {
    let path = path.as_ref();
    let mut text = String::new();
    File::open(path)?.read_to_string(&mut text)?;
    log::trace!("loaded {} chars from {}", text.len(), path.display());
    Ok(text)
}
