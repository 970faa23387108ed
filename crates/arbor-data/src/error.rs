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

//! Errors produced while reading and writing data streams.
//!
//! Decode failures are recoverable and reported through [`DataError`];
//! schema misuse of an already-loaded tree (reading a field the header
//! never declared) is a programming error and panics instead.

use thiserror::Error;

/// Failure while serializing or deserializing table and tree streams.
#[derive(Debug, Error)]
pub enum DataError {
    /// The underlying reader or writer failed.
    #[error("data stream i/o failed")]
    Io(#[from] std::io::Error),

    /// The bytes do not describe a valid table or tree.
    #[error("malformed data stream: {what}")]
    Malformed {
        /// Which structural check the stream failed.
        what: String,
    },
}

impl DataError {
    /// Builds a [`DataError::Malformed`] from any displayable context.
    pub fn malformed(what: impl Into<String>) -> Self {
        Self::Malformed { what: what.into() }
    }
}
