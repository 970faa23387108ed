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

//! Compile-time string identifiers.
//!
//! A [`StringHash`] is the CRC-32 of a piece of text. Systems key their
//! registries on these instead of owned strings so lookups stay cheap and
//! ids can live in `const` items. With the `hash-names` feature (the
//! default) each hash also carries a debug payload naming its source text,
//! either the original `&'static str` or an index into whichever string
//! table interned it. The payload never participates in comparison.

use std::cmp::Ordering;
use std::fmt;

/// CRC-32 (IEEE, reflected) of `bytes`, evaluable in `const` context.
///
/// The bitwise formulation is used instead of a lookup table so ids can be
/// computed at compile time.
pub const fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFF_u32;
    let mut i = 0;
    while i < bytes.len() {
        crc ^= bytes[i] as u32;
        let mut bit = 0;
        while bit < 8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            bit += 1;
        }
        i += 1;
    }
    !crc
}

/// Debug payload of a [`StringHash`].
#[cfg(feature = "hash-names")]
#[derive(Debug, Clone, Copy, Default)]
pub enum HashName {
    /// No text attached (hash built from a raw value or read without names).
    #[default]
    None,
    /// The source text, with static storage.
    Static(&'static str),
    /// Index of the text inside the string table that interned it.
    Tabulated(u32),
}

/// A 32-bit string identifier.
///
/// Equality, ordering, and hashing all consider the `hash` field alone, so
/// two hashes of the same text compare equal regardless of where their
/// debug payloads point.
#[derive(Clone, Copy)]
pub struct StringHash {
    /// CRC-32 of the source text.
    pub hash: u32,
    /// Debug-only name payload.
    #[cfg(feature = "hash-names")]
    pub name: HashName,
}

impl StringHash {
    /// Hashes a static string, keeping the text as the debug payload.
    ///
    /// Usable in `const` items:
    /// ```
    /// use arbor_core::hash::StringHash;
    /// const ENEMY: StringHash = StringHash::from_static("enemy");
    /// assert_eq!(ENEMY, StringHash::from_static("enemy"));
    /// ```
    pub const fn from_static(text: &'static str) -> Self {
        Self {
            hash: crc32(text.as_bytes()),
            #[cfg(feature = "hash-names")]
            name: HashName::Static(text),
        }
    }

    /// Hashes arbitrary text. The debug payload stays empty because the
    /// text cannot be retained; interning it in a string table later fills
    /// it in.
    pub fn from_text(text: &str) -> Self {
        Self {
            hash: crc32(text.as_bytes()),
            #[cfg(feature = "hash-names")]
            name: HashName::None,
        }
    }

    /// Wraps an already-computed hash value with no payload.
    pub const fn raw(hash: u32) -> Self {
        Self {
            hash,
            #[cfg(feature = "hash-names")]
            name: HashName::None,
        }
    }

    /// Pairs a static string with a precomputed hash, checking the pair in
    /// debug builds. Used where hashes come from offline tooling.
    pub const fn verified(text: &'static str, hash: u32) -> Self {
        debug_assert!(crc32(text.as_bytes()) == hash);
        Self {
            hash,
            #[cfg(feature = "hash-names")]
            name: HashName::Static(text),
        }
    }

    /// The table index of the debug payload, or `None` when the payload is
    /// absent or still textual.
    #[cfg(feature = "hash-names")]
    pub fn table_index(&self) -> Option<u32> {
        match self.name {
            HashName::Tabulated(index) => Some(index),
            _ => None,
        }
    }

    /// The source text, when the payload still holds it.
    #[cfg(feature = "hash-names")]
    pub fn static_text(&self) -> Option<&'static str> {
        match self.name {
            HashName::Static(text) => Some(text),
            _ => None,
        }
    }
}

impl PartialEq for StringHash {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for StringHash {}

impl PartialOrd for StringHash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StringHash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl std::hash::Hash for StringHash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Debug for StringHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "hash-names")]
        match self.name {
            HashName::Static(text) => {
                return write!(f, "StringHash({:#010x} {:?})", self.hash, text)
            }
            HashName::Tabulated(index) => {
                return write!(f, "StringHash({:#010x} @{})", self.hash, index)
            }
            HashName::None => {}
        }
        write!(f, "StringHash({:#010x})", self.hash)
    }
}

impl fmt::Display for StringHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "hash-names")]
        if let HashName::Static(text) = self.name {
            return f.write_str(text);
        }
        write!(f, "{:#010x}", self.hash)
    }
}

impl serde::Serialize for StringHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.hash)
    }
}

impl<'de> serde::Deserialize<'de> for StringHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(StringHash::raw)
    }
}
