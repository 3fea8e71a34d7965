// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cache Key Value Object
//!
//! This module provides the validated cache-key value object used to identify
//! `(task identity, input fingerprint)` pairs throughout the engine.
//!
//! ## Overview
//!
//! A cache key is the first 20 hexadecimal characters (80 bits) of a SHA-256
//! digest over a task's identity and its canonicalised inputs (see
//! [`crate::services::fingerprint`] for the derivation). The engine treats it
//! as an opaque identifier: equal keys mean "the same task ran on the same
//! inputs", and materialised table names embed the key so that stored rows
//! can always be traced back to the run that produced them.
//!
//! ## Validation
//!
//! - Exactly [`CacheKey::LENGTH`] characters
//! - Lowercase ASCII hexadecimal only
//!
//! Construction through [`CacheKey::parse`] (or `FromStr`/serde) enforces
//! both rules; a key that exists is always well formed.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::StoreError;

/// Validated 20-hex-character cache key identifying a task execution.
///
/// Cache keys are value objects: immutable, compared by value, and usable as
/// map keys. They serialize as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Number of hex characters in a cache key (80 bits).
    pub const LENGTH: usize = 20;

    /// Parses and validates a cache key from a string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ValidationError`] if the input is not exactly
    /// [`Self::LENGTH`] lowercase hex characters.
    pub fn parse(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if value.len() != Self::LENGTH {
            return Err(StoreError::validation_error(format!(
                "cache key must be {} characters, got {} ('{}')",
                Self::LENGTH,
                value.len(),
                value
            )));
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(StoreError::validation_error(format!(
                "cache key must be lowercase hex: '{value}'"
            )));
        }
        Ok(CacheKey(value))
    }

    /// Builds a cache key from the leading characters of a hex digest.
    ///
    /// Used by the fingerprint service after hashing; the digest is already
    /// known to be lowercase hex and long enough.
    pub(crate) fn from_digest_hex(digest_hex: &str) -> Self {
        CacheKey(digest_hex[..Self::LENGTH].to_string())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CacheKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheKey::parse(s)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CacheKey::parse(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
