// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Identifier Value Object
//!
//! A run id is a fresh 20-hex-character value generated once per engine
//! lifetime and stamped into every task metadata record, so that rows in the
//! metadata store can be attributed to the process that wrote them. It shares
//! the cache key's textual shape but carries no fingerprint semantics.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use uuid::Uuid;

use crate::StoreError;

/// Per-process run identifier (20 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    /// Number of hex characters in a run id.
    pub const LENGTH: usize = 20;

    /// Generates a fresh random run id.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        RunId(hex[..Self::LENGTH].to_string())
    }

    /// Parses and validates a run id from a string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ValidationError`] if the input is not exactly
    /// [`Self::LENGTH`] lowercase hex characters.
    pub fn parse(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if value.len() != Self::LENGTH
            || !value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(StoreError::validation_error(format!(
                "run id must be {} lowercase hex characters: '{}'",
                Self::LENGTH,
                value
            )));
        }
        Ok(RunId(value))
    }

    /// Returns the run id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RunId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RunId::parse(value)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_eq!(a.as_str().len(), RunId::LENGTH);
        assert!(RunId::parse(a.as_str()).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(RunId::parse("short").is_err());
        assert!(RunId::parse("0123456789ABCDEF0123").is_err());
    }
}
