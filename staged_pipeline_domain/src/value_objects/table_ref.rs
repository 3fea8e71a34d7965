// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Table Reference Value Objects
//!
//! This module provides the two halves of the engine's table handling:
//!
//! - [`TableRef`]: the logical handle `(stage, name, cache_key)` naming rows
//!   that live in a table store. References do not own the underlying data;
//!   two references are equal iff all three fields match.
//! - [`Table`]: a task-produced table. A task wraps its in-memory payload in
//!   a `Table` with no reference; the materialisation controller assigns the
//!   reference (stage, generated name, cache key) when the payload is
//!   persisted. From then on the reference is immutable.
//!
//! ## Naming Convention
//!
//! Materialised tables are named
//! `"<task name>_<4-digit zero-padded counter>_<cache key>"`, the counter
//! starting at 0 per task invocation. The padding keeps names sortable for
//! the common case while tasks producing ten thousand or more tables still
//! get distinct names.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use super::cache_key::CacheKey;

/// Logical handle for rows stored in a table store.
///
/// A reference names the production stage the table belongs to, the generated
/// table name, and the cache key of the task invocation that produced it.
/// It is a pure value: cloneable, hashable, serializable, and immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    stage: String,
    name: String,
    cache_key: CacheKey,
}

impl TableRef {
    /// Creates a new table reference.
    pub fn new(stage: impl Into<String>, name: impl Into<String>, cache_key: CacheKey) -> Self {
        TableRef {
            stage: stage.into(),
            name: name.into(),
            cache_key,
        }
    }

    /// Returns the generated table name for a materialised table.
    ///
    /// `index` is the position of the table in the deterministic walk of the
    /// task's output tree, starting at 0.
    pub fn materialised_name(task_name: &str, index: usize, cache_key: &CacheKey) -> String {
        format!("{task_name}_{index:04}_{cache_key}")
    }

    /// The production stage name this table belongs to.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The generated table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cache key of the producing task invocation.
    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stage, self.name)
    }
}

/// A table produced by a task: an in-memory payload plus, once materialised,
/// the reference under which the payload was persisted.
///
/// `T` is the table store's payload representation (a dataframe, a set of
/// JSON rows, ...). The payload never participates in equality: tables
/// compare by their assigned reference, mirroring the rule that references
/// are equal iff `(stage, name, cache_key)` match. Decoded tables carry a
/// reference and no payload until dematerialisation attaches one.
#[derive(Debug, Clone)]
pub struct Table<T> {
    payload: Option<T>,
    reference: Option<TableRef>,
}

impl<T> Table<T> {
    /// Wraps a freshly produced payload; the reference is assigned later by
    /// the materialisation controller.
    pub fn new(payload: T) -> Self {
        Table {
            payload: Some(payload),
            reference: None,
        }
    }

    /// Builds a table from a decoded reference, without payload.
    pub fn from_reference(reference: TableRef) -> Self {
        Table {
            payload: None,
            reference: Some(reference),
        }
    }

    /// The assigned reference, if the table has been materialised or decoded.
    pub fn reference(&self) -> Option<&TableRef> {
        self.reference.as_ref()
    }

    /// The in-memory payload, if present.
    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    /// Assigns the reference under which the payload is persisted.
    pub fn with_reference(mut self, reference: TableRef) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Attaches a retrieved payload to a decoded reference.
    pub fn with_payload(mut self, payload: T) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl<T> PartialEq for Table<T> {
    /// Tables compare by assigned reference only; payloads are opaque to the
    /// engine. Two unreferenced tables compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl<T> Eq for Table<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::parse(s).unwrap()
    }

    #[test]
    fn test_reference_equality_requires_all_fields() {
        let a = TableRef::new("raw", "t_0000_x", key("0123456789abcdef0123"));
        let b = TableRef::new("raw", "t_0000_x", key("0123456789abcdef0123"));
        let c = TableRef::new("raw", "t_0001_x", key("0123456789abcdef0123"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_materialised_name_padding() {
        let k = key("0123456789abcdef0123");
        assert_eq!(
            TableRef::materialised_name("build", 0, &k),
            "build_0000_0123456789abcdef0123"
        );
        assert_eq!(
            TableRef::materialised_name("build", 42, &k),
            "build_0042_0123456789abcdef0123"
        );
    }

    /// Tasks producing ten thousand or more tables still get distinct names;
    /// the counter grows past the four-digit padding instead of wrapping.
    #[test]
    fn test_materialised_name_distinct_beyond_padding() {
        let k = key("0123456789abcdef0123");
        let names: std::collections::HashSet<String> = (9998..10_002)
            .map(|i| TableRef::materialised_name("big", i, &k))
            .collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains("big_10000_0123456789abcdef0123"));
    }

    #[test]
    fn test_table_equality_ignores_payload() {
        let r = TableRef::new("raw", "t_0000_x", key("0123456789abcdef0123"));
        let with_payload: Table<i32> = Table::new(7).with_reference(r.clone());
        let bare: Table<i32> = Table::from_reference(r);
        assert_eq!(with_payload, bare);
    }
}
