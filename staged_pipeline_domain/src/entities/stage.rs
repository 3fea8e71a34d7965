// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Entity
//!
//! A stage is a named logical unit of the pipeline with two table-store
//! namespaces: the production namespace (visible under the stable `name`) and
//! the working namespace (under the derived `working_name`) into which the
//! current run materialises. When every task of the stage has succeeded, the
//! working namespace is atomically swapped into production.
//!
//! ## Lifecycle
//!
//! A stage is created once per logical pipeline stage, registered with the
//! [`crate::StageRegistry`], and destroyed only with the process. The swap
//! flags progress one way: `swap_in_progress` is raised while the commit
//! protocol runs and `has_been_swapped` stays set once the swap completed.
//! After that, no task may materialise into the stage and cache lookups
//! against it fail.
//!
//! Stage names feed table-store namespaces and lock-file names, so they are
//! validated on construction.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::StoreError;

/// Suffix appended to a stage name to derive its working namespace.
pub const WORKING_SUFFIX: &str = "__tmp";

/// Derives the working namespace name for a stage name.
///
/// Exposed for table-store implementations that must resolve a production
/// stage name to the namespace the current run writes into.
pub fn working_name_for(stage_name: &str) -> String {
    format!("{stage_name}{WORKING_SUFFIX}")
}

/// A pipeline stage with a production namespace and a working namespace.
///
/// Identity is the stable `name`; equality compares names only. The swap
/// flags are interior-mutable because stages are shared immutably (behind
/// `Arc`) between the registry, tasks, and the commit protocol.
#[derive(Debug)]
pub struct Stage {
    name: String,
    working_name: String,
    swap_in_progress: AtomicBool,
    has_been_swapped: AtomicBool,
}

impl Stage {
    /// Creates a new stage with the given production name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ValidationError`] if the name is empty or
    /// contains characters that cannot appear in namespace or lock-file
    /// names.
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(StoreError::validation_error("stage name must not be empty"));
        }
        if name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_whitespace())
        {
            return Err(StoreError::validation_error(format!(
                "stage name contains invalid characters: '{name}'"
            )));
        }
        let working_name = working_name_for(&name);
        Ok(Stage {
            name,
            working_name,
            swap_in_progress: AtomicBool::new(false),
            has_been_swapped: AtomicBool::new(false),
        })
    }

    /// The stable, production-visible stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The derived working (staging) namespace name.
    pub fn working_name(&self) -> &str {
        &self.working_name
    }

    /// Whether the commit protocol is currently swapping this stage.
    pub fn is_swap_in_progress(&self) -> bool {
        self.swap_in_progress.load(Ordering::SeqCst)
    }

    /// Whether the production swap for this stage has completed.
    pub fn has_been_swapped(&self) -> bool {
        self.has_been_swapped.load(Ordering::SeqCst)
    }

    pub(crate) fn set_swap_in_progress(&self, value: bool) {
        self.swap_in_progress.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_swapped(&self) {
        self.has_been_swapped.store(true, Ordering::SeqCst);
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Stage {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_name_is_derived() {
        let stage = Stage::new("raw").unwrap();
        assert_eq!(stage.name(), "raw");
        assert_eq!(stage.working_name(), "raw__tmp");
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(Stage::new("").is_err());
        assert!(Stage::new("a/b").is_err());
        assert!(Stage::new("a b").is_err());
    }

    #[test]
    fn test_swap_flags_progress() {
        let stage = Stage::new("raw").unwrap();
        assert!(!stage.is_swap_in_progress());
        assert!(!stage.has_been_swapped());
        stage.set_swap_in_progress(true);
        assert!(stage.is_swap_in_progress());
        stage.set_swapped();
        stage.set_swap_in_progress(false);
        assert!(stage.has_been_swapped());
        assert!(!stage.is_swap_in_progress());
    }

    #[test]
    fn test_equality_is_by_name() {
        let a = Stage::new("raw").unwrap();
        let b = Stage::new("raw").unwrap();
        b.set_swapped();
        assert_eq!(a, b);
    }
}
