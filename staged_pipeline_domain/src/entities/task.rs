// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Materialising Task Entity
//!
//! A materialising task is the unit of work the engine deduplicates.
//! Its identity is `(original_name, version, stage)`:
//!
//! - `original_name`: stable symbolic name of the task in the DAG
//! - `version`: user-supplied version string, or `None` for "unversioned /
//!   always lazy"; a missing version fingerprints as the literal `"None"`
//! - `stage`: the stage the task materialises into
//!
//! A task also declares an `input_type`, the capability key the table store
//! honours when dematerialising inputs (which in-memory form to hand the
//! task), and a `lazy` flag: lazy tasks ask to be recomputed even when the
//! cache hits, though the table store may still deduplicate their stored
//! rows.
//!
//! The cache key is not part of the identity; it is computed once the
//! serialised inputs are known and assigned write-once.

use std::sync::{Arc, OnceLock};

use super::stage::Stage;
use crate::value_objects::CacheKey;
use crate::StoreError;

/// A task whose outputs are materialised and cached by the engine.
#[derive(Debug)]
pub struct MaterialisingTask {
    original_name: String,
    version: Option<String>,
    stage: Arc<Stage>,
    input_type: String,
    lazy: bool,
    cache_key: OnceLock<CacheKey>,
}

impl MaterialisingTask {
    /// Creates a new task bound to a stage.
    ///
    /// `input_type` is the capability key passed to the table store when
    /// inputs are dematerialised.
    pub fn new(
        original_name: impl Into<String>,
        stage: Arc<Stage>,
        input_type: impl Into<String>,
    ) -> Self {
        MaterialisingTask {
            original_name: original_name.into(),
            version: None,
            stage,
            input_type: input_type.into(),
            lazy: false,
            cache_key: OnceLock::new(),
        }
    }

    /// Sets the task version. Unversioned tasks fingerprint as `"None"`.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Marks the task lazy: recompute on cache hits, let the table store
    /// deduplicate the stored rows.
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// The task's stable symbolic name.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// The task version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The stage this task materialises into.
    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    /// The capability key for dematerialising inputs.
    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    /// Whether the task asked to be recomputed even on cache hits.
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Assigns the computed cache key, write-once.
    ///
    /// Re-assigning the same key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InternalError`] when a different key was already
    /// assigned.
    pub fn assign_cache_key(&self, key: CacheKey) -> Result<(), StoreError> {
        let existing = self.cache_key.get_or_init(|| key.clone());
        if *existing != key {
            return Err(StoreError::internal_error(format!(
                "task '{}' already has cache key {existing}, refusing {key}",
                self.original_name
            )));
        }
        Ok(())
    }

    /// The assigned cache key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InternalError`] if the key has not been computed
    /// yet.
    pub fn cache_key(&self) -> Result<&CacheKey, StoreError> {
        self.cache_key.get().ok_or_else(|| {
            StoreError::internal_error(format!(
                "task '{}' has no cache key assigned yet",
                self.original_name
            ))
        })
    }
}
