// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Registry Aggregate
//!
//! The registry is the in-memory source of truth for which stages exist and
//! which have already been swapped into production. Every stage is inserted
//! under both its `name` and its `working_name`, so a lookup by either
//! resolves to the same shared entity and neither may collide with any other
//! registered stage.
//!
//! ## Invariants
//!
//! - `name` and `working_name` are unique across all registered stages;
//!   violating registration fails with `DuplicateStage` and leaves the
//!   registry untouched (no partial registration)
//! - a stage enters the swapped set exactly once; a second swap attempt
//!   fails with `StageAlreadySwapped`
//! - the swapped-set claim is taken *before* the table store performs the
//!   swap and is rolled back only when the store declares its swap
//!   idempotent (no-retry policy otherwise)
//!
//! All mutation happens under one short-lived mutex; callers perform I/O
//! outside of it.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::entities::Stage;
use crate::StoreError;

/// Registry of known stages and their swap state.
///
/// Cheap to share: clone the surrounding `Arc`, not the registry.
#[derive(Debug, Default)]
pub struct StageRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    stages: HashMap<String, Arc<Stage>>,
    swapped: HashSet<String>,
}

impl StageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage under both its name and its working name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateStage`] if either key is already
    /// present; the registry is left unchanged.
    pub fn register(&self, stage: Stage) -> Result<Arc<Stage>, StoreError> {
        let mut state = self.inner.lock();
        if state.stages.contains_key(stage.name()) {
            return Err(StoreError::DuplicateStage(format!(
                "stage with name '{}' already exists",
                stage.name()
            )));
        }
        if state.stages.contains_key(stage.working_name()) {
            return Err(StoreError::DuplicateStage(format!(
                "stage with working name '{}' already exists",
                stage.working_name()
            )));
        }
        let stage = Arc::new(stage);
        state
            .stages
            .insert(stage.name().to_string(), Arc::clone(&stage));
        state
            .stages
            .insert(stage.working_name().to_string(), Arc::clone(&stage));
        Ok(stage)
    }

    /// Looks up a stage by name or working name.
    pub fn get(&self, name: &str) -> Option<Arc<Stage>> {
        self.inner.lock().stages.get(name).cloned()
    }

    /// Whether a stage is registered under the given name or working name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().stages.contains_key(name)
    }

    /// Whether the stage's production swap has completed (or been claimed).
    pub fn is_swapped(&self, name: &str) -> bool {
        self.inner.lock().swapped.contains(name)
    }

    /// Claims the swap for a stage ahead of the table-store swap.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownStage`] if the stage is not registered
    /// - [`StoreError::StageAlreadySwapped`] if the swap was already claimed
    pub fn begin_swap(&self, stage: &Stage) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        if !state.stages.contains_key(stage.name()) {
            return Err(StoreError::UnknownStage(format!(
                "stage '{}' is not registered",
                stage.name()
            )));
        }
        if !state.swapped.insert(stage.name().to_string()) {
            return Err(StoreError::StageAlreadySwapped(format!(
                "stage '{}' has already been swapped",
                stage.name()
            )));
        }
        stage.set_swap_in_progress(true);
        Ok(())
    }

    /// Records a completed table-store swap.
    pub fn complete_swap(&self, stage: &Stage) {
        // the claim from begin_swap stays in the swapped set
        let _state = self.inner.lock();
        stage.set_swapped();
        stage.set_swap_in_progress(false);
    }

    /// Rolls the swap claim back after a failed table-store swap.
    ///
    /// Only valid when the table store declares its swap idempotent;
    /// otherwise the stage must stay claimed and unusable.
    pub fn abort_swap(&self, stage: &Stage) {
        let mut state = self.inner.lock();
        state.swapped.remove(stage.name());
        stage.set_swap_in_progress(false);
    }

    /// Number of registered stages (each stage counts once).
    pub fn len(&self) -> usize {
        self.inner.lock().stages.len() / 2
    }

    /// Whether no stage is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().stages.is_empty()
    }

    /// Clears all registration and swap state. Test support.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        state.stages.clear();
        state.swapped.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup_by_both_names() {
        let registry = StageRegistry::new();
        let stage = registry.register(Stage::new("raw").unwrap()).unwrap();
        assert!(Arc::ptr_eq(&registry.get("raw").unwrap(), &stage));
        assert!(Arc::ptr_eq(&registry.get("raw__tmp").unwrap(), &stage));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = StageRegistry::new();
        registry.register(Stage::new("raw").unwrap()).unwrap();
        let err = registry.register(Stage::new("raw").unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateStage(_)));
    }

    /// Two distinct stages whose working names collide are rejected and the
    /// registry stays unchanged.
    #[test]
    fn test_duplicate_working_name_rejected_without_partial_state() {
        let registry = StageRegistry::new();
        registry.register(Stage::new("raw__tmp").unwrap()).unwrap();
        // "raw" derives working name "raw__tmp", which is taken
        let err = registry.register(Stage::new("raw").unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateStage(_)));
        assert!(registry.get("raw").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_swap_claim_is_single_use() {
        let registry = StageRegistry::new();
        let stage = registry.register(Stage::new("raw").unwrap()).unwrap();

        registry.begin_swap(&stage).unwrap();
        assert!(registry.is_swapped("raw"));
        assert!(stage.is_swap_in_progress());

        let err = registry.begin_swap(&stage).unwrap_err();
        assert!(matches!(err, StoreError::StageAlreadySwapped(_)));

        registry.complete_swap(&stage);
        assert!(stage.has_been_swapped());
        assert!(!stage.is_swap_in_progress());
        assert!(registry.is_swapped("raw"));
    }

    #[test]
    fn test_abort_swap_releases_claim() {
        let registry = StageRegistry::new();
        let stage = registry.register(Stage::new("raw").unwrap()).unwrap();
        registry.begin_swap(&stage).unwrap();
        registry.abort_swap(&stage);
        assert!(!registry.is_swapped("raw"));
        // the claim can be retaken
        registry.begin_swap(&stage).unwrap();
    }

    #[test]
    fn test_begin_swap_requires_registration() {
        let registry = StageRegistry::new();
        let stage = Stage::new("raw").unwrap();
        assert!(matches!(
            registry.begin_swap(&stage),
            Err(StoreError::UnknownStage(_))
        ));
    }
}
