// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # No-Op Lock Manager
//!
//! A lock manager that does not lock (an oxymoron). It exists so a pipeline
//! can be exercised locally without a lock backend; every `acquire`
//! immediately reports `LOCKED`.
//!
//! Never use this in a production environment. Without a real lock manager,
//! two concurrent runs can corrupt a stage.

use async_trait::async_trait;

use staged_pipeline_domain::{LockManager, LockState, LockStateTracker, Lockable, StoreError};

/// Non-locking lock manager for single-process testing.
pub struct NoOpLockManager {
    tracker: LockStateTracker,
}

impl NoOpLockManager {
    /// Creates the manager and logs a prominent warning.
    pub fn new() -> Self {
        tracing::warn!(
            "NoOpLockManager in use: stages are NOT protected against \
             concurrent runs. Do not use this in production."
        );
        NoOpLockManager {
            tracker: LockStateTracker::new(),
        }
    }
}

impl Default for NoOpLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockManager for NoOpLockManager {
    async fn acquire(&self, lockable: &Lockable) -> Result<(), StoreError> {
        self.tracker.set_state(lockable, LockState::Locked);
        Ok(())
    }

    async fn release(&self, lockable: &Lockable) -> Result<(), StoreError> {
        if self.tracker.get_state(lockable) != LockState::Locked {
            return Err(StoreError::lock_error(format!(
                "no lock '{lockable}' held"
            )));
        }
        self.tracker.set_state(lockable, LockState::Unlocked);
        Ok(())
    }

    fn state_tracker(&self) -> &LockStateTracker {
        &self.tracker
    }
}
