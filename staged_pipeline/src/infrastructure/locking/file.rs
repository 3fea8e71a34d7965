// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Lock Manager
//!
//! Lock manager backed by advisory lock files, for concurrent runs that
//! share a file system. Each lockable maps to one file under a configured
//! base directory (`<base>/<stage name>.lock` for stages,
//! `<base>/<name>.lock` for named resources), and holding the advisory lock
//! on that file is holding the lock.
//!
//! ## Semantics
//!
//! - `acquire` opens or creates the lock file and blocks (on a blocking
//!   worker thread) until the exclusive advisory lock is held. Re-acquiring
//!   a lockable this manager already holds increments a hold count instead
//!   of touching the file again.
//! - `release` decrements; when the last hold leaves, the advisory lock is
//!   dropped, the lock file deleted, and the state transitions to
//!   `UNLOCKED`. Releasing a never-acquired lockable fails with `LockError`.
//!
//! Acquires through one manager are serialised by its lock table; that table
//! is a `tokio` mutex precisely because it is held across the blocking
//! acquire. Advisory locks vanish with the process, so a crashed run never
//! leaves a stage locked, only a stale unlocked file.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::Mutex;

use staged_pipeline_domain::{LockManager, LockState, LockStateTracker, Lockable, StoreError};

/// Lock manager using one advisory lock file per lockable.
pub struct FileLockManager {
    base_path: PathBuf,
    tracker: LockStateTracker,
    locks: Mutex<HashMap<Lockable, FileLockEntry>>,
}

struct FileLockEntry {
    file: File,
    path: PathBuf,
    holds: usize,
}

impl FileLockManager {
    /// Creates a manager rooted at `base_path`, creating the directory if
    /// needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(FileLockManager {
            base_path,
            tracker: LockStateTracker::new(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The lock file backing a lockable.
    pub fn lock_path(&self, lockable: &Lockable) -> PathBuf {
        self.base_path.join(format!("{}.lock", lockable.key()))
    }
}

#[async_trait]
impl LockManager for FileLockManager {
    async fn acquire(&self, lockable: &Lockable) -> Result<(), StoreError> {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get_mut(lockable) {
            entry.holds += 1;
            return Ok(());
        }

        let path = self.lock_path(lockable);
        tracing::info!(lock = %lockable, path = %path.display(), "locking");
        let lock_file = path.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<File, StoreError> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&lock_file)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|err| {
            StoreError::internal_error(format!("lock acquisition task failed: {err}"))
        })??;

        locks.insert(
            lockable.clone(),
            FileLockEntry {
                file,
                path,
                holds: 1,
            },
        );
        self.tracker.set_state(lockable, LockState::Locked);
        Ok(())
    }

    async fn release(&self, lockable: &Lockable) -> Result<(), StoreError> {
        let mut locks = self.locks.lock().await;
        match locks.get_mut(lockable) {
            None => {
                return Err(StoreError::lock_error(format!(
                    "no lock '{lockable}' found"
                )))
            }
            Some(entry) if entry.holds > 1 => {
                entry.holds -= 1;
                return Ok(());
            }
            Some(_) => {}
        }

        if let Some(entry) = locks.remove(lockable) {
            tracing::info!(lock = %lockable, "unlocking");
            let result = tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
                entry.file.unlock()?;
                std::fs::remove_file(&entry.path)?;
                Ok(())
            })
            .await
            .map_err(|err| {
                StoreError::internal_error(format!("lock release task failed: {err}"))
            })?;
            // the handle is gone either way; the lock no longer protects
            self.tracker.set_state(lockable, LockState::Unlocked);
            result?;
        }
        Ok(())
    }

    fn state_tracker(&self) -> &LockStateTracker {
        &self.tracker
    }
}
