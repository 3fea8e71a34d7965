// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Table Store Port
//!
//! The persistence boundary the materialisation controller calls into. A
//! table store owns two namespaces per stage, production (visible under the
//! stage name) and working (under the derived working name), plus the task
//! metadata records, and promotes working to production atomically on swap.
//!
//! ## Contract
//!
//! - `store_table` / `store_task_metadata` write into the *working*
//!   namespace of the referenced stage; `retrieve_task_metadata` reads the
//!   *production* namespace (the committed cache of previous runs)
//! - if a metadata record is visible, every table it references must be
//!   visible too; implementations without cross-row transactions must order
//!   their writes accordingly
//! - `swap_stage` atomically renames working over production
//! - blocking calls honour externally signalled cancellation by failing
//!   with `Cancelled`
//!
//! The associated `Payload` type is the store's in-memory table
//! representation; converting it to task-facing dataframe types is the
//! store's concern and out of the engine's scope.

use async_trait::async_trait;

use crate::entities::{MaterialisingTask, Stage};
use crate::value_objects::{CacheKey, Table, TableRef, TaskMetadata};
use crate::StoreError;

/// Persistence boundary for tables and task metadata.
#[async_trait]
pub trait TableStore: Send + Sync + 'static {
    /// The store's in-memory table representation.
    type Payload: Send + Sync;

    /// Prepares both namespaces of a stage; the working namespace starts
    /// empty.
    async fn create_stage(&self, stage: &Stage) -> Result<(), StoreError>;

    /// Atomically promotes the stage's working namespace over production.
    async fn swap_stage(&self, stage: &Stage) -> Result<(), StoreError>;

    /// Persists a table's payload under its assigned reference, into the
    /// working namespace of the referenced stage.
    ///
    /// `lazy` signals that the producing task re-ran on a cache hit; the
    /// store may deduplicate identical rows instead of rewriting them.
    async fn store_table(
        &self,
        table: &Table<Self::Payload>,
        lazy: bool,
    ) -> Result<(), StoreError>;

    /// Materialises a referenced table into the in-memory form selected by
    /// the capability key `as_type`.
    async fn retrieve_table(
        &self,
        reference: &TableRef,
        as_type: &str,
    ) -> Result<Self::Payload, StoreError>;

    /// Writes a task metadata record into the working namespace.
    async fn store_task_metadata(&self, metadata: &TaskMetadata) -> Result<(), StoreError>;

    /// Reads the committed metadata record for `(task, cache_key)` from the
    /// production namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CacheMiss`] when no record exists.
    async fn retrieve_task_metadata(
        &self,
        task: &MaterialisingTask,
        cache_key: &CacheKey,
    ) -> Result<TaskMetadata, StoreError>;

    /// Copies a committed table from production into the working namespace.
    async fn copy_table_to_working(&self, reference: &TableRef) -> Result<(), StoreError>;

    /// Copies the committed metadata record for `task` into the working
    /// namespace.
    async fn copy_task_metadata_to_working(
        &self,
        task: &MaterialisingTask,
    ) -> Result<(), StoreError>;

    /// Whether `swap_stage` may safely be retried after a failure.
    ///
    /// The commit protocol rolls its swap claim back on failure only when
    /// this returns `true`.
    fn swap_is_idempotent(&self) -> bool {
        false
    }
}
