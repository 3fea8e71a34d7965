// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Materialisation Store
//!
//! The application service that ties the engine together. A DAG scheduler
//! drives it with four operations per task (dematerialise inputs, run the
//! user task, materialise outputs, or reuse a cached output) plus the stage
//! lifecycle (create, swap).
//!
//! ## Concurrency
//!
//! The store is safe for concurrent invocation across tasks. All mutation of
//! the stage registry and swapped set happens inside the registry's own
//! short-lived mutex; table-store I/O and user-task execution always run
//! outside of it. The store itself holds no task state beyond the
//! per-process run id.
//!
//! ## Ordering
//!
//! Within one task, every produced table is persisted before the metadata
//! record is written, so visible metadata implies visible tables. Between
//! tasks and between stages no ordering is enforced here; that is the
//! scheduler's job.
//!
//! ## Failure
//!
//! Errors surface to the caller unretried. A task failing mid-flight leaves
//! no metadata record; the partial tables in the working namespace are
//! discarded by the next stage swap.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;

use staged_pipeline_domain::services::{fingerprint, reference_codec};
use staged_pipeline_domain::{
    CacheKey, LockManager, MatValue, MaterialisingTask, RunId, Stage, StageRegistry, StoreError,
    TableRef, TableStore, TaskMetadata,
};

/// Materialisation and caching engine over a table store and a lock manager.
///
/// Cheap to share behind an `Arc`; one instance per process run.
pub struct MaterialisationStore<S: TableStore> {
    table_store: Arc<S>,
    lock_manager: Arc<dyn LockManager>,
    registry: Arc<StageRegistry>,
    run_id: RunId,
}

impl<S: TableStore> MaterialisationStore<S> {
    /// Creates a store with a fresh run id and an empty stage registry.
    pub fn new(table_store: Arc<S>, lock_manager: Arc<dyn LockManager>) -> Self {
        MaterialisationStore {
            table_store,
            lock_manager,
            registry: Arc::new(StageRegistry::new()),
            run_id: RunId::generate(),
        }
    }

    /// The stage registry backing this store.
    pub fn registry(&self) -> &Arc<StageRegistry> {
        &self.registry
    }

    /// The lock manager coordinating runs of this pipeline.
    pub fn lock_manager(&self) -> &Arc<dyn LockManager> {
        &self.lock_manager
    }

    /// The id stamped into every metadata record this process writes.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Registers a stage and prepares its namespaces in the table store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateStage`] if the stage's name or working
    /// name is already registered.
    pub async fn create_stage(&self, stage: Stage) -> Result<Arc<Stage>, StoreError> {
        let stage = self.registry.register(stage)?;
        tracing::info!(stage = stage.name(), "creating stage namespaces");
        self.table_store.create_stage(&stage).await?;
        Ok(stage)
    }

    /// Atomically promotes the stage's working namespace into production.
    ///
    /// The swap claim is taken before the table store acts, so a second
    /// attempt fails with [`StoreError::StageAlreadySwapped`] even while the
    /// first is still running. On backend failure the claim is rolled back
    /// only when the table store declares its swap idempotent; otherwise the
    /// stage stays claimed and unusable (no-retry policy).
    pub async fn swap_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        self.registry.begin_swap(stage)?;
        tracing::info!(stage = stage.name(), "swapping stage into production");
        match self.table_store.swap_stage(stage).await {
            Ok(()) => {
                self.registry.complete_swap(stage);
                Ok(())
            }
            Err(err) => {
                tracing::error!(stage = stage.name(), error = %err, "stage swap failed");
                if self.table_store.swap_is_idempotent() {
                    self.registry.abort_swap(stage);
                }
                Err(err)
            }
        }
    }

    /// Computes the task's cache key from its identity and canonical input
    /// JSON, and assigns it to the task (write-once).
    pub fn compute_cache_key(
        &self,
        task: &MaterialisingTask,
        input_json: &str,
    ) -> Result<CacheKey, StoreError> {
        let key = fingerprint::compute_cache_key(task.original_name(), task.version(), input_json);
        task.assign_cache_key(key.clone())?;
        tracing::debug!(task = task.original_name(), cache_key = %key, "computed cache key");
        Ok(key)
    }

    /// Resolves every table reference embedded in `args` into the in-memory
    /// payload requested by the task's `input_type`.
    ///
    /// The walk is deterministic (pre-order, mapping keys sorted), and
    /// non-reference nodes pass through unchanged.
    pub async fn dematerialise_task_inputs(
        &self,
        task: &MaterialisingTask,
        args: MatValue<S::Payload>,
    ) -> Result<MatValue<S::Payload>, StoreError> {
        let references = args.references()?;
        tracing::debug!(
            task = task.original_name(),
            tables = references.len(),
            "dematerialising task inputs"
        );
        let mut payloads = VecDeque::with_capacity(references.len());
        for reference in &references {
            payloads.push_back(
                self.table_store
                    .retrieve_table(reference, task.input_type())
                    .await?,
            );
        }
        // same deterministic order as the collection walk above
        args.map_tables(&mut |table| {
            let payload = payloads.pop_front().ok_or_else(|| {
                StoreError::internal_error("input tree changed during dematerialisation")
            })?;
            Ok(table.with_payload(payload))
        })
    }

    /// Persists a task's output tree and writes its metadata record.
    ///
    /// Every embedded table is assigned its reference (the task's stage,
    /// the generated `<task>_<counter:04>_<cache key>` name, and the task's
    /// cache key) and persisted before the metadata record is written.
    /// Returns the rewritten tree.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownStage`] if the task's stage is not registered
    /// - [`StoreError::StageAlreadySwapped`] if the stage's swap completed
    pub async fn materialise_task(
        &self,
        task: &MaterialisingTask,
        value: MatValue<S::Payload>,
    ) -> Result<MatValue<S::Payload>, StoreError> {
        let stage = task.stage();
        if !self.registry.contains(stage.name()) {
            return Err(StoreError::UnknownStage(format!(
                "stage '{}' is not registered",
                stage.name()
            )));
        }
        if self.registry.is_swapped(stage.name()) {
            return Err(StoreError::StageAlreadySwapped(format!(
                "cannot materialise into swapped stage '{}'",
                stage.name()
            )));
        }

        let cache_key = task.cache_key()?.clone();
        let mut counter = 0usize;
        let named = value.map_tables(&mut |table| {
            let name = TableRef::materialised_name(task.original_name(), counter, &cache_key);
            counter += 1;
            Ok(table.with_reference(TableRef::new(stage.name(), name, cache_key.clone())))
        })?;

        tracing::debug!(
            task = task.original_name(),
            stage = stage.name(),
            tables = counter,
            lazy = task.is_lazy(),
            "materialising task output"
        );
        // all tables before the metadata record: visible metadata must imply
        // visible tables
        for table in named.tables() {
            self.table_store.store_table(table, task.is_lazy()).await?;
        }

        let output_json = reference_codec::encode(&named)?;
        let metadata = TaskMetadata::new(
            task.original_name(),
            stage.name(),
            task.version().map(str::to_string),
            Utc::now(),
            self.run_id.clone(),
            cache_key,
            output_json,
        );
        self.table_store.store_task_metadata(&metadata).await?;

        Ok(named)
    }

    /// Fetches and decodes the committed output of a prior run of `task`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::StageAlreadySwapped`] if the task's stage already
    ///   swapped (a cache hit after the swap is an error, not a fallback)
    /// - [`StoreError::CacheMiss`] if no metadata exists for the task's
    ///   cache key
    pub async fn retrieve_cached_output(
        &self,
        task: &MaterialisingTask,
    ) -> Result<MatValue<S::Payload>, StoreError> {
        let stage = task.stage();
        if self.registry.is_swapped(stage.name()) {
            return Err(StoreError::StageAlreadySwapped(format!(
                "stage '{}' has already been swapped",
                stage.name()
            )));
        }
        tracing::debug!(
            task = task.original_name(),
            stage = stage.name(),
            "probing cache for task output"
        );
        let metadata = self
            .table_store
            .retrieve_task_metadata(task, task.cache_key()?)
            .await?;
        reference_codec::decode(metadata.output_json(), &self.registry)
    }

    /// Copies a cached output, its tables and its metadata record, from
    /// the production namespace into the working namespace.
    pub async fn copy_cached_output_to_working(
        &self,
        task: &MaterialisingTask,
        output: &MatValue<S::Payload>,
    ) -> Result<(), StoreError> {
        let references = output.references()?;
        tracing::debug!(
            task = task.original_name(),
            tables = references.len(),
            "copying cached output into working namespace"
        );
        for reference in &references {
            self.table_store.copy_table_to_working(reference).await?;
        }
        self.table_store.copy_task_metadata_to_working(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::locking::NoOpLockManager;
    use crate::infrastructure::stores::InMemoryTableStore;
    use staged_pipeline_domain::Table;

    fn store() -> MaterialisationStore<InMemoryTableStore> {
        MaterialisationStore::new(
            Arc::new(InMemoryTableStore::new()),
            Arc::new(NoOpLockManager::new()),
        )
    }

    #[tokio::test]
    async fn test_materialise_requires_registered_stage() {
        let store = store();
        let stage = Arc::new(Stage::new("raw").unwrap());
        let task = MaterialisingTask::new("build", stage, "json");
        store.compute_cache_key(&task, "{}").unwrap();

        let err = store
            .materialise_task(&task, MatValue::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownStage(_)));
    }

    #[tokio::test]
    async fn test_materialise_requires_cache_key() {
        let store = store();
        let stage = store.create_stage(Stage::new("raw").unwrap()).await.unwrap();
        let task = MaterialisingTask::new("build", stage, "json");

        let err = store
            .materialise_task(&task, MatValue::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InternalError(_)));
    }

    #[tokio::test]
    async fn test_table_names_follow_counter_convention() {
        let store = store();
        let stage = store.create_stage(Stage::new("raw").unwrap()).await.unwrap();
        let task = MaterialisingTask::new("build", stage, "json").with_version("v1");
        let key = store.compute_cache_key(&task, "{}").unwrap();

        let value = MatValue::seq([
            MatValue::Table(Table::new(serde_json::json!([1]))),
            MatValue::Table(Table::new(serde_json::json!([2]))),
        ]);
        let output = store.materialise_task(&task, value).await.unwrap();

        let names: Vec<String> = output
            .tables()
            .iter()
            .filter_map(|t| t.reference())
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![format!("build_0000_{key}"), format!("build_0001_{key}")]
        );
    }
}
