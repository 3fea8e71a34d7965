// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Table Store
//!
//! A `TableStore` keeping namespaces, tables, and metadata in process
//! memory. It provides the same interface and the same working/production
//! namespace semantics as a persistent store, which makes it the reference
//! backend for tests and local pipeline development.
//!
//! ## Semantics
//!
//! - `create_stage` prepares the production namespace and resets the working
//!   namespace, so every run starts with an empty working stage
//! - writes (`store_table`, `store_task_metadata`) land in the working
//!   namespace; cache reads (`retrieve_task_metadata`) come from production
//! - `swap_stage` replaces the production namespace with the working one and
//!   leaves a fresh empty working namespace, atomically under the store's
//!   mutex
//! - table payloads are JSON row sets; the only capability key honoured by
//!   `retrieve_table` is [`JSON_INPUT_TYPE`]
//!
//! The single mutex also gives the required write ordering for free: if a
//! metadata record is visible, the tables written before it are visible too.

use parking_lot::Mutex;
use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use staged_pipeline_domain::entities::stage::working_name_for;
use staged_pipeline_domain::{
    CacheKey, MaterialisingTask, Stage, StoreError, Table, TableRef, TableStore, TaskMetadata,
};

/// The capability key for retrieving tables as JSON row sets.
pub const JSON_INPUT_TYPE: &str = "json";

type Namespace = HashMap<String, Value>;
type MetadataNamespace = HashMap<String, TaskMetadata>;

/// In-memory table store for tests and local runs.
#[derive(Default)]
pub struct InMemoryTableStore {
    inner: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    tables: HashMap<String, Namespace>,
    metadata: HashMap<String, MetadataNamespace>,
}

impl InMemoryTableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn metadata_key(name: &str, cache_key: &CacheKey) -> String {
        format!("{name}:{cache_key}")
    }

    /// Number of tables in a namespace. Test support.
    pub fn table_count(&self, namespace: &str) -> usize {
        self.inner
            .lock()
            .tables
            .get(namespace)
            .map_or(0, Namespace::len)
    }

    /// Sorted table names of a namespace. Test support.
    pub fn table_names(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .tables
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Number of metadata records in a namespace. Test support.
    pub fn metadata_count(&self, namespace: &str) -> usize {
        self.inner
            .lock()
            .metadata
            .get(namespace)
            .map_or(0, MetadataNamespace::len)
    }

    /// The stored rows of one table, if present. Test support.
    pub fn table_rows(&self, namespace: &str, name: &str) -> Option<Value> {
        self.inner
            .lock()
            .tables
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .cloned()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    type Payload = Value;

    async fn create_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        state.tables.entry(stage.name().to_string()).or_default();
        state.metadata.entry(stage.name().to_string()).or_default();
        // the working namespace starts empty on every run
        state
            .tables
            .insert(stage.working_name().to_string(), Namespace::new());
        state
            .metadata
            .insert(stage.working_name().to_string(), MetadataNamespace::new());
        Ok(())
    }

    async fn swap_stage(&self, stage: &Stage) -> Result<(), StoreError> {
        let mut state = self.inner.lock();
        let tables = state
            .tables
            .remove(stage.working_name())
            .ok_or_else(|| unknown_namespace(stage.working_name()))?;
        let metadata = state
            .metadata
            .remove(stage.working_name())
            .ok_or_else(|| unknown_namespace(stage.working_name()))?;
        state.tables.insert(stage.name().to_string(), tables);
        state.metadata.insert(stage.name().to_string(), metadata);
        state
            .tables
            .insert(stage.working_name().to_string(), Namespace::new());
        state
            .metadata
            .insert(stage.working_name().to_string(), MetadataNamespace::new());
        Ok(())
    }

    async fn store_table(
        &self,
        table: &Table<Self::Payload>,
        lazy: bool,
    ) -> Result<(), StoreError> {
        let reference = table.reference().ok_or_else(|| {
            StoreError::internal_error("cannot store a table with no assigned reference")
        })?;
        let payload = table.payload().ok_or_else(|| {
            StoreError::internal_error(format!("table '{reference}' has no payload to store"))
        })?;

        let working = working_name_for(reference.stage());
        let mut state = self.inner.lock();
        let namespace = state
            .tables
            .get_mut(&working)
            .ok_or_else(|| unknown_namespace(&working))?;
        if lazy && namespace.contains_key(reference.name()) {
            // identical name implies identical task version and inputs;
            // deduplicate instead of rewriting
            tracing::debug!(table = %reference, "lazy store deduplicated");
            return Ok(());
        }
        namespace.insert(reference.name().to_string(), payload.clone());
        Ok(())
    }

    async fn retrieve_table(
        &self,
        reference: &TableRef,
        as_type: &str,
    ) -> Result<Self::Payload, StoreError> {
        if as_type != JSON_INPUT_TYPE {
            return Err(StoreError::not_supported(format!(
                "input type '{as_type}' (in-memory store serves '{JSON_INPUT_TYPE}')"
            )));
        }
        let working = working_name_for(reference.stage());
        let state = self.inner.lock();
        // tables materialised this run live in the working namespace,
        // committed ones in production
        state
            .tables
            .get(&working)
            .and_then(|ns| ns.get(reference.name()))
            .or_else(|| {
                state
                    .tables
                    .get(reference.stage())
                    .and_then(|ns| ns.get(reference.name()))
            })
            .cloned()
            .ok_or_else(|| {
                StoreError::storage_error(format!("table '{reference}' does not exist"))
            })
    }

    async fn store_task_metadata(&self, metadata: &TaskMetadata) -> Result<(), StoreError> {
        let working = working_name_for(metadata.stage());
        let mut state = self.inner.lock();
        let namespace = state
            .metadata
            .get_mut(&working)
            .ok_or_else(|| unknown_namespace(&working))?;
        namespace.insert(
            Self::metadata_key(metadata.name(), metadata.cache_key()),
            metadata.clone(),
        );
        Ok(())
    }

    async fn retrieve_task_metadata(
        &self,
        task: &MaterialisingTask,
        cache_key: &CacheKey,
    ) -> Result<TaskMetadata, StoreError> {
        let state = self.inner.lock();
        state
            .metadata
            .get(task.stage().name())
            .and_then(|ns| ns.get(&Self::metadata_key(task.original_name(), cache_key)))
            .cloned()
            .ok_or_else(|| {
                StoreError::cache_miss(format!(
                    "no metadata for task '{}' with cache key {cache_key}",
                    task.original_name()
                ))
            })
    }

    async fn copy_table_to_working(&self, reference: &TableRef) -> Result<(), StoreError> {
        let working = working_name_for(reference.stage());
        let mut state = self.inner.lock();
        let payload = state
            .tables
            .get(reference.stage())
            .and_then(|ns| ns.get(reference.name()))
            .cloned()
            .ok_or_else(|| {
                StoreError::storage_error(format!(
                    "table '{reference}' does not exist in production"
                ))
            })?;
        let namespace = state
            .tables
            .get_mut(&working)
            .ok_or_else(|| unknown_namespace(&working))?;
        namespace.insert(reference.name().to_string(), payload);
        Ok(())
    }

    async fn copy_task_metadata_to_working(
        &self,
        task: &MaterialisingTask,
    ) -> Result<(), StoreError> {
        let cache_key = task.cache_key()?.clone();
        let working = working_name_for(task.stage().name());
        let mut state = self.inner.lock();
        let record = state
            .metadata
            .get(task.stage().name())
            .and_then(|ns| ns.get(&Self::metadata_key(task.original_name(), &cache_key)))
            .cloned()
            .ok_or_else(|| {
                StoreError::cache_miss(format!(
                    "no metadata for task '{}' with cache key {cache_key}",
                    task.original_name()
                ))
            })?;
        let namespace = state
            .metadata
            .get_mut(&working)
            .ok_or_else(|| unknown_namespace(&working))?;
        namespace.insert(
            Self::metadata_key(task.original_name(), &cache_key),
            record,
        );
        Ok(())
    }
}

fn unknown_namespace(name: &str) -> StoreError {
    StoreError::storage_error(format!(
        "namespace '{name}' does not exist (was the stage created?)"
    ))
}
