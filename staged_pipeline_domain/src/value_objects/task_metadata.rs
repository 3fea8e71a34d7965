// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Metadata Record
//!
//! The canonical record written alongside every materialised task output.
//! Written once on success, read on cache lookups, and copied from the
//! production namespace into the working namespace on cache hits. A task that
//! fails mid-materialisation leaves no record behind, so the presence of
//! metadata implies the referenced tables were fully persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cache_key::CacheKey;
use super::run_id::RunId;

/// Immutable metadata attached to a materialised task output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    name: String,
    stage: String,
    version: Option<String>,
    timestamp: DateTime<Utc>,
    run_id: RunId,
    cache_key: CacheKey,
    output_json: String,
}

impl TaskMetadata {
    /// Creates a new metadata record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        stage: impl Into<String>,
        version: Option<String>,
        timestamp: DateTime<Utc>,
        run_id: RunId,
        cache_key: CacheKey,
        output_json: impl Into<String>,
    ) -> Self {
        TaskMetadata {
            name: name.into(),
            stage: stage.into(),
            version,
            timestamp,
            run_id,
            cache_key,
            output_json: output_json.into(),
        }
    }

    /// The task's stable symbolic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The production stage name the output belongs to.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// The task version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Wall-clock time of the materialisation.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The run that wrote this record.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The cache key of the producing task invocation.
    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    /// The encoded output tree.
    pub fn output_json(&self) -> &str {
        &self.output_json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_serde_round_trip() {
        let record = TaskMetadata::new(
            "build",
            "raw",
            Some("v1".to_string()),
            Utc::now(),
            RunId::generate(),
            CacheKey::parse("0123456789abcdef0123").unwrap(),
            "{}",
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: TaskMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_missing_version_serialises_as_null() {
        let record = TaskMetadata::new(
            "build",
            "raw",
            None,
            Utc::now(),
            RunId::generate(),
            CacheKey::parse("0123456789abcdef0123").unwrap(),
            "{}",
        );
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["version"].is_null());
    }
}
