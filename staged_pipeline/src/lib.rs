// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Staged Pipeline
//!
//! A materialisation and caching engine for data-processing DAGs. Tasks
//! declare the tabular artifacts they consume and produce; the engine runs
//! each task exactly once per unique `(task identity, input fingerprint)`
//! pair, persists outputs into a *working* namespace, and atomically swaps
//! working namespaces into production once every task of a stage succeeded.
//! Concurrent runs across machines coordinate through a distributed lock
//! manager so two runs cannot corrupt the same stage.
//!
//! ## Architecture Overview
//!
//! The crate follows the workspace's Clean Architecture split:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (MaterialisationStore: cache hits, commit protocol)        │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (staged-pipeline-domain: entities, codec, ports)           │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (lock backends, in-memory table store)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Flow
//!
//! An external DAG scheduler drives tasks in parallel. For each task the
//! controller dematerialises inputs (resolving embedded table references
//! through the table store), invokes the user task, materialises the output
//! tree (naming, persisting, and recording every produced table), and writes
//! a metadata record. On a cache hit the prior output is decoded and copied
//! into the working namespace instead of re-running the task.
//!
//! ## Locking
//!
//! Three lock backends ship in [`infrastructure::locking`]: a warn-loudly
//! no-op manager for single-process testing, an advisory file-lock manager,
//! and a coordinator-backed manager with session-event mapping onto the
//! `UNCERTAIN`/`INVALID` lock states.

pub mod application;
pub mod infrastructure;

pub use application::services::MaterialisationStore;

// Re-export the domain crate so downstream users need only one dependency.
pub use staged_pipeline_domain as domain;
