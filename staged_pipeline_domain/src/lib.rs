// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Staged Pipeline Domain
//!
//! The domain layer of the staged pipeline materialisation engine. Tasks in a
//! data-processing DAG consume and produce tabular artifacts; this crate holds
//! the business rules that let every task run exactly once per unique
//! `(task identity, input fingerprint)` pair and commit whole stages
//! atomically. It is completely independent of external concerns like
//! databases, file systems, or coordination services.
//!
//! ## Domain-Driven Design Concepts
//!
//! ### Entities
//! Objects with a distinct identity that persists through state changes:
//!
//! - [`Stage`]: a named logical unit with a production namespace and a
//!   working namespace, committed atomically by swapping the two
//! - [`MaterialisingTask`]: a unit of work identified by
//!   `(original_name, version, stage)`
//!
//! ### Value Objects
//! Immutable objects defined entirely by their attributes:
//!
//! - [`CacheKey`]: 80-bit fingerprint over a task identity and its inputs
//! - [`RunId`]: fresh 20-hex-char identifier per engine lifetime
//! - [`TableRef`]: value-typed handle `(stage, name, cache_key)` naming rows
//!   in a table store
//! - [`MatValue`]: tagged tree of task inputs/outputs (scalars, sequences,
//!   mappings, embedded tables)
//! - [`TaskMetadata`]: the record written alongside every materialised output
//!
//! ### Aggregates
//! - [`StageRegistry`]: the collection of known stages; enforces name
//!   uniqueness and tracks which stages have been swapped
//!
//! ### Domain Services
//! Stateless logic that doesn't belong to a single object:
//!
//! - [`services::fingerprint`]: deterministic cache-key derivation
//! - [`services::reference_codec`]: canonical-JSON encoding of output trees
//!   with embedded table references
//!
//! ### Repositories (Ports)
//! Abstract contracts implemented by the infrastructure layer:
//!
//! - [`TableStore`]: persistence boundary for tables and task metadata
//! - [`LockManager`]: distributed locking with an explicit lock-state machine
//!
//! ## Business Rules and Invariants
//!
//! - Stage names and working names are unique across the registry
//! - No task materialises into a stage whose swap has completed
//! - Metadata is written only after every referenced table is persisted
//! - Lock states follow the `UNLOCKED → LOCKED → UNCERTAIN → INVALID` walk;
//!   listeners observe every transition
//!
//! ## Error Handling
//!
//! All fallible operations return [`StoreError`]; the domain never panics on
//! bad input and performs no retries.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
// These exports provide a clean API surface for consumers of the domain layer
pub use aggregates::StageRegistry;
pub use entities::{MaterialisingTask, Stage};
pub use error::StoreError;
pub use repositories::{
    LockManager, LockState, LockStateListener, LockStateTracker, Lockable, TableStore,
};
pub use value_objects::{CacheKey, MatValue, RunId, Table, TableRef, TaskMetadata};
