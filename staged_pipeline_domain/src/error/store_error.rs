// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Store Error
//!
//! This module provides the error system for the materialisation domain. It
//! categorizes the failure modes of cache lookups, stage registration, the
//! reference codec, and the lock manager, and provides clear messages about
//! what went wrong.
//!
//! ## Error Categories
//!
//! ### Stage Lifecycle Errors
//! - **DuplicateStage**: a stage name or working name is already registered
//! - **StageAlreadySwapped**: an operation targeted a stage whose production
//!   swap has completed
//! - **UnknownStage**: a decoded table reference names an unregistered stage
//!
//! ### Cache and Codec Errors
//! - **CacheMiss**: no metadata exists for the requested `(task, cache_key)`
//! - **EncodingError** / **DecodeError**: canonical-JSON invariants violated,
//!   or an unknown type tag was encountered
//! - **NotSupported**: reserved but unimplemented forms (`blob` references)
//!
//! ### Locking Errors
//! - **LockError**: a backend refused an acquire, or a never-acquired lock
//!   was released
//! - **NotRegistered**: a lock-state listener was removed without prior
//!   registration
//!
//! ### Infrastructure Errors
//! - **IoError**: file system failures (lock files, base directories)
//! - **StorageError**: table-store backend failures
//! - **Cancelled**: externally signalled cancellation of a blocking call
//! - **InternalError**: invariant breaches that indicate a bug, not bad input
//!
//! ## Propagation
//!
//! All errors surface to the caller; neither the materialisation controller
//! nor the lock manager retries. A task failing mid-materialisation leaves no
//! metadata record behind.

use thiserror::Error;

/// Domain-specific errors for the pipeline materialisation engine.
///
/// Each variant represents a specific failure mode and carries a descriptive
/// message. Errors are cloneable so they can be logged and recorded without
/// losing the original.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Duplicate stage: {0}")]
    DuplicateStage(String),

    #[error("Stage already swapped: {0}")]
    StageAlreadySwapped(String),

    #[error("Cache miss: {0}")]
    CacheMiss(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Listener not registered: {0}")]
    NotRegistered(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl StoreError {
    /// Creates a new cache-miss error
    pub fn cache_miss(msg: impl Into<String>) -> Self {
        Self::CacheMiss(msg.into())
    }

    /// Creates a new lock error
    pub fn lock_error(msg: impl Into<String>) -> Self {
        Self::LockError(msg.into())
    }

    /// Creates a new encoding error
    pub fn encoding_error(msg: impl Into<String>) -> Self {
        Self::EncodingError(msg.into())
    }

    /// Creates a new decode error
    pub fn decode_error(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }

    /// Creates a new not-supported error
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Creates a new validation error
    pub fn validation_error(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Creates a new storage error
    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks whether this error is a cache miss
    ///
    /// Schedulers branch on this to decide between reusing a cached output
    /// and executing the task.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, StoreError::CacheMiss(_))
    }

    /// Gets the error category
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::DuplicateStage(_) => "stage",
            StoreError::StageAlreadySwapped(_) => "stage",
            StoreError::UnknownStage(_) => "stage",
            StoreError::CacheMiss(_) => "cache",
            StoreError::LockError(_) => "lock",
            StoreError::NotRegistered(_) => "lock",
            StoreError::DecodeError(_) => "codec",
            StoreError::EncodingError(_) => "codec",
            StoreError::NotSupported(_) => "codec",
            StoreError::ValidationError(_) => "validation",
            StoreError::IoError(_) => "io",
            StoreError::StorageError(_) => "storage",
            StoreError::Cancelled(_) => "cancellation",
            StoreError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::DecodeError(err.to_string())
    }
}
