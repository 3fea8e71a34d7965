// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Concrete implementations of the domain ports:
//!
//! - [`locking`]: the three lock-manager backends (no-op, advisory file
//!   locks, coordinator-backed)
//! - [`stores`]: the in-memory table store used by tests and local runs

pub mod locking;
pub mod stores;
