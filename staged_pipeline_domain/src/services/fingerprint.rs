// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Cache-Key Fingerprinting
//!
//! Deterministic derivation of cache keys from a task identity and its
//! serialised inputs. The fingerprint decides whether a task runs or its
//! cached output is reused, so it must be identical across runs, machines,
//! and platforms.
//!
//! ## Derivation
//!
//! The record `"PYDIVERSE-PIPEDAG-TASK" | name | version | input_json`
//! (fields joined with `|`) is hashed with SHA-256 and the first 20 hex
//! characters of the digest form the [`CacheKey`]. A missing version is
//! represented by the literal string `"None"`.
//!
//! The input JSON must already be canonical (sorted mapping keys, compact
//! separators, no NaN/Infinity); that is the reference codec's job. The
//! hasher treats it as an opaque string.

use sha2::{Digest, Sha256};

use crate::value_objects::CacheKey;

/// Leading record tag, versioning the fingerprint format on the wire.
const CACHE_KEY_RECORD: &str = "PYDIVERSE-PIPEDAG-TASK";

/// Literal standing in for a missing task version.
const NO_VERSION: &str = "None";

/// Computes the cache key for a task identity and canonical input JSON.
pub fn compute_cache_key(
    original_name: &str,
    version: Option<&str>,
    input_json: &str,
) -> CacheKey {
    let record = [
        CACHE_KEY_RECORD,
        original_name,
        version.unwrap_or(NO_VERSION),
        input_json,
    ]
    .join("|");

    let mut hasher = Sha256::new();
    hasher.update(record.as_bytes());
    let digest_hex = hex::encode(hasher.finalize());
    CacheKey::from_digest_hex(&digest_hex)
}
