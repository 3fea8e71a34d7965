// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Reference Codec
//!
//! Canonical-JSON encoding and decoding of [`MatValue`] trees. The encoded
//! form is the wire format of the `output_json` metadata field, and it also
//! feeds the cache-key fingerprint, so it must be byte-identical across
//! platforms:
//!
//! - UTF-8, mapping keys sorted, compact separators
//! - no NaN or Infinity anywhere in the tree
//!
//! ## Table references
//!
//! Embedded tables are encoded as objects carrying the reserved sentinel
//! key [`PIPEDAG_TYPE_KEY`]:
//!
//! ```json
//! {"_pipedag_type_":"table","cache_key":"...","name":"...","stage":"..."}
//! ```
//!
//! The tag value `"blob"` is reserved for a planned extension; encountering
//! it fails with `NotSupported` until it is implemented. Any other tag value
//! fails with `DecodeError`. Objects without the sentinel key pass through
//! as plain mappings.
//!
//! Decoding resolves stage names against an explicitly passed
//! [`StageRegistry`] (the registry is a decoding context, not ambient
//! global state) and fails with `UnknownStage` when a reference names an
//! unregistered stage.
//!
//! ## Round trip
//!
//! `decode(encode(x)) ≡ x` for every supported tree whose table references
//! name registered stages, and `encode(decode(j)) == j` for canonical `j`
//! produced by `encode`.

use serde_json::Value;

use crate::aggregates::StageRegistry;
use crate::value_objects::{CacheKey, MatValue, Table, TableRef};
use crate::StoreError;

/// Reserved sentinel key marking encoded engine objects.
pub const PIPEDAG_TYPE_KEY: &str = "_pipedag_type_";

/// Tag value for table references.
pub const PIPEDAG_TYPE_TABLE: &str = "table";

/// Tag value reserved for blob references (not yet supported).
pub const PIPEDAG_TYPE_BLOB: &str = "blob";

/// Encodes a value tree into canonical JSON.
///
/// # Errors
///
/// - [`StoreError::EncodingError`] for non-finite floats, tables without an
///   assigned reference, or user mappings containing the reserved sentinel
///   key
pub fn encode<T>(value: &MatValue<T>) -> Result<String, StoreError> {
    let json = to_json(value)?;
    serde_json::to_string(&json)
        .map_err(|err| StoreError::encoding_error(format!("cannot serialise output tree: {err}")))
}

/// Decodes canonical JSON back into a value tree, resolving stage names
/// against `registry`.
///
/// Decoded tables carry their reference and no payload; dematerialisation
/// attaches payloads later.
///
/// # Errors
///
/// - [`StoreError::DecodeError`] for malformed JSON or an unknown tag value
/// - [`StoreError::NotSupported`] for `blob` references
/// - [`StoreError::UnknownStage`] when a reference names an unregistered
///   stage
pub fn decode<T>(json: &str, registry: &StageRegistry) -> Result<MatValue<T>, StoreError> {
    let value: Value = serde_json::from_str(json)?;
    from_json(value, registry)
}

fn to_json<T>(value: &MatValue<T>) -> Result<Value, StoreError> {
    Ok(match value {
        MatValue::Null => Value::Null,
        MatValue::Bool(b) => Value::Bool(*b),
        MatValue::Int(i) => Value::from(*i),
        MatValue::Float(f) => {
            // canonical JSON permits finite floats only
            serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| {
                    StoreError::encoding_error(format!("non-finite float in output tree: {f}"))
                })?
        }
        MatValue::Str(s) => Value::String(s.clone()),
        MatValue::Seq(items) => Value::Array(
            items
                .iter()
                .map(to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        MatValue::Map(entries) => {
            if entries.contains_key(PIPEDAG_TYPE_KEY) {
                return Err(StoreError::encoding_error(format!(
                    "mapping key '{PIPEDAG_TYPE_KEY}' is reserved"
                )));
            }
            let mut object = serde_json::Map::new();
            for (key, entry) in entries {
                object.insert(key.clone(), to_json(entry)?);
            }
            Value::Object(object)
        }
        MatValue::Table(table) => {
            let reference = table.reference().ok_or_else(|| {
                StoreError::encoding_error("cannot encode a table with no assigned reference")
            })?;
            let mut object = serde_json::Map::new();
            object.insert(
                PIPEDAG_TYPE_KEY.to_string(),
                Value::String(PIPEDAG_TYPE_TABLE.to_string()),
            );
            object.insert(
                "stage".to_string(),
                Value::String(reference.stage().to_string()),
            );
            object.insert(
                "name".to_string(),
                Value::String(reference.name().to_string()),
            );
            object.insert(
                "cache_key".to_string(),
                Value::String(reference.cache_key().as_str().to_string()),
            );
            Value::Object(object)
        }
    })
}

fn from_json<T>(value: Value, registry: &StageRegistry) -> Result<MatValue<T>, StoreError> {
    Ok(match value {
        Value::Null => MatValue::Null,
        Value::Bool(b) => MatValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MatValue::Int(i)
            } else if let Some(f) = n.as_f64() {
                MatValue::Float(f)
            } else {
                return Err(StoreError::decode_error(format!(
                    "number out of supported range: {n}"
                )));
            }
        }
        Value::String(s) => MatValue::Str(s),
        Value::Array(items) => MatValue::Seq(
            items
                .into_iter()
                .map(|item| from_json(item, registry))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Object(mut object) => match object.remove(PIPEDAG_TYPE_KEY) {
            None => {
                // unmarked objects pass through as plain mappings
                let mut entries = std::collections::BTreeMap::new();
                for (key, entry) in object {
                    entries.insert(key, from_json(entry, registry)?);
                }
                MatValue::Map(entries)
            }
            Some(Value::String(tag)) if tag == PIPEDAG_TYPE_TABLE => {
                let stage = take_string_field(&mut object, "stage")?;
                let name = take_string_field(&mut object, "name")?;
                let cache_key = take_string_field(&mut object, "cache_key")?;
                let cache_key = CacheKey::parse(cache_key)
                    .map_err(|err| StoreError::decode_error(err.to_string()))?;
                if !registry.contains(&stage) {
                    return Err(StoreError::UnknownStage(format!(
                        "table reference names unregistered stage '{stage}'"
                    )));
                }
                MatValue::Table(Table::from_reference(TableRef::new(stage, name, cache_key)))
            }
            Some(Value::String(tag)) if tag == PIPEDAG_TYPE_BLOB => {
                return Err(StoreError::not_supported(
                    "blob references are reserved but not implemented",
                ));
            }
            Some(tag) => {
                return Err(StoreError::decode_error(format!(
                    "invalid value for '{PIPEDAG_TYPE_KEY}' key: {tag}"
                )));
            }
        },
    })
}

fn take_string_field(
    object: &mut serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, StoreError> {
    match object.remove(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(StoreError::decode_error(format!(
            "table reference field '{field}' must be a string, got {other}"
        ))),
        None => Err(StoreError::decode_error(format!(
            "table reference is missing field '{field}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123";

    fn registry_with(names: &[&str]) -> StageRegistry {
        let registry = StageRegistry::new();
        for name in names {
            registry
                .register(crate::entities::Stage::new(*name).unwrap())
                .unwrap();
        }
        registry
    }

    fn table_in(stage: &str, name: &str) -> MatValue<()> {
        MatValue::Table(Table::from_reference(TableRef::new(
            stage,
            name,
            CacheKey::parse(KEY).unwrap(),
        )))
    }

    /// A table reference inside a mapping encodes to the exact canonical
    /// string: sorted keys, compact separators, reserved sentinel first.
    #[test]
    fn test_reference_encoding_is_canonical() {
        let tree: MatValue<()> = MatValue::map([(
            "k",
            MatValue::seq([table_in("s", &format!("t_0000_{KEY}"))]),
        )]);
        let registry = registry_with(&["s"]);
        let encoded = encode(&tree).unwrap();
        assert_eq!(
            encoded,
            format!(
                "{{\"k\":[{{\"_pipedag_type_\":\"table\",\
                 \"cache_key\":\"{KEY}\",\"name\":\"t_0000_{KEY}\",\"stage\":\"s\"}}]}}"
            )
        );
        assert_eq!(decode::<()>(&encoded, &registry).unwrap(), tree);
    }

    #[test]
    fn test_mapping_keys_are_sorted_and_compact() {
        let tree: MatValue<()> =
            MatValue::map([("b", MatValue::Int(2)), ("a", MatValue::Int(1))]);
        assert_eq!(encode(&tree).unwrap(), "{\"a\":1,\"b\":2}");
    }

    #[test]
    fn test_non_finite_floats_fail_encoding() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let tree: MatValue<()> = MatValue::seq([MatValue::Float(bad)]);
            assert!(matches!(
                encode(&tree),
                Err(StoreError::EncodingError(_))
            ));
        }
    }

    #[test]
    fn test_unassigned_table_fails_encoding() {
        let tree: MatValue<()> = MatValue::Table(Table::new(()));
        assert!(matches!(encode(&tree), Err(StoreError::EncodingError(_))));
    }

    #[test]
    fn test_reserved_key_in_user_mapping_fails_encoding() {
        let tree: MatValue<()> = MatValue::map([(PIPEDAG_TYPE_KEY, MatValue::Int(1))]);
        assert!(matches!(encode(&tree), Err(StoreError::EncodingError(_))));
    }

    #[test]
    fn test_blob_references_are_not_supported() {
        let registry = registry_with(&["s"]);
        let err = decode::<()>("{\"_pipedag_type_\":\"blob\"}", &registry).unwrap_err();
        assert!(matches!(err, StoreError::NotSupported(_)));
    }

    #[test]
    fn test_unknown_tag_fails_decoding() {
        let registry = registry_with(&["s"]);
        let err = decode::<()>("{\"_pipedag_type_\":\"view\"}", &registry).unwrap_err();
        assert!(matches!(err, StoreError::DecodeError(_)));
    }

    #[test]
    fn test_unknown_stage_fails_decoding() {
        let registry = registry_with(&["s"]);
        let json = format!(
            "{{\"_pipedag_type_\":\"table\",\"cache_key\":\"{KEY}\",\
             \"name\":\"t\",\"stage\":\"other\"}}"
        );
        let err = decode::<()>(&json, &registry).unwrap_err();
        assert!(matches!(err, StoreError::UnknownStage(_)));
    }

    #[test]
    fn test_unmarked_objects_pass_through() {
        let registry = registry_with(&[]);
        let decoded = decode::<()>("{\"stage\":\"s\",\"name\":\"t\"}", &registry).unwrap();
        assert_eq!(
            decoded,
            MatValue::map([("stage", MatValue::from("s")), ("name", MatValue::from("t"))])
        );
    }

    #[test]
    fn test_malformed_json_fails_decoding() {
        let registry = registry_with(&[]);
        assert!(matches!(
            decode::<()>("{not json", &registry),
            Err(StoreError::DecodeError(_))
        ));
    }

    #[test]
    fn test_encode_decode_encode_is_identity_on_wire() {
        let registry = registry_with(&["s"]);
        let tree: MatValue<()> = MatValue::map([
            ("t", table_in("s", "t_0000_x")),
            ("xs", MatValue::seq([MatValue::Int(1), MatValue::Null])),
        ]);
        let wire = encode(&tree).unwrap();
        let rewire = encode(&decode::<()>(&wire, &registry).unwrap()).unwrap();
        assert_eq!(wire, rewire);
    }

    mod round_trip {
        use super::*;
        use proptest::prelude::*;

        fn arb_tree() -> impl Strategy<Value = MatValue<()>> {
            let leaf = prop_oneof![
                Just(MatValue::Null),
                any::<bool>().prop_map(MatValue::Bool),
                any::<i64>().prop_map(MatValue::Int),
                (-1.0e9f64..1.0e9).prop_map(MatValue::Float),
                "[a-z0-9 ]{0,12}".prop_map(MatValue::Str),
                "[a-z][a-z0-9_]{0,10}".prop_map(|name| {
                    MatValue::Table(Table::from_reference(TableRef::new(
                        "s",
                        name,
                        CacheKey::parse(KEY).unwrap(),
                    )))
                }),
            ];
            leaf.prop_recursive(4, 48, 6, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..5).prop_map(MatValue::Seq),
                    prop::collection::btree_map("[a-z]{1,6}", inner, 0..5)
                        .prop_map(MatValue::Map),
                ]
            })
        }

        proptest! {
            #[test]
            fn decode_inverts_encode(tree in arb_tree()) {
                let registry = registry_with(&["s"]);
                let encoded = encode(&tree).unwrap();
                let decoded = decode::<()>(&encoded, &registry).unwrap();
                prop_assert_eq!(decoded, tree);
            }
        }
    }
}
