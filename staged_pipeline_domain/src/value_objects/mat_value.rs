// /////////////////////////////////////////////////////////////////////////////
// Staged Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Materialisable Value Trees
//!
//! This module provides [`MatValue`], the tagged tree in which task inputs
//! and outputs travel through the engine. A tree is composed of JSON-like
//! scalars (strings, integers, finite floats, booleans, null), ordered
//! sequences, mappings with string keys, and embedded [`Table`]s.
//!
//! ## Design
//!
//! The tree is an explicit variant rather than a dynamically typed value:
//! every transformation is a fold that produces a new tree, never an in-place
//! edit of nested data. Walks are deterministic: pre-order, sequences in
//! element order, mappings in sorted key order (a `BTreeMap` keeps keys
//! sorted by construction). The materialisation controller relies on this
//! when it assigns table names, persists payloads, and later re-attaches
//! retrieved payloads in the same order.
//!
//! `T` is the table store's payload representation and stays fully opaque to
//! the tree.

use std::collections::BTreeMap;

use super::table_ref::{Table, TableRef};
use crate::StoreError;

/// A task input or output tree with embedded tables.
#[derive(Debug, Clone, PartialEq)]
pub enum MatValue<T> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<MatValue<T>>),
    Map(BTreeMap<String, MatValue<T>>),
    Table(Table<T>),
}

impl<T> MatValue<T> {
    /// Builds a sequence node.
    pub fn seq(items: impl IntoIterator<Item = MatValue<T>>) -> Self {
        MatValue::Seq(items.into_iter().collect())
    }

    /// Builds a mapping node; keys keep sorted order regardless of insertion
    /// order.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, MatValue<T>)>) -> Self {
        MatValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Collects every embedded table in deterministic pre-order.
    pub fn tables(&self) -> Vec<&Table<T>> {
        let mut found = Vec::new();
        self.visit_tables(&mut found);
        found
    }

    fn visit_tables<'a>(&'a self, found: &mut Vec<&'a Table<T>>) {
        match self {
            MatValue::Seq(items) => {
                for item in items {
                    item.visit_tables(found);
                }
            }
            MatValue::Map(entries) => {
                for value in entries.values() {
                    value.visit_tables(found);
                }
            }
            MatValue::Table(table) => found.push(table),
            _ => {}
        }
    }

    /// Collects the assigned references of every embedded table, in
    /// deterministic pre-order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ValidationError`] if any table has no assigned
    /// reference yet.
    pub fn references(&self) -> Result<Vec<TableRef>, StoreError> {
        self.tables()
            .into_iter()
            .map(|table| {
                table.reference().cloned().ok_or_else(|| {
                    StoreError::validation_error("table has no assigned reference")
                })
            })
            .collect()
    }

    /// Folds the tree into a new one, transforming every embedded table in
    /// deterministic pre-order and passing all other nodes through.
    pub fn map_tables<F>(self, f: &mut F) -> Result<Self, StoreError>
    where
        F: FnMut(Table<T>) -> Result<Table<T>, StoreError>,
    {
        Ok(match self {
            MatValue::Seq(items) => MatValue::Seq(
                items
                    .into_iter()
                    .map(|item| item.map_tables(f))
                    .collect::<Result<_, _>>()?,
            ),
            MatValue::Map(entries) => MatValue::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, value.map_tables(f)?)))
                    .collect::<Result<_, StoreError>>()?,
            ),
            MatValue::Table(table) => MatValue::Table(f(table)?),
            scalar => scalar,
        })
    }
}

impl<T> From<bool> for MatValue<T> {
    fn from(value: bool) -> Self {
        MatValue::Bool(value)
    }
}

impl<T> From<i64> for MatValue<T> {
    fn from(value: i64) -> Self {
        MatValue::Int(value)
    }
}

impl<T> From<f64> for MatValue<T> {
    fn from(value: f64) -> Self {
        MatValue::Float(value)
    }
}

impl<T> From<&str> for MatValue<T> {
    fn from(value: &str) -> Self {
        MatValue::Str(value.to_string())
    }
}

impl<T> From<String> for MatValue<T> {
    fn from(value: String) -> Self {
        MatValue::Str(value)
    }
}

impl<T> From<Table<T>> for MatValue<T> {
    fn from(table: Table<T>) -> Self {
        MatValue::Table(table)
    }
}
