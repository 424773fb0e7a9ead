/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # Error taxonomy for the schema and record layers.
//!
//! Everything that can go wrong while declaring schemas or combining record
//! values is a variant here. Declaration-time errors (`UriCollision`,
//! `FieldOrder`, `HandlerConflict`, ...) are expected to abort startup;
//! algebra errors (`TypeMismatch`, `KeyMismatch`) surface to whoever tried
//! to combine two records that don't belong together.
//!
//! Translator *handler* failures are application errors and travel as
//! `anyhow::Error` instead; see [`crate::translator`].

use crate::value::{Value, ValueKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An object was not recognized as a type, alias, or URI.
    #[error("no type information available for {0:?}")]
    UnknownType(String),

    /// An import transaction finished with unresolved load-queue entries.
    #[error("import finished with {0} item(s) still waiting for their type")]
    IncompatibleTypes(usize),

    #[error("URI {0:?} is already in use")]
    UriCollision(String),

    #[error("alias {0:?} is already registered")]
    DuplicateAlias(String),

    #[error("a URI must be provided for {0}")]
    MissingUri(&'static str),

    /// Two records of different classes were combined.
    #[error("{found:?} is not a {expected} record")]
    TypeMismatch { expected: String, found: String },

    /// Two records with incompatible key values were combined.
    #[error("can't combine {field} values {left} and {right}")]
    KeyMismatch {
        field: String,
        left: Value,
        right: Value,
    },

    #[error("no converter registered for {kind} values in {type_name}")]
    ConverterMissing { type_name: String, kind: ValueKind },

    #[error("can't have required fields after optional ones: {class}.{field}")]
    FieldOrder { class: String, field: String },

    #[error("key field {class}.{field} may not hold a sentinel value")]
    KeyValue { class: String, field: String },

    #[error("key field {class}.{field} can't participate in a filter")]
    FilteredKey { class: String, field: String },

    #[error("{class} has no field named {field:?}")]
    NoSuchField { class: String, field: String },

    #[error("{class} declares the field {field:?} twice")]
    DuplicateField { class: String, field: String },

    #[error("{class} takes {expected} values, got {got}")]
    Arity {
        class: String,
        expected: usize,
        got: usize,
    },

    /// A second importer/deleter/exporter was registered for one target in
    /// one translator.
    #[error("multiple {registry} defined for {target}")]
    HandlerConflict {
        registry: &'static str,
        target: String,
    },

    /// `Diff::remove` was asked to drop an inclusion that isn't there.
    #[error("record {0} is not present in this diff")]
    MissingInclusion(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
