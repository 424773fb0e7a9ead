/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # A schema-driven record synchronization core.
//!
//! This crate is the machinery for exchanging structured item state
//! between peers. Two sides that agree on a *schema* - a set of record
//! classes with typed, keyed fields - can describe any item as a handful
//! of [`Record`] values, ship full state as a [`RecordSet`] or changes as
//! a [`Diff`], and apply what they receive through a [`Translator`] that
//! maps records onto their own item model.
//!
//! The pieces, bottom up:
//!
//!   * [`Value`] - record slot values, including the `NoChange` /
//!     `Inherit` / `Absent` sentinels that make partial updates and
//!     attribute resets first-class.
//!   * [`TypeInfo`] and the [`SchemaRegistry`] - primitive value types
//!     with per-type converter tables, a URI registry for every schema
//!     object, string type aliases, and a schema checksum for verifying
//!     peer compatibility.
//!   * [`RecordType`] / [`Record`] - declarative record classes and the
//!     value algebra over them: diff, apply, merge, each honoring the
//!     "no change" sentinel slot-by-slot.
//!   * [`RecordSet`] / [`Diff`] - keyed containers with union, difference
//!     and in-place accumulation; diff union *detects* conflicts and
//!     ejects them for reporting rather than resolving them.
//!   * [`sort_records`] - dependency-aware ordering, so records that
//!     define a key arrive before records that reference it no matter how
//!     the transport ordered them.
//!   * [`Filter`] - named projections that hide designated fields from a
//!     record stream.
//!   * [`Translator`] - the import/export framework, driving application
//!     items through the narrow [`ItemStore`] surface.
//!
//! Everything schema-shaped is declared once at startup against a
//! [`SchemaRegistry`] and is immutable afterwards; record values and
//! containers are plain values and may be shared freely. Nothing here
//! does transport, persistence, or conflict *resolution* - those belong
//! to the application.

mod error;
mod field;
mod filter;
mod item;
mod record;
mod recordset;
mod registry;
mod sort;
mod translator;
mod types;
mod value;

pub use error::{Error, Result};
pub use field::{Field, FieldDef, FieldRef, FieldType, FormatterFn, KeyDef};
pub use filter::Filter;
pub use item::{ItemRole, ItemStore, ItemType};
pub use record::{Record, RecordKey, RecordType, RecordTypeBuilder};
pub use recordset::{Diff, RecordBag, RecordIter, RecordSet};
pub use registry::{normalize_uuid_string, SchemaItem, SchemaRegistry, TypeContext};
pub use sort::{sort_records, SortRecords};
pub use translator::{
    Conflict, Deleter, Exporter, Importer, Translator, TranslatorInfo, TranslatorSpec,
    TranslatorSpecBuilder,
};
pub use types::{Converter, TypeClass, TypeInfo, TypeKind, TypeOverrides};
pub use value::{Value, ValueKind};
