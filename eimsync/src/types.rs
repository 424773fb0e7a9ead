/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # Primitive value types and their converter tables.
//!
//! A [`TypeInfo`] describes one primitive value kind a field can carry:
//! length-bounded byte and text strings, integers, dates, timestamps,
//! blobs/clobs, and fixed-precision decimals. Type infos are immutable
//! after construction and are created through the
//! [`SchemaRegistry`](crate::SchemaRegistry), which also hands out
//! parameter-tweaked *subtypes* of existing types.
//!
//! Each type info owns a [`ConverterTable`]: a map from the runtime
//! [`ValueKind`] of an incoming value to the function that canonicalizes it
//! for this type context. Tables chain to a parent - a fresh type chains to
//! the per-variant base table seeded by the registry, and a subtype chains
//! to its parent type's table - so converters registered on a parent after
//! the subtype was created are still found by the subtype. The three
//! sentinels pass through any table untouched; a payload kind with no entry
//! anywhere on the chain is a [`ConverterMissing`](crate::Error::ConverterMissing)
//! error.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::value::{Value, ValueKind};

/// A canonicalizing conversion for one `(type context, value kind)` pair.
pub type Converter = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// The concrete shape of a [`TypeInfo`], parameters included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Bytes { size: usize },
    Text { size: usize },
    Int,
    Date,
    Timestamp,
    Blob,
    Clob,
    Decimal { digits: u32, decimal_places: u32 },
}

impl TypeKind {
    pub fn class(&self) -> TypeClass {
        match self {
            TypeKind::Bytes { .. } => TypeClass::Bytes,
            TypeKind::Text { .. } => TypeClass::Text,
            TypeKind::Int => TypeClass::Int,
            TypeKind::Date => TypeClass::Date,
            TypeKind::Timestamp => TypeClass::Timestamp,
            TypeKind::Blob => TypeClass::Blob,
            TypeKind::Clob => TypeClass::Clob,
            TypeKind::Decimal { .. } => TypeClass::Decimal,
        }
    }
}

/// Parameter-free discriminant of [`TypeKind`]; the outer key of the base
/// converter tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Bytes,
    Text,
    Int,
    Date,
    Timestamp,
    Blob,
    Clob,
    Decimal,
}

impl TypeClass {
    pub fn name(&self) -> &'static str {
        match self {
            TypeClass::Bytes => "BytesType",
            TypeClass::Text => "TextType",
            TypeClass::Int => "IntType",
            TypeClass::Date => "DateType",
            TypeClass::Timestamp => "TimestampType",
            TypeClass::Blob => "BlobType",
            TypeClass::Clob => "ClobType",
            TypeClass::Decimal => "DecimalType",
        }
    }
}

/// One level of converter dispatch, chained to an optional parent level.
///
/// Lookup walks the chain from the most specific level upward; insertion
/// always writes the local level, so a child can shadow its parent without
/// disturbing it. Mutation is an init-time activity (see the concurrency
/// notes on [`SchemaRegistry`](crate::SchemaRegistry)); the interior lock
/// makes post-init reads safe from any thread.
pub struct ConverterTable {
    entries: RwLock<HashMap<ValueKind, Converter>>,
    parent: Option<Arc<ConverterTable>>,
}

impl ConverterTable {
    pub(crate) fn root() -> Arc<ConverterTable> {
        Arc::new(ConverterTable {
            entries: RwLock::new(HashMap::new()),
            parent: None,
        })
    }

    pub(crate) fn child_of(parent: &Arc<ConverterTable>) -> Arc<ConverterTable> {
        Arc::new(ConverterTable {
            entries: RwLock::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    pub(crate) fn insert(&self, kind: ValueKind, converter: Converter) {
        self.entries
            .write()
            .expect("converter table lock poisoned")
            .insert(kind, converter);
    }

    pub(crate) fn lookup(&self, kind: ValueKind) -> Option<Converter> {
        let local = self
            .entries
            .read()
            .expect("converter table lock poisoned")
            .get(&kind)
            .cloned();
        match local {
            Some(c) => Some(c),
            None => self.parent.as_ref().and_then(|p| p.lookup(kind)),
        }
    }
}

impl fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<ValueKind> = self
            .entries
            .read()
            .expect("converter table lock poisoned")
            .keys()
            .copied()
            .collect();
        f.debug_struct("ConverterTable")
            .field("kinds", &kinds)
            .field("chained", &self.parent.is_some())
            .finish()
    }
}

/// An immutable description of a primitive value kind, optionally bound to
/// a canonical URI, with its own converter table.
#[derive(Debug)]
pub struct TypeInfo {
    uri: Option<String>,
    kind: TypeKind,
    converters: Arc<ConverterTable>,
}

impl TypeInfo {
    pub(crate) fn new(uri: Option<String>, kind: TypeKind, converters: Arc<ConverterTable>) -> TypeInfo {
        TypeInfo {
            uri,
            kind,
            converters,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// The declared size bound, for the sized variants.
    pub fn size(&self) -> Option<usize> {
        match self.kind {
            TypeKind::Bytes { size } | TypeKind::Text { size } => Some(size),
            _ => None,
        }
    }

    pub(crate) fn converters(&self) -> &Arc<ConverterTable> {
        &self.converters
    }

    /// Run `value` through this type context's converter.
    ///
    /// Sentinels pass through unchanged; payloads must find a converter on
    /// the table chain.
    pub fn convert(&self, value: Value) -> Result<Value> {
        let Some(kind) = value.kind() else {
            return Ok(value);
        };
        match self.converters.lookup(kind) {
            Some(converter) => converter(value),
            None => Err(Error::ConverterMissing {
                type_name: self.describe(),
                kind,
            }),
        }
    }

    /// A printable name: the URI when there is one, the variant otherwise.
    pub fn describe(&self) -> String {
        match &self.uri {
            Some(uri) => uri.clone(),
            None => self.kind.class().name().to_owned(),
        }
    }
}

/// Two type infos are the same type only when they are the same object;
/// URI and parameters alone don't confer identity (an anonymous
/// `TextType(256)` is distinct from every other `TextType(256)`).
impl PartialEq for TypeInfo {
    fn eq(&self, other: &TypeInfo) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for TypeInfo {}

/// Hashing covers only the declared shape (URI and parameters), not the
/// converter table: the schema checksum wants two registries that declare
/// identical schemas to agree, and converter functions have no stable
/// identity to mix in anyway.
impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.kind.hash(state);
    }
}

/// Parameter overrides for [`SchemaRegistry::subtype`](crate::SchemaRegistry::subtype).
/// Unset fields keep the parent's value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeOverrides {
    pub size: Option<usize>,
    pub digits: Option<u32>,
    pub decimal_places: Option<u32>,
}

impl TypeOverrides {
    pub fn size(size: usize) -> TypeOverrides {
        TypeOverrides {
            size: Some(size),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn identity() -> Converter {
        Arc::new(|value| Ok(value))
    }

    #[test]
    fn lookup_walks_the_chain() {
        let base = ConverterTable::root();
        base.insert(ValueKind::Int, identity());
        let child = ConverterTable::child_of(&base);

        assert!(child.lookup(ValueKind::Int).is_some());
        assert!(child.lookup(ValueKind::Text).is_none());

        // A converter added to the parent after the child exists is found.
        base.insert(ValueKind::Text, identity());
        assert!(child.lookup(ValueKind::Text).is_some());

        // The reverse is not true.
        child.insert(ValueKind::Blob, identity());
        assert!(base.lookup(ValueKind::Blob).is_none());
    }

    #[test]
    fn sentinels_pass_through_empty_tables() {
        let ti = TypeInfo::new(None, TypeKind::Int, ConverterTable::root());
        assert_eq!(ti.convert(Value::NoChange).unwrap(), Value::NoChange);
        assert_eq!(ti.convert(Value::Inherit).unwrap(), Value::Inherit);
        assert_eq!(ti.convert(Value::Absent).unwrap(), Value::Absent);
    }

    #[test]
    fn missing_converter_is_an_error() {
        let ti = TypeInfo::new(None, TypeKind::Int, ConverterTable::root());
        let err = ti.convert(Value::Int(1)).unwrap_err();
        assert!(matches!(err, Error::ConverterMissing { .. }));
    }
}
