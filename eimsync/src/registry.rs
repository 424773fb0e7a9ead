/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # The schema registry.
//!
//! A [`SchemaRegistry`] holds everything a process declares at startup:
//! the URI → schema-object map, string aliases for types, the per-variant
//! base converter tables, and the roster of record classes (from which the
//! schema checksum is computed).
//!
//! There is deliberately no global instance. An application owns one
//! registry for the life of the process and treats every mutating call
//! (`declare_*`, [`typedef`](SchemaRegistry::typedef),
//! [`add_converter`](SchemaRegistry::add_converter), record-class and
//! translator construction) as part of a single-threaded initialization
//! phase; after that, reads are safe from anywhere. Tests simply build
//! fresh registries.
//!
//! The [`TypeContext`] trait is the "anything that names a type" seam:
//! URIs, registered aliases, type infos themselves, and field references
//! all resolve to a [`TypeInfo`], and everything else is an
//! [`UnknownType`](Error::UnknownType) error.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::field::{Field, FieldRef, FieldType};
use crate::filter::Filter;
use crate::record::RecordType;
use crate::translator::TranslatorInfo;
use crate::types::{ConverterTable, TypeClass, TypeInfo, TypeKind, TypeOverrides};
use crate::value::{Value, ValueKind};

/// Anything that can live under a URI in the registry.
#[derive(Debug, Clone)]
pub enum SchemaItem {
    Type(Arc<TypeInfo>),
    Record(Arc<RecordType>),
    Filter(Arc<Filter>),
    Translator(TranslatorInfo),
}

impl SchemaItem {
    /// Re-registering the same object under its URI is a no-op; only a
    /// *different* object is a collision.
    fn same_as(&self, other: &SchemaItem) -> bool {
        match (self, other) {
            (SchemaItem::Type(a), SchemaItem::Type(b)) => Arc::ptr_eq(a, b),
            (SchemaItem::Record(a), SchemaItem::Record(b)) => Arc::ptr_eq(a, b),
            (SchemaItem::Filter(a), SchemaItem::Filter(b)) => Arc::ptr_eq(a, b),
            (SchemaItem::Translator(a), SchemaItem::Translator(b)) => a == b,
            _ => false,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            SchemaItem::Type(_) => "type",
            SchemaItem::Record(_) => "record class",
            SchemaItem::Filter(_) => "filter",
            SchemaItem::Translator(_) => "translator",
        }
    }
}

/// Process-wide schema state; see the module docs for the lifecycle.
pub struct SchemaRegistry {
    by_uri: HashMap<String, SchemaItem>,
    aliases: HashMap<String, Arc<TypeInfo>>,
    base_tables: HashMap<TypeClass, Arc<ConverterTable>>,
    uuid_type: Arc<TypeInfo>,
    record_types: Vec<Arc<RecordType>>,
}

/// Lowercase the UUID portion of a `uuid` or `uuid:recurrence_id` alias,
/// leaving everything after the first colon untouched.
pub fn normalize_uuid_string(uuid_or_alias: &str) -> String {
    match uuid_or_alias.split_once(':') {
        Some((uuid, recurrence_id)) => format!("{}:{}", uuid.to_lowercase(), recurrence_id),
        None => uuid_or_alias.to_lowercase(),
    }
}

fn identity(value: Value) -> Result<Value> {
    Ok(value)
}

impl SchemaRegistry {
    pub fn new() -> SchemaRegistry {
        let mut base_tables = HashMap::new();
        for class in [
            TypeClass::Bytes,
            TypeClass::Text,
            TypeClass::Int,
            TypeClass::Date,
            TypeClass::Timestamp,
            TypeClass::Blob,
            TypeClass::Clob,
            TypeClass::Decimal,
        ] {
            base_tables.insert(class, ConverterTable::root());
        }

        let seed = |class: TypeClass, kind: ValueKind| {
            base_tables[&class].insert(kind, Arc::new(identity));
        };
        seed(TypeClass::Bytes, ValueKind::Bytes);
        seed(TypeClass::Text, ValueKind::Text);
        seed(TypeClass::Int, ValueKind::Int);
        seed(TypeClass::Date, ValueKind::Date);
        seed(TypeClass::Timestamp, ValueKind::Timestamp);
        seed(TypeClass::Blob, ValueKind::Blob);
        seed(TypeClass::Clob, ValueKind::Clob);
        seed(TypeClass::Decimal, ValueKind::Decimal);
        // Byte strings flow into blobs and text into clobs unmodified.
        base_tables[&TypeClass::Blob].insert(
            ValueKind::Bytes,
            Arc::new(|v| match v {
                Value::Bytes(b) => Ok(Value::Blob(b)),
                other => Ok(other),
            }),
        );
        base_tables[&TypeClass::Clob].insert(
            ValueKind::Text,
            Arc::new(|v| match v {
                Value::Text(s) => Ok(Value::Clob(s)),
                other => Ok(other),
            }),
        );

        let uuid_type = Arc::new(TypeInfo::new(
            Some("cid:uuid_type@osaf.us".to_owned()),
            TypeKind::Text { size: 36 },
            ConverterTable::child_of(&base_tables[&TypeClass::Text]),
        ));
        uuid_type.converters().insert(
            ValueKind::Text,
            Arc::new(|v| match v {
                Value::Text(s) => Ok(Value::Text(normalize_uuid_string(&s))),
                other => Ok(other),
            }),
        );

        let mut registry = SchemaRegistry {
            by_uri: HashMap::new(),
            aliases: HashMap::new(),
            base_tables,
            uuid_type: uuid_type.clone(),
            record_types: Vec::new(),
        };
        registry
            .by_uri
            .insert("cid:uuid_type@osaf.us".to_owned(), SchemaItem::Type(uuid_type));
        registry
    }

    /// The built-in UUID text type (`cid:uuid_type@osaf.us`), whose
    /// converter canonicalizes the case of incoming UUID strings.
    pub fn uuid_type(&self) -> &Arc<TypeInfo> {
        &self.uuid_type
    }

    /// Map `uri` to `item`. A `None` URI is allowed (the item simply stays
    /// unregistered) unless `required` names what kind of declaration
    /// demanded one. Registering a different object under a taken URI is a
    /// collision.
    pub fn register(
        &mut self,
        uri: Option<&str>,
        item: SchemaItem,
        required: Option<&'static str>,
    ) -> Result<()> {
        let Some(uri) = uri else {
            return match required {
                Some(what) => Err(Error::MissingUri(what)),
                None => Ok(()),
            };
        };
        match self.by_uri.get(uri) {
            Some(existing) if existing.same_as(&item) => Ok(()),
            Some(_) => Err(Error::UriCollision(uri.to_owned())),
            None => {
                debug!("registered {} at {uri}", item.kind_name());
                self.by_uri.insert(uri.to_owned(), item);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, uri: &str) -> Option<&SchemaItem> {
        self.by_uri.get(uri)
    }

    fn declare(&mut self, uri: Option<&str>, kind: TypeKind) -> Result<Arc<TypeInfo>> {
        let table = ConverterTable::child_of(&self.base_tables[&kind.class()]);
        let info = Arc::new(TypeInfo::new(uri.map(str::to_owned), kind, table));
        self.register(uri, SchemaItem::Type(info.clone()), None)?;
        Ok(info)
    }

    pub fn declare_bytes(&mut self, uri: Option<&str>, size: usize) -> Result<Arc<TypeInfo>> {
        self.declare(uri, TypeKind::Bytes { size })
    }

    pub fn declare_text(&mut self, uri: Option<&str>, size: usize) -> Result<Arc<TypeInfo>> {
        self.declare(uri, TypeKind::Text { size })
    }

    pub fn declare_int(&mut self, uri: Option<&str>) -> Result<Arc<TypeInfo>> {
        self.declare(uri, TypeKind::Int)
    }

    pub fn declare_date(&mut self, uri: Option<&str>) -> Result<Arc<TypeInfo>> {
        self.declare(uri, TypeKind::Date)
    }

    pub fn declare_timestamp(&mut self, uri: Option<&str>) -> Result<Arc<TypeInfo>> {
        self.declare(uri, TypeKind::Timestamp)
    }

    pub fn declare_blob(&mut self, uri: Option<&str>) -> Result<Arc<TypeInfo>> {
        self.declare(uri, TypeKind::Blob)
    }

    pub fn declare_clob(&mut self, uri: Option<&str>) -> Result<Arc<TypeInfo>> {
        self.declare(uri, TypeKind::Clob)
    }

    pub fn declare_decimal(
        &mut self,
        uri: Option<&str>,
        digits: u32,
        decimal_places: u32,
    ) -> Result<Arc<TypeInfo>> {
        self.declare(
            uri,
            TypeKind::Decimal {
                digits,
                decimal_places,
            },
        )
    }

    /// Clone a type under a new URI with some parameters overridden. The
    /// subtype's converter table chains to the parent's, so converters the
    /// parent gains later are visible to the subtype as well.
    pub fn subtype(
        &mut self,
        parent: &Arc<TypeInfo>,
        uri: Option<&str>,
        overrides: TypeOverrides,
    ) -> Result<Arc<TypeInfo>> {
        let kind = match parent.kind() {
            TypeKind::Bytes { size } => TypeKind::Bytes {
                size: overrides.size.unwrap_or(*size),
            },
            TypeKind::Text { size } => TypeKind::Text {
                size: overrides.size.unwrap_or(*size),
            },
            TypeKind::Decimal {
                digits,
                decimal_places,
            } => TypeKind::Decimal {
                digits: overrides.digits.unwrap_or(*digits),
                decimal_places: overrides.decimal_places.unwrap_or(*decimal_places),
            },
            unsized_kind => unsized_kind.clone(),
        };
        let info = Arc::new(TypeInfo::new(
            uri.map(str::to_owned),
            kind,
            ConverterTable::child_of(parent.converters()),
        ));
        self.register(uri, SchemaItem::Type(info.clone()), None)?;
        Ok(info)
    }

    /// Register `alias` so that [`type_info_for`](Self::type_info_for)
    /// resolves it to whatever `context` names. Re-registration is an
    /// error.
    pub fn typedef(&mut self, alias: &str, context: impl TypeContext) -> Result<()> {
        let info = context.resolve(self)?;
        if self.aliases.contains_key(alias) {
            return Err(Error::DuplicateAlias(alias.to_owned()));
        }
        self.aliases.insert(alias.to_owned(), info);
        Ok(())
    }

    /// Resolve anything that names a type to its [`TypeInfo`].
    pub fn type_info_for(&self, context: impl TypeContext) -> Result<Arc<TypeInfo>> {
        context.resolve(self)
    }

    /// The converter that `context`'s type uses for `kind`-valued inputs,
    /// following the table chain up through subtype parents and the
    /// variant base table.
    pub fn get_converter(
        &self,
        context: impl TypeContext,
        kind: ValueKind,
    ) -> Result<crate::types::Converter> {
        let info = context.resolve(self)?;
        info.converters()
            .lookup(kind)
            .ok_or_else(|| Error::ConverterMissing {
                type_name: info.describe(),
                kind,
            })
    }

    /// Register a converter for `kind`-valued inputs in the type context
    /// `context` resolves to.
    pub fn add_converter(
        &self,
        context: impl TypeContext,
        kind: ValueKind,
        converter: impl Fn(Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<()> {
        let info = context.resolve(self)?;
        info.converters().insert(kind, Arc::new(converter));
        Ok(())
    }

    /// Declare a named filter; the URI is optional, as some filters exist
    /// only to be composed into others.
    pub fn declare_filter(&mut self, uri: Option<&str>, description: &str) -> Result<Arc<Filter>> {
        let filter = Arc::new(Filter::new(uri.map(str::to_owned), description.to_owned()));
        self.register(uri, SchemaItem::Filter(filter.clone()), None)?;
        Ok(filter)
    }

    pub(crate) fn note_record_type(&mut self, record_type: &Arc<RecordType>) {
        self.record_types.push(record_type.clone());
    }

    pub fn record_types(&self) -> &[Arc<RecordType>] {
        &self.record_types
    }

    /// A checksum over every record class declared so far: names, URIs,
    /// field order, field types (sizes and precision included), defaults
    /// and filter membership. Two peers whose registries disagree here
    /// will not interoperate, so compare checksums before syncing.
    pub fn checksum(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for record_type in &self.record_types {
            record_type.hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl Default for SchemaRegistry {
    fn default() -> SchemaRegistry {
        SchemaRegistry::new()
    }
}

/// Anything that can name a type: a URI or alias string, a type info, a
/// field, or a reference to a field of a built record class.
pub trait TypeContext {
    fn resolve(&self, registry: &SchemaRegistry) -> Result<Arc<TypeInfo>>;
}

impl TypeContext for &Arc<TypeInfo> {
    fn resolve(&self, _registry: &SchemaRegistry) -> Result<Arc<TypeInfo>> {
        Ok((*self).clone())
    }
}

impl TypeContext for &str {
    fn resolve(&self, registry: &SchemaRegistry) -> Result<Arc<TypeInfo>> {
        match registry.by_uri.get(*self) {
            Some(SchemaItem::Type(info)) => Ok(info.clone()),
            // A URI naming some other kind of schema object isn't a type.
            Some(_) => Err(Error::UnknownType((*self).to_owned())),
            None => match registry.aliases.get(*self) {
                Some(info) => Ok(info.clone()),
                None => Err(Error::UnknownType((*self).to_owned())),
            },
        }
    }
}

impl TypeContext for &Field {
    fn resolve(&self, _registry: &SchemaRegistry) -> Result<Arc<TypeInfo>> {
        Ok(self.type_info().clone())
    }
}

impl TypeContext for &FieldRef {
    fn resolve(&self, _registry: &SchemaRegistry) -> Result<Arc<TypeInfo>> {
        Ok(self.field().type_info().clone())
    }
}

impl TypeContext for &FieldType {
    fn resolve(&self, _registry: &SchemaRegistry) -> Result<Arc<TypeInfo>> {
        Ok(self.type_info().clone())
    }
}
