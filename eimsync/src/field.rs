/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # Field declarations for record classes.
//!
//! A record class is declared as an ordered list of fields, each with a
//! name, a type, and optional trimmings (human title, default value,
//! formatter, filter memberships). Declarations come in two flavours:
//!
//!   * [`FieldDef`] - an ordinary field; may join filters.
//!   * [`KeyDef`] - a primary-key field; carries no filter hook at all, so
//!     a key can never end up filtered.
//!
//! Both are *consumed* by the
//! [`RecordTypeBuilder`](crate::RecordTypeBuilder), which turns them into
//! owned [`Field`]s with an offset and an owner. Because the definition
//! moves into the builder, attaching one field to two record classes is a
//! compile error rather than a runtime one.
//!
//! A field's type is either a [`TypeInfo`] or a [`FieldRef`] pointing at a
//! field of another, already-built record class. A reference to a *key*
//! field is a foreign key: it declares that records of this class depend on
//! the record that defines the referenced key (see [`crate::sort_records`]).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::filter::Filter;
use crate::record::RecordType;
use crate::types::TypeInfo;
use crate::value::Value;

/// Per-field formatting hook used by `Record::explain`.
pub type FormatterFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Global creation counter; gives every declaration a `seq` so the builder
/// can keep fields in declaration order.
static FIELD_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_seq() -> u64 {
    FIELD_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// The declared type of a field: a primitive type, or a reference to a
/// field of another record class (whose type is then used transitively).
#[derive(Clone)]
pub enum FieldType {
    Info(Arc<TypeInfo>),
    Ref(FieldRef),
}

impl FieldType {
    /// Resolve to the underlying primitive type, following field
    /// references through to the class that declares a concrete type.
    pub fn type_info(&self) -> &Arc<TypeInfo> {
        match self {
            FieldType::Info(info) => info,
            FieldType::Ref(fr) => fr.field().field_type().type_info(),
        }
    }
}

impl From<&Arc<TypeInfo>> for FieldType {
    fn from(info: &Arc<TypeInfo>) -> FieldType {
        FieldType::Info(info.clone())
    }
}

impl From<FieldRef> for FieldType {
    fn from(fr: FieldRef) -> FieldType {
        FieldType::Ref(fr)
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Info(info) => write!(f, "{}", info.describe()),
            FieldType::Ref(fr) => write!(f, "{}.{}", fr.owner().name(), fr.field().name()),
        }
    }
}

impl Hash for FieldType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FieldType::Info(info) => {
                0u8.hash(state);
                info.hash(state);
            }
            FieldType::Ref(fr) => {
                1u8.hash(state);
                fr.owner().uri().hash(state);
                fr.field().name().hash(state);
            }
        }
    }
}

/// A handle on one field of a built record class.
#[derive(Clone)]
pub struct FieldRef {
    owner: Arc<RecordType>,
    offset: usize,
}

impl FieldRef {
    pub(crate) fn new(owner: Arc<RecordType>, offset: usize) -> FieldRef {
        FieldRef { owner, offset }
    }

    pub fn owner(&self) -> &Arc<RecordType> {
        &self.owner
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn field(&self) -> &Field {
        &self.owner.fields()[self.offset]
    }

    /// Whether the referenced field is a key of its class, i.e. whether a
    /// field typed by this reference is a foreign key.
    pub fn is_key_target(&self) -> bool {
        self.field().is_key()
    }
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner.name(), self.field().name())
    }
}

/// Declaration of an ordinary (non-key) field.
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) title: Option<String>,
    pub(crate) default: Option<Value>,
    pub(crate) formatter: Option<FormatterFn>,
    pub(crate) filters: Vec<Arc<Filter>>,
    pub(crate) seq: u64,
}

impl FieldDef {
    pub fn new(name: &str, ty: impl Into<FieldType>) -> FieldDef {
        FieldDef {
            name: name.to_owned(),
            ty: ty.into(),
            title: None,
            default: None,
            formatter: None,
            filters: Vec::new(),
            seq: next_seq(),
        }
    }

    pub fn title(mut self, title: &str) -> FieldDef {
        self.title = Some(title.to_owned());
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> FieldDef {
        self.default = Some(value.into());
        self
    }

    pub fn filter(mut self, filter: &Arc<Filter>) -> FieldDef {
        self.filters.push(filter.clone());
        self
    }

    pub fn formatter(mut self, f: impl Fn(&Value) -> String + Send + Sync + 'static) -> FieldDef {
        self.formatter = Some(Arc::new(f));
        self
    }
}

/// Declaration of a primary-key field. Key fields participate in record
/// identity and may not be filtered, which is why there is no `filter`
/// method here.
pub struct KeyDef {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) title: Option<String>,
    pub(crate) default: Option<Value>,
    pub(crate) formatter: Option<FormatterFn>,
    pub(crate) seq: u64,
}

impl KeyDef {
    pub fn new(name: &str, ty: impl Into<FieldType>) -> KeyDef {
        KeyDef {
            name: name.to_owned(),
            ty: ty.into(),
            title: None,
            default: None,
            formatter: None,
            seq: next_seq(),
        }
    }

    pub fn title(mut self, title: &str) -> KeyDef {
        self.title = Some(title.to_owned());
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> KeyDef {
        self.default = Some(value.into());
        self
    }

    pub fn formatter(mut self, f: impl Fn(&Value) -> String + Send + Sync + 'static) -> KeyDef {
        self.formatter = Some(Arc::new(f));
        self
    }
}

/// A field that has been assigned to a record class. Immutable.
pub struct Field {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) title: Option<String>,
    pub(crate) default: Option<Value>,
    pub(crate) formatter: Option<FormatterFn>,
    pub(crate) filters: Vec<Arc<Filter>>,
    pub(crate) seq: u64,
    pub(crate) offset: usize,
    pub(crate) owner_name: String,
    pub(crate) is_key: bool,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn type_info(&self) -> &Arc<TypeInfo> {
        self.ty.type_info()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn filters(&self) -> &[Arc<Filter>] {
        &self.filters
    }

    /// Position of this field's slot within its record's values.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    /// The field reference this field was typed with, if that reference
    /// points at a key field of another class.
    pub fn foreign_key(&self) -> Option<&FieldRef> {
        match &self.ty {
            FieldType::Ref(fr) if fr.is_key_target() => Some(fr),
            _ => None,
        }
    }

    /// Format a value of this field for human display.
    pub fn format(&self, value: &Value) -> String {
        match &self.formatter {
            Some(f) => f(value),
            None => value.to_string(),
        }
    }

    /// Title if declared, name otherwise; what `explain` labels the field
    /// with.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("owner", &self.owner_name)
            .field("type", &self.ty)
            .field("offset", &self.offset)
            .field("key", &self.is_key)
            .finish()
    }
}

/// Hashing covers the wire-relevant schema shape: name, declaration order
/// is implied by the containing class, type parameters, default and filter
/// membership. Titles and formatters are presentation-only and the global
/// `seq` differs between registries, so none of those participate.
impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.ty.hash(state);
        self.default.hash(state);
        self.is_key.hash(state);
        for filter in &self.filters {
            filter.uri().hash(state);
        }
    }
}
