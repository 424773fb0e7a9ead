/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # Record classes and the record value algebra.
//!
//! A [`RecordType`] is the declarative description of one kind of record: a
//! URI, a name, and an ordered run of typed [`Field`]s, some of which are
//! keys. Classes are built once at startup through [`RecordType::builder`]
//! and registered with the [`SchemaRegistry`](crate::SchemaRegistry); they
//! are final - there is no way to derive one record class from another.
//!
//! A [`Record`] is an immutable tuple of [`Value`]s under a class. Each
//! non-key slot either asserts a value or carries [`Value::NoChange`],
//! which is how partial updates are encoded. Two records of the same class
//! with equal key values describe the same entity, and the algebra here
//! combines them:
//!
//!   * [`Record::diff`] - what's new in `a` relative to `b`,
//!   * [`Record::apply`] - `b`'s assertions layered onto `a`,
//!   * [`Record::merge`] - symmetric combination, conflicts collapsing to
//!     `NoChange`.
//!
//! All three return `None` instead of a record when nothing remains
//! asserted, mirroring the constructor's own collapse rule: a record whose
//! non-key slots are all `NoChange` *is* "no change" and is never
//! materialized.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::field::{Field, FieldDef, FieldRef, FieldType, KeyDef};
use crate::registry::{SchemaItem, SchemaRegistry};
use crate::value::Value;

/// A record class: URI, name, ordered typed fields, key positions.
#[derive(Debug)]
pub struct RecordType {
    name: String,
    uri: String,
    fields: Vec<Field>,
    key_offsets: Vec<usize>,
    // Back-reference to the Arc every class lives behind, so records and
    // field references can be minted from `&self`.
    this: Weak<RecordType>,
}

impl RecordType {
    pub fn builder(name: &str, uri: &str) -> RecordTypeBuilder {
        RecordTypeBuilder {
            name: name.to_owned(),
            uri: uri.to_owned(),
            raw: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Offsets of the key fields, in field order.
    pub fn key_offsets(&self) -> &[usize] {
        &self.key_offsets
    }

    fn arc(&self) -> Arc<RecordType> {
        self.this.upgrade().expect("record classes live behind an Arc")
    }

    /// A [`FieldRef`] to one of this class's fields, for use as another
    /// class's field type (foreign keys) or as a filter member.
    pub fn field_ref(&self, name: &str) -> Result<FieldRef> {
        match self.fields.iter().position(|f| f.name == name) {
            Some(offset) => Ok(FieldRef::new(self.arc(), offset)),
            None => Err(Error::NoSuchField {
                class: self.name.clone(),
                field: name.to_owned(),
            }),
        }
    }

    /// Construct a record, running every value through its field's
    /// converter and filling omitted trailing values from field defaults.
    ///
    /// Returns `Ok(None)` when every non-key value converted to
    /// [`Value::NoChange`]: such a record asserts nothing and is
    /// represented as "no change" rather than materialized.
    pub fn make(&self, values: impl Into<Vec<Value>>) -> Result<Option<Record>> {
        let values = values.into();
        if values.len() > self.fields.len() {
            return Err(Error::Arity {
                class: self.name.clone(),
                expected: self.fields.len(),
                got: values.len(),
            });
        }
        let mut slots = Vec::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            let raw = match values.get(i) {
                Some(v) => v.clone(),
                None => match &field.default {
                    Some(d) => d.clone(),
                    None => {
                        return Err(Error::Arity {
                            class: self.name.clone(),
                            expected: self.fields.len(),
                            got: values.len(),
                        })
                    }
                },
            };
            let converted = field.type_info().convert(raw)?;
            if field.is_key && converted.is_sentinel() {
                return Err(Error::KeyValue {
                    class: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            slots.push(converted);
        }
        Ok(self.with_values(slots))
    }

    /// Build a record from already-canonical slot values, applying only the
    /// collapse rule. Internal plumbing for the algebra and the filters.
    pub(crate) fn with_values(&self, values: Vec<Value>) -> Option<Record> {
        let non_key_count = self.fields.len() - self.key_offsets.len();
        if non_key_count > 0 {
            let all_no_change = self
                .fields
                .iter()
                .zip(&values)
                .all(|(f, v)| f.is_key || v.is_no_change());
            if all_no_change {
                return None;
            }
        }
        Some(Record {
            class: self.arc(),
            values: values.into(),
        })
    }
}

/// Hashing covers the schema shape (URI, name, fields) so that two
/// registries declaring the same catalogue produce the same checksum.
impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.uri.hash(state);
        self.fields.hash(state);
    }
}

/// Accumulates field declarations and assembles a [`RecordType`].
///
/// Fields keep their declaration order (tracked by each definition's global
/// `seq`), keys and plain fields interleaved exactly as declared.
pub struct RecordTypeBuilder {
    name: String,
    uri: String,
    raw: Vec<RawField>,
}

struct RawField {
    name: String,
    ty: FieldType,
    title: Option<String>,
    default: Option<Value>,
    formatter: Option<crate::field::FormatterFn>,
    filters: Vec<Arc<crate::filter::Filter>>,
    seq: u64,
    is_key: bool,
}

impl RecordTypeBuilder {
    pub fn key(mut self, def: KeyDef) -> RecordTypeBuilder {
        self.raw.push(RawField {
            name: def.name,
            ty: def.ty,
            title: def.title,
            default: def.default,
            formatter: def.formatter,
            filters: Vec::new(),
            seq: def.seq,
            is_key: true,
        });
        self
    }

    pub fn field(mut self, def: FieldDef) -> RecordTypeBuilder {
        self.raw.push(RawField {
            name: def.name,
            ty: def.ty,
            title: def.title,
            default: def.default,
            formatter: def.formatter,
            filters: def.filters,
            seq: def.seq,
            is_key: false,
        });
        self
    }

    /// Validate the declaration, register the class URI, and enrol each
    /// field with the filters it listed.
    pub fn build(mut self, registry: &mut SchemaRegistry) -> Result<Arc<RecordType>> {
        self.raw.sort_by_key(|f| f.seq);

        let mut fields = Vec::with_capacity(self.raw.len());
        let mut key_offsets = Vec::new();
        let mut saw_default = false;
        for (offset, raw) in self.raw.into_iter().enumerate() {
            if fields.iter().any(|f: &Field| f.name == raw.name) {
                return Err(Error::DuplicateField {
                    class: self.name.clone(),
                    field: raw.name,
                });
            }
            match raw.default {
                Some(_) => saw_default = true,
                None if saw_default => {
                    return Err(Error::FieldOrder {
                        class: self.name.clone(),
                        field: raw.name,
                    })
                }
                None => {}
            }
            if raw.is_key {
                key_offsets.push(offset);
            }
            fields.push(Field {
                name: raw.name,
                ty: raw.ty,
                title: raw.title,
                default: raw.default,
                formatter: raw.formatter,
                filters: raw.filters,
                seq: raw.seq,
                offset,
                owner_name: self.name.clone(),
                is_key: raw.is_key,
            });
        }

        let record_type = Arc::new_cyclic(|this| RecordType {
            name: self.name,
            uri: self.uri,
            fields,
            key_offsets,
            this: this.clone(),
        });
        registry.register(
            Some(record_type.uri.as_str()),
            SchemaItem::Record(record_type.clone()),
            Some("record classes"),
        )?;
        registry.note_record_type(&record_type);

        for field in &record_type.fields {
            for filter in &field.filters {
                filter.attach(&record_type.uri, field.offset);
            }
        }
        Ok(record_type)
    }
}

/// An immutable record value: a class tag plus one [`Value`] per field.
#[derive(Clone)]
pub struct Record {
    class: Arc<RecordType>,
    values: Arc<[Value]>,
}

impl Record {
    pub fn class(&self) -> &Arc<RecordType> {
        &self.class
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, offset: usize) -> &Value {
        &self.values[offset]
    }

    /// Look a slot up by field name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.class.field(name).map(|f| &self.values[f.offset])
    }

    /// The identity of the entity this record describes: the class plus
    /// the key slot values, in field order.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            class: self.class.clone(),
            values: self
                .class
                .key_offsets
                .iter()
                .map(|&o| self.values[o].clone())
                .collect(),
        }
    }

    fn check_class(&self, other: &Record) -> Result<()> {
        if Arc::ptr_eq(&self.class, &other.class) || self.class.uri == other.class.uri {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                expected: self.class.name.clone(),
                found: other.class.name.clone(),
            })
        }
    }

    /// `self − other`: what's new in `self` relative to `other`.
    ///
    /// Per non-key slot, the result asserts `self`'s value where the two
    /// differ and `NoChange` where they agree. `None` when nothing
    /// differs. Unequal key values are a [`Error::KeyMismatch`].
    pub fn diff(&self, other: &Record) -> Result<Option<Record>> {
        self.check_class(other)?;
        if self == other {
            return Ok(None);
        }
        let mut slots = Vec::with_capacity(self.values.len());
        for (field, (new, old)) in self
            .class
            .fields
            .iter()
            .zip(self.values.iter().zip(other.values.iter()))
        {
            if field.is_key {
                if new != old {
                    return Err(Error::KeyMismatch {
                        field: field.name.clone(),
                        left: old.clone(),
                        right: new.clone(),
                    });
                }
            } else if new == old {
                slots.push(Value::NoChange);
                continue;
            }
            slots.push(new.clone());
        }
        Ok(self.class.with_values(slots))
    }

    /// `self + other`: `other`'s assertions applied on top of `self`.
    ///
    /// Per non-key slot, `other`'s value wins unless it is `NoChange`, in
    /// which case `self`'s survives.
    pub fn apply(&self, other: &Record) -> Result<Record> {
        self.check_class(other)?;
        let mut slots = Vec::with_capacity(self.values.len());
        for (field, (new, old)) in self
            .class
            .fields
            .iter()
            .zip(other.values.iter().zip(self.values.iter()))
        {
            if field.is_key && new != old {
                return Err(Error::KeyMismatch {
                    field: field.name.clone(),
                    left: old.clone(),
                    right: new.clone(),
                });
            }
            slots.push(if new.is_no_change() {
                old.clone()
            } else {
                new.clone()
            });
        }
        Ok(Record {
            class: self.class.clone(),
            values: slots.into(),
        })
    }

    /// `self | other`: commutative merge.
    ///
    /// Per non-key slot: both `NoChange` stays `NoChange`, one `NoChange`
    /// yields the other, equal values yield that value, and disagreeing
    /// values collapse to `NoChange` - that collapse is the conflict
    /// marker [`Diff`](crate::Diff) union looks for. Disagreeing key
    /// values fail instead.
    pub fn merge(&self, other: &Record) -> Result<Option<Record>> {
        self.check_class(other)?;
        let mut slots = Vec::with_capacity(self.values.len());
        for (field, (old, new)) in self
            .class
            .fields
            .iter()
            .zip(self.values.iter().zip(other.values.iter()))
        {
            let slot = if new.is_no_change() {
                old.clone()
            } else if old.is_no_change() {
                new.clone()
            } else if old == new {
                new.clone()
            } else if field.is_key {
                return Err(Error::KeyMismatch {
                    field: field.name.clone(),
                    left: old.clone(),
                    right: new.clone(),
                });
            } else {
                Value::NoChange
            };
            slots.push(slot);
        }
        Ok(self.class.with_values(slots))
    }

    /// Keys of the records this record depends on: one entry per
    /// referenced class, with the referencing slot values grouped in field
    /// order. Consumed by [`crate::sort_records`].
    pub fn requires_keys(&self) -> Vec<RecordKey> {
        let mut grouped: IndexMap<String, (Arc<RecordType>, Vec<Value>)> = IndexMap::new();
        for field in &self.class.fields {
            if let Some(fk) = field.foreign_key() {
                let owner = fk.owner();
                grouped
                    .entry(owner.uri().to_owned())
                    .or_insert_with(|| (owner.clone(), Vec::new()))
                    .1
                    .push(self.values[field.offset].clone());
            }
        }
        grouped
            .into_values()
            .map(|(class, values)| RecordKey { class, values })
            .collect()
    }

    /// One `(label, formatted value, singleton record)` per asserted
    /// non-key slot. The singleton record carries the keys plus exactly
    /// that slot, ready to be wrapped in a one-record diff for conflict
    /// display.
    pub fn explain(&self) -> Vec<(String, String, Record)> {
        let mut data: Vec<Value> = self
            .class
            .fields
            .iter()
            .map(|f| {
                if f.is_key {
                    self.values[f.offset].clone()
                } else {
                    Value::NoChange
                }
            })
            .collect();
        let mut out = Vec::new();
        for field in &self.class.fields {
            let value = &self.values[field.offset];
            if field.is_key || value.is_no_change() {
                continue;
            }
            data[field.offset] = value.clone();
            let singleton = self
                .class
                .with_values(data.clone())
                .expect("a singleton explanation asserts one slot");
            out.push((field.label().to_owned(), field.format(value), singleton));
            data[field.offset] = Value::NoChange;
        }
        out
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Text(s) | Value::Clob(s) => write!(f, "{s:?}"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.class.name)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_value(f, value)?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Value equality incorporates the class identity.
impl PartialEq for Record {
    fn eq(&self, other: &Record) -> bool {
        (Arc::ptr_eq(&self.class, &other.class) || self.class.uri == other.class.uri)
            && self.values == other.values
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class.uri.hash(state);
        self.values.hash(state);
    }
}

/// The identity of a record: its class plus its key slot values.
#[derive(Clone)]
pub struct RecordKey {
    class: Arc<RecordType>,
    values: Vec<Value>,
}

impl RecordKey {
    pub fn class(&self) -> &Arc<RecordType> {
        &self.class
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The key addressing the same values under the class this key's class
    /// foreign-keys into, if any: the first key field whose type is itself
    /// a key field decides the parent class.
    pub fn parent(&self) -> Option<RecordKey> {
        for field in self.class.fields() {
            if !field.is_key() {
                continue;
            }
            if let Some(fk) = field.foreign_key() {
                return Some(RecordKey {
                    class: fk.owner().clone(),
                    values: self.values.clone(),
                });
            }
        }
        None
    }
}

impl PartialEq for RecordKey {
    fn eq(&self, other: &RecordKey) -> bool {
        (Arc::ptr_eq(&self.class, &other.class) || self.class.uri == other.class.uri)
            && self.values == other.values
    }
}

impl Eq for RecordKey {}

impl Hash for RecordKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class.uri.hash(state);
        self.values.hash(state);
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.class.name)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_value(f, value)?;
        }
        f.write_str(")")
    }
}

impl fmt::Debug for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::SchemaRegistry;
    use crate::value::Value;

    fn schema() -> (SchemaRegistry, Arc<RecordType>) {
        let mut registry = SchemaRegistry::new();
        let text = registry.declare_text(None, 1024).unwrap();
        let int = registry.declare_int(None).unwrap();
        let item = RecordType::builder("ItemRecord", "http://example.org/test/item/0")
            .key(KeyDef::new("uuid", &text))
            .field(FieldDef::new("title", &text).title("Title"))
            .field(FieldDef::new("triage", &text))
            .field(FieldDef::new("read", &int).default(0))
            .build(&mut registry)
            .unwrap();
        (registry, item)
    }

    fn rec(class: &Arc<RecordType>, values: Vec<Value>) -> Record {
        class.make(values).unwrap().unwrap()
    }

    #[test]
    fn make_fills_defaults_and_collapses() {
        let (_registry, item) = schema();
        let r = item
            .make(vec![Value::text("u"), Value::text("t"), Value::NoChange])
            .unwrap()
            .unwrap();
        assert_eq!(r.get("read"), Some(&Value::Int(0)));

        let collapsed = item
            .make(vec![
                Value::text("u"),
                Value::NoChange,
                Value::NoChange,
                Value::NoChange,
            ])
            .unwrap();
        assert!(collapsed.is_none());
    }

    #[test]
    fn make_rejects_sentinel_keys_and_bad_arity() {
        let (_registry, item) = schema();
        assert!(matches!(
            item.make(vec![Value::NoChange, Value::text("t"), Value::NoChange, Value::Int(0)]),
            Err(Error::KeyValue { .. })
        ));
        assert!(matches!(
            item.make(vec![Value::text("u")]),
            Err(Error::Arity { .. })
        ));
    }

    #[test]
    fn diff_of_identical_records_is_no_change() {
        let (_registry, item) = schema();
        let a = rec(&item, vec!["u".into(), "t".into(), "now".into(), 1.into()]);
        assert!(a.diff(&a).unwrap().is_none());
    }

    #[test]
    fn patch_round_trip() {
        // a + (b − a) = b and (a − b) + b = a
        let (_registry, item) = schema();
        let a = rec(&item, vec!["u".into(), "old".into(), "now".into(), 1.into()]);
        let b = rec(&item, vec!["u".into(), "new".into(), "now".into(), 0.into()]);

        let patch = b.diff(&a).unwrap().unwrap();
        assert_eq!(patch.get("triage"), Some(&Value::NoChange));
        assert_eq!(a.apply(&patch).unwrap(), b);

        let back = a.diff(&b).unwrap().unwrap();
        assert_eq!(b.apply(&back).unwrap(), a);
    }

    #[test]
    fn diff_rejects_key_mismatch() {
        let (_registry, item) = schema();
        let a = rec(&item, vec!["u1".into(), "t".into(), "now".into(), 1.into()]);
        let b = rec(&item, vec!["u2".into(), "t".into(), "now".into(), 1.into()]);
        assert!(matches!(a.diff(&b), Err(Error::KeyMismatch { .. })));
    }

    #[test]
    fn partial_update_applies_only_asserted_slots() {
        let (_registry, item) = schema();
        let base = rec(&item, vec!["u".into(), "old".into(), "now".into(), 1.into()]);
        let update = rec(
            &item,
            vec!["u".into(), "A".into(), Value::NoChange, 0.into()],
        );
        let merged = base.apply(&update).unwrap();
        assert_eq!(merged.get("title"), Some(&Value::text("A")));
        assert_eq!(merged.get("triage"), Some(&Value::text("now")));
        assert_eq!(merged.get("read"), Some(&Value::Int(0)));
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let (_registry, item) = schema();
        let a = rec(
            &item,
            vec!["u".into(), "t".into(), Value::NoChange, 1.into()],
        );
        let b = rec(
            &item,
            vec!["u".into(), Value::NoChange, "later".into(), 1.into()],
        );
        assert_eq!(a.merge(&a).unwrap().unwrap(), a);
        assert_eq!(a.merge(&b).unwrap(), b.merge(&a).unwrap());
        let m = a.merge(&b).unwrap().unwrap();
        assert_eq!(m.get("title"), Some(&Value::text("t")));
        assert_eq!(m.get("triage"), Some(&Value::text("later")));
    }

    #[test]
    fn merge_conflict_collapses_to_no_change() {
        let (_registry, item) = schema();
        let a = rec(
            &item,
            vec!["u".into(), "A".into(), Value::NoChange, Value::NoChange],
        );
        let b = rec(
            &item,
            vec!["u".into(), "B".into(), Value::NoChange, Value::NoChange],
        );
        // The only asserted slot disagrees, so the merge collapses.
        assert!(a.merge(&b).unwrap().is_none());
    }

    #[test]
    fn explain_lists_asserted_slots() {
        let (_registry, item) = schema();
        let r = rec(
            &item,
            vec!["u".into(), "hello".into(), Value::NoChange, 1.into()],
        );
        let entries = r.explain();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "Title");
        assert_eq!(entries[0].1, "hello");
        assert_eq!(entries[0].2.get("read"), Some(&Value::NoChange));
        assert_eq!(entries[1].0, "read");
    }

    #[test]
    fn foreign_keys_induce_requirements() {
        let (mut registry, item) = schema();
        let note = RecordType::builder("NoteRecord", "http://example.org/test/note/0")
            .key(KeyDef::new("uuid", item.field_ref("uuid").unwrap()))
            .field(FieldDef::new(
                "body",
                &registry.declare_clob(None).unwrap(),
            ))
            .build(&mut registry)
            .unwrap();
        let n = rec(&note, vec!["u".into(), Value::Clob("b".into())]);
        let requires = n.requires_keys();
        assert_eq!(requires.len(), 1);
        assert_eq!(requires[0].class().name(), "ItemRecord");
        assert_eq!(requires[0].values(), &[Value::text("u")]);
        // And the key's parent walks the same hop.
        assert_eq!(n.key().parent().unwrap(), requires[0]);
    }
}
