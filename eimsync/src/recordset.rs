/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # Record containers: full state and change sets.
//!
//! A [`RecordSet`] is a keyed set of records - the wire unit of *full
//! state*. A [`Diff`] adds an exclusion set: records asserting deletion -
//! the wire unit of *change*. Both index their inclusions by
//! [`RecordKey`], holding at most one record per key; colliding records
//! are combined with the record algebra rather than replaced.
//!
//! The asymmetry between the two containers is deliberate: updating a
//! `RecordSet` with an exclusion whose key it doesn't hold silently drops
//! the exclusion (there is nothing to delete from full state), while a
//! `Diff` records it so the deletion propagates.
//!
//! Subtracting one record set from another yields the diff that transforms
//! the subtrahend into the minuend: `t += &(s - t)` reconstructs `s`.
//! Unioning two diffs merges their assertions and *ejects* conflicting
//! keys from both sides; conflicts are reported, never resolved.

use std::collections::HashSet;
use std::ops::{Add, AddAssign, BitOr, Sub};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::record::{Record, RecordKey};

/// Boxed iterator over records, so [`RecordBag`] stays object-safe.
pub type RecordIter<'a> = Box<dyn Iterator<Item = &'a Record> + 'a>;

/// What the translator needs from either container: the included and the
/// excluded records.
pub trait RecordBag {
    fn inclusions(&self) -> RecordIter<'_>;
    fn exclusions(&self) -> RecordIter<'_>;
}

/// Apply inclusions and exclusions to a keyed index. The shared core of
/// [`RecordSet::update`] and [`Diff::update`]; the containers differ only
/// in what happens to an exclusion whose key isn't present.
fn update_index(
    index: &mut IndexMap<RecordKey, Record>,
    inclusions: impl IntoIterator<Item = Record>,
    exclusions: impl IntoIterator<Item = Record>,
    subtract: bool,
    mut missing_exclusion: impl FnMut(Record),
) {
    for record in inclusions {
        let key = record.key();
        match index.get(&key) {
            Some(existing) => {
                let combined = existing
                    .apply(&record)
                    .expect("records sharing a key share a class and key values");
                index.insert(key, combined);
            }
            None => {
                index.insert(key, record);
            }
        }
    }
    for record in exclusions {
        let key = record.key();
        match index.get(&key) {
            Some(existing) => {
                let residual = existing
                    .diff(&record)
                    .expect("records sharing a key share a class and key values");
                match residual {
                    Some(rest) if subtract => {
                        index.insert(key, rest);
                    }
                    _ => {
                        index.shift_remove(&key);
                    }
                }
            }
            None => missing_exclusion(record),
        }
    }
}

/// A set of records indexed by key; inclusions only.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    index: IndexMap<RecordKey, Record>,
}

impl RecordSet {
    pub fn new() -> RecordSet {
        RecordSet::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> RecordSet {
        let mut set = RecordSet::new();
        set.update(records, std::iter::empty(), false);
        set
    }

    /// Fold inclusions and exclusions into this set.
    ///
    /// Inclusions are applied onto any record already held under the same
    /// key. An exclusion removes the held record outright unless
    /// `subtract` is set, in which case the residual (what the held record
    /// asserts beyond the exclusion) survives. Exclusions for keys not
    /// held are discarded - a record *set* carries no deletions.
    pub fn update(
        &mut self,
        inclusions: impl IntoIterator<Item = Record>,
        exclusions: impl IntoIterator<Item = Record>,
        subtract: bool,
    ) {
        update_index(&mut self.index, inclusions, exclusions, subtract, |_| {});
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.index.get(key)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl RecordBag for RecordSet {
    fn inclusions(&self) -> RecordIter<'_> {
        Box::new(self.index.values())
    }

    fn exclusions(&self) -> RecordIter<'_> {
        Box::new(std::iter::empty())
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> RecordSet {
        RecordSet::from_records(iter)
    }
}

/// `s - t`: the diff that turns `t` into `s`.
///
/// Starts from `s`'s inclusions, then subtracts `t`'s records: a record of
/// `t` also in `s` leaves only the residual assertions (or vanishes when
/// identical), and a record of `t` absent from `s` becomes an exclusion -
/// applying the diff to `t` must delete it. Only record sets may be
/// subtracted; a diff has no well-defined state to subtract from.
impl Sub<&RecordSet> for &RecordSet {
    type Output = Diff;

    fn sub(self, other: &RecordSet) -> Diff {
        let mut diff = Diff {
            index: self.index.clone(),
            excluded: IndexMap::new(),
        };
        diff.update(std::iter::empty(), other.index.values().cloned(), true);
        diff
    }
}

impl AddAssign<&RecordSet> for RecordSet {
    fn add_assign(&mut self, other: &RecordSet) {
        self.update(other.index.values().cloned(), std::iter::empty(), false);
    }
}

impl AddAssign<&Diff> for RecordSet {
    fn add_assign(&mut self, other: &Diff) {
        self.update(
            other.index.values().cloned(),
            other.excluded.values().cloned(),
            false,
        );
    }
}

impl Add<&Diff> for &RecordSet {
    type Output = RecordSet;

    fn add(self, other: &Diff) -> RecordSet {
        let mut set = self.clone();
        set += other;
        set
    }
}

impl PartialEq for RecordSet {
    fn eq(&self, other: &RecordSet) -> bool {
        self.index == other.index
    }
}

impl Eq for RecordSet {}

impl PartialEq<Diff> for RecordSet {
    fn eq(&self, other: &Diff) -> bool {
        other.excluded.is_empty() && self.index == other.index
    }
}

/// A record set plus an exclusion set; the wire unit of change.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    index: IndexMap<RecordKey, Record>,
    excluded: IndexMap<RecordKey, Record>,
}

impl Diff {
    pub fn new() -> Diff {
        Diff::default()
    }

    pub fn from_parts(
        inclusions: impl IntoIterator<Item = Record>,
        exclusions: impl IntoIterator<Item = Record>,
    ) -> Diff {
        let mut diff = Diff::new();
        diff.update(inclusions, exclusions, false);
        diff
    }

    /// As [`RecordSet::update`], except that an exclusion whose key isn't
    /// held joins the exclusion set instead of being dropped.
    pub fn update(
        &mut self,
        inclusions: impl IntoIterator<Item = Record>,
        exclusions: impl IntoIterator<Item = Record>,
        subtract: bool,
    ) {
        let excluded = &mut self.excluded;
        update_index(&mut self.index, inclusions, exclusions, subtract, |r| {
            excluded.insert(r.key(), r);
        });
    }

    /// Withdraw a single record's assertions from this diff. The record's
    /// key must be among the inclusions.
    pub fn remove_record(&mut self, record: &Record) -> Result<()> {
        self.withdraw(std::iter::once(record))
    }

    /// Withdraw another diff from this one: its inclusions are subtracted
    /// from ours (every listed key must be present), and its exclusion
    /// keys are dropped from our exclusion set.
    pub fn remove(&mut self, other: &Diff) -> Result<()> {
        self.withdraw(other.index.values())?;
        let skip: HashSet<RecordKey> = other.excluded.keys().cloned().collect();
        self.excluded.retain(|key, _| !skip.contains(key));
        Ok(())
    }

    fn withdraw<'a>(&mut self, records: impl Iterator<Item = &'a Record>) -> Result<()> {
        for record in records {
            let key = record.key();
            match self.index.get(&key) {
                Some(existing) => {
                    let residual = existing
                        .diff(record)
                        .expect("records sharing a key share a class and key values");
                    match residual {
                        Some(rest) => {
                            self.index.insert(key, rest);
                        }
                        None => {
                            self.index.shift_remove(&key);
                        }
                    }
                }
                None => return Err(Error::MissingInclusion(key.to_string())),
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.index.get(key)
    }

    pub fn get_excluded(&self, key: &RecordKey) -> Option<&Record> {
        self.excluded.get(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() && self.excluded.is_empty()
    }
}

impl RecordBag for Diff {
    fn inclusions(&self) -> RecordIter<'_> {
        Box::new(self.index.values())
    }

    fn exclusions(&self) -> RecordIter<'_> {
        Box::new(self.excluded.values())
    }
}

/// Union of two diffs.
///
/// Inclusions sharing a key merge; exclusions accumulate. A key that ends
/// up contested - included on one side and excluded on the other, or whose
/// merge collapsed entirely - is a conflict and is ejected from *both*
/// sides of the result, leaving it for conflict reporting.
impl BitOr<&Diff> for &Diff {
    type Output = Diff;

    fn bitor(self, other: &Diff) -> Diff {
        let mut index: IndexMap<RecordKey, Record> = IndexMap::new();
        let mut excluded: IndexMap<RecordKey, Record> = IndexMap::new();
        let mut conflicts: HashSet<RecordKey> = HashSet::new();

        for record in self.index.values().chain(other.index.values()) {
            let key = record.key();
            if conflicts.contains(&key) {
                continue;
            }
            match index.get(&key) {
                Some(existing) => {
                    let merged = existing
                        .merge(record)
                        .expect("records sharing a key share a class and key values");
                    match merged {
                        Some(m) => {
                            index.insert(key, m);
                        }
                        None => {
                            index.shift_remove(&key);
                            conflicts.insert(key);
                        }
                    }
                }
                None => {
                    index.insert(key, record.clone());
                }
            }
        }
        for record in self.excluded.values().chain(other.excluded.values()) {
            let key = record.key();
            if conflicts.contains(&key) {
                continue;
            }
            if index.contains_key(&key) {
                index.shift_remove(&key);
                conflicts.insert(key);
            } else {
                excluded.insert(key, record.clone());
            }
        }
        Diff { index, excluded }
    }
}

impl AddAssign<&Diff> for Diff {
    fn add_assign(&mut self, other: &Diff) {
        self.update(
            other.index.values().cloned(),
            other.excluded.values().cloned(),
            false,
        );
    }
}

impl Add<&Diff> for &Diff {
    type Output = Diff;

    fn add(self, other: &Diff) -> Diff {
        let mut diff = self.clone();
        diff += other;
        diff
    }
}

impl PartialEq for Diff {
    fn eq(&self, other: &Diff) -> bool {
        self.index == other.index && self.excluded == other.excluded
    }
}

impl Eq for Diff {}

impl PartialEq<RecordSet> for Diff {
    fn eq(&self, other: &RecordSet) -> bool {
        self.excluded.is_empty() && self.index == other.index
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::field::{FieldDef, KeyDef};
    use crate::record::RecordType;
    use crate::registry::SchemaRegistry;
    use crate::value::Value;
    use std::sync::Arc;

    fn schema() -> (SchemaRegistry, Arc<RecordType>) {
        let mut registry = SchemaRegistry::new();
        let text = registry.declare_text(None, 1024).unwrap();
        let item = RecordType::builder("ItemRecord", "http://example.org/set/item/0")
            .key(KeyDef::new("uuid", &text))
            .field(FieldDef::new("title", &text))
            .field(FieldDef::new("triage", &text))
            .build(&mut registry)
            .unwrap();
        (registry, item)
    }

    fn item(class: &Arc<RecordType>, uuid: &str, title: Value, triage: Value) -> Record {
        class
            .make(vec![Value::text(uuid), title, triage])
            .unwrap()
            .unwrap()
    }

    #[test]
    fn update_combines_records_by_key() {
        let (_registry, class) = schema();
        let mut set = RecordSet::new();
        set.update(
            [item(&class, "u", "a".into(), Value::NoChange)],
            std::iter::empty(),
            false,
        );
        set.update(
            [item(&class, "u", Value::NoChange, "now".into())],
            std::iter::empty(),
            false,
        );
        assert_eq!(set.len(), 1);
        let stored = set.inclusions().next().unwrap();
        assert_eq!(stored.get("title"), Some(&Value::text("a")));
        assert_eq!(stored.get("triage"), Some(&Value::text("now")));
    }

    #[test]
    fn record_set_discards_unknown_exclusions() {
        let (_registry, class) = schema();
        let mut set = RecordSet::new();
        set.update(
            std::iter::empty(),
            [item(&class, "u", "a".into(), Value::NoChange)],
            false,
        );
        assert!(set.is_empty());
    }

    #[test]
    fn diff_tracks_unknown_exclusions() {
        let (_registry, class) = schema();
        let mut diff = Diff::new();
        diff.update(
            std::iter::empty(),
            [item(&class, "u", "a".into(), Value::NoChange)],
            false,
        );
        assert_eq!(diff.exclusions().count(), 1);
    }

    #[test]
    fn subtract_then_apply_reconstructs() {
        // (s - t) applied to t gives s, deletions included.
        let (_registry, class) = schema();
        let s = RecordSet::from_records([
            item(&class, "u1", "one".into(), "now".into()),
            item(&class, "u2", "two".into(), Value::NoChange),
        ]);
        let mut t = RecordSet::from_records([
            item(&class, "u1", "one".into(), "later".into()),
            item(&class, "u3", "three".into(), Value::NoChange),
        ]);

        let delta = &s - &t;
        // u3 is not in s, so the delta excludes it.
        assert_eq!(delta.exclusions().count(), 1);

        t += &delta;
        assert_eq!(t, s);
    }

    #[test]
    fn subtract_of_equal_sets_is_empty() {
        let (_registry, class) = schema();
        let s = RecordSet::from_records([item(&class, "u", "a".into(), Value::NoChange)]);
        let delta = &s - &s;
        assert!(delta.is_empty());
    }

    #[test]
    fn union_is_idempotent_and_associative() {
        let (_registry, class) = schema();
        let d1 = Diff::from_parts(
            [item(&class, "u1", "a".into(), Value::NoChange)],
            std::iter::empty(),
        );
        let d2 = Diff::from_parts(
            [item(&class, "u1", Value::NoChange, "now".into())],
            std::iter::empty(),
        );
        let d3 = Diff::from_parts(
            std::iter::empty(),
            [item(&class, "u2", "gone".into(), Value::NoChange)],
        );

        assert_eq!(&d1 | &d1, d1);
        let left = &(&d1 | &d2) | &d3;
        let right = &d1 | &(&d2 | &d3);
        assert_eq!(left, right);
    }

    #[test]
    fn union_ejects_conflicting_keys() {
        let (_registry, class) = schema();
        let r1 = item(&class, "u", "A".into(), Value::NoChange);
        let r2 = item(&class, "u", "B".into(), Value::NoChange);
        let d1 = Diff::from_parts([r1], std::iter::empty());
        let d2 = Diff::from_parts([r2], std::iter::empty());

        let merged = &d1 | &d2;
        assert!(merged.is_empty());
    }

    #[test]
    fn union_ejects_include_exclude_clashes() {
        let (_registry, class) = schema();
        let r = item(&class, "u", "A".into(), Value::NoChange);
        let d1 = Diff::from_parts([r.clone()], std::iter::empty());
        let d2 = Diff::from_parts(std::iter::empty(), [r]);

        let merged = &d1 | &d2;
        assert!(merged.inclusions().next().is_none());
        assert!(merged.exclusions().next().is_none());
    }

    #[test]
    fn remove_requires_present_inclusions() {
        let (_registry, class) = schema();
        let mut diff = Diff::from_parts(
            [item(&class, "u1", "a".into(), "now".into())],
            std::iter::empty(),
        );
        let err = diff
            .remove_record(&item(&class, "u2", "b".into(), Value::NoChange))
            .unwrap_err();
        assert!(matches!(err, Error::MissingInclusion(_)));

        // Removing a partial leaves the residual assertions behind.
        diff.remove_record(&item(&class, "u1", "a".into(), Value::NoChange))
            .unwrap();
        let rest = diff.inclusions().next().unwrap();
        assert_eq!(rest.get("title"), Some(&Value::NoChange));
        assert_eq!(rest.get("triage"), Some(&Value::text("now")));
    }
}
