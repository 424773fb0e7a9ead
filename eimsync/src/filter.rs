/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # Field filters.
//!
//! A [`Filter`] names a set of fields (possibly spanning several record
//! classes) that should be *suppressed* when records pass through it:
//! projection replaces each member slot with [`Value::NoChange`], so the
//! receiving side simply doesn't see an assertion for that field.
//!
//! Fields usually join a filter at declaration time (via
//! [`FieldDef::filter`](crate::FieldDef::filter)); the class builder enrols
//! them when the class is built. Whole filters can also be folded into one
//! another. Key fields can never be members: the key declaration type has
//! no filter hook, and [`Filter::add_field`] refuses references to keys.
//!
//! Projection is computed once per record class and cached; growing the
//! filter invalidates the affected cache entries. Projecting twice is the
//! same as projecting once.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::field::FieldRef;
use crate::record::{Record, RecordType};
use crate::recordset::{Diff, RecordBag, RecordSet};
use crate::value::Value;

enum Projection {
    /// No member fields on this class; records pass unchanged.
    Pass,
    /// Replace these slots with `NoChange`.
    Mask(Vec<usize>),
}

/// A named projection that hides designated fields from a record stream.
pub struct Filter {
    uri: Option<String>,
    description: String,
    fields: RwLock<HashSet<(String, usize)>>,
    cache: RwLock<HashMap<String, Arc<Projection>>>,
}

impl Filter {
    pub(crate) fn new(uri: Option<String>, description: String) -> Filter {
        Filter {
            uri,
            description,
            fields: RwLock::new(HashSet::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Membership hook used by the record-class builder.
    pub(crate) fn attach(&self, class_uri: &str, offset: usize) {
        self.fields
            .write()
            .expect("filter lock poisoned")
            .insert((class_uri.to_owned(), offset));
        self.cache
            .write()
            .expect("filter lock poisoned")
            .remove(class_uri);
    }

    /// Add one field of a built record class to this filter.
    pub fn add_field(&self, field: &FieldRef) -> Result<()> {
        if field.field().is_key() {
            return Err(Error::FilteredKey {
                class: field.owner().name().to_owned(),
                field: field.field().name().to_owned(),
            });
        }
        self.attach(field.owner().uri(), field.offset());
        Ok(())
    }

    /// Fold every member of `other` into this filter.
    pub fn add_filter(&self, other: &Filter) {
        let members: Vec<(String, usize)> = other
            .fields
            .read()
            .expect("filter lock poisoned")
            .iter()
            .cloned()
            .collect();
        for (class_uri, offset) in members {
            self.attach(&class_uri, offset);
        }
    }

    fn projection_for(&self, class: &Arc<RecordType>) -> Arc<Projection> {
        if let Some(plan) = self
            .cache
            .read()
            .expect("filter lock poisoned")
            .get(class.uri())
        {
            return plan.clone();
        }
        let mut offsets: Vec<usize> = self
            .fields
            .read()
            .expect("filter lock poisoned")
            .iter()
            .filter(|(uri, _)| uri == class.uri())
            .map(|&(_, offset)| offset)
            .collect();
        offsets.sort_unstable();
        let plan = Arc::new(if offsets.is_empty() {
            Projection::Pass
        } else {
            Projection::Mask(offsets)
        });
        self.cache
            .write()
            .expect("filter lock poisoned")
            .insert(class.uri().to_owned(), plan.clone());
        plan
    }

    /// Project a single record, or `None` when filtering removed its every
    /// assertion.
    pub fn apply_record(&self, record: &Record) -> Option<Record> {
        match &*self.projection_for(record.class()) {
            Projection::Pass => Some(record.clone()),
            Projection::Mask(offsets) => {
                let mut values = record.values().to_vec();
                for &offset in offsets {
                    values[offset] = Value::NoChange;
                }
                record.class().with_values(values)
            }
        }
    }

    /// Project every inclusion of a record set.
    pub fn apply_set(&self, set: &RecordSet) -> RecordSet {
        set.inclusions()
            .filter_map(|r| self.apply_record(r))
            .collect()
    }

    /// Project a diff's inclusions; exclusions are deletions by key and
    /// pass through untouched.
    pub fn apply_diff(&self, diff: &Diff) -> Diff {
        Diff::from_parts(
            diff.inclusions().filter_map(|r| self.apply_record(r)),
            diff.exclusions().cloned(),
        )
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("uri", &self.uri)
            .field("description", &self.description)
            .finish()
    }
}
