/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # Dependency-aware record ordering.
//!
//! [`sort_records`] reorders a stream of records so that a record defining
//! a key is emitted before any record that
//! [requires](crate::Record::requires_keys) it. The pass is streaming:
//! records whose dependencies are already satisfied flow straight through
//! in input order; the rest park until the record they wait for shows up,
//! at which point they (and transitively *their* dependents) are released.
//!
//! When the input runs dry with records still parked - a forward reference
//! whose target never arrived, or a dependency cycle - the sort does not
//! fail. Each remaining key is resolved by climbing the foreign-key chain
//! of its class to the highest ancestor not yet seen
//! ([`RecordKey::parent`]), and that ancestor's key is treated as
//! satisfied. Climbing hop by hop unwinds multi-level chains and breaks
//! cycles, so every parked record is eventually emitted.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::record::{Record, RecordKey};

/// Order `records` so that key definitions precede their dependents. The
/// result is lazy; nothing is pulled from the input until the iterator is
/// driven.
pub fn sort_records<I>(records: I) -> SortRecords<I::IntoIter>
where
    I: IntoIterator<Item = Record>,
{
    SortRecords {
        input: Some(records.into_iter()),
        ready: VecDeque::new(),
        seen: HashSet::new(),
        waiting: HashMap::new(),
    }
}

/// A record parked behind one or more unsatisfied keys. Shared between all
/// the waiting-lists it is parked on; the record is taken when the last
/// dependency clears, so it can only be emitted once.
struct Pending {
    deps: HashSet<RecordKey>,
    record: Option<Record>,
}

pub struct SortRecords<I> {
    input: Option<I>,
    ready: VecDeque<Record>,
    seen: HashSet<RecordKey>,
    waiting: HashMap<RecordKey, Vec<Rc<RefCell<Pending>>>>,
}

impl<I> SortRecords<I>
where
    I: Iterator<Item = Record>,
{
    /// Mark `key` satisfied and move every record this transitively frees
    /// onto the ready queue.
    fn release(&mut self, key: RecordKey) {
        let mut to_release = vec![key];
        while let Some(key) = to_release.pop() {
            self.seen.insert(key.clone());
            let Some(entries) = self.waiting.remove(&key) else {
                continue;
            };
            for entry in entries {
                let mut pending = entry.borrow_mut();
                pending.deps.remove(&key);
                if pending.deps.is_empty() {
                    if let Some(record) = pending.record.take() {
                        to_release.push(record.key());
                        self.ready.push_back(record);
                    }
                }
            }
        }
    }

    fn highest_unseen_parent(&self, mut key: RecordKey) -> RecordKey {
        loop {
            match key.parent() {
                Some(parent) if !self.seen.contains(&parent) => key = parent,
                _ => return key,
            }
        }
    }

    fn take_input(&mut self, record: Record) {
        let deps: Vec<RecordKey> = record
            .requires_keys()
            .into_iter()
            .filter(|dep| !self.seen.contains(dep))
            .collect();
        if deps.is_empty() {
            let key = record.key();
            self.ready.push_back(record);
            self.release(key);
        } else {
            let pending = Rc::new(RefCell::new(Pending {
                deps: deps.iter().cloned().collect(),
                record: Some(record),
            }));
            for dep in deps {
                self.waiting.entry(dep).or_default().push(pending.clone());
            }
        }
    }

    /// End-of-input fallback: resolve each parked key through its highest
    /// unseen ancestor until nothing waits.
    fn drain(&mut self) {
        while self.ready.is_empty() && !self.waiting.is_empty() {
            let parked: Vec<RecordKey> = self.waiting.keys().cloned().collect();
            for key in parked {
                if !self.waiting.contains_key(&key) {
                    continue;
                }
                let ancestor = self.highest_unseen_parent(key);
                self.release(ancestor);
            }
        }
    }
}

impl<I> Iterator for SortRecords<I>
where
    I: Iterator<Item = Record>,
{
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Some(record);
            }
            match self.input.as_mut() {
                Some(input) => match input.next() {
                    Some(record) => self.take_input(record),
                    None => {
                        self.input = None;
                        self.drain();
                    }
                },
                None => {
                    if self.waiting.is_empty() {
                        return None;
                    }
                    self.drain();
                }
            }
        }
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

    struct Chain {
        item: Arc<RecordType>,
        note: Arc<RecordType>,
        event: Arc<RecordType>,
    }

    // Item <= Note <= Event, keyed by a shared uuid.
    fn chain() -> (SchemaRegistry, Chain) {
        let mut registry = SchemaRegistry::new();
        let text = registry.declare_text(None, 256).unwrap();
        let item = RecordType::builder("ItemRecord", "http://example.org/sort/item/0")
            .key(KeyDef::new("uuid", &text))
            .field(FieldDef::new("title", &text))
            .build(&mut registry)
            .unwrap();
        let note = RecordType::builder("NoteRecord", "http://example.org/sort/note/0")
            .key(KeyDef::new("uuid", item.field_ref("uuid").unwrap()))
            .field(FieldDef::new("body", &text))
            .build(&mut registry)
            .unwrap();
        let event = RecordType::builder("EventRecord", "http://example.org/sort/event/0")
            .key(KeyDef::new("uuid", note.field_ref("uuid").unwrap()))
            .field(FieldDef::new("dtstart", &text))
            .build(&mut registry)
            .unwrap();
        (registry, Chain { item, note, event })
    }

    fn rec(class: &Arc<RecordType>, uuid: &str, extra: &str) -> Record {
        class
            .make(vec![Value::text(uuid), Value::text(extra)])
            .unwrap()
            .unwrap()
    }

    fn names(records: Vec<Record>) -> Vec<String> {
        records
            .into_iter()
            .map(|r| r.class().name().to_owned())
            .collect()
    }

    #[test]
    fn dependencies_come_first() {
        let (_registry, c) = chain();
        let sorted: Vec<Record> = sort_records([
            rec(&c.event, "u", "20080101"),
            rec(&c.item, "u", "hello"),
            rec(&c.note, "u", "body"),
        ])
        .collect();
        assert_eq!(
            names(sorted),
            vec!["ItemRecord", "NoteRecord", "EventRecord"]
        );
    }

    #[test]
    fn satisfied_records_keep_input_order() {
        let (_registry, c) = chain();
        let sorted: Vec<Record> = sort_records([
            rec(&c.item, "u1", "one"),
            rec(&c.item, "u2", "two"),
            rec(&c.note, "u1", "n1"),
            rec(&c.item, "u3", "three"),
            rec(&c.note, "u2", "n2"),
        ])
        .collect();
        let got: Vec<(String, String)> = sorted
            .iter()
            .map(|r| {
                (
                    r.class().name().to_owned(),
                    r.get("uuid").unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("ItemRecord".to_owned(), "u1".to_owned()),
                ("ItemRecord".to_owned(), "u2".to_owned()),
                ("NoteRecord".to_owned(), "u1".to_owned()),
                ("ItemRecord".to_owned(), "u3".to_owned()),
                ("NoteRecord".to_owned(), "u2".to_owned()),
            ]
        );
    }

    #[test]
    fn missing_roots_are_tolerated() {
        let (_registry, c) = chain();
        // No ItemRecord ever arrives; the parent walk must still let the
        // parked records out, deepest ancestor first.
        let sorted: Vec<Record> = sort_records([
            rec(&c.event, "u", "20080101"),
            rec(&c.note, "u", "body"),
        ])
        .collect();
        assert_eq!(names(sorted), vec!["NoteRecord", "EventRecord"]);
    }

    #[test]
    fn independent_records_pass_straight_through() {
        let (_registry, c) = chain();
        let sorted: Vec<Record> = sort_records([
            rec(&c.item, "u2", "two"),
            rec(&c.item, "u1", "one"),
        ])
        .collect();
        let uuids: Vec<String> = sorted
            .iter()
            .map(|r| r.get("uuid").unwrap().to_string())
            .collect();
        assert_eq!(uuids, vec!["u2", "u1"]);
    }

    #[test]
    fn laziness_yields_before_input_is_exhausted() {
        let (_registry, c) = chain();
        let pulled = std::cell::Cell::new(0usize);
        let input: Vec<Record> = vec![rec(&c.item, "u1", "one"), rec(&c.item, "u2", "two")];
        let mut sorted =
            sort_records(input.into_iter().inspect(|_| pulled.set(pulled.get() + 1)));
        let first = sorted.next().unwrap();
        assert_eq!(first.get("uuid"), Some(&Value::text("u1")));
        assert_eq!(pulled.get(), 1);
    }
}
