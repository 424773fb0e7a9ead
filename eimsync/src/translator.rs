/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # The translator framework.
//!
//! A translator maps records to and from the hosting application's item
//! model. Its static shape is a [`TranslatorSpec`]: a version, a URI, a
//! description, and three handler tables - importers and deleters keyed by
//! record class, exporters keyed by item type. Specs are assembled with an
//! explicit builder at startup; registering two handlers for one target in
//! one spec fails right there, and a spec can
//! [`inherit`](TranslatorSpecBuilder::inherit) the tables of its parents
//! (its own entries win, then the nearest parent's).
//!
//! A [`Translator`] pairs a spec with an [`ItemStore`] and carries the
//! per-transaction state: the load queue, the exporter cache, and the last
//! captured failure. Transactions are bracketed by `start_import` /
//! `finish_import` (or the export pair); a translator is not shareable
//! across threads and is cheap to recreate per transaction.
//!
//! Handlers are application code, so they deal in `anyhow` errors. The
//! framework guards each imported record: a handler error (raised or
//! recorded via [`record_failure`](Translator::record_failure)) is
//! annotated with the record's printable form and the captured trace, the
//! failure slot is cleared, and the error is re-raised to the caller.
//! Records whose class has no handler are silently ignored - an older
//! translator must be able to skip record types it has never heard of.

use std::collections::HashMap;
use std::sync::Arc;

use log::error;

use crate::error::{Error, Result};
use crate::item::{ItemStore, ItemType};
use crate::record::{Record, RecordType};
use crate::recordset::{Diff, RecordBag};
use crate::registry::{SchemaItem, SchemaRegistry};
use crate::value::Value;

/// Imports one record into the item model.
pub type Importer<S> = fn(&mut Translator<S>, &Record) -> anyhow::Result<()>;

/// Handles the deletion a record exclusion asserts.
pub type Deleter<S> = fn(&mut Translator<S>, &Record) -> anyhow::Result<()>;

/// Emits the records describing one item (or add-on) handle.
pub type Exporter<S> =
    fn(&mut Translator<S>, &<S as ItemStore>::Item) -> anyhow::Result<Vec<Record>>;

/// Identifying metadata of a translator; what the schema registry stores
/// under the translator's URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorInfo {
    pub uri: String,
    pub version: u32,
    pub description: String,
}

/// The static shape of a translator: identity plus handler tables.
pub struct TranslatorSpec<S: ItemStore> {
    info: TranslatorInfo,
    importers: HashMap<String, Importer<S>>,
    deleters: HashMap<String, Deleter<S>>,
    exporters: HashMap<String, Exporter<S>>,
}

impl<S: ItemStore> std::fmt::Debug for TranslatorSpec<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorSpec")
            .field("info", &self.info)
            .field("importers", &self.importers.keys().collect::<Vec<_>>())
            .field("deleters", &self.deleters.keys().collect::<Vec<_>>())
            .field("exporters", &self.exporters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: ItemStore> TranslatorSpec<S> {
    pub fn builder(uri: &str, version: u32, description: &str) -> TranslatorSpecBuilder<S> {
        TranslatorSpecBuilder {
            info: TranslatorInfo {
                uri: uri.to_owned(),
                version,
                description: description.to_owned(),
            },
            importers: Vec::new(),
            deleters: Vec::new(),
            exporters: Vec::new(),
            parents: Vec::new(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.info.uri
    }

    pub fn version(&self) -> u32 {
        self.info.version
    }

    pub fn description(&self) -> &str {
        &self.info.description
    }

    pub fn info(&self) -> &TranslatorInfo {
        &self.info
    }
}

/// Accumulates handler registrations and assembles a [`TranslatorSpec`].
pub struct TranslatorSpecBuilder<S: ItemStore> {
    info: TranslatorInfo,
    importers: Vec<(String, Importer<S>)>,
    deleters: Vec<(String, Deleter<S>)>,
    exporters: Vec<(String, Exporter<S>)>,
    parents: Vec<Arc<TranslatorSpec<S>>>,
}

fn collect_handlers<V>(
    entries: Vec<(String, V)>,
    registry: &'static str,
) -> Result<HashMap<String, V>> {
    let mut table = HashMap::new();
    for (target, handler) in entries {
        if table.insert(target.clone(), handler).is_some() {
            return Err(Error::HandlerConflict { registry, target });
        }
    }
    Ok(table)
}

impl<S: ItemStore> TranslatorSpecBuilder<S> {
    /// Register `handler` as the importer for `class`. To share one
    /// handler between several classes, register it once per class.
    pub fn importer(mut self, class: &Arc<RecordType>, handler: Importer<S>) -> Self {
        self.importers.push((class.uri().to_owned(), handler));
        self
    }

    pub fn deleter(mut self, class: &Arc<RecordType>, handler: Deleter<S>) -> Self {
        self.deleters.push((class.uri().to_owned(), handler));
        self
    }

    pub fn exporter(mut self, item_type: &Arc<ItemType>, handler: Exporter<S>) -> Self {
        self.exporters.push((item_type.name().to_owned(), handler));
        self
    }

    /// Inherit the handler tables of `parent`. This spec's own entries
    /// win; among several parents, the one named first wins.
    pub fn inherit(mut self, parent: &Arc<TranslatorSpec<S>>) -> Self {
        self.parents.push(parent.clone());
        self
    }

    /// Check for duplicate registrations, fold in the inherited tables,
    /// and register the translator's URI.
    pub fn build(self, registry: &mut SchemaRegistry) -> Result<Arc<TranslatorSpec<S>>> {
        let mut importers = collect_handlers(self.importers, "importers")?;
        let mut deleters = collect_handlers(self.deleters, "deleters")?;
        let mut exporters = collect_handlers(self.exporters, "exporters")?;
        for parent in &self.parents {
            for (target, handler) in &parent.importers {
                importers.entry(target.clone()).or_insert(*handler);
            }
            for (target, handler) in &parent.deleters {
                deleters.entry(target.clone()).or_insert(*handler);
            }
            for (target, handler) in &parent.exporters {
                exporters.entry(target.clone()).or_insert(*handler);
            }
        }
        let spec = Arc::new(TranslatorSpec {
            info: self.info,
            importers,
            deleters,
            exporters,
        });
        registry.register(
            Some(spec.info.uri.as_str()),
            SchemaItem::Translator(spec.info.clone()),
            None,
        )?;
        Ok(spec)
    }
}

/// A translator bound to an item store, with per-transaction state.
pub struct Translator<S: ItemStore> {
    spec: Arc<TranslatorSpec<S>>,
    store: S,
    /// Items parked by handlers until the record that settles their type
    /// arrives. Keys are item UUIDs. A non-empty queue at
    /// [`finish_import`](Translator::finish_import) is an error.
    pub load_queue: HashMap<String, Vec<Record>>,
    export_cache: HashMap<String, Arc<Vec<Exporter<S>>>>,
    failure: Option<anyhow::Error>,
    failure_trace: String,
}

impl<S: ItemStore> Translator<S> {
    pub fn new(spec: &Arc<TranslatorSpec<S>>, store: S) -> Translator<S> {
        Translator {
            spec: spec.clone(),
            store,
            load_queue: HashMap::new(),
            export_cache: HashMap::new(),
            failure: None,
            failure_trace: String::new(),
        }
    }

    pub fn spec(&self) -> &Arc<TranslatorSpec<S>> {
        &self.spec
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Begin an import transaction, discarding any state a previous
    /// transaction left behind.
    pub fn start_import(&mut self) {
        self.load_queue.clear();
        self.failure = None;
        self.failure_trace.clear();
    }

    /// End an import transaction. Items still parked on the load queue
    /// never received the record that settles their type.
    pub fn finish_import(&mut self) -> Result<()> {
        if !self.load_queue.is_empty() {
            return Err(Error::IncompatibleTypes(self.load_queue.len()));
        }
        Ok(())
    }

    pub fn start_export(&mut self) {
        self.export_cache.clear();
    }

    pub fn finish_export(&mut self) {
        self.export_cache.clear();
    }

    /// Import every inclusion, then dispatch deleters for the exclusions.
    /// Record classes with no registered handler are skipped.
    pub fn import_records(&mut self, bag: &impl RecordBag) -> anyhow::Result<()> {
        for record in bag.inclusions() {
            self.import_record(record)?;
        }
        for record in bag.exclusions() {
            let deleter = self.spec.deleters.get(record.class().uri()).copied();
            if let Some(deleter) = deleter {
                deleter(self, record)?;
            }
        }
        Ok(())
    }

    /// Dispatch the importer for one record inside a guarded scope.
    ///
    /// A failure - whether the handler returned it or parked it via
    /// [`record_failure`](Self::record_failure) - is annotated with the
    /// record's printable form and the captured trace, and re-raised. The
    /// failure slot is cleared either way.
    pub fn import_record(&mut self, record: &Record) -> anyhow::Result<()> {
        let importer = self.spec.importers.get(record.class().uri()).copied();
        let mut outcome = match importer {
            Some(handler) => handler(self, record),
            None => Ok(()),
        };
        if outcome.is_ok() {
            if let Some(parked) = self.failure.take() {
                outcome = Err(parked);
            }
        }
        self.failure = None;
        let trace = std::mem::take(&mut self.failure_trace);
        outcome.map_err(|e| {
            let e = e.context(format!("failed to import record {record}"));
            if trace.is_empty() {
                e
            } else {
                e.context(trace)
            }
        })
    }

    fn exporters_for(&mut self, item_type: &Arc<ItemType>) -> Arc<Vec<Exporter<S>>> {
        if let Some(cached) = self.export_cache.get(item_type.name()) {
            return cached.clone();
        }
        let mut handlers = Vec::new();
        for ancestor in item_type.ancestry().into_iter().rev() {
            if let Some(handler) = self.spec.exporters.get(ancestor.name()) {
                handlers.push(*handler);
            }
        }
        let handlers = Arc::new(handlers);
        self.export_cache
            .insert(item_type.name().to_owned(), handlers.clone());
        handlers
    }

    /// Export an item and each of its extensions: for every handle, run
    /// the exporters registered along its type's ancestor chain, base
    /// types first. The per-type handler list is computed once per
    /// transaction.
    pub fn export_item(&mut self, item: &S::Item) -> anyhow::Result<Vec<Record>> {
        let mut targets = vec![item.clone()];
        targets.extend(self.store.extensions(item));
        let mut records = Vec::new();
        for target in targets {
            let item_type = self.store.item_type(&target);
            let exporters = self.exporters_for(&item_type);
            for exporter in exporters.iter() {
                records.extend(exporter(self, &target)?);
            }
        }
        Ok(records)
    }

    /// Resolve (or lazily create) the item with `uuid`, view it through
    /// `item_type` (installing the extension if need be), smart-set
    /// `attrs`, and hand the resolved handle to `body`. Errors anywhere
    /// along the way are captured via
    /// [`record_failure`](Self::record_failure) rather than raised.
    pub fn with_item_for_uuid<F>(
        &mut self,
        uuid: &str,
        item_type: &Arc<ItemType>,
        attrs: &[(&str, Value)],
        body: F,
    ) where
        F: FnOnce(&mut Self, &S::Item) -> anyhow::Result<()>,
    {
        if let Err(failure) = self.with_item_inner(uuid, item_type, attrs, body) {
            self.record_failure(failure);
        }
    }

    fn with_item_inner<F>(
        &mut self,
        uuid: &str,
        item_type: &Arc<ItemType>,
        attrs: &[(&str, Value)],
        body: F,
    ) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Self, &S::Item) -> anyhow::Result<()>,
    {
        let item = self.store.item_for_uuid(uuid)?;
        let target = if item_type.is_addon() {
            if item_type.is_extension() && !self.store.extension_installed(&item, item_type) {
                self.store.install_extension(&item, item_type)?
            } else {
                self.store.addon_for(&item, item_type)?
            }
        } else {
            item
        };
        for (name, value) in attrs {
            self.smart_set(&target, name, value)?;
        }
        body(self, &target)
    }

    /// Assign one attribute with the sentinel semantics: `NoChange` leaves
    /// it alone, `Inherit` resets it to its declared initial value, and
    /// anything else is assigned as-is.
    pub fn smart_set(&mut self, target: &S::Item, name: &str, value: &Value) -> anyhow::Result<()> {
        match value {
            Value::NoChange => Ok(()),
            Value::Inherit => {
                let initial = self.store.initial_value(target, name)?;
                self.store.set_attribute(target, name, &initial)
            }
            other => self.store.set_attribute(target, name, other),
        }
    }

    /// One entry per asserted field of every included record, plus a
    /// "Deleted" entry per exclusion; each carries a one-record diff
    /// suitable for selective application once the user picks a side.
    pub fn explain_conflicts(&self, bag: &impl RecordBag) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for record in bag.inclusions() {
            for (field, value, singleton) in record.explain() {
                conflicts.push(Conflict {
                    field,
                    value,
                    change: Diff::from_parts([singleton], std::iter::empty()),
                });
            }
        }
        for record in bag.exclusions() {
            conflicts.push(Conflict {
                field: "Deleted".to_owned(),
                value: record.key().to_string(),
                change: Diff::from_parts(std::iter::empty(), [record.clone()]),
            });
        }
        conflicts
    }

    /// Park a failure for the framework to pick up at the end of the
    /// current record. Logged immediately at error level.
    pub fn record_failure(&mut self, failure: anyhow::Error) {
        self.failure_trace = format!("{failure:?}");
        error!("translator failure: {}", self.failure_trace);
        self.failure = Some(failure);
    }

    pub fn failure(&self) -> Option<&anyhow::Error> {
        self.failure.as_ref()
    }
}

/// One reportable conflict entry: a field label, the human-formatted
/// value, and the single-record diff asserting it.
#[derive(Debug)]
pub struct Conflict {
    pub field: String,
    pub value: String,
    pub change: Diff,
}
