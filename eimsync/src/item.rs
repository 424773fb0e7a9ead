/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! # The item-model surface consumed by translators.
//!
//! The synchronization core never owns application items; it drives them
//! through the [`ItemStore`] trait, which is the whole of what a hosting
//! object model must provide: items resolvable (or lazily creatable) by
//! UUID, a mutable attribute namespace with declared initial values, and
//! add-ons/extensions attachable to items.
//!
//! Item *types* are described to the core as [`ItemType`] descriptors: a
//! name, an optional parent (single inheritance), and a role saying
//! whether the type is a plain item, an add-on, or an installable
//! extension. The parent chain is what export walks to find every
//! applicable exporter, base types first.

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// How an [`ItemType`] attaches to the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    /// A free-standing item.
    Item,
    /// A facet always available on its item.
    AddOn,
    /// An add-on that must be explicitly installed on an item before use.
    Extension,
}

/// Runtime descriptor for a kind of item or add-on.
#[derive(Debug)]
pub struct ItemType {
    name: String,
    role: ItemRole,
    parent: Option<Arc<ItemType>>,
}

impl ItemType {
    pub fn item(name: &str) -> Arc<ItemType> {
        Arc::new(ItemType {
            name: name.to_owned(),
            role: ItemRole::Item,
            parent: None,
        })
    }

    pub fn addon(name: &str) -> Arc<ItemType> {
        Arc::new(ItemType {
            name: name.to_owned(),
            role: ItemRole::AddOn,
            parent: None,
        })
    }

    pub fn extension(name: &str) -> Arc<ItemType> {
        Arc::new(ItemType {
            name: name.to_owned(),
            role: ItemRole::Extension,
            parent: None,
        })
    }

    /// A subtype of `parent`, inheriting its role.
    pub fn derive(parent: &Arc<ItemType>, name: &str) -> Arc<ItemType> {
        Arc::new(ItemType {
            name: name.to_owned(),
            role: parent.role,
            parent: Some(parent.clone()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> ItemRole {
        self.role
    }

    pub fn parent(&self) -> Option<&Arc<ItemType>> {
        self.parent.as_ref()
    }

    pub fn is_addon(&self) -> bool {
        !matches!(self.role, ItemRole::Item)
    }

    pub fn is_extension(&self) -> bool {
        matches!(self.role, ItemRole::Extension)
    }

    /// This type and its ancestors, most-derived first.
    pub fn ancestry(&self) -> Vec<&ItemType> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            chain.push(parent);
            current = parent;
        }
        chain
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The hosting object model, as translators see it.
///
/// `Item` is an opaque, cheaply clonable handle; the store interprets it.
/// Handler errors are application errors, so everything fallible returns
/// `anyhow::Result`.
pub trait ItemStore {
    type Item: Clone;

    /// Return the item with this UUID, creating it if it doesn't exist.
    fn item_for_uuid(&mut self, uuid: &str) -> anyhow::Result<Self::Item>;

    /// The most-derived type of `item`.
    fn item_type(&self, item: &Self::Item) -> Arc<ItemType>;

    /// Add-ons currently attached to `item`.
    fn extensions(&self, item: &Self::Item) -> Vec<Self::Item>;

    /// View `item` through the given add-on type, without installing
    /// anything.
    fn addon_for(&mut self, item: &Self::Item, ty: &Arc<ItemType>) -> anyhow::Result<Self::Item>;

    /// Whether the extension type is already installed on `item`.
    fn extension_installed(&self, item: &Self::Item, ty: &Arc<ItemType>) -> bool;

    /// Install the extension type on `item`, returning the extension
    /// handle.
    fn install_extension(
        &mut self,
        item: &Self::Item,
        ty: &Arc<ItemType>,
    ) -> anyhow::Result<Self::Item>;

    /// Assign an attribute on an item or add-on handle.
    fn set_attribute(
        &mut self,
        target: &Self::Item,
        name: &str,
        value: &Value,
    ) -> anyhow::Result<()>;

    /// The declared initial value of an attribute, used to honor
    /// [`Value::Inherit`].
    fn initial_value(&self, target: &Self::Item, name: &str) -> anyhow::Result<Value>;

    /// The stable UUID of an item.
    fn uuid(&self, item: &Self::Item) -> String;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ancestry_is_most_derived_first() {
        let base = ItemType::item("Item");
        let note = ItemType::derive(&base, "Note");
        let event = ItemType::derive(&note, "Event");
        let names: Vec<&str> = event.ancestry().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Event", "Note", "Item"]);
    }

    #[test]
    fn derived_types_keep_their_role() {
        let ext = ItemType::extension("Reminders");
        let derived = ItemType::derive(&ext, "SnoozedReminders");
        assert!(derived.is_extension());
        assert!(derived.is_addon());
        assert!(!ItemType::item("Item").is_addon());
    }
}
