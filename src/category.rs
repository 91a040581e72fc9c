/// Category bookkeeping for one owner (a tab group or a project)
///
/// The ledger edits the `(categories, order)` pair in place. Entries that
/// point at a category by name are rewritten by the caller through
/// [`uncategorize`] and [`recategorize`].
use crate::error::{Error, Result};
use crate::tab_data::UrlEntry;

/// Marker for the virtual uncategorized bucket inside a display order
pub const UNCATEGORIZED: &str = "__uncategorized__";

/// Signal returned by [`CategoryLedger::remove`]; referencing entries must be
/// moved to uncategorized
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct RemovedCategory {
    pub name: String,
}

pub struct CategoryLedger<'a> {
    categories: &'a mut Vec<String>,
    order: &'a mut Vec<String>,
}

impl<'a> CategoryLedger<'a> {
    pub fn new(categories: &'a mut Vec<String>, order: &'a mut Vec<String>) -> Self {
        CategoryLedger { categories, order }
    }

    /// Trim and check a user-supplied name
    pub fn validate_name(name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("category", "name must not be empty"));
        }
        if name == UNCATEGORIZED {
            return Err(Error::validation("category", format!("{} is reserved", UNCATEGORIZED)));
        }
        Ok(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.iter().any(|c| c == name)
    }

    /// Append to both lists. Returns false (no-op) if the name is taken.
    pub fn add(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.categories.push(name.to_string());
        if !self.order.iter().any(|c| c == name) {
            self.order.push(name.to_string());
        }
        true
    }

    /// Drop from both lists, stale order entries included
    pub fn remove(&mut self, name: &str) -> Option<RemovedCategory> {
        let before = self.categories.len() + self.order.len();
        self.categories.retain(|c| c != name);
        self.order.retain(|c| c != name);
        (self.categories.len() + self.order.len() < before).then(|| RemovedCategory {
            name: name.to_string(),
        })
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if !self.contains(old) {
            return Err(Error::not_found("category", old));
        }
        if old == new {
            return Ok(());
        }
        if self.contains(new) {
            return Err(Error::duplicate("category", new));
        }
        replace_name(self.categories, old, new);
        replace_name(self.order, old, new);
        Ok(())
    }

    /// Replace the order verbatim; callers guarantee it is a permutation
    pub fn reorder(&mut self, new_order: Vec<String>) {
        *self.order = new_order;
    }
}

/// Substitute `old` with `new` wherever it occurs in a name list
pub fn replace_name(names: &mut [String], old: &str, new: &str) {
    for name in names.iter_mut().filter(|name| name.as_str() == old) {
        *name = new.to_string();
    }
}

/// Whether `order` names each category exactly once
pub fn is_permutation(order: &[String], categories: &[String]) -> bool {
    let mut sorted_order = order.to_vec();
    let mut sorted_categories = categories.to_vec();
    sorted_order.sort();
    sorted_categories.sort();
    sorted_order == sorted_categories
}

/// Move every entry of a removed category to uncategorized
pub fn uncategorize(entries: &mut [UrlEntry], removed: &RemovedCategory) -> usize {
    let mut touched = 0;
    for entry in entries.iter_mut() {
        if entry.category.as_deref() == Some(removed.name.as_str()) {
            entry.category = None;
            touched += 1;
        }
    }
    touched
}

/// Point every entry of `old` at `new`
pub fn recategorize(entries: &mut [UrlEntry], old: &str, new: &str) -> usize {
    let mut touched = 0;
    for entry in entries.iter_mut() {
        if entry.category.as_deref() == Some(old) {
            entry.category = Some(new.to_string());
            touched += 1;
        }
    }
    touched
}

/// One position in a combined display order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplaySlot {
    Named(String),
    Uncategorized,
}

/// Combined order of named categories and the uncategorized bucket
///
/// `with_uncategorized` wins where present; names it lacks are appended in
/// `order` sequence and a missing uncategorized slot goes last. Names no
/// longer in `order` are ignored.
pub fn display_order(order: &[String], with_uncategorized: Option<&[String]>) -> Vec<DisplaySlot> {
    let mut slots = Vec::with_capacity(order.len() + 1);
    let mut has_uncategorized = false;

    for name in with_uncategorized.unwrap_or_default() {
        if name == UNCATEGORIZED {
            if !has_uncategorized {
                slots.push(DisplaySlot::Uncategorized);
                has_uncategorized = true;
            }
        } else if order.contains(name) && !slots.contains(&DisplaySlot::Named(name.clone())) {
            slots.push(DisplaySlot::Named(name.clone()));
        }
    }

    for name in order {
        let slot = DisplaySlot::Named(name.clone());
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }

    if !has_uncategorized {
        slots.push(DisplaySlot::Uncategorized);
    }
    slots
}

/// Split a display order into `(order, with_uncategorized)`
pub fn split_display_order(slots: &[DisplaySlot]) -> (Vec<String>, Vec<String>) {
    let mut order = Vec::with_capacity(slots.len());
    let mut with_uncategorized = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            DisplaySlot::Named(name) => {
                order.push(name.clone());
                with_uncategorized.push(name.clone());
            }
            DisplaySlot::Uncategorized => with_uncategorized.push(UNCATEGORIZED.to_string()),
        }
    }
    (order, with_uncategorized)
}
