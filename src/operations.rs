/// View-side helpers: visibility, grouping, uniqueness
use crate::category::{DisplaySlot, display_order};
use crate::tab_data::{ParentCategory, TabGroup, UrlEntry};
use std::collections::{HashMap, HashSet};

/// Groups worth rendering; empty groups are kept in storage but never shown
pub fn visible_groups(groups: &[(TabGroup, Vec<UrlEntry>)]) -> Vec<&(TabGroup, Vec<UrlEntry>)> {
    groups.iter().filter(|(_, entries)| !entries.is_empty()).collect()
}

/// Visible groups bucketed under their parent category
///
/// Parents come in stored order, each followed by its groups; groups without
/// a (known) parent land in the trailing `None` bucket. Parents with no
/// visible group are skipped.
pub fn group_by_parent<'a>(
    groups: &'a [(TabGroup, Vec<UrlEntry>)],
    parents: &'a [ParentCategory],
) -> Vec<(Option<&'a ParentCategory>, Vec<&'a (TabGroup, Vec<UrlEntry>)>)> {
    let known: HashMap<&str, usize> = parents
        .iter()
        .enumerate()
        .map(|(i, parent)| (parent.id.as_str(), i))
        .collect();

    let mut buckets: Vec<Vec<&(TabGroup, Vec<UrlEntry>)>> = vec![Vec::new(); parents.len()];
    let mut orphans = Vec::new();
    for item in visible_groups(groups) {
        match item.0.parent_category_id.as_deref().and_then(|id| known.get(id)) {
            Some(&index) => buckets[index].push(item),
            None => orphans.push(item),
        }
    }

    let mut result: Vec<_> = parents
        .iter()
        .zip(buckets)
        .filter(|(_, members)| !members.is_empty())
        .map(|(parent, members)| (Some(parent), members))
        .collect();
    if !orphans.is_empty() {
        result.push((None, orphans));
    }
    result
}

/// Make entries unique by URL (keep first occurrence). Returns the kept
/// entries and the URLs of the dropped duplicates.
pub fn make_urls_unique(entries: &[UrlEntry]) -> (Vec<UrlEntry>, Vec<String>) {
    let mut seen_urls = HashSet::new();
    let mut keep = Vec::new();
    let mut dropped = Vec::new();

    for entry in entries {
        if seen_urls.insert(entry.url.as_str()) {
            keep.push(entry.clone());
        } else {
            dropped.push(entry.url.clone());
        }
    }

    (keep, dropped)
}

/// A group's entries laid out by its display order
///
/// Entries whose sub-category is unknown to the group fall into the
/// uncategorized slot. Empty slots are omitted.
pub fn entries_by_sub_category<'a>(
    group: &TabGroup,
    entries: &'a [UrlEntry],
) -> Vec<(DisplaySlot, Vec<&'a UrlEntry>)> {
    let slots = display_order(
        &group.sub_category_order,
        group.sub_category_order_with_uncategorized.as_deref(),
    );

    slots
        .into_iter()
        .filter_map(|slot| {
            let members: Vec<&UrlEntry> = entries
                .iter()
                .filter(|entry| {
                    let named = entry
                        .category
                        .as_deref()
                        .filter(|name| group.sub_categories.iter().any(|c| c == name));
                    match (&slot, named) {
                        (DisplaySlot::Named(name), Some(category)) => name == category,
                        (DisplaySlot::Uncategorized, None) => true,
                        _ => false,
                    }
                })
                .collect();
            (!members.is_empty()).then_some((slot, members))
        })
        .collect()
}
