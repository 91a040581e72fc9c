/// Domain view storage: tab groups keyed by origin, parent categories, side tables
///
/// A group whose last URL goes away stays in `savedTabs` and is invisible to
/// consumers; only `remove_group` deletes one. Before it does, the group's
/// sub-category setup and parent association are parked in side tables
/// keyed by domain so a later group for the same domain picks them up again.
use crate::backend::Backend;
use crate::category::{self, CategoryLedger, DisplaySlot};
use crate::domain::{compile_exclusions, is_excluded, origin_of};
use crate::error::{Error, Result};
use crate::messages::RuntimeMessage;
use crate::operations::make_urls_unique;
use crate::settings::UserSettings;
use crate::storage::{self, keys};
use crate::tab_data::{
    CategoryKey, CategoryKeywords, DomainCategorySettings, ParentCategory, TabGroup, UrlEntry, UrlList, UrlRecords,
};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const PARENT_CATEGORY_NAME_MAX: usize = 25;

/// Result of saving a browser tab from the domain view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Matched an exclusion pattern; nothing was written
    Excluded,
    Inserted { group_id: String, created_group: bool },
    Updated { group_id: String },
}

/// Result of mirroring a project URL into the domain view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorInsert {
    Inserted { group_id: String, created_group: bool },
    AlreadyPresent { group_id: String },
}

#[derive(Clone, Copy)]
enum OnExisting {
    Keep,
    Update,
}

#[derive(Clone)]
pub struct DomainStore {
    backend: Backend,
}

impl DomainStore {
    pub fn new(backend: Backend) -> DomainStore {
        DomainStore { backend }
    }

    async fn load_groups(&self) -> Result<Vec<TabGroup>> {
        storage::load_or_default(self.backend.store(), keys::SAVED_TABS).await
    }

    async fn load_records(&self) -> Result<UrlRecords> {
        storage::load_or_default(self.backend.store(), keys::SAVED_TAB_URL_RECORDS).await
    }

    async fn write_groups(&self, groups: &[TabGroup]) -> Result<()> {
        storage::save(self.backend.store(), keys::SAVED_TABS, &groups).await
    }

    async fn write_records(&self, records: &UrlRecords) -> Result<()> {
        storage::save(self.backend.store(), keys::SAVED_TAB_URL_RECORDS, records).await
    }

    /// Records first, so a written group never points at ids that do not exist yet
    async fn commit(&self, groups: &[TabGroup], records: Option<&UrlRecords>) -> Result<()> {
        if let Some(records) = records {
            self.write_records(records).await?;
        }
        self.write_groups(groups).await
    }

    async fn load_parents(&self) -> Result<Vec<ParentCategory>> {
        storage::load_or_default(self.backend.store(), keys::PARENT_CATEGORIES).await
    }

    async fn write_parents(&self, parents: &[ParentCategory]) -> Result<()> {
        storage::save(self.backend.store(), keys::PARENT_CATEGORIES, &parents).await
    }

    pub async fn domain_category_settings(&self) -> Result<BTreeMap<String, DomainCategorySettings>> {
        storage::load_or_default(self.backend.store(), keys::DOMAIN_CATEGORY_SETTINGS).await
    }

    /// Domain to parent category id
    pub async fn domain_category_mappings(&self) -> Result<BTreeMap<String, String>> {
        storage::load_or_default(self.backend.store(), keys::DOMAIN_CATEGORY_MAPPINGS).await
    }

    /// Every group as stored, empty ones included; no migration on read
    pub async fn get(&self) -> Result<Vec<TabGroup>> {
        self.load_groups().await
    }

    /// Every group with its URLs resolved
    pub async fn resolved(&self) -> Result<Vec<(TabGroup, Vec<UrlEntry>)>> {
        let groups = self.load_groups().await?;
        let records = self.load_records().await?;
        Ok(groups
            .into_iter()
            .map(|group| {
                let entries = group.url_list.resolve(&records);
                (group, entries)
            })
            .collect())
    }

    /// Replace one group's URLs
    ///
    /// An unknown id is logged and ignored. An empty result keeps the group
    /// and broadcasts `groupEmptied`.
    pub async fn upsert_group_urls(&self, group_id: &str, urls: Vec<UrlEntry>) -> Result<()> {
        let mut groups = self.load_groups().await?;
        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            log::warn!("upsert_group_urls: no tab group {}", group_id);
            return Ok(());
        };

        let (urls, dropped) = make_urls_unique(&urls);
        if !dropped.is_empty() {
            log::warn!("Dropped {} duplicate URLs from tab group {}: {:?}", dropped.len(), group_id, dropped);
        }

        let mut records = self.load_records().await?;
        let emptied = urls.is_empty();
        group.url_list.store(urls, &mut records);
        let referenced = group.url_list.is_referenced();

        self.commit(&groups, referenced.then_some(&records)).await?;
        log::debug!("Updated URLs of tab group {}", group_id);

        if emptied {
            self.announce_emptied(group_id);
        }
        Ok(())
    }

    fn announce_emptied(&self, group_id: &str) {
        log::info!("Tab group {} is now empty", group_id);
        self.backend.broadcaster.broadcast(RuntimeMessage::GroupEmptied {
            group_id: group_id.to_string(),
        });
    }

    /// Rewrite the URL lists of every group in one pass
    ///
    /// `edit` returns whether it changed the entries. Groups that end up empty
    /// because of this pass are announced. Returns the emptied group ids.
    pub(crate) async fn rewrite_entries<F>(&self, mut edit: F) -> Result<Vec<String>>
    where
        F: FnMut(&TabGroup, &mut Vec<UrlEntry>) -> bool,
    {
        let mut groups = self.load_groups().await?;
        let mut records = self.load_records().await?;
        let mut touched_referenced = false;
        let mut emptied = Vec::new();
        let mut changed_any = false;

        for group in groups.iter_mut() {
            let mut entries = group.url_list.resolve(&records);
            let was_empty = entries.is_empty();
            if !edit(&*group, &mut entries) {
                continue;
            }
            changed_any = true;
            if entries.is_empty() && !was_empty {
                emptied.push(group.id.clone());
            }
            touched_referenced |= group.url_list.is_referenced();
            group.url_list.store(entries, &mut records);
        }

        if changed_any {
            self.commit(&groups, touched_referenced.then_some(&records)).await?;
        }
        for group_id in &emptied {
            self.announce_emptied(group_id);
        }
        Ok(emptied)
    }

    /// Remove `url` from every group holding it. Returns the ids of emptied groups.
    pub async fn remove_url_everywhere(&self, url: &str) -> Result<Vec<String>> {
        self.rewrite_entries(|_, entries| {
            let before = entries.len();
            entries.retain(|e| e.url != url);
            entries.len() != before
        })
        .await
    }

    /// Delete one URL from one group; never touches projects
    pub async fn remove_url(&self, group_id: &str, url: &str) -> Result<bool> {
        let groups = self.load_groups().await?;
        let Some(group) = groups.iter().find(|g| g.id == group_id) else {
            return Err(Error::not_found("tab group", group_id));
        };
        let records = self.load_records().await?;
        let mut entries = group.url_list.resolve(&records);
        let before = entries.len();
        entries.retain(|e| e.url != url);
        if entries.len() == before {
            return Ok(false);
        }
        self.upsert_group_urls(group_id, entries).await?;
        Ok(true)
    }

    /// Delete a group, parking its categorization in the side tables first
    pub async fn remove_group(&self, group_id: &str) -> Result<()> {
        let mut groups = self.load_groups().await?;
        let Some(index) = groups.iter().position(|g| g.id == group_id) else {
            return Err(Error::not_found("tab group", group_id));
        };
        let group = groups[index].clone();

        let mut settings = self.domain_category_settings().await?;
        settings.insert(
            group.domain.clone(),
            DomainCategorySettings {
                sub_categories: group.sub_categories.clone(),
                category_keywords: group.category_keywords.clone(),
                sub_category_order: group.sub_category_order.clone(),
            },
        );
        storage::save(self.backend.store(), keys::DOMAIN_CATEGORY_SETTINGS, &settings).await?;

        if let Some(parent_id) = &group.parent_category_id {
            let mut parents = self.load_parents().await?;
            if let Some(parent) = parents.iter_mut().find(|p| &p.id == parent_id) {
                parent.domains.retain(|id| id != group_id);
                if !parent.domain_names.contains(&group.domain) {
                    parent.domain_names.push(group.domain.clone());
                }
                self.write_parents(&parents).await?;
            } else {
                log::warn!("Tab group {} points at missing parent category {}", group_id, parent_id);
            }

            let mut mappings = self.domain_category_mappings().await?;
            mappings.insert(group.domain.clone(), parent_id.clone());
            storage::save(self.backend.store(), keys::DOMAIN_CATEGORY_MAPPINGS, &mappings).await?;
        }

        groups.remove(index);
        if group.url_list.is_referenced() {
            let mut records = self.load_records().await?;
            group.url_list.release(&mut records);
            self.commit(&groups, Some(&records)).await?;
        } else {
            self.write_groups(&groups).await?;
        }
        log::info!("Removed tab group {} ({})", group_id, group.domain);
        Ok(())
    }

    /// The group for `origin`, created (with restored categorization) if missing
    pub async fn find_or_create_group(&self, origin: &str) -> Result<TabGroup> {
        Ok(self.locate_or_create(origin).await?.0)
    }

    async fn locate_or_create(&self, origin: &str) -> Result<(TabGroup, bool)> {
        let mut groups = self.load_groups().await?;
        let records = self.load_records().await?;
        if let Some(index) = find_group_for(&groups, &records, origin) {
            return Ok((groups.swap_remove(index), false));
        }

        let referenced = groups.iter().any(|g| g.url_list.is_referenced());
        let (group, parent_id) = self.seed_group(origin, referenced).await?;
        groups.push(group.clone());
        self.write_groups(&groups).await?;
        if let Some(parent_id) = parent_id {
            self.attach_to_parent(&parent_id, &group.id, origin).await?;
        }
        log::debug!("Created tab group {} for {}", group.id, origin);
        Ok((group, true))
    }

    /// A fresh group for `origin`, plus the parent it should be attached to
    async fn seed_group(&self, origin: &str, referenced: bool) -> Result<(TabGroup, Option<String>)> {
        let mut group = TabGroup::new(origin, self.backend.now());
        if referenced {
            group.url_list = UrlList::Referenced { url_ids: Vec::new() };
        }

        if let Some(saved) = self.domain_category_settings().await?.remove(origin) {
            group.sub_category_order = if saved.sub_category_order.is_empty() {
                saved.sub_categories.clone()
            } else {
                saved.sub_category_order
            };
            group.sub_categories = saved.sub_categories;
            group.category_keywords = saved.category_keywords;
            log::debug!("Restored sub-categories for {}", origin);
        }

        let parents = self.load_parents().await?;
        let mapped = self.domain_category_mappings().await?.remove(origin);
        let parent_id = mapped
            .filter(|id| parents.iter().any(|p| &p.id == id))
            .or_else(|| {
                parents
                    .iter()
                    .find(|p| p.domain_names.iter().any(|d| d == origin))
                    .map(|p| p.id.clone())
            });
        group.parent_category_id = parent_id.clone();
        Ok((group, parent_id))
    }

    async fn attach_to_parent(&self, parent_id: &str, group_id: &str, domain: &str) -> Result<()> {
        let mut parents = self.load_parents().await?;
        if let Some(parent) = parents.iter_mut().find(|p| p.id == parent_id) {
            if !parent.domains.iter().any(|id| id == group_id) {
                parent.domains.push(group_id.to_string());
            }
            if !parent.domain_names.iter().any(|d| d == domain) {
                parent.domain_names.push(domain.to_string());
            }
            self.write_parents(&parents).await?;
        }
        Ok(())
    }

    async fn insert(&self, entry: UrlEntry, on_existing: OnExisting) -> Result<(String, bool, bool)> {
        let origin = origin_of(&entry.url).ok_or_else(|| {
            Error::validation("url", format!("cannot derive a domain from {}", entry.url))
        })?;

        let (group, created_group) = self.locate_or_create(&origin).await?;
        let mut groups = self.load_groups().await?;
        let mut records = self.load_records().await?;
        let Some(group) = groups.iter_mut().find(|g| g.id == group.id) else {
            return Err(Error::not_found("tab group", group.id));
        };

        let mut entries = group.url_list.resolve(&records);
        let inserted = match entries.iter_mut().find(|e| e.url == entry.url) {
            Some(current) => match on_existing {
                OnExisting::Keep => return Ok((group.id.clone(), created_group, false)),
                OnExisting::Update => {
                    current.title = entry.title;
                    current.saved_at = entry.saved_at.or(current.saved_at);
                    if entry.fav_icon_url.is_some() {
                        current.fav_icon_url = entry.fav_icon_url;
                    }
                    if entry.category.is_some() {
                        current.category = entry.category;
                    }
                    false
                }
            },
            None => {
                let mut entry = entry;
                if entry.category.is_none() {
                    entry.category = keyword_category(group, &entry);
                }
                entries.push(entry);
                true
            }
        };

        let group_id = group.id.clone();
        group.url_list.store(entries, &mut records);
        let referenced = group.url_list.is_referenced();
        self.commit(&groups, referenced.then_some(&records)).await?;
        Ok((group_id, created_group, inserted))
    }

    /// Save a browser tab from the domain view; projects are not involved
    pub async fn save_tab(&self, settings: &UserSettings, entry: UrlEntry) -> Result<SaveOutcome> {
        let exclusions = compile_exclusions(&settings.exclude_patterns)?;
        if is_excluded(&entry.url, &exclusions) {
            log::debug!("Not saving excluded URL {}", entry.url);
            return Ok(SaveOutcome::Excluded);
        }

        let (group_id, created_group, inserted) = self.insert(entry, OnExisting::Update).await?;
        Ok(if inserted {
            SaveOutcome::Inserted {
                group_id,
                created_group,
            }
        } else {
            SaveOutcome::Updated { group_id }
        })
    }

    /// Add a project URL to its domain group unless already present
    ///
    /// Project-only metadata (notes, project category) is not copied.
    pub async fn mirror_url(&self, entry: &UrlEntry) -> Result<MirrorInsert> {
        let mirrored = UrlEntry {
            notes: None,
            category: None,
            category_key: CategoryKey::Category,
            ..entry.clone()
        };
        let (group_id, created_group, inserted) = self.insert(mirrored, OnExisting::Keep).await?;
        Ok(if inserted {
            MirrorInsert::Inserted {
                group_id,
                created_group,
            }
        } else {
            MirrorInsert::AlreadyPresent { group_id }
        })
    }

    /// Convert every inline group to the id-referenced encoding
    pub async fn migrate_url_encoding(&self) -> Result<usize> {
        let mut groups = self.load_groups().await?;
        let mut records = self.load_records().await?;
        let migrated = groups
            .iter_mut()
            .map(|group| group.url_list.migrate(&mut records))
            .filter(|migrated| *migrated)
            .count();
        if migrated > 0 {
            self.commit(&groups, Some(&records)).await?;
            log::info!("Migrated {} tab groups to referenced URLs", migrated);
        }
        Ok(migrated)
    }

    /// Load, edit and write back one group with its resolved entries
    async fn edit_group<T, F>(&self, group_id: &str, edit: F) -> Result<T>
    where
        F: FnOnce(&mut TabGroup, &mut Vec<UrlEntry>) -> Result<T>,
    {
        let mut groups = self.load_groups().await?;
        let mut records = self.load_records().await?;
        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            return Err(Error::not_found("tab group", group_id));
        };

        let mut entries = group.url_list.resolve(&records);
        let value = edit(group, &mut entries)?;
        group.url_list.store(entries, &mut records);
        let referenced = group.url_list.is_referenced();

        self.commit(&groups, referenced.then_some(&records)).await?;
        Ok(value)
    }

    pub async fn add_sub_category(&self, group_id: &str, name: &str) -> Result<bool> {
        let name = CategoryLedger::validate_name(name)?;
        self.edit_group(group_id, |group, _| {
            Ok(CategoryLedger::new(&mut group.sub_categories, &mut group.sub_category_order).add(&name))
        })
        .await
    }

    /// Entries and keywords of the removed sub-category fall back to uncategorized
    pub async fn remove_sub_category(&self, group_id: &str, name: &str) -> Result<()> {
        self.edit_group(group_id, |group, entries| {
            let removed = CategoryLedger::new(&mut group.sub_categories, &mut group.sub_category_order)
                .remove(name);
            if let Some(removed) = removed {
                category::uncategorize(entries, &removed);
                group.category_keywords.retain(|k| k.category != removed.name);
                if let Some(display) = group.sub_category_order_with_uncategorized.as_mut() {
                    display.retain(|c| c != &removed.name);
                }
            }
            Ok(())
        })
        .await
    }

    pub async fn rename_sub_category(&self, group_id: &str, old: &str, new: &str) -> Result<()> {
        let new = CategoryLedger::validate_name(new)?;
        self.edit_group(group_id, |group, entries| {
            CategoryLedger::new(&mut group.sub_categories, &mut group.sub_category_order)
                .rename(old, &new)?;
            category::recategorize(entries, old, &new);
            for keywords in group.category_keywords.iter_mut().filter(|k| k.category == old) {
                keywords.category = new.clone();
            }
            if let Some(display) = group.sub_category_order_with_uncategorized.as_mut() {
                category::replace_name(display, old, &new);
            }
            Ok(())
        })
        .await
    }

    pub async fn reorder_sub_categories(&self, group_id: &str, order: Vec<String>) -> Result<()> {
        self.edit_group(group_id, |group, _| {
            CategoryLedger::new(&mut group.sub_categories, &mut group.sub_category_order).reorder(order);
            Ok(())
        })
        .await
    }

    /// Persist a combined order that places the uncategorized bucket too
    pub async fn set_display_order(&self, group_id: &str, slots: &[DisplaySlot]) -> Result<()> {
        let (order, with_uncategorized) = category::split_display_order(slots);
        self.edit_group(group_id, |group, _| {
            CategoryLedger::new(&mut group.sub_categories, &mut group.sub_category_order).reorder(order);
            group.sub_category_order_with_uncategorized = Some(with_uncategorized);
            Ok(())
        })
        .await
    }

    pub async fn set_category_keywords(&self, group_id: &str, keywords: Vec<CategoryKeywords>) -> Result<()> {
        self.edit_group(group_id, |group, _| {
            if let Some(unknown) = keywords.iter().find(|k| !group.sub_categories.contains(&k.category)) {
                return Err(Error::validation(
                    "categoryKeywords",
                    format!("unknown sub-category {}", unknown.category),
                ));
            }
            group.category_keywords = keywords
                .into_iter()
                .map(|k| CategoryKeywords {
                    category: k.category,
                    keywords: k
                        .keywords
                        .iter()
                        .map(|w| w.trim().to_lowercase())
                        .filter(|w| !w.is_empty())
                        .collect(),
                })
                .collect();
            Ok(())
        })
        .await
    }

    pub async fn set_url_sub_category(&self, group_id: &str, url: &str, sub_category: Option<String>) -> Result<()> {
        self.edit_group(group_id, |group, entries| {
            if let Some(name) = &sub_category {
                if !group.sub_categories.contains(name) {
                    return Err(Error::not_found("sub-category", name.clone()));
                }
            }
            let Some(entry) = entries.iter_mut().find(|e| e.url == url) else {
                return Err(Error::not_found("url", url));
            };
            entry.category = sub_category;
            Ok(())
        })
        .await
    }

    pub async fn parent_categories(&self) -> Result<Vec<ParentCategory>> {
        self.load_parents().await
    }

    fn validate_parent_name(parents: &[ParentCategory], name: &str, except_id: Option<&str>) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("parentCategory", "name must not be empty"));
        }
        if name.chars().count() > PARENT_CATEGORY_NAME_MAX {
            return Err(Error::validation(
                "parentCategory",
                format!("name must be at most {} characters", PARENT_CATEGORY_NAME_MAX),
            ));
        }
        let lowered = name.to_lowercase();
        if parents
            .iter()
            .any(|p| Some(p.id.as_str()) != except_id && p.name.to_lowercase() == lowered)
        {
            return Err(Error::duplicate("parent category", name));
        }
        Ok(name.to_string())
    }

    pub async fn create_parent_category(&self, name: &str) -> Result<ParentCategory> {
        let mut parents = self.load_parents().await?;
        let name = Self::validate_parent_name(&parents, name, None)?;
        let parent = ParentCategory {
            id: Uuid::new_v4().to_string(),
            name,
            domains: Vec::new(),
            domain_names: Vec::new(),
        };
        parents.push(parent.clone());
        self.write_parents(&parents).await?;
        log::debug!("Created parent category {}", parent.name);
        Ok(parent)
    }

    pub async fn rename_parent_category(&self, parent_id: &str, name: &str) -> Result<()> {
        let mut parents = self.load_parents().await?;
        let name = Self::validate_parent_name(&parents, name, Some(parent_id))?;
        let Some(parent) = parents.iter_mut().find(|p| p.id == parent_id) else {
            return Err(Error::not_found("parent category", parent_id));
        };
        parent.name = name;
        self.write_parents(&parents).await
    }

    /// Move a group under a parent category, or detach it with `None`
    pub async fn assign_parent_category(&self, group_id: &str, parent_id: Option<&str>) -> Result<()> {
        let mut groups = self.load_groups().await?;
        let mut parents = self.load_parents().await?;
        let Some(group) = groups.iter_mut().find(|g| g.id == group_id) else {
            return Err(Error::not_found("tab group", group_id));
        };
        if let Some(parent_id) = parent_id {
            if !parents.iter().any(|p| p.id == parent_id) {
                return Err(Error::not_found("parent category", parent_id));
            }
        }

        for parent in parents.iter_mut() {
            if Some(parent.id.as_str()) == parent_id {
                if !parent.domains.iter().any(|id| id == group_id) {
                    parent.domains.push(group_id.to_string());
                }
                if !parent.domain_names.contains(&group.domain) {
                    parent.domain_names.push(group.domain.clone());
                }
            } else {
                parent.domains.retain(|id| id != group_id);
            }
        }
        group.parent_category_id = parent_id.map(str::to_string);
        let domain = group.domain.clone();

        let mut mappings = self.domain_category_mappings().await?;
        match parent_id {
            Some(parent_id) => mappings.insert(domain, parent_id.to_string()),
            None => mappings.remove(&domain),
        };

        self.write_parents(&parents).await?;
        self.write_groups(&groups).await?;
        storage::save(self.backend.store(), keys::DOMAIN_CATEGORY_MAPPINGS, &mappings).await
    }

    /// Delete a parent category and every reference to it
    pub async fn delete_parent_category(&self, parent_id: &str) -> Result<()> {
        let mut parents = self.load_parents().await?;
        let before = parents.len();
        parents.retain(|p| p.id != parent_id);
        if parents.len() == before {
            return Err(Error::not_found("parent category", parent_id));
        }

        let mut groups = self.load_groups().await?;
        let mut detached = false;
        for group in groups.iter_mut() {
            if group.parent_category_id.as_deref() == Some(parent_id) {
                group.parent_category_id = None;
                detached = true;
            }
        }

        let mut mappings = self.domain_category_mappings().await?;
        let mapped = mappings.len();
        mappings.retain(|_, id| id.as_str() != parent_id);

        if detached {
            self.write_groups(&groups).await?;
        }
        if mappings.len() != mapped {
            storage::save(self.backend.store(), keys::DOMAIN_CATEGORY_MAPPINGS, &mappings).await?;
        }
        self.write_parents(&parents).await
    }
}

/// Index of the group for `origin`, preferring one that still holds URLs
fn find_group_for(groups: &[TabGroup], records: &UrlRecords, origin: &str) -> Option<usize> {
    let mut empty_match = None;
    for (index, group) in groups.iter().enumerate() {
        if group.domain != origin {
            continue;
        }
        if !group.url_list.resolve(records).is_empty() {
            return Some(index);
        }
        empty_match.get_or_insert(index);
    }
    empty_match
}

/// First sub-category whose keywords occur in the entry's title or URL
fn keyword_category(group: &TabGroup, entry: &UrlEntry) -> Option<String> {
    let haystack = format!("{} {}", entry.title, entry.url).to_lowercase();
    group
        .category_keywords
        .iter()
        .filter(|k| group.sub_categories.contains(&k.category))
        .find(|k| {
            k.keywords
                .iter()
                .any(|w| !w.is_empty() && haystack.contains(&w.to_lowercase()))
        })
        .map(|k| k.category.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::UNCATEGORIZED;
    use crate::storage::KeyValueStore;
    use crate::testing::{T0, harness};
    use futures::executor::block_on;
    use serde_json::json;

    fn tab(url: &str, title: &str) -> UrlEntry {
        UrlEntry::new(url, title, T0)
    }

    fn inserted_group(outcome: SaveOutcome) -> String {
        match outcome {
            SaveOutcome::Inserted { group_id, .. } => group_id,
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_save_tab_creates_group_per_origin() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());
        let settings = UserSettings::default();

        block_on(async {
            let first = store.save_tab(&settings, tab("https://github.com/rust-lang", "Rust")).await.unwrap();
            let second = store.save_tab(&settings, tab("https://github.com/tokio-rs", "Tokio")).await.unwrap();
            store.save_tab(&settings, tab("https://docs.rs/serde", "serde")).await.unwrap();

            assert!(matches!(first, SaveOutcome::Inserted { created_group: true, .. }));
            assert!(matches!(second, SaveOutcome::Inserted { created_group: false, .. }));

            let groups = store.resolved().await.unwrap();
            assert_eq!(groups.len(), 2);
            assert_eq!(groups[0].0.domain, "https://github.com");
            assert_eq!(groups[0].1.len(), 2);
            assert_eq!(groups[1].0.domain, "https://docs.rs");
        });
    }

    #[test]
    fn test_save_tab_twice_updates_in_place() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());
        let settings = UserSettings::default();

        block_on(async {
            store.save_tab(&settings, tab("https://a.com/x", "Old")).await.unwrap();
            let mut again = tab("https://a.com/x", "New");
            again.saved_at = Some(T0 + 10.0);
            let outcome = store.save_tab(&settings, again).await.unwrap();

            assert!(matches!(outcome, SaveOutcome::Updated { .. }));
            let groups = store.resolved().await.unwrap();
            assert_eq!(groups[0].1.len(), 1);
            assert_eq!(groups[0].1[0].title, "New");
            assert_eq!(groups[0].1[0].saved_at, Some(T0 + 10.0));
        });
    }

    #[test]
    fn test_excluded_and_invalid_urls_write_nothing() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());
        let mut settings = UserSettings::default();
        settings.exclude_patterns = vec!["*://mail.google.com/*".to_string()];

        block_on(async {
            let outcome = store
                .save_tab(&settings, tab("https://mail.google.com/mail/u/0", "Inbox"))
                .await
                .unwrap();
            assert_eq!(outcome, SaveOutcome::Excluded);

            let err = store.save_tab(&settings, tab("not a url", "?")).await.unwrap_err();
            assert!(matches!(err, Error::Validation { field: "url", .. }));
        });
        assert_eq!(h.store.inner.snapshot(keys::SAVED_TABS), None);
    }

    #[test]
    fn test_upsert_to_empty_keeps_group_and_announces() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            let group_id = inserted_group(
                store
                    .save_tab(&UserSettings::default(), tab("https://a.com/1", "one"))
                    .await
                    .unwrap(),
            );
            store.upsert_group_urls(&group_id, vec![]).await.unwrap();

            let groups = store.get().await.unwrap();
            assert_eq!(groups.len(), 1);
            assert_eq!(groups[0].url_list, UrlList::Inline { urls: vec![] });
            assert_eq!(h.broadcaster.emptied(), vec![group_id]);
        });
    }

    #[test]
    fn test_upsert_keeps_first_of_each_url() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            let group_id = inserted_group(
                store
                    .save_tab(&UserSettings::default(), tab("https://a.com/1", "one"))
                    .await
                    .unwrap(),
            );
            store
                .upsert_group_urls(
                    &group_id,
                    vec![
                        tab("https://a.com/1", "first"),
                        tab("https://a.com/2", "two"),
                        tab("https://a.com/1", "again"),
                    ],
                )
                .await
                .unwrap();

            let resolved = store.resolved().await.unwrap();
            let entries: Vec<(&str, &str)> = resolved[0]
                .1
                .iter()
                .map(|e| (e.url.as_str(), e.title.as_str()))
                .collect();
            assert_eq!(entries, vec![("https://a.com/1", "first"), ("https://a.com/2", "two")]);
        });
    }

    #[test]
    fn test_upsert_unknown_group_is_silent() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(store.upsert_group_urls("missing", vec![tab("https://a.com", "a")])).unwrap();

        assert_eq!(h.store.inner.snapshot(keys::SAVED_TABS), None);
        assert!(h.broadcaster.messages().is_empty());
    }

    #[test]
    fn test_empty_group_is_reused_for_same_origin() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());
        let settings = UserSettings::default();

        block_on(async {
            let group_id = inserted_group(store.save_tab(&settings, tab("https://a.com/1", "one")).await.unwrap());
            store.remove_url(&group_id, "https://a.com/1").await.unwrap();

            let outcome = store.save_tab(&settings, tab("https://a.com/2", "two")).await.unwrap();
            assert_eq!(
                outcome,
                SaveOutcome::Inserted {
                    group_id: group_id.clone(),
                    created_group: false
                }
            );
            assert_eq!(store.get().await.unwrap().len(), 1);
        });
    }

    #[test]
    fn test_remove_group_parks_and_restores_categorization() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());
        let settings = UserSettings::default();

        block_on(async {
            let group_id = inserted_group(store.save_tab(&settings, tab("https://news.site/a", "a")).await.unwrap());
            store.add_sub_category(&group_id, "politics").await.unwrap();
            store.add_sub_category(&group_id, "sport").await.unwrap();
            store
                .set_category_keywords(
                    &group_id,
                    vec![CategoryKeywords {
                        category: "sport".to_string(),
                        keywords: vec!["Football".to_string()],
                    }],
                )
                .await
                .unwrap();
            let parent = store.create_parent_category("News").await.unwrap();
            store.assign_parent_category(&group_id, Some(&parent.id)).await.unwrap();

            store.remove_group(&group_id).await.unwrap();

            assert!(store.get().await.unwrap().is_empty());
            let parked = store.domain_category_settings().await.unwrap();
            assert_eq!(parked["https://news.site"].sub_categories, vec!["politics", "sport"]);
            let mappings = store.domain_category_mappings().await.unwrap();
            assert_eq!(mappings["https://news.site"], parent.id);
            let parents = store.parent_categories().await.unwrap();
            assert!(parents[0].domains.is_empty());
            assert_eq!(parents[0].domain_names, vec!["https://news.site"]);

            let outcome = store
                .save_tab(&settings, tab("https://news.site/match-report", "Football final"))
                .await
                .unwrap();
            let new_id = inserted_group(outcome);
            assert_ne!(new_id, group_id);

            let (group, entries) = store.resolved().await.unwrap().remove(0);
            assert_eq!(group.sub_categories, vec!["politics", "sport"]);
            assert_eq!(group.sub_category_order, vec!["politics", "sport"]);
            assert_eq!(group.parent_category_id.as_deref(), Some(parent.id.as_str()));
            assert_eq!(entries[0].category.as_deref(), Some("sport"));
            let parents = store.parent_categories().await.unwrap();
            assert_eq!(parents[0].domains, vec![new_id]);
        });
    }

    #[test]
    fn test_domain_names_alone_reassociate() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            let parent = store.create_parent_category("Work").await.unwrap();
            let mut parents = store.parent_categories().await.unwrap();
            parents[0].domain_names.push("https://jira.example".to_string());
            storage::save(h.backend.store(), keys::PARENT_CATEGORIES, &parents).await.unwrap();

            let group = store.find_or_create_group("https://jira.example").await.unwrap();

            assert_eq!(group.parent_category_id, Some(parent.id));
        });
    }

    #[test]
    fn test_remove_group_unknown_fails() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());
        assert!(block_on(store.remove_group("nope")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_sub_category_remove_cascades() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            let group_id = inserted_group(
                store
                    .save_tab(&UserSettings::default(), tab("https://a.com/1", "one"))
                    .await
                    .unwrap(),
            );
            store.add_sub_category(&group_id, "docs").await.unwrap();
            store.add_sub_category(&group_id, "blog").await.unwrap();
            store
                .set_url_sub_category(&group_id, "https://a.com/1", Some("docs".to_string()))
                .await
                .unwrap();
            store
                .set_category_keywords(
                    &group_id,
                    vec![CategoryKeywords {
                        category: "docs".to_string(),
                        keywords: vec!["api".to_string()],
                    }],
                )
                .await
                .unwrap();
            store
                .set_display_order(
                    &group_id,
                    &[
                        DisplaySlot::Uncategorized,
                        DisplaySlot::Named("blog".to_string()),
                        DisplaySlot::Named("docs".to_string()),
                    ],
                )
                .await
                .unwrap();

            store.remove_sub_category(&group_id, "docs").await.unwrap();

            let (group, entries) = store.resolved().await.unwrap().remove(0);
            assert_eq!(group.sub_categories, vec!["blog"]);
            assert_eq!(group.sub_category_order, vec!["blog"]);
            assert!(group.category_keywords.is_empty());
            assert_eq!(
                group.sub_category_order_with_uncategorized,
                Some(vec![UNCATEGORIZED.to_string(), "blog".to_string()])
            );
            assert_eq!(entries[0].category, None);
        });
    }

    #[test]
    fn test_sub_category_rename_cascades_and_rejects_duplicates() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            let group_id = inserted_group(
                store
                    .save_tab(&UserSettings::default(), tab("https://a.com/1", "one"))
                    .await
                    .unwrap(),
            );
            store.add_sub_category(&group_id, "docs").await.unwrap();
            store.add_sub_category(&group_id, "blog").await.unwrap();
            store
                .set_url_sub_category(&group_id, "https://a.com/1", Some("docs".to_string()))
                .await
                .unwrap();

            let err = store.rename_sub_category(&group_id, "docs", "blog").await.unwrap_err();
            assert!(err.is_duplicate_name());

            store.rename_sub_category(&group_id, "docs", "reference").await.unwrap();
            let (group, entries) = store.resolved().await.unwrap().remove(0);
            assert_eq!(group.sub_categories, vec!["reference", "blog"]);
            assert_eq!(entries[0].category.as_deref(), Some("reference"));
        });
    }

    #[test]
    fn test_keywords_must_reference_sub_categories() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            let group = store.find_or_create_group("https://a.com").await.unwrap();
            let err = store
                .set_category_keywords(
                    &group.id,
                    vec![CategoryKeywords {
                        category: "ghost".to_string(),
                        keywords: vec!["x".to_string()],
                    }],
                )
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
        });
    }

    #[test]
    fn test_parent_category_name_rules() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            store.create_parent_category("Reading").await.unwrap();

            assert!(store.create_parent_category("reading").await.unwrap_err().is_duplicate_name());
            assert!(matches!(
                store.create_parent_category(&"x".repeat(26)).await.unwrap_err(),
                Error::Validation { .. }
            ));
            assert!(store.create_parent_category(&"x".repeat(25)).await.is_ok());
            assert!(matches!(
                store.create_parent_category("   ").await.unwrap_err(),
                Error::Validation { .. }
            ));
        });
        assert_eq!(block_on(store.parent_categories()).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_parent_category_clears_references() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            let group = store.find_or_create_group("https://a.com").await.unwrap();
            let parent = store.create_parent_category("Misc").await.unwrap();
            store.assign_parent_category(&group.id, Some(&parent.id)).await.unwrap();
            store.rename_parent_category(&parent.id, "Other").await.unwrap();

            store.delete_parent_category(&parent.id).await.unwrap();

            assert!(store.parent_categories().await.unwrap().is_empty());
            assert_eq!(store.get().await.unwrap()[0].parent_category_id, None);
            assert!(store.domain_category_mappings().await.unwrap().is_empty());
            assert!(store.delete_parent_category(&parent.id).await.unwrap_err().is_not_found());
        });
    }

    #[test]
    fn test_reads_never_migrate_legacy_groups() {
        let h = harness();
        let legacy = json!([{
            "id": "legacy",
            "domain": "https://a.com",
            "urls": [{"url": "https://a.com/1", "title": "one", "savedAt": T0}]
        }]);
        block_on(h.store.inner.set(keys::SAVED_TABS, legacy.clone())).unwrap();
        let store = DomainStore::new(h.backend.clone());

        block_on(async {
            let groups = store.get().await.unwrap();
            assert!(!groups[0].url_list.is_referenced());
            store.resolved().await.unwrap();
        });
        assert_eq!(h.store.inner.snapshot(keys::SAVED_TABS), Some(legacy));
    }

    #[test]
    fn test_unrelated_write_keeps_legacy_entry_shape() {
        let h = harness();
        let legacy = json!([{
            "id": "legacy",
            "domain": "https://a.com",
            "subCategories": ["news"],
            "urls": [{"url": "https://a.com/1", "title": "one", "savedAt": 1700000000000u64, "subCategory": "news"}]
        }]);
        block_on(h.store.inner.set(keys::SAVED_TABS, legacy.clone())).unwrap();
        let store = DomainStore::new(h.backend.clone());

        block_on(store.save_tab(&UserSettings::default(), tab("https://b.com/1", "b"))).unwrap();

        let raw = h.store.inner.snapshot(keys::SAVED_TABS).unwrap();
        assert_eq!(raw[0]["urls"], legacy[0]["urls"]);
        assert!(raw[0]["urls"][0].get("category").is_none());
        assert_eq!(raw[1]["urls"][0]["savedAt"], json!(1700000000000u64));
        let groups = block_on(store.resolved()).unwrap();
        assert_eq!(groups[0].1[0].category.as_deref(), Some("news"));
    }

    #[test]
    fn test_migration_then_writes_keep_referenced_shape() {
        let h = harness();
        let store = DomainStore::new(h.backend.clone());
        let settings = UserSettings::default();

        block_on(async {
            store.save_tab(&settings, tab("https://a.com/1", "one")).await.unwrap();
            assert_eq!(store.migrate_url_encoding().await.unwrap(), 1);
            assert_eq!(store.migrate_url_encoding().await.unwrap(), 0);

            store.save_tab(&settings, tab("https://a.com/2", "two")).await.unwrap();
            store.save_tab(&settings, tab("https://b.com/1", "b")).await.unwrap();

            let raw = h.store.inner.snapshot(keys::SAVED_TABS).unwrap();
            assert_eq!(raw[0]["urlIds"].as_array().unwrap().len(), 2);
            assert_eq!(raw[1]["urlIds"].as_array().unwrap().len(), 1);
            assert!(raw[0].get("urls").is_none());

            let groups = store.resolved().await.unwrap();
            assert_eq!(groups[0].1[1].url, "https://a.com/2");

            let group_id = groups[1].0.id.clone();
            store.remove_group(&group_id).await.unwrap();
            let records = h.store.inner.snapshot(keys::SAVED_TAB_URL_RECORDS).unwrap();
            assert_eq!(records.as_object().unwrap().len(), 2);
        });
    }
}
