/// Data structures for Tab Keeper
use crate::clock::millis;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// A saved URL
///
/// Identity is the URL string. `category` holds the project category inside
/// a project and the sub-category inside a tab group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredUrlEntry", into = "StoredUrlEntry")]
pub struct UrlEntry {
    pub url: String,
    pub title: String,
    pub saved_at: Option<f64>,
    pub fav_icon_url: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
    /// Field name `category` is written back under
    pub category_key: CategoryKey,
}

impl UrlEntry {
    pub fn new(url: impl Into<String>, title: impl Into<String>, saved_at: f64) -> UrlEntry {
        UrlEntry {
            url: url.into(),
            title: title.into(),
            saved_at: Some(saved_at),
            fav_icon_url: None,
            notes: None,
            category: None,
            category_key: CategoryKey::Category,
        }
    }
}

/// Older domain entries store their sub-category as `subCategory`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryKey {
    #[default]
    Category,
    SubCategory,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredUrlEntry {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "millis::serialize_opt")]
    saved_at: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fav_icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub_category: Option<String>,
}

impl From<StoredUrlEntry> for UrlEntry {
    fn from(stored: StoredUrlEntry) -> Self {
        let (category, category_key) = match (stored.category, stored.sub_category) {
            (None, Some(legacy)) => (Some(legacy), CategoryKey::SubCategory),
            (current, _) => (current, CategoryKey::Category),
        };
        UrlEntry {
            url: stored.url,
            title: stored.title,
            saved_at: stored.saved_at,
            fav_icon_url: stored.fav_icon_url,
            notes: stored.notes,
            category,
            category_key,
        }
    }
}

impl From<UrlEntry> for StoredUrlEntry {
    fn from(entry: UrlEntry) -> Self {
        let (category, sub_category) = match entry.category_key {
            CategoryKey::Category => (entry.category, None),
            CategoryKey::SubCategory => (None, entry.category),
        };
        StoredUrlEntry {
            url: entry.url,
            title: entry.title,
            saved_at: entry.saved_at,
            fav_icon_url: entry.fav_icon_url,
            notes: entry.notes,
            category,
            sub_category,
        }
    }
}

/// Url records addressed by id, used by the referenced encoding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlRecords(pub BTreeMap<String, UrlEntry>);

impl UrlRecords {
    pub fn get(&self, id: &str) -> Option<&UrlEntry> {
        self.0.get(id)
    }
}

/// The two on-disk shapes of a URL list
///
/// Legacy records carry `urls` inline; migrated records carry `urlIds` that
/// point into a [`UrlRecords`] table. Both are read; writes keep whichever
/// shape was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlList {
    Referenced {
        #[serde(rename = "urlIds")]
        url_ids: Vec<String>,
    },
    Inline {
        #[serde(default)]
        urls: Vec<UrlEntry>,
    },
}

impl Default for UrlList {
    fn default() -> Self {
        UrlList::Inline { urls: Vec::new() }
    }
}

impl UrlList {
    pub fn is_referenced(&self) -> bool {
        matches!(self, UrlList::Referenced { .. })
    }

    /// Normalize either encoding to entries. Dangling ids are skipped.
    pub fn resolve(&self, records: &UrlRecords) -> Vec<UrlEntry> {
        match self {
            UrlList::Inline { urls } => urls.clone(),
            UrlList::Referenced { url_ids } => url_ids
                .iter()
                .filter_map(|id| {
                    let entry = records.get(id);
                    if entry.is_none() {
                        log::warn!("dangling url record id {}", id);
                    }
                    entry.cloned()
                })
                .collect(),
        }
    }

    /// Replace the entries, keeping the current encoding
    ///
    /// Referenced lists reuse the id already assigned to a URL, allocate ids
    /// for new URLs and drop records no longer referenced.
    pub fn store(&mut self, entries: Vec<UrlEntry>, records: &mut UrlRecords) {
        match self {
            UrlList::Inline { urls } => *urls = entries,
            UrlList::Referenced { url_ids } => {
                let mut id_by_url: HashMap<String, String> = url_ids
                    .iter()
                    .filter_map(|id| records.get(id).map(|entry| (entry.url.clone(), id.clone())))
                    .collect();

                let mut next_ids = Vec::with_capacity(entries.len());
                for entry in entries {
                    let id = id_by_url
                        .remove(&entry.url)
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    records.0.insert(id.clone(), entry);
                    next_ids.push(id);
                }

                for stale in url_ids.iter().filter(|id| !next_ids.contains(id)) {
                    records.0.remove(stale);
                }
                *url_ids = next_ids;
            }
        }
    }

    /// Convert an inline list to id references. Returns false if already migrated.
    pub fn migrate(&mut self, records: &mut UrlRecords) -> bool {
        let UrlList::Inline { urls } = self else {
            return false;
        };
        let entries = std::mem::take(urls);
        *self = UrlList::Referenced { url_ids: Vec::new() };
        self.store(entries, records);
        true
    }

    /// Drop every record this list points at (owner deletion)
    pub fn release(&self, records: &mut UrlRecords) {
        if let UrlList::Referenced { url_ids } = self {
            for id in url_ids {
                records.0.remove(id);
            }
        }
    }
}

/// Keywords that auto-assign a sub-category when a tab is saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryKeywords {
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Domain-view aggregate: every saved tab sharing one origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_category_id: Option<String>,
    #[serde(flatten)]
    pub url_list: UrlList,
    #[serde(default)]
    pub sub_categories: Vec<String>,
    #[serde(default)]
    pub category_keywords: Vec<CategoryKeywords>,
    #[serde(default)]
    pub sub_category_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category_order_with_uncategorized: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "millis::serialize_opt")]
    pub saved_at: Option<f64>,
}

impl TabGroup {
    pub fn new(domain: impl Into<String>, saved_at: f64) -> TabGroup {
        TabGroup {
            id: Uuid::new_v4().to_string(),
            domain: domain.into(),
            parent_category_id: None,
            url_list: UrlList::default(),
            sub_categories: Vec::new(),
            category_keywords: Vec::new(),
            sub_category_order: Vec::new(),
            sub_category_order_with_uncategorized: None,
            saved_at: Some(saved_at),
        }
    }
}

/// A user label spanning several domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentCategory {
    pub id: String,
    pub name: String,
    /// Ids of the tab groups currently assigned
    #[serde(default)]
    pub domains: Vec<String>,
    /// Every domain that ever belonged here; append-only
    #[serde(default)]
    pub domain_names: Vec<String>,
}

/// Project-view aggregate: a curated, user-named collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomProject {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub url_list: UrlList,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub category_order: Vec<String>,
    #[serde(serialize_with = "millis::serialize")]
    pub created_at: f64,
    #[serde(serialize_with = "millis::serialize")]
    pub updated_at: f64,
}

/// Sub-category settings kept per domain after its group is deleted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainCategorySettings {
    #[serde(default)]
    pub sub_categories: Vec<String>,
    #[serde(default)]
    pub category_keywords: Vec<CategoryKeywords>,
    #[serde(default)]
    pub sub_category_order: Vec<String>,
}
