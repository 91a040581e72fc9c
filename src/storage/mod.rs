/// Key-value storage seam (chrome.storage.local semantics)
///
/// Whole values are read and written per key with last-write-wins and no
/// transactions. Every mutator in this crate is a read-modify-write of one
/// key; nothing serializes concurrent writers.
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::channel::mpsc::UnboundedReceiver;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

mod memory;
pub use memory::MemoryStore;

#[cfg(target_arch = "wasm32")]
mod chrome;
#[cfg(target_arch = "wasm32")]
pub use chrome::ChromeStorage;

/// Persisted keys
pub mod keys {
    pub const USER_SETTINGS: &str = "userSettings";
    pub const SAVED_TABS: &str = "savedTabs";
    pub const SAVED_TAB_URL_RECORDS: &str = "savedTabUrlRecords";
    pub const CUSTOM_PROJECTS: &str = "customProjects";
    pub const CUSTOM_PROJECT_URL_RECORDS: &str = "customProjectUrlRecords";
    pub const CUSTOM_PROJECT_ORDER: &str = "customProjectOrder";
    pub const PARENT_CATEGORIES: &str = "parentCategories";
    pub const VIEW_MODE: &str = "viewMode";
    pub const DOMAIN_CATEGORY_SETTINGS: &str = "domainCategorySettings";
    pub const DOMAIN_CATEGORY_MAPPINGS: &str = "domainCategoryMappings";
}

/// A per-key change notification; `None` means the key is absent
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[async_trait(?Send)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Changes made after this call, including the subscriber's own writes
    fn subscribe(&self) -> UnboundedReceiver<StorageChange>;
}

/// Read and decode one key; `None` if absent or null
///
/// Failures are logged here, once for every store operation built on top.
pub async fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    let loaded = match store.get(key).await {
        Ok(None | Some(Value::Null)) => Ok(None),
        Ok(Some(value)) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| Error::Decode {
                key: key.to_string(),
                source,
            }),
        Err(e) => Err(e),
    };
    loaded.inspect_err(|e| log::error!("Failed to load {}: {}", key, e))
}

/// Read and decode one key, falling back to `T::default()` when absent
pub async fn load_or_default<T: DeserializeOwned + Default>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<T> {
    Ok(load(store, key).await?.unwrap_or_default())
}

pub async fn save<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value).map_err(|source| Error::Encode {
        key: key.to_string(),
        source,
    });
    let saved = match value {
        Ok(value) => store.set(key, value).await,
        Err(e) => Err(e),
    };
    saved.inspect_err(|e| log::error!("Failed to save {}: {}", key, e))
}
