/// In-process store with the same change-notification contract as chrome.storage
use super::{KeyValueStore, StorageChange};
use crate::error::Result;
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<BTreeMap<String, Value>>,
    listeners: RefCell<Vec<UnboundedSender<StorageChange>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek, for diagnostics and tests
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    fn notify(&self, change: StorageChange) {
        if change.old_value == change.new_value {
            return;
        }
        // Closed receivers are dropped here
        self.listeners
            .borrow_mut()
            .retain(|listener| listener.unbounded_send(change.clone()).is_ok());
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let old_value = self
            .values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        self.notify(StorageChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let old_value = self.values.borrow_mut().remove(key);
        self.notify(StorageChange {
            key: key.to_string(),
            old_value,
            new_value: None,
        });
        Ok(())
    }

    fn subscribe(&self) -> UnboundedReceiver<StorageChange> {
        let (sender, receiver) = mpsc::unbounded();
        self.listeners.borrow_mut().push(sender);
        receiver
    }
}
