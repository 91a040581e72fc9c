/// chrome.storage.local bridge
use super::{KeyValueStore, StorageChange};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/storage.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: JsValue) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch)]
    async fn removeStorage(key: &str) -> std::result::Result<(), JsValue>;

    fn onStorageChanged(callback: &js_sys::Function);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeStorage;

impl ChromeStorage {
    pub fn new() -> Self {
        ChromeStorage
    }
}

fn to_js(value: &Value) -> Result<JsValue> {
    // Plain objects, not ES Maps
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| Error::Storage(format!("Failed to serialize value: {:?}", e)))
}

fn from_js(value: JsValue) -> Option<Value> {
    if value.is_null() || value.is_undefined() {
        return None;
    }
    match serde_wasm_bindgen::from_value(value) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Failed to parse storage value: {:?}", e);
            None
        }
    }
}

#[async_trait(?Send)]
impl KeyValueStore for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let value = getStorage(key)
            .await
            .map_err(|e| Error::Storage(format!("Failed to get {}: {:?}", key, e)))?;
        Ok(from_js(value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let value = to_js(&value)?;
        setStorage(key, value)
            .await
            .map_err(|e| Error::Storage(format!("Failed to save {}: {:?}", key, e)))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        removeStorage(key)
            .await
            .map_err(|e| Error::Storage(format!("Failed to remove {}: {:?}", key, e)))
    }

    fn subscribe(&self) -> UnboundedReceiver<StorageChange> {
        let (sender, receiver) = mpsc::unbounded();
        let callback = Closure::wrap(Box::new(move |key: String, old_value: JsValue, new_value: JsValue| {
            let change = StorageChange {
                key,
                old_value: from_js(old_value),
                new_value: from_js(new_value),
            };
            if sender.unbounded_send(change).is_err() {
                log::debug!("storage change listener dropped");
            }
        }) as Box<dyn Fn(String, JsValue, JsValue)>);

        onStorageChanged(callback.as_ref().unchecked_ref());
        // The listener lives as long as the extension page
        callback.forget();
        receiver
    }
}
