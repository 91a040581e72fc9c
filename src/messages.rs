/// Messages broadcast to the other open surfaces of the extension
use crate::period::Period;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RuntimeMessage {
    /// Ask the background surface to re-evaluate expiry
    #[serde(rename_all = "camelCase")]
    CheckExpiredTabs {
        update_timestamps: bool,
        period: Period,
        force_reload: bool,
    },
    /// A tab group lost its last URL and is now invisible
    #[serde(rename_all = "camelCase")]
    GroupEmptied { group_id: String },
}

/// One-shot, fire-and-forget delivery
///
/// Nobody listening is not an error; implementations log and move on.
pub trait Broadcaster {
    fn broadcast(&self, message: RuntimeMessage);
}

/// Drops every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn broadcast(&self, message: RuntimeMessage) {
        log::debug!("no broadcaster installed, dropping {:?}", message);
    }
}

#[cfg(target_arch = "wasm32")]
pub use chrome::ChromeBroadcaster;

#[cfg(target_arch = "wasm32")]
mod chrome {
    use super::{Broadcaster, RuntimeMessage};
    use serde::Serialize;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::spawn_local;

    #[wasm_bindgen(module = "/storage.js")]
    extern "C" {
        async fn sendRuntimeMessage(message: JsValue) -> JsValue;
    }

    /// chrome.runtime.sendMessage
    #[derive(Debug, Default, Clone, Copy)]
    pub struct ChromeBroadcaster;

    impl Broadcaster for ChromeBroadcaster {
        fn broadcast(&self, message: RuntimeMessage) {
            let payload = match message.serialize(&serde_wasm_bindgen::Serializer::json_compatible()) {
                Ok(payload) => payload,
                Err(e) => {
                    log::error!("Failed to serialize {:?}: {:?}", message, e);
                    return;
                }
            };
            spawn_local(async move {
                let delivered = sendRuntimeMessage(payload).await;
                if delivered.as_bool() != Some(true) {
                    log::debug!("no listener for {:?}", message);
                }
            });
        }
    }
}
