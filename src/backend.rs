/// The collaborators every store is handed explicitly
use crate::clock::{Clock, SystemClock};
use crate::messages::{Broadcaster, NullBroadcaster};
use crate::storage::{KeyValueStore, MemoryStore};
use std::rc::Rc;

#[derive(Clone)]
pub struct Backend {
    pub store: Rc<dyn KeyValueStore>,
    pub broadcaster: Rc<dyn Broadcaster>,
    pub clock: Rc<dyn Clock>,
}

impl Backend {
    pub fn new(
        store: Rc<dyn KeyValueStore>,
        broadcaster: Rc<dyn Broadcaster>,
        clock: Rc<dyn Clock>,
    ) -> Backend {
        Backend {
            store,
            broadcaster,
            clock,
        }
    }

    /// In-memory store, no broadcast listeners, system clock
    pub fn in_memory() -> Backend {
        Backend::new(
            Rc::new(MemoryStore::new()),
            Rc::new(NullBroadcaster),
            Rc::new(SystemClock),
        )
    }

    /// chrome.storage.local, chrome.runtime messaging, Date.now()
    #[cfg(target_arch = "wasm32")]
    pub fn chrome() -> Backend {
        Backend::new(
            Rc::new(crate::storage::ChromeStorage::new()),
            Rc::new(crate::messages::ChromeBroadcaster),
            Rc::new(SystemClock),
        )
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> f64 {
        self.clock.now_millis()
    }
}
