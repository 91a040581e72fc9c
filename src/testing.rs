/// Test doubles shared by the store tests
use crate::backend::Backend;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::messages::{Broadcaster, RuntimeMessage};
use crate::storage::{KeyValueStore, MemoryStore, StorageChange};
use async_trait::async_trait;
use futures::channel::mpsc::UnboundedReceiver;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

pub const T0: f64 = 1_700_000_000_000.0;

pub struct ManualClock(Cell<f64>);

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock(Cell::new(start))
    }

    pub fn set(&self, now: f64) {
        self.0.set(now);
    }

    pub fn advance(&self, millis: f64) {
        self.0.set(self.0.get() + millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> f64 {
        self.0.get()
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster(RefCell<Vec<RuntimeMessage>>);

impl RecordingBroadcaster {
    pub fn messages(&self) -> Vec<RuntimeMessage> {
        self.0.borrow().clone()
    }

    pub fn emptied(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter_map(|message| match message {
                RuntimeMessage::GroupEmptied { group_id } => Some(group_id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, message: RuntimeMessage) {
        self.0.borrow_mut().push(message);
    }
}

/// Wraps a [`MemoryStore`] and fails writes to chosen keys
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing: RefCell<HashSet<String>>,
}

impl FlakyStore {
    pub fn fail_writes_to(&self, key: &str) {
        self.failing.borrow_mut().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.failing.borrow_mut().clear();
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.borrow().contains(key) {
            return Err(Error::Storage(format!("write to {} interrupted", key)));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check(key)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check(key)?;
        self.inner.remove(key).await
    }

    fn subscribe(&self) -> UnboundedReceiver<StorageChange> {
        self.inner.subscribe()
    }
}

/// Pending on the first poll, ready on the second
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// A [`MemoryStore`] whose reads suspend once, like chrome.storage does,
/// so concurrent read-modify-write cycles interleave
#[derive(Default)]
pub struct YieldingStore {
    pub inner: MemoryStore,
}

#[async_trait(?Send)]
impl KeyValueStore for YieldingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        YieldOnce(false).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    fn subscribe(&self) -> UnboundedReceiver<StorageChange> {
        self.inner.subscribe()
    }
}

pub fn yielding_backend() -> (Backend, Rc<YieldingStore>) {
    let store = Rc::new(YieldingStore::default());
    let backend = Backend::new(
        store.clone(),
        Rc::new(RecordingBroadcaster::default()),
        Rc::new(ManualClock::new(T0)),
    );
    (backend, store)
}

pub struct Harness {
    pub backend: Backend,
    pub store: Rc<FlakyStore>,
    pub broadcaster: Rc<RecordingBroadcaster>,
    pub clock: Rc<ManualClock>,
}

pub fn harness() -> Harness {
    let store = Rc::new(FlakyStore::default());
    let broadcaster = Rc::new(RecordingBroadcaster::default());
    let clock = Rc::new(ManualClock::new(T0));
    let backend = Backend::new(store.clone(), broadcaster.clone(), clock.clone());
    Harness {
        backend,
        store,
        broadcaster,
        clock,
    }
}
