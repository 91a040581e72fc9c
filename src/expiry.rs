/// Auto-delete of saved tabs once their retention period runs out
///
/// Only the domain view expires. Project URLs are kept until the user
/// removes them, so a sweep can leave a project URL without a domain group
/// (see [`crate::sync::audit`]).
use crate::domain_store::DomainStore;
use crate::error::Result;
use crate::messages::RuntimeMessage;
use crate::period::{Period, remaining};
use crate::settings::UserSettings;
use futures::future::{AbortHandle, Abortable};
use futures::{Future, FutureExt, Stream, StreamExt};

#[cfg(target_arch = "wasm32")]
pub use ticker::{IntervalTicks, interval_ticks, poll_ticks};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub emptied_groups: Vec<String>,
}

/// Sweep with the configured retention period
pub async fn sweep_expired(domains: &DomainStore, settings: &UserSettings, now: f64) -> Result<SweepReport> {
    sweep_for_period(domains, &settings.retention_period, now).await
}

/// Remove every domain URL whose countdown under `period` has run out
///
/// Entries without `savedAt` never expire. Emptied groups stay behind,
/// invisible, and are announced with `groupEmptied`.
pub async fn sweep_for_period(domains: &DomainStore, period: &Period, now: f64) -> Result<SweepReport> {
    if period.is_never() {
        return Ok(SweepReport::default());
    }

    let mut removed = 0;
    let emptied_groups = domains
        .rewrite_entries(|group, entries| {
            let before = entries.len();
            entries.retain(|entry| !remaining(entry.saved_at, period, now).is_some_and(|r| r.expired));
            let dropped = before - entries.len();
            if dropped > 0 {
                log::debug!("Expired {} URLs from {}", dropped, group.domain);
            }
            removed += dropped;
            dropped > 0
        })
        .await?;

    if removed > 0 {
        log::info!("Expired {} saved tabs ({})", removed, period.token());
    }
    Ok(SweepReport {
        removed,
        emptied_groups,
    })
}

/// Restart every domain URL's countdown at `now`
pub async fn refresh_timestamps(domains: &DomainStore, now: f64) -> Result<usize> {
    let mut touched = 0;
    domains
        .rewrite_entries(|_, entries| {
            for entry in entries.iter_mut() {
                entry.saved_at = Some(now);
            }
            touched += entries.len();
            !entries.is_empty()
        })
        .await?;
    log::debug!("Reset the expiry timer of {} saved tabs", touched);
    Ok(touched)
}

/// Receiving side of `checkExpiredTabs`
///
/// Returns `None` for messages that are not about expiry.
pub async fn handle_check_expired(
    domains: &DomainStore,
    message: &RuntimeMessage,
    now: f64,
) -> Result<Option<SweepReport>> {
    let RuntimeMessage::CheckExpiredTabs {
        update_timestamps,
        period,
        ..
    } = message
    else {
        return Ok(None);
    };

    if *update_timestamps {
        refresh_timestamps(domains, now).await?;
    }
    sweep_for_period(domains, period, now).await.map(Some)
}

/// Handle to a running poll loop
///
/// The loop future is returned separately so the caller picks the executor
/// (`spawn_local` in the browser). Stopping or dropping the handle ends the
/// loop at its next suspension point.
#[derive(Debug)]
pub struct ExpiryPoller {
    handle: AbortHandle,
}

impl ExpiryPoller {
    pub fn start<S, F, Fut>(ticks: S, mut on_tick: F) -> (ExpiryPoller, impl Future<Output = ()>)
    where
        S: Stream<Item = ()>,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let (handle, registration) = AbortHandle::new_pair();
        let run = async move {
            let mut ticks = Box::pin(ticks);
            while ticks.next().await.is_some() {
                on_tick().await;
            }
        };
        let task = Abortable::new(run, registration).map(|finished| {
            if finished.is_err() {
                log::debug!("Expiry poller stopped");
            }
        });
        (ExpiryPoller { handle }, task)
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl Drop for ExpiryPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(target_arch = "wasm32")]
mod ticker {
    use futures::channel::mpsc::{self, UnboundedReceiver};
    use futures::{Stream, StreamExt};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use wasm_bindgen::prelude::*;

    #[wasm_bindgen(module = "/storage.js")]
    extern "C" {
        fn startTicker(interval_ms: u32, callback: &js_sys::Function) -> JsValue;

        fn stopTicker(id: JsValue);
    }

    /// A `setInterval` timer as a stream; dropping it clears the interval
    pub struct IntervalTicks {
        id: JsValue,
        _callback: Closure<dyn FnMut()>,
        receiver: UnboundedReceiver<()>,
    }

    pub fn interval_ticks(interval_ms: u32) -> IntervalTicks {
        let (sender, receiver) = mpsc::unbounded();
        let callback = Closure::wrap(Box::new(move || {
            let _ = sender.unbounded_send(());
        }) as Box<dyn FnMut()>);
        let id = startTicker(interval_ms, callback.as_ref().unchecked_ref());
        IntervalTicks {
            id,
            _callback: callback,
            receiver,
        }
    }

    /// Ticks at the countdown cadence views share
    pub fn poll_ticks() -> IntervalTicks {
        interval_ticks(crate::period::EXPIRY_POLL_INTERVAL_MS)
    }

    impl Stream for IntervalTicks {
        type Item = ();

        fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<()>> {
            self.get_mut().receiver.poll_next_unpin(cx)
        }
    }

    impl Drop for IntervalTicks {
        fn drop(&mut self) {
            stopTicker(self.id.clone());
        }
    }
}
