/// Tab Keeper - storage core for a two-view tab organizer extension
/// Built with Rust + WASM

pub mod backend;
pub mod category;
pub mod clock;
pub mod domain;
pub mod domain_store;
pub mod error;
pub mod expiry;
pub mod messages;
pub mod operations;
pub mod period;
pub mod project_store;
pub mod settings;
pub mod storage;
pub mod sync;
pub mod tab_data;

#[cfg(test)]
mod testing;

pub use backend::Backend;
pub use domain_store::DomainStore;
pub use error::{Error, Result};
pub use period::Period;
pub use project_store::ProjectStore;
pub use settings::{SettingsGate, UserSettings};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Pure helpers exported for the extension's JavaScript
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn extract_origin(url: &str) -> String {
    domain::origin_of(url).unwrap_or_else(|| "invalid".to_string())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn period_seconds(period: &str) -> f64 {
    Period::from_token(period).to_seconds()
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn is_period_shortening(current: &str, next: &str) -> bool {
    period::is_shortening(&Period::from_token(current), &Period::from_token(next))
}

/// Remaining milliseconds for a URL saved at `saved_at`; `undefined` when it never expires
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn remaining_millis(saved_at: f64, period: &str, now: f64) -> Option<f64> {
    period::remaining(Some(saved_at), &Period::from_token(period), now).map(|r| r.millis)
}

/// Warning tier index for a countdown, `undefined` when none applies
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn warning_tier(saved_at: f64, period: &str, now: f64) -> Option<u32> {
    period::remaining(Some(saved_at), &Period::from_token(period), now)
        .and_then(|left| period::warning_tier(&left))
        .map(|tier| tier as u32)
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn expiry_poll_interval_ms() -> u32 {
    period::EXPIRY_POLL_INTERVAL_MS
}
