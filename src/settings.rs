/// User settings: load, merge with defaults, save, follow changes
use crate::backend::Backend;
use crate::domain::compile_exclusions;
use crate::error::{Error, Result};
use crate::messages::RuntimeMessage;
use crate::period::{Period, is_shortening};
use crate::storage::{self, StorageChange, keys};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;

const RETENTION_PERIOD_FIELD: &str = "autoDeletePeriod";

/// What clicking a saved tab does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClickBehavior {
    #[default]
    OpenNewTab,
    OpenCurrentTab,
    OpenAndRemove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    #[serde(rename = "autoDeletePeriod")]
    pub retention_period: Period,
    pub click_behavior: ClickBehavior,
    /// Glob or `/regex/` patterns for URLs that are never saved
    pub exclude_patterns: Vec<String>,
    /// Color slot name to CSS color
    pub color_overrides: BTreeMap<String, String>,
    pub confirm_delete_group: bool,
    pub confirm_delete_project: bool,
    pub confirm_delete_category: bool,
    pub confirm_period_change: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        UserSettings {
            retention_period: Period::Never,
            click_behavior: ClickBehavior::OpenNewTab,
            exclude_patterns: Vec::new(),
            color_overrides: BTreeMap::new(),
            confirm_delete_group: true,
            confirm_delete_project: true,
            confirm_delete_category: true,
            confirm_period_change: true,
        }
    }
}

impl UserSettings {
    /// Side-effect-free checks run before any write
    pub fn validate(&self) -> Result<()> {
        compile_exclusions(&self.exclude_patterns)?;
        Ok(())
    }
}

/// `{...defaults, ...stored}` at the JSON level
pub fn merge_with_defaults(stored: Value) -> Result<UserSettings> {
    let mut merged = serde_json::to_value(UserSettings::default()).map_err(|source| Error::Encode {
        key: keys::USER_SETTINGS.to_string(),
        source,
    })?;

    match (&mut merged, stored) {
        (Value::Object(base), Value::Object(overrides)) => base.extend(overrides),
        (_, Value::Null) => {}
        (_, other) => {
            return Err(Error::validation(
                "userSettings",
                format!("expected an object, got {}", other),
            ));
        }
    }

    serde_json::from_value(merged).map_err(|source| Error::Decode {
        key: keys::USER_SETTINGS.to_string(),
        source,
    })
}

/// Which of the two views the manager shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Domain,
    Custom,
}

/// Outcome of a retention period change
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodChange {
    pub previous: Period,
    pub next: Period,
    pub shortening: bool,
}

/// Owns the settings lifecycle and a cache refreshed from change notifications
pub struct SettingsGate {
    backend: Backend,
    cached: RefCell<Option<UserSettings>>,
}

impl SettingsGate {
    pub fn new(backend: Backend) -> SettingsGate {
        SettingsGate {
            backend,
            cached: RefCell::new(None),
        }
    }

    /// Cached settings, or defaults before the first load
    pub fn current(&self) -> UserSettings {
        self.cached.borrow().clone().unwrap_or_default()
    }

    /// Read and merge; never fails
    ///
    /// Absent settings are written with defaults. Unreadable settings fall
    /// back to defaults without overwriting what is stored.
    pub async fn load(&self) -> UserSettings {
        let settings = match self.backend.store().get(keys::USER_SETTINGS).await {
            Ok(None) => {
                let defaults = UserSettings::default();
                if let Err(e) = storage::save(self.backend.store(), keys::USER_SETTINGS, &defaults).await {
                    log::warn!("Failed to write default settings: {}", e);
                }
                defaults
            }
            Ok(Some(stored)) => merge_with_defaults(stored).unwrap_or_else(|e| {
                log::warn!("Unreadable settings, using defaults: {}", e);
                UserSettings::default()
            }),
            Err(e) => {
                log::warn!("Failed to load settings, using defaults: {}", e);
                UserSettings::default()
            }
        };
        *self.cached.borrow_mut() = Some(settings.clone());
        settings
    }

    pub async fn save(&self, settings: &UserSettings) -> Result<()> {
        settings.validate()?;
        storage::save(self.backend.store(), keys::USER_SETTINGS, settings).await?;
        *self.cached.borrow_mut() = Some(settings.clone());
        Ok(())
    }

    /// Store a partial settings object verbatim; later reads merge defaults under it
    pub async fn save_partial(&self, patch: Value) -> Result<UserSettings> {
        let merged = merge_with_defaults(patch.clone())?;
        merged.validate()?;
        self.backend
            .store()
            .set(keys::USER_SETTINGS, patch)
            .await
            .inspect_err(|e| log::error!("Failed to save settings: {}", e))?;
        *self.cached.borrow_mut() = Some(merged.clone());
        Ok(merged)
    }

    /// Refresh the cache from a change notification
    ///
    /// Returns whether the cached value changed; our own writes come back
    /// as no-ops.
    pub fn apply_change(&self, change: &StorageChange) -> bool {
        if change.key != keys::USER_SETTINGS {
            return false;
        }
        let next = match &change.new_value {
            None => UserSettings::default(),
            Some(value) => match merge_with_defaults(value.clone()) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Ignoring unreadable settings change: {}", e);
                    return false;
                }
            },
        };

        let mut cached = self.cached.borrow_mut();
        if cached.as_ref() == Some(&next) {
            return false;
        }
        *cached = Some(next);
        true
    }

    /// Persist a new retention period and ask other surfaces to re-check expiry
    ///
    /// Only the period field of the stored object is replaced, so settings
    /// this build cannot decode are kept as they are.
    pub async fn change_retention_period(&self, next: Period, reset_timers: bool) -> Result<PeriodChange> {
        let stored = self
            .backend
            .store()
            .get(keys::USER_SETTINGS)
            .await
            .inspect_err(|e| log::error!("Failed to load settings: {}", e))?;
        let mut stored = match stored {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(stored)) => stored,
            Some(other) => {
                return Err(Error::validation(
                    "userSettings",
                    format!("expected an object, got {}", other),
                ));
            }
        };
        let previous = stored
            .get(RETENTION_PERIOD_FIELD)
            .and_then(Value::as_str)
            .map(Period::from_token)
            .unwrap_or_default();
        let shortening = is_shortening(&previous, &next);

        stored.insert(
            RETENTION_PERIOD_FIELD.to_string(),
            Value::String(next.token().to_string()),
        );
        let merged = merge_with_defaults(Value::Object(stored.clone())).unwrap_or_else(|e| {
            log::warn!("Stored settings are unreadable, keeping them as they are: {}", e);
            UserSettings {
                retention_period: next.clone(),
                ..UserSettings::default()
            }
        });
        self.backend
            .store()
            .set(keys::USER_SETTINGS, Value::Object(stored))
            .await
            .inspect_err(|e| log::error!("Failed to save settings: {}", e))?;
        *self.cached.borrow_mut() = Some(merged);

        log::info!(
            "Retention period {} -> {} (shortening: {})",
            previous.token(),
            next.token(),
            shortening
        );
        self.backend.broadcaster.broadcast(RuntimeMessage::CheckExpiredTabs {
            update_timestamps: reset_timers,
            period: next.clone(),
            force_reload: true,
        });

        Ok(PeriodChange {
            previous,
            next,
            shortening,
        })
    }

    pub async fn view_mode(&self) -> ViewMode {
        storage::load(self.backend.store(), keys::VIEW_MODE)
            .await
            .unwrap_or_else(|e| {
                log::warn!("Failed to load view mode: {}", e);
                None
            })
            .unwrap_or_default()
    }

    pub async fn set_view_mode(&self, mode: ViewMode) -> Result<()> {
        storage::save(self.backend.store(), keys::VIEW_MODE, &mode).await
    }
}
