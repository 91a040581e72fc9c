/// Retention periods and countdown arithmetic
///
/// Everything here is pure. Callers own the polling cadence and decide how a
/// remaining duration is styled.
use serde::{Deserialize, Serialize};

/// How often views recompute countdowns and sweep expired tabs
pub const EXPIRY_POLL_INTERVAL_MS: u32 = 1_000;

/// Presentation tiers (1 hour, 24 hours, 3 days) callers bucket countdowns into
pub const WARNING_THRESHOLDS_MS: [f64; 3] = [
    3_600_000.0,
    86_400_000.0,
    259_200_000.0,
];

/// A named retention period
///
/// Unknown tokens are kept verbatim so a settings value written by a newer
/// build survives a round trip; they never expire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Period {
    #[default]
    Never,
    ThirtySeconds,
    OneMinute,
    OneHour,
    OneDay,
    SevenDays,
    FourteenDays,
    ThirtyDays,
    HalfYear,
    OneYear,
    Other(String),
}

impl Period {
    pub const ALL: [Period; 10] = [
        Period::Never,
        Period::ThirtySeconds,
        Period::OneMinute,
        Period::OneHour,
        Period::OneDay,
        Period::SevenDays,
        Period::FourteenDays,
        Period::ThirtyDays,
        Period::HalfYear,
        Period::OneYear,
    ];

    pub fn from_token(token: &str) -> Period {
        match token {
            "never" => Period::Never,
            "30sec" => Period::ThirtySeconds,
            "1min" => Period::OneMinute,
            "1hour" => Period::OneHour,
            "1day" => Period::OneDay,
            "7days" => Period::SevenDays,
            "14days" => Period::FourteenDays,
            "30days" => Period::ThirtyDays,
            "180days" => Period::HalfYear,
            "365days" => Period::OneYear,
            other => Period::Other(other.to_string()),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Period::Never => "never",
            Period::ThirtySeconds => "30sec",
            Period::OneMinute => "1min",
            Period::OneHour => "1hour",
            Period::OneDay => "1day",
            Period::SevenDays => "7days",
            Period::FourteenDays => "14days",
            Period::ThirtyDays => "30days",
            Period::HalfYear => "180days",
            Period::OneYear => "365days",
            Period::Other(token) => token,
        }
    }

    /// Seconds until expiry; `f64::INFINITY` for `never` and unknown tokens
    pub fn to_seconds(&self) -> f64 {
        const DAY: f64 = 86_400.0;
        match self {
            Period::ThirtySeconds => 30.0,
            Period::OneMinute => 60.0,
            Period::OneHour => 3_600.0,
            Period::OneDay => DAY,
            Period::SevenDays => 7.0 * DAY,
            Period::FourteenDays => 14.0 * DAY,
            Period::ThirtyDays => 30.0 * DAY,
            Period::HalfYear => 180.0 * DAY,
            Period::OneYear => 365.0 * DAY,
            Period::Never | Period::Other(_) => f64::INFINITY,
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Period::Never)
    }
}

impl From<String> for Period {
    fn from(token: String) -> Self {
        Period::from_token(&token)
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.token().to_string()
    }
}

/// Whether switching from `current` to `next` shortens retention
///
/// Leaving `never` always counts as shortening; moving to `never` never does.
pub fn is_shortening(current: &Period, next: &Period) -> bool {
    if current.is_never() {
        return true;
    }
    if next.is_never() {
        return false;
    }
    next.to_seconds() < current.to_seconds()
}

/// Time left before an entry saved at `saved_at` expires
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Remaining {
    pub expired: bool,
    pub millis: f64,
}

/// `None` when the period is `never` or the entry carries no save time
pub fn remaining(saved_at: Option<f64>, period: &Period, now: f64) -> Option<Remaining> {
    if period.is_never() {
        return None;
    }
    let saved_at = saved_at?;
    let millis = saved_at + period.to_seconds() * 1000.0 - now;
    Some(Remaining {
        expired: millis <= 0.0,
        millis,
    })
}

/// Index of the tightest warning tier `remaining` falls under
///
/// `None` for expired entries and for anything beyond the widest tier.
pub fn warning_tier(remaining: &Remaining) -> Option<usize> {
    if remaining.expired {
        return None;
    }
    WARNING_THRESHOLDS_MS
        .iter()
        .position(|threshold| remaining.millis <= *threshold)
}
