use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_ACTIVE_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_SLOW_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_HIDDEN_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_INACTIVITY_DELAY_MS: u64 = 60_000;
pub const DEFAULT_BACKFILL_THRESHOLD_PX: f64 = 200.0;
pub const DEFAULT_BACKFILL_SETTLE_MS: u64 = 300;
pub const DEFAULT_NEAR_BOTTOM_THRESHOLD_PX: f64 = 150.0;
pub const DEFAULT_SCROLL_IDLE_MS: u64 = 1_500;
pub const DEFAULT_SCROLL_DELTA_PX: f64 = 5.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid CHAT_SYNC_ACTIVE_INTERVAL_MS: {0}")]
    InvalidActiveIntervalMs(String),
    #[error("invalid CHAT_SYNC_SLOW_INTERVAL_MS: {0}")]
    InvalidSlowIntervalMs(String),
    #[error("invalid CHAT_SYNC_HIDDEN_INTERVAL_MS: {0}")]
    InvalidHiddenIntervalMs(String),
    #[error("invalid CHAT_SYNC_INACTIVITY_DELAY_MS: {0}")]
    InvalidInactivityDelayMs(String),
    #[error("invalid CHAT_SYNC_BACKFILL_THRESHOLD_PX: {0}")]
    InvalidBackfillThresholdPx(String),
    #[error("invalid CHAT_SYNC_BACKFILL_SETTLE_MS: {0}")]
    InvalidBackfillSettleMs(String),
    #[error("invalid CHAT_SYNC_NEAR_BOTTOM_THRESHOLD_PX: {0}")]
    InvalidNearBottomThresholdPx(String),
    #[error("invalid CHAT_SYNC_SCROLL_IDLE_MS: {0}")]
    InvalidScrollIdleMs(String),
    #[error("invalid CHAT_SYNC_SCROLL_DELTA_PX: {0}")]
    InvalidScrollDeltaPx(String),
    #[error("invalid CHAT_SYNC_PAUSE_WHEN_HIDDEN: {0}")]
    InvalidPauseWhenHidden(String),
}

/// Cadence for each poll state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub active: Duration,
    pub slow: Duration,
    pub hidden: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            active: Duration::from_millis(DEFAULT_ACTIVE_INTERVAL_MS),
            slow: Duration::from_millis(DEFAULT_SLOW_INTERVAL_MS),
            hidden: Duration::from_millis(DEFAULT_HIDDEN_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub intervals: PollIntervals,
    pub inactivity_delay: Duration,
    pub pause_when_hidden: bool,
    pub backfill_threshold_px: f64,
    pub backfill_settle: Duration,
    pub near_bottom_threshold_px: f64,
    pub scroll_idle: Duration,
    pub scroll_delta_px: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            intervals: PollIntervals::default(),
            inactivity_delay: Duration::from_millis(DEFAULT_INACTIVITY_DELAY_MS),
            pause_when_hidden: false,
            backfill_threshold_px: DEFAULT_BACKFILL_THRESHOLD_PX,
            backfill_settle: Duration::from_millis(DEFAULT_BACKFILL_SETTLE_MS),
            near_bottom_threshold_px: DEFAULT_NEAR_BOTTOM_THRESHOLD_PX,
            scroll_idle: Duration::from_millis(DEFAULT_SCROLL_IDLE_MS),
            scroll_delta_px: DEFAULT_SCROLL_DELTA_PX,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or blank keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let active = parse_interval_ms(
            read("CHAT_SYNC_ACTIVE_INTERVAL_MS"),
            defaults.intervals.active,
            ConfigError::InvalidActiveIntervalMs,
        )?;
        let slow = parse_interval_ms(
            read("CHAT_SYNC_SLOW_INTERVAL_MS"),
            defaults.intervals.slow,
            ConfigError::InvalidSlowIntervalMs,
        )?;
        let hidden = parse_interval_ms(
            read("CHAT_SYNC_HIDDEN_INTERVAL_MS"),
            defaults.intervals.hidden,
            ConfigError::InvalidHiddenIntervalMs,
        )?;
        let inactivity_delay = parse_interval_ms(
            read("CHAT_SYNC_INACTIVITY_DELAY_MS"),
            defaults.inactivity_delay,
            ConfigError::InvalidInactivityDelayMs,
        )?;
        let backfill_settle = parse_duration_ms(
            read("CHAT_SYNC_BACKFILL_SETTLE_MS"),
            defaults.backfill_settle,
            ConfigError::InvalidBackfillSettleMs,
        )?;
        let scroll_idle = parse_duration_ms(
            read("CHAT_SYNC_SCROLL_IDLE_MS"),
            defaults.scroll_idle,
            ConfigError::InvalidScrollIdleMs,
        )?;
        let backfill_threshold_px = parse_pixels(
            read("CHAT_SYNC_BACKFILL_THRESHOLD_PX"),
            defaults.backfill_threshold_px,
            ConfigError::InvalidBackfillThresholdPx,
        )?;
        let near_bottom_threshold_px = parse_pixels(
            read("CHAT_SYNC_NEAR_BOTTOM_THRESHOLD_PX"),
            defaults.near_bottom_threshold_px,
            ConfigError::InvalidNearBottomThresholdPx,
        )?;
        let scroll_delta_px = parse_pixels(
            read("CHAT_SYNC_SCROLL_DELTA_PX"),
            defaults.scroll_delta_px,
            ConfigError::InvalidScrollDeltaPx,
        )?;
        let pause_when_hidden = match read("CHAT_SYNC_PAUSE_WHEN_HIDDEN") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidPauseWhenHidden(raw))?,
            None => defaults.pause_when_hidden,
        };

        Ok(Self {
            intervals: PollIntervals {
                active,
                slow,
                hidden,
            },
            inactivity_delay,
            pause_when_hidden,
            backfill_threshold_px,
            backfill_settle,
            near_bottom_threshold_px,
            scroll_idle,
            scroll_delta_px,
        })
    }
}

fn parse_duration_ms(
    raw: Option<String>,
    default: Duration,
    error: fn(String) -> ConfigError,
) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|parse_error| error(format!("{raw}: {parse_error}"))),
        None => Ok(default),
    }
}

fn parse_interval_ms(
    raw: Option<String>,
    default: Duration,
    error: fn(String) -> ConfigError,
) -> Result<Duration, ConfigError> {
    let value = parse_duration_ms(raw, default, error)?;
    if value.is_zero() {
        return Err(error("must be greater than zero".to_string()));
    }
    Ok(value)
}

fn parse_pixels(
    raw: Option<String>,
    default: f64,
    error: fn(String) -> ConfigError,
) -> Result<f64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        Ok(_) => Err(error(format!("{raw}: must be a non-negative number"))),
        Err(parse_error) => Err(error(format!("{raw}: {parse_error}"))),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
