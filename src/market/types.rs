use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_RECONNECT_FLOOR_MS: u64 = 2_000;
pub const DEFAULT_RECONNECT_CAP_MS: u64 = 30_000;
pub const DEFAULT_EMIT_INTERVAL_MS: u64 = 250;
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1_000;
pub const MAX_HEARTBEAT_INTERVAL_MS: u64 = 120_000;
pub const MIN_RECONNECT_FLOOR_MS: u64 = 100;
pub const MAX_RECONNECT_FLOOR_MS: u64 = 60_000;
pub const MAX_RECONNECT_CAP_MS: u64 = 300_000;
pub const MIN_EMIT_INTERVAL_MS: u64 = 16;
pub const MAX_EMIT_INTERVAL_MS: u64 = 5_000;
pub const MIN_EVICT_AFTER_MISSED: u32 = 1;
pub const MAX_EVICT_AFTER_MISSED: u32 = 1_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Delta,
    Binance,
}

impl Exchange {
    pub const ALL: [Exchange; 2] = [Exchange::Binance, Exchange::Delta];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Binance => "binance",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Delta => "Delta India",
            Self::Binance => "Binance",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Wire flavour of a funding-rate feed. Each venue pins the exchange, the
/// frame shape and the merge policy used by the reconciler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeedVenue {
    DeltaFundingRate,
    BinanceMarkPrice,
    BinanceFundingArray,
}

impl FeedVenue {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeltaFundingRate => "delta_funding_rate",
            Self::BinanceMarkPrice => "binance_mark_price",
            Self::BinanceFundingArray => "binance_funding_array",
        }
    }

    pub fn exchange(self) -> Exchange {
        match self {
            Self::DeltaFundingRate => Exchange::Delta,
            Self::BinanceMarkPrice | Self::BinanceFundingArray => Exchange::Binance,
        }
    }

    pub fn merge_policy(self, evict_after_missed: Option<u32>) -> MergePolicy {
        match self {
            Self::DeltaFundingRate | Self::BinanceMarkPrice => MergePolicy::IncrementalMerge,
            Self::BinanceFundingArray => MergePolicy::BatchReplace { evict_after_missed },
        }
    }

    /// Parses the short names accepted in configuration.
    pub fn parse_binance_variant(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mark_price" | "binance_mark_price" => Ok(Self::BinanceMarkPrice),
            "funding_array" | "binance_funding_array" => Ok(Self::BinanceFundingArray),
            other => Err(AppError::InvalidArgument(format!(
                "unknown binance feed variant '{other}' (expected mark_price or funding_array)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MergePolicy {
    IncrementalMerge,
    BatchReplace { evict_after_missed: Option<u32> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundingUpdate {
    pub symbol: String,
    pub rate: f64,
    pub event_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateRecord {
    pub symbol: String,
    pub rate: f64,
    pub changed_since_last_emit: bool,
    pub missed_broadcasts: u32,
}

impl FundingRateRecord {
    pub fn observed(symbol: String, rate: f64) -> Self {
        Self {
            symbol,
            rate,
            changed_since_last_emit: true,
            missed_broadcasts: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusSnapshot {
    pub exchange: Exchange,
    pub venue: FeedVenue,
    pub state: FeedConnectionState,
    pub reconnect_attempt: u32,
    pub next_retry_ms: Option<u64>,
    pub frames_received: u64,
    pub updates_applied: u64,
    pub decode_errors: u64,
    pub last_decode_error: Option<String>,
    pub tracked_symbols: usize,
    pub reason: Option<String>,
}

impl FeedStatusSnapshot {
    pub fn stopped(venue: FeedVenue, reason: Option<String>) -> Self {
        Self {
            exchange: venue.exchange(),
            venue,
            state: FeedConnectionState::Stopped,
            reconnect_attempt: 0,
            next_retry_ms: None,
            frames_received: 0,
            updates_applied: 0,
            decode_errors: 0,
            last_decode_error: None,
            tracked_symbols: 0,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartFundingFeedArgs {
    pub venue: Option<FeedVenue>,
    pub heartbeat_interval_ms: Option<u64>,
    pub reconnect_floor_ms: Option<u64>,
    pub reconnect_cap_ms: Option<u64>,
    pub emit_interval_ms: Option<u64>,
    pub evict_after_missed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub venue: FeedVenue,
    pub heartbeat_interval: Duration,
    pub reconnect_floor: Duration,
    pub reconnect_cap: Duration,
    pub emit_interval: Duration,
    pub merge_policy: MergePolicy,
}

impl StartFundingFeedArgs {
    pub fn normalize(
        self,
        exchange: Exchange,
        default_venue: FeedVenue,
    ) -> Result<FeedSettings, AppError> {
        let venue = self.venue.unwrap_or(default_venue);
        if venue.exchange() != exchange {
            return Err(AppError::InvalidArgument(format!(
                "venue {} does not belong to the {} feed",
                venue.as_str(),
                exchange.as_str()
            )));
        }

        let heartbeat_interval_ms = self
            .heartbeat_interval_ms
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
        if !(MIN_HEARTBEAT_INTERVAL_MS..=MAX_HEARTBEAT_INTERVAL_MS).contains(&heartbeat_interval_ms)
        {
            return Err(AppError::InvalidArgument(format!(
                "heartbeatIntervalMs must be between {MIN_HEARTBEAT_INTERVAL_MS} and {MAX_HEARTBEAT_INTERVAL_MS}"
            )));
        }

        let reconnect_floor_ms = self.reconnect_floor_ms.unwrap_or(DEFAULT_RECONNECT_FLOOR_MS);
        if !(MIN_RECONNECT_FLOOR_MS..=MAX_RECONNECT_FLOOR_MS).contains(&reconnect_floor_ms) {
            return Err(AppError::InvalidArgument(format!(
                "reconnectFloorMs must be between {MIN_RECONNECT_FLOOR_MS} and {MAX_RECONNECT_FLOOR_MS}"
            )));
        }

        let reconnect_cap_ms = self
            .reconnect_cap_ms
            .unwrap_or_else(|| DEFAULT_RECONNECT_CAP_MS.max(reconnect_floor_ms));
        if !(reconnect_floor_ms..=MAX_RECONNECT_CAP_MS).contains(&reconnect_cap_ms) {
            return Err(AppError::InvalidArgument(format!(
                "reconnectCapMs must be between reconnectFloorMs and {MAX_RECONNECT_CAP_MS}"
            )));
        }

        let emit_interval_ms = self.emit_interval_ms.unwrap_or(DEFAULT_EMIT_INTERVAL_MS);
        if !(MIN_EMIT_INTERVAL_MS..=MAX_EMIT_INTERVAL_MS).contains(&emit_interval_ms) {
            return Err(AppError::InvalidArgument(format!(
                "emitIntervalMs must be between {MIN_EMIT_INTERVAL_MS} and {MAX_EMIT_INTERVAL_MS}"
            )));
        }

        if let Some(missed) = self.evict_after_missed {
            if !(MIN_EVICT_AFTER_MISSED..=MAX_EVICT_AFTER_MISSED).contains(&missed) {
                return Err(AppError::InvalidArgument(format!(
                    "evictAfterMissed must be between {MIN_EVICT_AFTER_MISSED} and {MAX_EVICT_AFTER_MISSED}"
                )));
            }
        }

        Ok(FeedSettings {
            venue,
            heartbeat_interval: Duration::from_millis(heartbeat_interval_ms),
            reconnect_floor: Duration::from_millis(reconnect_floor_ms),
            reconnect_cap: Duration::from_millis(reconnect_cap_ms),
            emit_interval: Duration::from_millis(emit_interval_ms),
            merge_policy: venue.merge_policy(self.evict_after_missed),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingFeedSession {
    pub running: bool,
    pub exchange: Exchange,
    pub venue: FeedVenue,
    pub heartbeat_interval_ms: u64,
    pub reconnect_floor_ms: u64,
    pub reconnect_cap_ms: u64,
    pub emit_interval_ms: u64,
    pub merge_policy: MergePolicy,
}

impl FundingFeedSession {
    pub fn from_settings(settings: &FeedSettings) -> Self {
        Self {
            running: true,
            exchange: settings.venue.exchange(),
            venue: settings.venue,
            heartbeat_interval_ms: duration_ms(settings.heartbeat_interval),
            reconnect_floor_ms: duration_ms(settings.reconnect_floor),
            reconnect_cap_ms: duration_ms(settings.reconnect_cap),
            emit_interval_ms: duration_ms(settings.emit_interval),
            merge_policy: settings.merge_policy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingFeedStopResult {
    pub stopped: bool,
}

pub fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

/// Exchanges quote funding as a fraction; the desk shows percent.
pub fn fraction_to_percent(fraction: f64) -> f64 {
    fraction * 100.0
}

/// Snapshot keys are always the uppercase display form of the ticker.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}
