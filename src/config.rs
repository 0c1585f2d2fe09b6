use crate::error::AppError;
use crate::market::binance::{BINANCE_REST_BASE_URL, BINANCE_STREAM_BASE_URL};
use crate::market::delta::DELTA_STREAM_URL;
use crate::market::types::{Exchange, FeedVenue};
use crate::market::venue::VenueEndpoints;

pub const DELTA_CONTROL_BASE_URL: &str = "http://localhost:3001/delta-exchange/";
pub const BINANCE_CONTROL_BASE_URL: &str = "http://localhost:3001/binance/";
const DEFAULT_BINANCE_FEED: &str = "mark_price";

const DELTA_WS_URL_VAR: &str = "FUNDING_DELTA_WS_URL";
const BINANCE_WS_URL_VAR: &str = "FUNDING_BINANCE_WS_URL";
const BINANCE_REST_URL_VAR: &str = "FUNDING_BINANCE_REST_URL";
const BINANCE_FEED_VAR: &str = "FUNDING_BINANCE_FEED";
const DELTA_CONTROL_URL_VAR: &str = "FUNDING_DELTA_CONTROL_URL";
const BINANCE_CONTROL_URL_VAR: &str = "FUNDING_BINANCE_CONTROL_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub endpoints: VenueEndpoints,
    pub binance_venue: FeedVenue,
    pub delta_control_url: String,
    pub binance_control_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Blank values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |name: &str, default: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let binance_venue =
            FeedVenue::parse_binance_variant(&resolve(BINANCE_FEED_VAR, DEFAULT_BINANCE_FEED))?;

        Ok(Self {
            endpoints: VenueEndpoints {
                delta_ws_url: resolve(DELTA_WS_URL_VAR, DELTA_STREAM_URL),
                binance_ws_url: resolve(BINANCE_WS_URL_VAR, BINANCE_STREAM_BASE_URL),
                binance_rest_url: resolve(BINANCE_REST_URL_VAR, BINANCE_REST_BASE_URL),
            },
            binance_venue,
            delta_control_url: resolve(DELTA_CONTROL_URL_VAR, DELTA_CONTROL_BASE_URL),
            binance_control_url: resolve(BINANCE_CONTROL_URL_VAR, BINANCE_CONTROL_BASE_URL),
        })
    }

    pub fn default_venue(&self, exchange: Exchange) -> FeedVenue {
        match exchange {
            Exchange::Delta => FeedVenue::DeltaFundingRate,
            Exchange::Binance => self.binance_venue,
        }
    }

    pub fn control_url(&self, exchange: Exchange) -> &str {
        match exchange {
            Exchange::Delta => &self.delta_control_url,
            Exchange::Binance => &self.binance_control_url,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoints: VenueEndpoints {
                delta_ws_url: DELTA_STREAM_URL.to_string(),
                binance_ws_url: BINANCE_STREAM_BASE_URL.to_string(),
                binance_rest_url: BINANCE_REST_BASE_URL.to_string(),
            },
            binance_venue: FeedVenue::BinanceMarkPrice,
            delta_control_url: DELTA_CONTROL_BASE_URL.to_string(),
            binance_control_url: BINANCE_CONTROL_BASE_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name: &str| values.get(name).cloned()
    }

    #[test]
    fn missing_variables_resolve_to_defaults() {
        let config = AppConfig::from_lookup(|_| None).expect("defaults should resolve");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.endpoints.delta_ws_url, "wss://socket.india.delta.exchange");
        assert_eq!(
            config.default_venue(Exchange::Binance),
            FeedVenue::BinanceMarkPrice
        );
    }

    #[test]
    fn blank_values_are_ignored_and_others_trimmed() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("FUNDING_DELTA_WS_URL", "   "),
            ("FUNDING_BINANCE_CONTROL_URL", " http://10.0.0.5:3001/binance/ "),
            ("FUNDING_BINANCE_FEED", "funding_array"),
        ]))
        .expect("overrides should resolve");

        assert_eq!(config.endpoints.delta_ws_url, DELTA_STREAM_URL);
        assert_eq!(
            config.control_url(Exchange::Binance),
            "http://10.0.0.5:3001/binance/"
        );
        assert_eq!(
            config.default_venue(Exchange::Binance),
            FeedVenue::BinanceFundingArray
        );
    }

    #[test]
    fn unknown_binance_feed_is_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[("FUNDING_BINANCE_FEED", "klines")]));
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }
}
