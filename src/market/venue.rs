use crate::error::AppError;
use crate::market::binance::{
    connect_feed_stream, fetch_perpetual_usdt_symbols, funding_array_endpoint,
    mark_price_endpoint, FeedWsStream,
};
use crate::market::decode::{decode_frame_collecting, DecodeOutcome};
use crate::market::delta;
use crate::market::types::{Exchange, FeedVenue};
use reqwest::Client;
use tokio_tungstenite::tungstenite::Message;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueEndpoints {
    pub delta_ws_url: String,
    pub binance_ws_url: String,
    pub binance_rest_url: String,
}

/// Everything that differs between exchanges: where to connect, what to send
/// once the socket is open, how to keep it alive and how to read frames.
#[derive(Debug, Clone)]
pub struct FeedAdapter {
    venue: FeedVenue,
    endpoints: VenueEndpoints,
    listed_symbols: Option<Vec<String>>,
}

impl FeedAdapter {
    pub fn new(venue: FeedVenue, endpoints: VenueEndpoints) -> Self {
        Self {
            venue,
            endpoints,
            listed_symbols: None,
        }
    }

    pub fn exchange(&self) -> Exchange {
        self.venue.exchange()
    }

    /// The instrument listing is fetched once and reused across reconnects.
    pub async fn resolve_endpoint(&mut self, client: &Client) -> Result<String, AppError> {
        match self.venue {
            FeedVenue::DeltaFundingRate => Ok(self.endpoints.delta_ws_url.clone()),
            FeedVenue::BinanceFundingArray => {
                Ok(funding_array_endpoint(&self.endpoints.binance_ws_url))
            }
            FeedVenue::BinanceMarkPrice => {
                if self.listed_symbols.is_none() {
                    let symbols =
                        fetch_perpetual_usdt_symbols(client, &self.endpoints.binance_rest_url)
                            .await?;
                    info!(
                        venue = self.venue.as_str(),
                        count = symbols.len(),
                        "listed perpetual USDT instruments"
                    );
                    self.listed_symbols = Some(symbols);
                }
                let symbols = self.listed_symbols.as_deref().unwrap_or_default();
                Ok(mark_price_endpoint(&self.endpoints.binance_ws_url, symbols))
            }
        }
    }

    pub async fn connect(&mut self, client: &Client) -> Result<FeedWsStream, AppError> {
        let endpoint = self.resolve_endpoint(client).await?;
        connect_feed_stream(&endpoint).await
    }

    pub fn subscription_message(&self) -> Result<Option<Message>, AppError> {
        match self.venue {
            FeedVenue::DeltaFundingRate => Ok(Some(Message::Text(delta::subscription_payload()?))),
            FeedVenue::BinanceMarkPrice | FeedVenue::BinanceFundingArray => Ok(None),
        }
    }

    pub fn heartbeat_message(&self) -> Result<Message, AppError> {
        match self.venue {
            FeedVenue::DeltaFundingRate => Ok(Message::Text(delta::heartbeat_payload()?)),
            FeedVenue::BinanceMarkPrice | FeedVenue::BinanceFundingArray => {
                Ok(Message::Ping(Vec::new()))
            }
        }
    }

    pub fn decode(&self, payload: &mut [u8], rejected_entries: &mut Vec<String>) -> DecodeOutcome {
        decode_frame_collecting(self.venue, payload, rejected_entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> VenueEndpoints {
        VenueEndpoints {
            delta_ws_url: "ws://127.0.0.1:9/delta".to_string(),
            binance_ws_url: "ws://127.0.0.1:9".to_string(),
            binance_rest_url: "http://127.0.0.1:9".to_string(),
        }
    }

    #[tokio::test]
    async fn delta_resolves_to_configured_url_and_subscribes() {
        let mut adapter = FeedAdapter::new(FeedVenue::DeltaFundingRate, endpoints());
        let endpoint = adapter
            .resolve_endpoint(&Client::new())
            .await
            .expect("delta endpoint needs no lookup");

        assert_eq!(endpoint, "ws://127.0.0.1:9/delta");
        assert!(matches!(
            adapter.subscription_message(),
            Ok(Some(Message::Text(_)))
        ));
        assert_eq!(
            adapter.heartbeat_message().expect("ping should build"),
            Message::Text(r#"{"type":"ping"}"#.to_string())
        );
    }

    #[tokio::test]
    async fn cached_listing_skips_rest_lookup() {
        let mut adapter = FeedAdapter::new(FeedVenue::BinanceMarkPrice, endpoints());
        adapter.listed_symbols = Some(vec!["btcusdt".to_string()]);

        let endpoint = adapter
            .resolve_endpoint(&Client::new())
            .await
            .expect("cached listing should be reused");

        assert_eq!(
            endpoint,
            "ws://127.0.0.1:9/stream?streams=btcusdt@markPrice@1s"
        );
        assert!(matches!(adapter.subscription_message(), Ok(None)));
        assert!(matches!(
            adapter.heartbeat_message(),
            Ok(Message::Ping(_))
        ));
    }

    #[tokio::test]
    async fn funding_array_needs_no_listing() {
        let mut adapter = FeedAdapter::new(FeedVenue::BinanceFundingArray, endpoints());
        let endpoint = adapter
            .resolve_endpoint(&Client::new())
            .await
            .expect("array stream endpoint is static");

        assert_eq!(endpoint, "ws://127.0.0.1:9/ws/!markPrice@arr@1s");
    }
}
