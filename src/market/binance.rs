use crate::error::AppError;
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

pub const BINANCE_STREAM_BASE_URL: &str = "wss://fstream.binance.com";
pub const BINANCE_REST_BASE_URL: &str = "https://fapi.binance.com";

const MARK_PRICE_STREAM_SUFFIX: &str = "@markPrice@1s";
const FUNDING_ARRAY_STREAM: &str = "!markPrice@arr@1s";

pub type FeedWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn mark_price_endpoint(stream_base_url: &str, symbols: &[String]) -> String {
    let streams = symbols
        .iter()
        .map(|symbol| format!("{}{MARK_PRICE_STREAM_SUFFIX}", symbol.to_ascii_lowercase()))
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{}/stream?streams={streams}",
        stream_base_url.trim_end_matches('/')
    )
}

pub fn funding_array_endpoint(stream_base_url: &str) -> String {
    format!(
        "{}/ws/{FUNDING_ARRAY_STREAM}",
        stream_base_url.trim_end_matches('/')
    )
}

fn exchange_info_endpoint(rest_base_url: &str) -> String {
    format!("{}/fapi/v1/exchangeInfo", rest_base_url.trim_end_matches('/'))
}

/// Opens a socket with the frame limits used by every funding feed.
pub async fn connect_feed_stream(endpoint: &str) -> Result<FeedWsStream, AppError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(64 << 20),
        max_frame_size: Some(16 << 20),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(endpoint, Some(ws_config), true).await?;
    Ok(stream)
}

#[derive(Debug, Deserialize)]
struct BinanceExchangeInfoWire {
    symbols: Vec<BinanceExchangeSymbolWire>,
}

#[derive(Debug, Deserialize)]
struct BinanceExchangeSymbolWire {
    symbol: String,
    status: String,
    #[serde(rename = "contractType", default)]
    contract_type: String,
    #[serde(rename = "quoteAsset", default)]
    quote_asset: String,
}

impl BinanceExchangeSymbolWire {
    fn is_tradable_usdt_perpetual(&self) -> bool {
        self.contract_type == "PERPETUAL"
            && self.quote_asset == "USDT"
            && self.status.eq_ignore_ascii_case("TRADING")
    }
}

fn select_perpetual_usdt_symbols(payload: BinanceExchangeInfoWire) -> Vec<String> {
    let mut symbols: Vec<String> = payload
        .symbols
        .into_iter()
        .filter(BinanceExchangeSymbolWire::is_tradable_usdt_perpetual)
        .map(|entry| entry.symbol.to_ascii_lowercase())
        .collect();

    symbols.sort_unstable();
    symbols.dedup();
    symbols
}

pub async fn fetch_perpetual_usdt_symbols(
    client: &Client,
    rest_base_url: &str,
) -> Result<Vec<String>, AppError> {
    let endpoint = exchange_info_endpoint(rest_base_url);
    let response = client.get(endpoint).send().await?.error_for_status()?;
    let payload = response.json::<BinanceExchangeInfoWire>().await?;

    let symbols = select_perpetual_usdt_symbols(payload);
    if symbols.is_empty() {
        return Err(AppError::InvalidArgument(
            "exchangeInfo listed no trading USDT perpetuals".to_string(),
        ));
    }
    Ok(symbols)
}
