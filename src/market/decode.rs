use crate::error::AppError;
use crate::market::types::{fraction_to_percent, normalize_symbol, FeedVenue, FundingUpdate};
use serde::Deserialize;

const DELTA_FUNDING_RATE_TYPE: &str = "funding_rate";
const BINANCE_MARK_PRICE_EVENT: &str = "markPriceUpdate";

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Updates(Vec<FundingUpdate>),
    /// Well-formed frame that carries no funding rate (acks, pongs, other channels).
    Ignored,
    /// Frame that does not match the venue's shape. Recorded, never fatal.
    Invalid(String),
}

/// Exchanges send the fraction either as a JSON number or as a decimal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RateWire {
    Number(f64),
    Text(String),
}

impl RateWire {
    fn to_percent(&self) -> Result<f64, AppError> {
        let fraction = match self {
            Self::Number(value) => *value,
            Self::Text(raw) => raw.trim().parse::<f64>()?,
        };
        if !fraction.is_finite() {
            return Err(AppError::InvalidArgument(
                "funding rate must be finite".to_string(),
            ));
        }
        Ok(fraction_to_percent(fraction))
    }
}

#[derive(Debug, Deserialize)]
struct DeltaFrameWire {
    #[serde(rename = "type")]
    kind: String,
    symbol: Option<String>,
    funding_rate: Option<RateWire>,
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BinanceCombinedFrameWire {
    data: Option<BinanceMarkPriceWire>,
}

#[derive(Debug, Deserialize)]
struct BinanceMarkPriceWire {
    #[serde(rename = "e")]
    event_type: Option<String>,
    #[serde(rename = "s")]
    symbol: Option<String>,
    #[serde(rename = "r")]
    funding_rate: Option<RateWire>,
    #[serde(rename = "T")]
    next_funding_time: Option<i64>,
}

pub fn decode_frame(venue: FeedVenue, payload: &mut [u8]) -> DecodeOutcome {
    let mut rejected_entries = Vec::new();
    decode_frame_collecting(venue, payload, &mut rejected_entries)
}

/// Like [`decode_frame`], but entries of a batch frame that cannot be read are
/// skipped and their reasons pushed to `rejected_entries`. The rest of the
/// batch still decodes.
pub fn decode_frame_collecting(
    venue: FeedVenue,
    payload: &mut [u8],
    rejected_entries: &mut Vec<String>,
) -> DecodeOutcome {
    let decoded = match venue {
        FeedVenue::DeltaFundingRate => decode_delta_frame(payload),
        FeedVenue::BinanceMarkPrice => decode_binance_mark_price_frame(payload),
        FeedVenue::BinanceFundingArray => decode_binance_funding_array(payload, rejected_entries),
    };

    match decoded {
        Ok(outcome) => outcome,
        Err(error) => DecodeOutcome::Invalid(error.to_string()),
    }
}

fn decode_delta_frame(payload: &mut [u8]) -> Result<DecodeOutcome, AppError> {
    let wire: DeltaFrameWire = simd_json::serde::from_slice(payload)?;
    if wire.kind != DELTA_FUNDING_RATE_TYPE {
        return Ok(DecodeOutcome::Ignored);
    }

    let symbol = wire
        .symbol
        .as_deref()
        .and_then(normalize_symbol)
        .ok_or_else(|| AppError::InvalidArgument("funding_rate frame without symbol".to_string()))?;
    let rate = wire
        .funding_rate
        .as_ref()
        .ok_or_else(|| {
            AppError::InvalidArgument(format!("funding_rate frame for {symbol} without rate"))
        })?
        .to_percent()?;

    Ok(DecodeOutcome::Updates(vec![FundingUpdate {
        symbol,
        rate,
        event_time: wire.timestamp,
    }]))
}

fn decode_binance_mark_price_frame(payload: &mut [u8]) -> Result<DecodeOutcome, AppError> {
    let wire: BinanceCombinedFrameWire = simd_json::serde::from_slice(payload)?;
    let Some(data) = wire.data else {
        return Ok(DecodeOutcome::Ignored);
    };

    match mark_price_update(data)? {
        Some(update) => Ok(DecodeOutcome::Updates(vec![update])),
        None => Ok(DecodeOutcome::Ignored),
    }
}

fn decode_binance_funding_array(
    payload: &mut [u8],
    rejected_entries: &mut Vec<String>,
) -> Result<DecodeOutcome, AppError> {
    let wire: Vec<BinanceMarkPriceWire> = simd_json::serde::from_slice(payload)?;

    let mut updates = Vec::with_capacity(wire.len());
    for item in wire {
        match mark_price_update(item) {
            Ok(Some(update)) => updates.push(update),
            Ok(None) => {}
            Err(error) => rejected_entries.push(error.to_string()),
        }
    }

    if updates.is_empty() {
        return Ok(DecodeOutcome::Ignored);
    }
    Ok(DecodeOutcome::Updates(updates))
}

fn mark_price_update(wire: BinanceMarkPriceWire) -> Result<Option<FundingUpdate>, AppError> {
    if let Some(event_type) = wire.event_type.as_deref() {
        if event_type != BINANCE_MARK_PRICE_EVENT {
            return Ok(None);
        }
    }

    let Some(symbol) = wire.symbol.as_deref().and_then(normalize_symbol) else {
        return Ok(None);
    };
    let rate = wire
        .funding_rate
        .as_ref()
        .ok_or_else(|| {
            AppError::InvalidArgument(format!("markPriceUpdate for {symbol} without rate"))
        })?
        .to_percent()
        .map_err(|error| AppError::InvalidArgument(format!("{symbol}: {error}")))?;

    Ok(Some(FundingUpdate {
        symbol,
        rate,
        event_time: wire.next_funding_time,
    }))
}
