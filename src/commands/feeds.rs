use crate::error::AppError;
use crate::market::pipeline::run_funding_feed;
use crate::market::snapshot::FundingSnapshot;
use crate::market::table::{derive_funding_table, FundingTable, TableQuery};
use crate::market::types::{
    Exchange, FeedConnectionState, FeedStatusSnapshot, FundingFeedSession, FundingFeedStopResult,
    StartFundingFeedArgs,
};
use crate::market::venue::FeedAdapter;
use crate::state::{AppState, FeedHandle};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Starts (or restarts) the feed for `exchange`. A running feed is cancelled
/// and awaited first, so at most one feed task exists per exchange.
pub async fn start_funding_feed(
    state: &AppState,
    exchange: Exchange,
    args: Option<StartFundingFeedArgs>,
) -> Result<FundingFeedSession, AppError> {
    let settings = args
        .unwrap_or_default()
        .normalize(exchange, state.config.default_venue(exchange))?;
    let slot = state.slot(exchange);

    let mut feed_slot = slot.feed.lock().await;
    if let Some(handle) = feed_slot.take() {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
    }

    slot.snapshot.publish(FundingSnapshot::empty(exchange));

    let cancellation_token = CancellationToken::new();
    let adapter = FeedAdapter::new(settings.venue, state.config.endpoints.clone());
    let join_handle = tokio::spawn(run_funding_feed(
        adapter,
        settings.clone(),
        state.http_client.clone(),
        slot.snapshot.clone(),
        Arc::clone(&slot.status),
        cancellation_token.clone(),
    ));

    *feed_slot = Some(FeedHandle {
        cancellation_token,
        join_handle,
    });

    info!(
        exchange = exchange.as_str(),
        venue = settings.venue.as_str(),
        "funding feed started"
    );
    Ok(FundingFeedSession::from_settings(&settings))
}

pub async fn stop_funding_feed(
    state: &AppState,
    exchange: Exchange,
) -> Result<FundingFeedStopResult, AppError> {
    let slot = state.slot(exchange);
    let existing_handle = {
        let mut feed_slot = slot.feed.lock().await;
        feed_slot.take()
    };

    let stopped = if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
        true
    } else {
        false
    };

    {
        let mut writable = slot.status.write().await;
        writable.state = FeedConnectionState::Stopped;
        writable.next_retry_ms = None;
        writable.reason = Some("feed stopped by command".to_string());
    }

    Ok(FundingFeedStopResult { stopped })
}

pub async fn stop_all_feeds(state: &AppState) -> Result<(), AppError> {
    for exchange in Exchange::ALL {
        stop_funding_feed(state, exchange).await?;
    }
    Ok(())
}

pub async fn funding_feed_status(
    state: &AppState,
    exchange: Exchange,
) -> Result<FeedStatusSnapshot, AppError> {
    let snapshot = state.slot(exchange).status.read().await.clone();
    Ok(snapshot)
}

pub fn funding_snapshot(state: &AppState, exchange: Exchange) -> Arc<FundingSnapshot> {
    state.slot(exchange).snapshot.current()
}

pub fn funding_table(
    state: &AppState,
    exchange: Exchange,
    query: Option<TableQuery>,
) -> FundingTable {
    let snapshot = funding_snapshot(state, exchange);
    derive_funding_table(&snapshot, &query.unwrap_or_default())
}
