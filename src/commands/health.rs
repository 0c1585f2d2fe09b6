use crate::error::AppError;
use crate::market::types::{Exchange, FeedConnectionState};
use crate::state::AppState;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedHealth {
    pub exchange: Exchange,
    pub state: FeedConnectionState,
    pub tracked_symbols: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub feeds: Vec<FeedHealth>,
}

/// `degraded` while any feed is waiting out a reconnect.
pub fn build_health_response(started_at: Instant, feeds: Vec<FeedHealth>) -> HealthResponse {
    let degraded = feeds
        .iter()
        .any(|feed| feed.state == FeedConnectionState::Closed);

    HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        uptime_ms: started_at.elapsed().as_millis(),
        feeds,
    }
}

pub async fn health(state: &AppState) -> Result<HealthResponse, AppError> {
    let mut feeds = Vec::with_capacity(Exchange::ALL.len());
    for exchange in Exchange::ALL {
        let status = state.slot(exchange).status.read().await;
        feeds.push(FeedHealth {
            exchange,
            state: status.state,
            tracked_symbols: status.tracked_symbols,
        });
    }

    Ok(build_health_response(state.started_at, feeds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn health_reports_ok_with_idle_feeds() {
        let state = AppState::new(AppConfig::default());

        let response = health(&state).await.expect("health should build");

        assert_eq!(response.status, "ok");
        assert_eq!(response.feeds.len(), 2);
        assert!(response
            .feeds
            .iter()
            .all(|feed| feed.state == FeedConnectionState::Stopped));
        assert!(response.uptime_ms <= 1_000);
    }

    #[test]
    fn closed_feed_degrades_health() {
        let response = build_health_response(
            Instant::now(),
            vec![FeedHealth {
                exchange: Exchange::Binance,
                state: FeedConnectionState::Closed,
                tracked_symbols: 12,
            }],
        );
        assert_eq!(response.status, "degraded");
    }
}
