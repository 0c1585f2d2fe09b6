pub mod commands;
pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod market;
pub mod state;

use commands::{
    app_info::app_info,
    feeds::{funding_feed_status, funding_table, start_funding_feed, stop_all_feeds},
};
use config::AppConfig;
use error::AppError;
use market::types::Exchange;
use state::AppState;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const SUMMARY_INTERVAL_SECS: u64 = 5;

/// Headless entry point: streams both exchanges and logs a table summary
/// until Ctrl-C.
pub fn run() -> Result<(), AppError> {
    logging::init_tracing();
    let config = AppConfig::from_env()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_headless(config))
}

async fn run_headless(config: AppConfig) -> Result<(), AppError> {
    let about = app_info();
    info!(
        product = %about.product_name,
        version = %about.version,
        delta_ws = %config.endpoints.delta_ws_url,
        binance_venue = config.binance_venue.as_str(),
        "funding desk starting"
    );

    let state = AppState::new(config);
    for exchange in Exchange::ALL {
        start_funding_feed(&state, exchange, None).await?;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut summary = tokio::time::interval(Duration::from_secs(SUMMARY_INTERVAL_SECS));
    summary.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            signal = &mut shutdown => {
                if let Err(error) = signal {
                    warn!(error = %error, "ctrl-c listener failed, shutting down");
                }
                break;
            }
            _ = summary.tick() => log_summary(&state).await?,
        }
    }

    info!("stopping funding feeds");
    stop_all_feeds(&state).await
}

async fn log_summary(state: &AppState) -> Result<(), AppError> {
    for exchange in Exchange::ALL {
        let status = funding_feed_status(state, exchange).await?;
        let table = funding_table(state, exchange, None);
        let richest = table
            .positive
            .first()
            .map(|row| format!("{} {}", row.symbol, row.display_rate));
        let cheapest = table
            .negative
            .first()
            .map(|row| format!("{} {}", row.symbol, row.display_rate));

        info!(
            exchange = table.label,
            state = ?status.state,
            symbols = table.displayed,
            positive = table.positive.len(),
            negative = table.negative.len(),
            richest = ?richest,
            cheapest = ?cheapest,
            decode_errors = status.decode_errors,
            "funding summary"
        );
    }
    Ok(())
}
