use crate::config::AppConfig;
use crate::control::{ActiveSymbolState, ControlClient};
use crate::market::snapshot::SharedSnapshot;
use crate::market::types::{Exchange, FeedStatusSnapshot};
use parking_lot::Mutex as SyncMutex;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct FeedHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
}

/// Everything the application keeps for one exchange. `control_gate` is held
/// for the duration of a control call; a second caller gets `Busy`.
pub struct FeedSlot {
    pub exchange: Exchange,
    pub feed: Mutex<Option<FeedHandle>>,
    pub status: Arc<RwLock<FeedStatusSnapshot>>,
    pub snapshot: SharedSnapshot,
    pub selection: SyncMutex<ActiveSymbolState>,
    pub control_gate: Mutex<()>,
    pub control: ControlClient,
}

impl FeedSlot {
    fn new(exchange: Exchange, config: &AppConfig, http_client: &Client) -> Self {
        let status = FeedStatusSnapshot::stopped(
            config.default_venue(exchange),
            Some("feed idle".to_string()),
        );

        Self {
            exchange,
            feed: Mutex::new(None),
            status: Arc::new(RwLock::new(status)),
            snapshot: SharedSnapshot::new(exchange),
            selection: SyncMutex::new(ActiveSymbolState::default()),
            control_gate: Mutex::new(()),
            control: ControlClient::new(http_client.clone(), config.control_url(exchange)),
        }
    }
}

pub struct AppState {
    pub started_at: Instant,
    pub config: AppConfig,
    pub http_client: Client,
    delta: FeedSlot,
    binance: FeedSlot,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let http_client = Client::new();
        let delta = FeedSlot::new(Exchange::Delta, &config, &http_client);
        let binance = FeedSlot::new(Exchange::Binance, &config, &http_client);

        Self {
            started_at: Instant::now(),
            config,
            http_client,
            delta,
            binance,
        }
    }

    pub fn slot(&self, exchange: Exchange) -> &FeedSlot {
        match exchange {
            Exchange::Delta => &self.delta,
            Exchange::Binance => &self.binance,
        }
    }
}
