use crate::market::binance::FeedWsStream;
use crate::market::decode::DecodeOutcome;
use crate::market::snapshot::{SharedSnapshot, SnapshotReconciler};
use crate::market::types::{duration_ms, FeedConnectionState, FeedSettings, FeedStatusSnapshot};
use crate::market::venue::FeedAdapter;
use futures_util::{Sink, SinkExt, StreamExt};
use reqwest::Client;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const CLOSE_SEND_TIMEOUT_MS: u64 = 1_000;

/// Exponential reconnect delay. The delay handed out for a retry is the value
/// before doubling; doubling is capped.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectBackoff {
    floor: Duration,
    cap: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(floor: Duration, cap: Duration) -> Self {
        Self {
            floor,
            cap: cap.max(floor),
            current: floor,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn schedule(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

/// Connection state machine, kept apart from socket I/O.
#[derive(Debug, Clone)]
pub struct FeedLifecycle {
    state: FeedConnectionState,
    backoff: ReconnectBackoff,
    heartbeat_running: bool,
    pending_retry: Option<Duration>,
    reconnect_attempt: u32,
}

impl FeedLifecycle {
    pub fn new(backoff: ReconnectBackoff) -> Self {
        Self {
            state: FeedConnectionState::Connecting,
            backoff,
            heartbeat_running: false,
            pending_retry: None,
            reconnect_attempt: 0,
        }
    }

    pub fn state(&self) -> FeedConnectionState {
        self.state
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat_running
    }

    pub fn pending_retry(&self) -> Option<Duration> {
        self.pending_retry
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    pub fn begin_connect(&mut self) {
        self.state = FeedConnectionState::Connecting;
        self.pending_retry = None;
    }

    pub fn on_open(&mut self) {
        self.state = FeedConnectionState::Open;
        self.heartbeat_running = true;
        self.backoff.reset();
        self.reconnect_attempt = 0;
    }

    /// Returns the delay before the next connect attempt.
    pub fn on_closed(&mut self) -> Duration {
        self.state = FeedConnectionState::Closed;
        self.heartbeat_running = false;
        let delay = self.backoff.schedule();
        self.pending_retry = Some(delay);
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        delay
    }

    pub fn on_unsubscribe(&mut self) {
        self.state = FeedConnectionState::Closing;
        self.heartbeat_running = false;
        self.pending_retry = None;
    }

    pub fn on_stopped(&mut self) {
        self.state = FeedConnectionState::Stopped;
        self.heartbeat_running = false;
        self.pending_retry = None;
    }
}

#[derive(Debug, Default, Clone)]
struct FeedDiagnostics {
    frames_received: u64,
    updates_applied: u64,
    decode_errors: u64,
    last_decode_error: Option<String>,
    unpublished: bool,
}

impl FeedDiagnostics {
    fn record_decode_error(&mut self, venue: &str, reason: String) {
        self.decode_errors = self.decode_errors.saturating_add(1);
        debug!(venue, reason = %reason, "discarded undecodable funding data");
        self.last_decode_error = Some(reason);
    }
}

struct FeedContext<'a> {
    settings: &'a FeedSettings,
    status_store: &'a Arc<RwLock<FeedStatusSnapshot>>,
    shared_snapshot: &'a SharedSnapshot,
    cancel_token: &'a CancellationToken,
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

/// Drives one exchange feed until `cancel_token` fires. The socket is replaced
/// on every retry; the reconciler and its snapshot survive reconnects.
pub async fn run_funding_feed(
    mut adapter: FeedAdapter,
    settings: FeedSettings,
    http_client: Client,
    shared_snapshot: SharedSnapshot,
    status_store: Arc<RwLock<FeedStatusSnapshot>>,
    cancel_token: CancellationToken,
) {
    let context = FeedContext {
        settings: &settings,
        status_store: &status_store,
        shared_snapshot: &shared_snapshot,
        cancel_token: &cancel_token,
    };
    let mut lifecycle = FeedLifecycle::new(ReconnectBackoff::new(
        settings.reconnect_floor,
        settings.reconnect_cap,
    ));
    let mut reconciler = SnapshotReconciler::new(adapter.exchange(), settings.merge_policy);
    let mut diagnostics = FeedDiagnostics::default();

    while !cancel_token.is_cancelled() {
        lifecycle.begin_connect();
        publish_status(
            &context,
            &lifecycle,
            &diagnostics,
            &reconciler,
            Some("opening websocket stream".to_string()),
        )
        .await;

        let connected = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            result = adapter.connect(&http_client) => result,
        };

        let reason = match connected {
            Ok(websocket_stream) => {
                lifecycle.on_open();
                info!(
                    venue = settings.venue.as_str(),
                    "funding feed connected"
                );
                publish_status(
                    &context,
                    &lifecycle,
                    &diagnostics,
                    &reconciler,
                    Some("websocket connected".to_string()),
                )
                .await;

                match drive_session(
                    websocket_stream,
                    &adapter,
                    &context,
                    &mut reconciler,
                    &mut diagnostics,
                )
                .await
                {
                    SessionEnd::Cancelled => {
                        lifecycle.on_unsubscribe();
                        break;
                    }
                    SessionEnd::Lost(reason) => reason,
                }
            }
            Err(error) => format!("websocket connect error: {error}"),
        };

        publish_snapshot(&context, &mut reconciler);
        let delay = lifecycle.on_closed();
        warn!(
            venue = settings.venue.as_str(),
            attempt = lifecycle.reconnect_attempt(),
            delay_ms = duration_ms(delay),
            reason = %reason,
            "funding feed closed, reconnect scheduled"
        );
        publish_status(&context, &lifecycle, &diagnostics, &reconciler, Some(reason)).await;

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    lifecycle.on_stopped();
    publish_snapshot(&context, &mut reconciler);
    info!(venue = settings.venue.as_str(), "funding feed stopped");
    publish_status(
        &context,
        &lifecycle,
        &diagnostics,
        &reconciler,
        Some("feed unsubscribed".to_string()),
    )
    .await;
}

async fn drive_session(
    websocket_stream: FeedWsStream,
    adapter: &FeedAdapter,
    context: &FeedContext<'_>,
    reconciler: &mut SnapshotReconciler,
    diagnostics: &mut FeedDiagnostics,
) -> SessionEnd {
    let (mut sink, mut stream) = websocket_stream.split();

    match adapter.subscription_message() {
        Ok(Some(subscription)) => {
            if let Err(error) = sink.send(subscription).await {
                return SessionEnd::Lost(format!("subscription failed: {error}"));
            }
        }
        Ok(None) => {}
        Err(error) => return SessionEnd::Lost(format!("subscription failed: {error}")),
    }

    let heartbeat_period = context.settings.heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_period, heartbeat_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut emit_ticker = tokio::time::interval(context.settings.emit_interval);
    emit_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = context.cancel_token.cancelled() => {
                let close = sink.send(Message::Close(None));
                let _ = tokio::time::timeout(Duration::from_millis(CLOSE_SEND_TIMEOUT_MS), close).await;
                return SessionEnd::Cancelled;
            }
            _ = heartbeat.tick() => {
                if let Err(reason) = send_heartbeat(&mut sink, adapter).await {
                    return SessionEnd::Lost(reason);
                }
                trace!(venue = context.settings.venue.as_str(), "heartbeat sent");
            }
            _ = emit_ticker.tick() => {
                let snapshot_published = publish_snapshot(context, reconciler);
                if snapshot_published || diagnostics.unpublished {
                    publish_counters(context, diagnostics, reconciler).await;
                    diagnostics.unpublished = false;
                }
            }
            next_frame = stream.next() => {
                let Some(frame_result) = next_frame else {
                    return SessionEnd::Lost("websocket stream ended".to_string());
                };
                match frame_result {
                    Ok(message) => {
                        if let Some(end) = handle_message(message, adapter, context, reconciler, diagnostics) {
                            return end;
                        }
                    }
                    Err(error) => {
                        return SessionEnd::Lost(format!("websocket frame error: {error}"));
                    }
                }
            }
        }
    }
}

/// A failed send means the socket is gone; the caller treats it as a close.
async fn send_heartbeat<S>(sink: &mut S, adapter: &FeedAdapter) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let ping = adapter
        .heartbeat_message()
        .map_err(|error| format!("heartbeat failed: {error}"))?;
    sink.send(ping)
        .await
        .map_err(|error| format!("heartbeat failed: {error}"))
}

fn handle_message(
    message: Message,
    adapter: &FeedAdapter,
    context: &FeedContext<'_>,
    reconciler: &mut SnapshotReconciler,
    diagnostics: &mut FeedDiagnostics,
) -> Option<SessionEnd> {
    match message {
        Message::Text(text_payload) => {
            let mut owned_payload = text_payload.into_bytes();
            ingest_frame(&mut owned_payload, adapter, context, reconciler, diagnostics);
            None
        }
        Message::Binary(mut binary_payload) => {
            ingest_frame(&mut binary_payload, adapter, context, reconciler, diagnostics);
            None
        }
        Message::Close(frame) => {
            let reason = frame
                .map(|close| format!("closed by server: {} {}", close.code, close.reason))
                .unwrap_or_else(|| "closed by server".to_string());
            Some(SessionEnd::Lost(reason))
        }
        _ => None,
    }
}

fn ingest_frame(
    payload: &mut [u8],
    adapter: &FeedAdapter,
    context: &FeedContext<'_>,
    reconciler: &mut SnapshotReconciler,
    diagnostics: &mut FeedDiagnostics,
) {
    if context.cancel_token.is_cancelled() {
        return;
    }
    diagnostics.frames_received = diagnostics.frames_received.saturating_add(1);
    diagnostics.unpublished = true;

    let venue = context.settings.venue.as_str();
    let mut rejected_entries = Vec::new();
    let outcome = adapter.decode(payload, &mut rejected_entries);
    for reason in rejected_entries {
        diagnostics.record_decode_error(venue, reason);
    }

    match outcome {
        DecodeOutcome::Updates(updates) => {
            let changed = reconciler.apply(&updates);
            diagnostics.updates_applied = diagnostics
                .updates_applied
                .saturating_add(updates.len() as u64);
            trace!(
                venue,
                updates = updates.len(),
                changed = changed.len(),
                "funding frame applied"
            );
        }
        DecodeOutcome::Ignored => {}
        DecodeOutcome::Invalid(reason) => diagnostics.record_decode_error(venue, reason),
    }
}

fn publish_snapshot(context: &FeedContext<'_>, reconciler: &mut SnapshotReconciler) -> bool {
    match reconciler.take_publication() {
        Some(snapshot) => {
            context.shared_snapshot.publish(snapshot);
            true
        }
        None => false,
    }
}

async fn publish_counters(
    context: &FeedContext<'_>,
    diagnostics: &FeedDiagnostics,
    reconciler: &SnapshotReconciler,
) {
    let mut writable = context.status_store.write().await;
    writable.frames_received = diagnostics.frames_received;
    writable.updates_applied = diagnostics.updates_applied;
    writable.decode_errors = diagnostics.decode_errors;
    writable.last_decode_error = diagnostics.last_decode_error.clone();
    writable.tracked_symbols = reconciler.snapshot().len();
}

async fn publish_status(
    context: &FeedContext<'_>,
    lifecycle: &FeedLifecycle,
    diagnostics: &FeedDiagnostics,
    reconciler: &SnapshotReconciler,
    reason: Option<String>,
) {
    let venue = context.settings.venue;
    let snapshot = FeedStatusSnapshot {
        exchange: venue.exchange(),
        venue,
        state: lifecycle.state(),
        reconnect_attempt: lifecycle.reconnect_attempt(),
        next_retry_ms: lifecycle.pending_retry().map(duration_ms),
        frames_received: diagnostics.frames_received,
        updates_applied: diagnostics.updates_applied,
        decode_errors: diagnostics.decode_errors,
        last_decode_error: diagnostics.last_decode_error.clone(),
        tracked_symbols: reconciler.snapshot().len(),
        reason,
    };

    let mut writable = context.status_store.write().await;
    *writable = snapshot;
}
