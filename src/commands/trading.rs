use crate::error::AppError;
use crate::market::table::{selected_row, SelectedSymbolView};
use crate::market::types::Exchange;
use crate::state::{AppState, FeedSlot};
use serde::Serialize;
use simd_json::OwnedValue;
use tokio::sync::MutexGuard;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSymbolView {
    pub exchange: Exchange,
    pub selected: Option<SelectedSymbolView>,
    pub loading: bool,
    pub last_error: Option<String>,
}

fn acquire_gate(slot: &FeedSlot) -> Result<MutexGuard<'_, ()>, AppError> {
    slot.control_gate.try_lock().map_err(|_| {
        AppError::Busy(format!("{} control call", slot.exchange.as_str()))
    })
}

pub async fn select_active_symbol(
    state: &AppState,
    exchange: Exchange,
    symbol: &str,
) -> Result<ActiveSymbolView, AppError> {
    let slot = state.slot(exchange);
    let _gate = acquire_gate(slot)?;

    let mut selection = slot.selection.lock().clone();
    let result = selection.select(&slot.control, symbol).await;
    *slot.selection.lock() = selection;
    result?;

    Ok(view_of(slot, false))
}

pub async fn clear_active_symbol(
    state: &AppState,
    exchange: Exchange,
) -> Result<ActiveSymbolView, AppError> {
    let slot = state.slot(exchange);
    let _gate = acquire_gate(slot)?;

    let mut selection = slot.selection.lock().clone();
    let result = selection.clear(&slot.control).await;
    *slot.selection.lock() = selection;
    result?;

    Ok(view_of(slot, false))
}

/// The selected-symbol panel: the chosen symbol plus its live rate, if tracked.
pub fn active_symbol_view(state: &AppState, exchange: Exchange) -> ActiveSymbolView {
    let slot = state.slot(exchange);
    let loading = slot.control_gate.try_lock().is_err();
    view_of(slot, loading)
}

fn view_of(slot: &FeedSlot, loading: bool) -> ActiveSymbolView {
    let selection = slot.selection.lock().clone();
    let snapshot = slot.snapshot.current();

    ActiveSymbolView {
        exchange: slot.exchange,
        selected: selection
            .selected
            .as_deref()
            .map(|symbol| selected_row(&snapshot, symbol)),
        loading,
        last_error: selection.last_error,
    }
}

pub async fn start_remote_service(state: &AppState, exchange: Exchange) -> Result<(), AppError> {
    let slot = state.slot(exchange);
    let _gate = acquire_gate(slot)?;
    slot.control.start_service().await
}

pub async fn stop_remote_service(state: &AppState, exchange: Exchange) -> Result<(), AppError> {
    let slot = state.slot(exchange);
    let _gate = acquire_gate(slot)?;
    slot.control.stop_service().await
}

pub async fn remote_service_status(
    state: &AppState,
    exchange: Exchange,
) -> Result<OwnedValue, AppError> {
    state.slot(exchange).control.service_status().await
}

pub async fn remote_active_symbol(
    state: &AppState,
    exchange: Exchange,
) -> Result<OwnedValue, AppError> {
    state.slot(exchange).control.active_symbol().await
}
