use crate::market::types::{Exchange, FundingRateRecord, FundingUpdate, MergePolicy};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Symbol -> record, iterated in first-seen order.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingSnapshot {
    pub exchange: Exchange,
    pub version: u64,
    pub records: IndexMap<String, FundingRateRecord>,
}

impl FundingSnapshot {
    pub fn empty(exchange: Exchange) -> Self {
        Self {
            exchange,
            version: 0,
            records: IndexMap::new(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&FundingRateRecord> {
        self.records.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FundingRateRecord> {
        self.records.values()
    }
}

/// Sole writer of a feed's snapshot. Lives inside the feed task.
#[derive(Debug)]
pub struct SnapshotReconciler {
    policy: MergePolicy,
    snapshot: FundingSnapshot,
    dirty: bool,
}

impl SnapshotReconciler {
    pub fn new(exchange: Exchange, policy: MergePolicy) -> Self {
        Self {
            policy,
            snapshot: FundingSnapshot::empty(exchange),
            dirty: false,
        }
    }

    pub fn snapshot(&self) -> &FundingSnapshot {
        &self.snapshot
    }

    /// Returns a copy for publication and clears the dirty mark.
    pub fn take_publication(&mut self) -> Option<FundingSnapshot> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.snapshot.clone())
    }

    /// Applies one decoded frame and returns the symbols now flagged as changed.
    pub fn apply(&mut self, updates: &[FundingUpdate]) -> Vec<String> {
        let mut changed = IndexSet::with_capacity(updates.len());
        match self.policy {
            MergePolicy::IncrementalMerge => self.apply_incremental(updates, &mut changed),
            MergePolicy::BatchReplace { evict_after_missed } => {
                self.apply_batch(updates, evict_after_missed, &mut changed)
            }
        }

        self.snapshot.version = self.snapshot.version.saturating_add(1);
        self.dirty = true;
        changed.into_iter().collect()
    }

    fn apply_incremental(&mut self, updates: &[FundingUpdate], changed: &mut IndexSet<String>) {
        for update in updates {
            let flagged = upsert(&mut self.snapshot.records, update);
            mark_changed(changed, &update.symbol, flagged);
        }
    }

    fn apply_batch(
        &mut self,
        updates: &[FundingUpdate],
        evict_after_missed: Option<u32>,
        changed: &mut IndexSet<String>,
    ) {
        let mut seen = HashSet::with_capacity(updates.len());
        for update in updates {
            let flagged = upsert(&mut self.snapshot.records, update);
            mark_changed(changed, &update.symbol, flagged);
            seen.insert(update.symbol.as_str());
        }

        for record in self.snapshot.records.values_mut() {
            if seen.contains(record.symbol.as_str()) {
                record.missed_broadcasts = 0;
            } else {
                record.changed_since_last_emit = false;
                record.missed_broadcasts = record.missed_broadcasts.saturating_add(1);
            }
        }

        if let Some(limit) = evict_after_missed {
            self.snapshot
                .records
                .retain(|_, record| record.missed_broadcasts < limit);
        }
    }
}

fn upsert(records: &mut IndexMap<String, FundingRateRecord>, update: &FundingUpdate) -> bool {
    match records.get_mut(&update.symbol) {
        Some(existing) => {
            let differs = existing.rate != update.rate;
            existing.rate = update.rate;
            existing.changed_since_last_emit = differs;
            differs
        }
        None => {
            records.insert(
                update.symbol.clone(),
                FundingRateRecord::observed(update.symbol.clone(), update.rate),
            );
            true
        }
    }
}

fn mark_changed(changed: &mut IndexSet<String>, symbol: &str, flagged: bool) {
    if flagged {
        if !changed.contains(symbol) {
            changed.insert(symbol.to_string());
        }
    } else {
        changed.shift_remove(symbol);
    }
}

/// Read side of a published snapshot. Consumers only ever get copies.
#[derive(Debug, Clone)]
pub struct SharedSnapshot {
    inner: Arc<RwLock<Arc<FundingSnapshot>>>,
}

impl SharedSnapshot {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(FundingSnapshot::empty(exchange)))),
        }
    }

    pub fn current(&self) -> Arc<FundingSnapshot> {
        Arc::clone(&self.inner.read())
    }

    pub(crate) fn publish(&self, snapshot: FundingSnapshot) {
        *self.inner.write() = Arc::new(snapshot);
    }
}
