use crate::market::snapshot::FundingSnapshot;
use crate::market::types::Exchange;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateSort {
    #[default]
    None,
    High,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TableQuery {
    pub search: String,
    pub positive_sort: RateSort,
    pub negative_sort: RateSort,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            positive_sort: RateSort::High,
            negative_sort: RateSort::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingRow {
    pub symbol: String,
    pub rate: f64,
    pub display_rate: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingTable {
    pub exchange: Exchange,
    pub label: &'static str,
    pub positive: Vec<FundingRow>,
    pub negative: Vec<FundingRow>,
    pub displayed: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectedSymbolView {
    pub symbol: String,
    pub rate: Option<f64>,
    pub display_rate: Option<String>,
}

pub fn format_rate(rate: f64) -> String {
    format!("{rate:.4}%")
}

/// Filters by case-insensitive substring, splits at zero (zero counts as
/// positive) and orders each bucket. Pure; the snapshot is not touched.
pub fn derive_funding_table(snapshot: &FundingSnapshot, query: &TableQuery) -> FundingTable {
    let needle = query.search.trim().to_ascii_lowercase();

    let (mut positive, mut negative): (Vec<FundingRow>, Vec<FundingRow>) = snapshot
        .iter()
        .filter(|record| needle.is_empty() || record.symbol.to_ascii_lowercase().contains(&needle))
        .map(|record| FundingRow {
            symbol: record.symbol.clone(),
            rate: record.rate,
            display_rate: format_rate(record.rate),
            changed: record.changed_since_last_emit,
        })
        .partition(|row| row.rate >= 0.0);

    sort_bucket(&mut positive, query.positive_sort, Ordering::Greater);
    sort_bucket(&mut negative, query.negative_sort, Ordering::Less);

    FundingTable {
        exchange: snapshot.exchange,
        label: snapshot.exchange.label(),
        displayed: positive.len() + negative.len(),
        positive,
        negative,
    }
}

/// `RateSort::None` falls back to the bucket's natural order: most extreme first.
fn sort_bucket(rows: &mut [FundingRow], sort: RateSort, natural: Ordering) {
    let descending = match sort {
        RateSort::High => true,
        RateSort::Low => false,
        RateSort::None => natural == Ordering::Greater,
    };

    if descending {
        rows.sort_by(|left, right| right.rate.total_cmp(&left.rate));
    } else {
        rows.sort_by(|left, right| left.rate.total_cmp(&right.rate));
    }
}

pub fn selected_row(snapshot: &FundingSnapshot, symbol: &str) -> SelectedSymbolView {
    let rate = snapshot.get(symbol).map(|record| record.rate);
    SelectedSymbolView {
        symbol: symbol.to_string(),
        rate,
        display_rate: rate.map(format_rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::FundingRateRecord;

    fn snapshot(rows: &[(&str, f64)]) -> FundingSnapshot {
        let mut snapshot = FundingSnapshot::empty(Exchange::Binance);
        for (symbol, rate) in rows {
            snapshot.records.insert(
                symbol.to_string(),
                FundingRateRecord::observed(symbol.to_string(), *rate),
            );
        }
        snapshot
    }

    fn symbols(rows: &[FundingRow]) -> Vec<&str> {
        rows.iter().map(|row| row.symbol.as_str()).collect()
    }

    #[test]
    fn splits_and_sorts_with_default_directives() {
        let snapshot = snapshot(&[
            ("A", 0.03),
            ("B", -0.01),
            ("C", 0.0),
            ("D", -0.05),
            ("E", 0.01),
        ]);

        let table = derive_funding_table(&snapshot, &TableQuery::default());

        assert_eq!(symbols(&table.positive), vec!["A", "E", "C"]);
        assert_eq!(symbols(&table.negative), vec!["D", "B"]);
        assert_eq!(table.displayed, 5);
        assert_eq!(table.label, "Binance");
    }

    #[test]
    fn search_is_case_insensitive_and_counts_filtered_rows() {
        let snapshot = snapshot(&[("BTCUSDT", 0.01), ("ETHUSDT", -0.02), ("BTCDOMUSDT", -0.001)]);
        let query = TableQuery {
            search: "btc".to_string(),
            ..TableQuery::default()
        };

        let table = derive_funding_table(&snapshot, &query);

        assert_eq!(symbols(&table.positive), vec!["BTCUSDT"]);
        assert_eq!(symbols(&table.negative), vec!["BTCDOMUSDT"]);
        assert_eq!(table.displayed, 2);
    }

    #[test]
    fn explicit_directives_reverse_bucket_order() {
        let snapshot = snapshot(&[("A", 0.03), ("B", -0.01), ("D", -0.05), ("E", 0.01)]);
        let query = TableQuery {
            search: String::new(),
            positive_sort: RateSort::Low,
            negative_sort: RateSort::High,
        };

        let table = derive_funding_table(&snapshot, &query);

        assert_eq!(symbols(&table.positive), vec!["E", "A"]);
        assert_eq!(symbols(&table.negative), vec!["B", "D"]);
    }

    #[test]
    fn unsorted_buckets_put_extremes_first() {
        let snapshot = snapshot(&[("A", 0.01), ("B", 0.04), ("C", -0.01), ("D", -0.03)]);
        let query = TableQuery {
            search: String::new(),
            positive_sort: RateSort::None,
            negative_sort: RateSort::None,
        };

        let table = derive_funding_table(&snapshot, &query);

        assert_eq!(symbols(&table.positive), vec!["B", "A"]);
        assert_eq!(symbols(&table.negative), vec!["D", "C"]);
    }

    #[test]
    fn equal_rates_keep_first_seen_order() {
        let snapshot = snapshot(&[("X", 0.01), ("Y", 0.01), ("Z", 0.01)]);
        let table = derive_funding_table(&snapshot, &TableQuery::default());
        assert_eq!(symbols(&table.positive), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn formats_four_decimals_with_percent_suffix() {
        assert_eq!(format_rate(0.125), "0.1250%");
        assert_eq!(format_rate(-0.02), "-0.0200%");
        assert_eq!(format_rate(0.0), "0.0000%");
    }

    #[test]
    fn selected_row_reports_missing_symbol_without_rate() {
        let snapshot = snapshot(&[("BTCUSDT", 0.01)]);

        let present = selected_row(&snapshot, "BTCUSDT");
        assert_eq!(present.display_rate.as_deref(), Some("0.0100%"));

        let absent = selected_row(&snapshot, "DOGEUSDT");
        assert_eq!(absent.rate, None);
        assert_eq!(absent.display_rate, None);
    }
}
