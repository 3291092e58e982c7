// 💵 Ledger Aggregator - totals, paid set and chart series from raw payments
//
// Policy for events outside the resolved range:
//   An event counts toward `total_in_range` iff it lies inside [start, end],
//   and then it lands in exactly one bucket. Anything else is rejected up
//   front (counted in `excluded_events`), so the series always sums to the
//   total.
//
// Paid status is evaluated against the real current month, never the
// selected report period.

use crate::models::{MemberId, PaymentEvent};
use crate::period::{current_month_start, to_local, BucketKey, ResolvedRange};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// LEDGER SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub key: BucketKey,
    pub label: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Sum of every accepted event in the range
    pub total_in_range: Decimal,

    /// Members with at least one payment in the current calendar month
    pub paid_member_ids: BTreeSet<MemberId>,

    /// One point per bucket, chronological, zero-filled
    pub series: Vec<SeriesPoint>,

    /// Events handed in but lying outside the range
    pub excluded_events: usize,
}

impl LedgerSummary {
    pub fn is_paid(&self, member_id: MemberId) -> bool {
        self.paid_member_ids.contains(&member_id)
    }

    pub fn series_total(&self) -> Decimal {
        self.series.iter().map(|point| point.total).sum()
    }
}

// ============================================================================
// LEDGER AGGREGATOR
// ============================================================================

pub struct LedgerAggregator {
    /// Local calendar used for bucketing and "current month"
    pub offset: FixedOffset,
}

impl LedgerAggregator {
    pub fn new(offset: FixedOffset) -> Self {
        LedgerAggregator { offset }
    }

    /// Aggregate one snapshot of the ledger.
    ///
    /// `range_events` are the payments fetched for the report range;
    /// `month_events` are the payments since the first of the current month.
    /// The two sets may overlap or be disjoint; they are read independently.
    pub fn aggregate(
        &self,
        range_events: &[PaymentEvent],
        month_events: &[PaymentEvent],
        range: &ResolvedRange,
        now: DateTime<Utc>,
    ) -> LedgerSummary {
        let (series, total_in_range, excluded_events) = self.bucket_series(range_events, range);

        if excluded_events > 0 {
            tracing::warn!(
                excluded = excluded_events,
                start = %range.start,
                end = %range.end,
                "Payments outside the report range were excluded"
            );
        }

        let paid_member_ids = self.paid_member_ids(month_events, now);

        tracing::debug!(
            events = range_events.len(),
            buckets = series.len(),
            paid = paid_member_ids.len(),
            "Ledger aggregated"
        );

        LedgerSummary {
            total_in_range,
            paid_member_ids,
            series,
            excluded_events,
        }
    }

    /// Single pass over the events into pre-enumerated, zero-initialised buckets
    fn bucket_series(
        &self,
        events: &[PaymentEvent],
        range: &ResolvedRange,
    ) -> (Vec<SeriesPoint>, Decimal, usize) {
        let mut totals = vec![Decimal::ZERO; range.buckets.len()];
        let mut total_in_range = Decimal::ZERO;
        let mut excluded = 0;

        for event in events {
            let local = to_local(event.paid_at, self.offset);
            match range.bucket_index(local) {
                Some(index) => {
                    totals[index] += event.amount;
                    total_in_range += event.amount;
                }
                None => excluded += 1,
            }
        }

        let series = range
            .buckets
            .iter()
            .zip(totals)
            .map(|(key, total)| SeriesPoint {
                key: *key,
                label: key.label(),
                total,
            })
            .collect();

        (series, total_in_range, excluded)
    }

    /// Members with ≥1 payment in [first of current month, now]
    pub fn paid_member_ids(&self, events: &[PaymentEvent], now: DateTime<Utc>) -> BTreeSet<MemberId> {
        let now_local = to_local(now, self.offset);
        let month_start = current_month_start(now_local);

        events
            .iter()
            .filter(|event| {
                let local = to_local(event.paid_at, self.offset);
                in_window(local, month_start, now_local)
            })
            .map(|event| event.member_id)
            .collect()
    }
}

fn in_window(ts: NaiveDateTime, start: NaiveDateTime, end: NaiveDateTime) -> bool {
    start <= ts && ts <= end
}

impl Default for LedgerAggregator {
    /// UTC calendar
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

// ============================================================================
// TESTS
// ============================================================================
