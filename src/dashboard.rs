// 📊 Dashboard - one immutable view state per screen
//
// fetch_snapshot() does the store round-trips (one read transaction, wrapped
// in the retry policy); DashboardView::build() is a pure reducer over that snapshot.
// Nothing is cached: after any payment insert or reversal the caller fetches
// a new snapshot and builds a new view.

use crate::attendance::{count_for_day, local_today};
use crate::config::Config;
use crate::db::DuesStore;
use crate::debt::{DebtCalculator, MemberStatus};
use crate::error::Result;
use crate::history::{HistoryEntry, HistoryProjector};
use crate::ledger::{LedgerAggregator, SeriesPoint};
use crate::models::{AttendanceEvent, Member, PaymentEvent};
use crate::period::{current_month_start, to_local, to_utc, ReportPeriod, ResolvedRange};
use crate::retry::{retry_with_backoff, RetryPolicy};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Everything the dashboard reads from the store, taken together
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    /// Whole roster, inactive members included (for payer names)
    pub members: Vec<Member>,
    /// Payments inside the report range
    pub range_payments: Vec<PaymentEvent>,
    /// Payments since the first of the current month
    pub month_payments: Vec<PaymentEvent>,
    /// Check-ins for the local "today"
    pub attendance_today: Vec<AttendanceEvent>,
}

/// Fetch a fresh snapshot for `range`.
///
/// All four reads share one read transaction; the whole snapshot is retried
/// as a unit on transient storage errors.
pub fn fetch_snapshot<S: DuesStore>(
    store: &S,
    range: &ResolvedRange,
    now: DateTime<Utc>,
    offset: FixedOffset,
    policy: &RetryPolicy,
) -> Result<LedgerSnapshot> {
    let bounds = range.to_utc_bounds(offset);
    let month_start = to_utc(current_month_start(to_local(now, offset)), offset);
    let today = local_today(now, offset);

    retry_with_backoff(policy, "snapshot", || {
        store.read_consistent(|store| {
            Ok(LedgerSnapshot {
                members: store.list_members()?,
                range_payments: store.list_payments(Some(bounds))?,
                month_payments: store.list_payments_since(month_start)?,
                attendance_today: store.list_attendance(today)?,
            })
        })
    })
}

// ============================================================================
// VIEW STATE
// ============================================================================

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub offset: FixedOffset,
    pub history_limit: usize,
    pub former_member_label: String,
}

impl From<&Config> for DashboardSettings {
    fn from(config: &Config) -> Self {
        DashboardSettings {
            offset: config.utc_offset,
            history_limit: config.history_limit,
            former_member_label: config.former_member_label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_outstanding: Decimal,
    pub headcount: usize,
    pub collected_in_range: Decimal,
    pub attendance_today: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub period: ReportPeriod,
    pub title: String,
    pub range: ResolvedRange,
    pub today: NaiveDate,
    pub metrics: DashboardMetrics,
    /// Active members in roster order, with paid flag
    pub members: Vec<MemberStatus>,
    pub series: Vec<SeriesPoint>,
    pub history: Vec<HistoryEntry>,
    pub excluded_payments: usize,
}

impl DashboardView {
    pub fn build(
        snapshot: &LedgerSnapshot,
        period: ReportPeriod,
        range: ResolvedRange,
        now: DateTime<Utc>,
        settings: &DashboardSettings,
    ) -> DashboardView {
        let aggregator = LedgerAggregator::new(settings.offset);
        let ledger = aggregator.aggregate(
            &snapshot.range_payments,
            &snapshot.month_payments,
            &range,
            now,
        );

        let debt = DebtCalculator::assess(&snapshot.members, &ledger.paid_member_ids);

        let history = HistoryProjector::new(
            settings.history_limit,
            settings.former_member_label.clone(),
        )
        .project(&snapshot.range_payments, &snapshot.members);

        let today = local_today(now, settings.offset);

        DashboardView {
            period,
            title: period.title(),
            today,
            metrics: DashboardMetrics {
                total_outstanding: debt.total_outstanding,
                headcount: debt.headcount,
                collected_in_range: ledger.total_in_range,
                attendance_today: count_for_day(&snapshot.attendance_today, today),
            },
            members: debt.members,
            series: ledger.series,
            history,
            excluded_payments: ledger.excluded_events,
            range,
        }
    }

    /// Home screen list: who still owes this month
    pub fn unpaid(&self) -> Vec<&MemberStatus> {
        self.members.iter().filter(|status| !status.is_paid).collect()
    }

    /// Roster directory filtered by a case-insensitive name fragment
    pub fn search(&self, query: &str) -> Vec<&MemberStatus> {
        let needle = query.trim().to_lowercase();
        self.members
            .iter()
            .filter(|status| status.member.name.to_lowercase().contains(&needle))
            .collect()
    }
}

/// Resolve, fetch and build in one call
pub fn load_dashboard<S: DuesStore>(
    store: &S,
    period: ReportPeriod,
    now: DateTime<Utc>,
    config: &Config,
) -> Result<DashboardView> {
    let settings = DashboardSettings::from(config);
    let range = period.resolve(to_local(now, settings.offset));
    let snapshot = fetch_snapshot(store, &range, now, settings.offset, &config.retry)?;

    Ok(DashboardView::build(&snapshot, period, range, now, &settings))
}

// ============================================================================
// TESTS
// ============================================================================
