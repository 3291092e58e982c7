// 🗓️ Period Resolver - turn a report selection into a concrete range + buckets
//
// Two modes:
//   Rolling        → the current month and the five before it, one bucket per month
//   Explicit month → first..last instant of that month, one bucket per day
//
// Buckets are keyed by calendar position (day / year-month), never by the
// display label. "MAR" 2023 and "MAR" 2024 are different buckets even though
// they print the same.

use crate::error::{DuesError, Result};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of monthly buckets in the rolling view
pub const ROLLING_MONTHS: u32 = 6;

/// Short month labels in the dashboard locale (es-MX, uppercase, no trailing dot)
const MONTH_LABELS_ES_MX: [&str; 12] = [
    "ENE", "FEB", "MAR", "ABR", "MAY", "JUN", "JUL", "AGO", "SEP", "OCT", "NOV", "DIC",
];

// ============================================================================
// LOCAL CALENDAR
// ============================================================================

/// Wall-clock time of a stored UTC instant in the dojo's local calendar
pub fn to_local(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    ts.with_timezone(&offset).naive_local()
}

/// UTC instant of a local wall-clock time
pub fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&utc)
}

/// First instant of the calendar month containing `now`
pub fn current_month_start(now: NaiveDateTime) -> NaiveDateTime {
    YearMonth::of(now.date()).first_day().and_time(NaiveTime::MIN)
}

// ============================================================================
// YEAR-MONTH
// ============================================================================

/// A calendar month. Always holds a valid date (the 1st of the month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct YearMonth {
    first: NaiveDate,
}

impl YearMonth {
    /// Rejects months outside 1..=12 with a validation error
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(DuesError::invalid(
                "month",
                format!("Must be between 1 and 12, got {}", month),
                "Period",
            ));
        }

        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first| YearMonth { first })
            .ok_or_else(|| {
                DuesError::invalid(
                    "year",
                    format!("Year {} is out of the supported range", year),
                    "Period",
                )
            })
    }

    /// Month containing `date`
    pub fn of(date: NaiveDate) -> Self {
        YearMonth {
            first: date - Duration::days(i64::from(date.day0())),
        }
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    /// Unambiguous position on the calendar: year * 12 + zero-based month
    pub fn index(&self) -> i64 {
        i64::from(self.year()) * 12 + i64::from(self.first.month0())
    }

    /// Shift by whole months; `None` past the calendar's supported range
    pub fn add_months(&self, delta: i32) -> Option<YearMonth> {
        let shifted = if delta >= 0 {
            self.first.checked_add_months(Months::new(delta.unsigned_abs()))
        } else {
            self.first.checked_sub_months(Months::new(delta.unsigned_abs()))
        };
        shifted.map(|first| YearMonth { first })
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    pub fn days_in_month(&self) -> u32 {
        match self.add_months(1) {
            Some(next) => (next.first - self.first).num_days() as u32,
            // December of the last representable year
            None => 31,
        }
    }

    pub fn last_day(&self) -> NaiveDate {
        self.first + Duration::days(i64::from(self.days_in_month()) - 1)
    }

    /// Every day of the month, in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let first = self.first;
        (0..self.days_in_month()).map(move |offset| first + Duration::days(i64::from(offset)))
    }

    /// Display label only. Never use it as an aggregation key.
    pub fn short_label(&self) -> &'static str {
        MONTH_LABELS_ES_MX[self.first.month0() as usize]
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for YearMonth {
    type Err = DuesError;

    /// Parses the `YYYY-MM` form used by the month filter
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || {
            DuesError::invalid(
                "period",
                format!("Expected YYYY-MM, got '{}'", s),
                "Period",
            )
        };

        let (year, month) = s.trim().split_once('-').ok_or_else(malformed)?;
        let year: i32 = year.parse().map_err(|_| malformed())?;
        let month: u32 = month.parse().map_err(|_| malformed())?;

        YearMonth::new(year, month)
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for YearMonth {
    type Error = DuesError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

// ============================================================================
// REPORT PERIOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "month")]
pub enum ReportPeriod {
    /// Current month plus the five before it
    #[default]
    Rolling,

    /// One explicit calendar month
    Month(YearMonth),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucketing {
    /// One bucket per calendar day of the explicit month
    Daily,
    /// One bucket per calendar month, oldest first
    Monthly,
}

impl ReportPeriod {
    pub fn explicit(year: i32, month: u32) -> Result<Self> {
        YearMonth::new(year, month).map(ReportPeriod::Month)
    }

    /// Map the UI filter value: empty / absent means rolling, otherwise `YYYY-MM`
    pub fn from_selection(selection: Option<&str>) -> Result<Self> {
        match selection.map(str::trim) {
            None | Some("") => Ok(ReportPeriod::Rolling),
            Some(value) => value.parse().map(ReportPeriod::Month),
        }
    }

    pub fn bucketing(&self) -> Bucketing {
        match self {
            ReportPeriod::Rolling => Bucketing::Monthly,
            ReportPeriod::Month(_) => Bucketing::Daily,
        }
    }

    /// Chart heading shown above the series
    pub fn title(&self) -> String {
        match self {
            ReportPeriod::Rolling => "TENDENCIA ÚLTIMOS 6 MESES".to_string(),
            ReportPeriod::Month(month) => format!("INGRESOS DIARIOS: {}", month),
        }
    }

    /// Resolve against the local wall-clock time `now`
    pub fn resolve(&self, now: NaiveDateTime) -> ResolvedRange {
        match self {
            ReportPeriod::Rolling => {
                let current = YearMonth::of(now.date());
                let months: Vec<YearMonth> = (0..ROLLING_MONTHS as i32)
                    .rev()
                    .filter_map(|back| current.add_months(-back))
                    .collect();

                let oldest = months.first().copied().unwrap_or(current);

                ResolvedRange {
                    start: oldest.first_day().and_time(NaiveTime::MIN),
                    end: now,
                    bucketing: Bucketing::Monthly,
                    buckets: months.into_iter().map(BucketKey::Month).collect(),
                }
            }
            ReportPeriod::Month(month) => ResolvedRange {
                start: month.first_day().and_time(NaiveTime::MIN),
                end: end_of_day(month.last_day()),
                bucketing: Bucketing::Daily,
                buckets: month.days().map(BucketKey::Day).collect(),
            },
        }
    }
}

fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::nanoseconds(1)
}

// ============================================================================
// RESOLVED RANGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum BucketKey {
    Day(NaiveDate),
    Month(YearMonth),
}

impl BucketKey {
    /// Chart label: day of month for daily buckets, month abbreviation otherwise
    pub fn label(&self) -> String {
        match self {
            BucketKey::Day(day) => day.day().to_string(),
            BucketKey::Month(month) => month.short_label().to_string(),
        }
    }
}

/// Concrete report window with its pre-enumerated buckets
///
/// `start` and `end` are both inclusive local wall-clock times. The buckets
/// partition `[start, end]`: every instant inside the range maps to exactly
/// one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub bucketing: Bucketing,
    pub buckets: Vec<BucketKey>,
}

impl ResolvedRange {
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Position of the bucket holding `ts`, or `None` outside the range
    pub fn bucket_index(&self, ts: NaiveDateTime) -> Option<usize> {
        if !self.contains(ts) {
            return None;
        }

        let offset = match self.bucketing {
            Bucketing::Daily => (ts.date() - self.start.date()).num_days(),
            Bucketing::Monthly => {
                YearMonth::of(ts.date()).index() - YearMonth::of(self.start.date()).index()
            }
        };

        usize::try_from(offset)
            .ok()
            .filter(|index| *index < self.buckets.len())
    }

    /// Range bounds as UTC instants, for querying the store
    pub fn to_utc_bounds(&self, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
        (to_utc(self.start, offset), to_utc(self.end, offset))
    }
}

// ============================================================================
// TESTS
// ============================================================================
