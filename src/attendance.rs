// ✅ Attendance Tally - check-ins for one local calendar day

use crate::models::{AttendanceEvent, MemberId};
use crate::period::to_local;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::collections::BTreeSet;

/// "Today" in the dojo's local calendar
pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    to_local(now, offset).date()
}

/// Number of check-ins recorded for `day`
pub fn count_for_day(events: &[AttendanceEvent], day: NaiveDate) -> usize {
    events.iter().filter(|event| event.date == day).count()
}

/// Distinct members who checked in on `day`
pub fn members_present(events: &[AttendanceEvent], day: NaiveDate) -> BTreeSet<MemberId> {
    events
        .iter()
        .filter(|event| event.date == day)
        .map(|event| event.member_id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn check_in(id: i64, member: i64, day: NaiveDate) -> AttendanceEvent {
        AttendanceEvent {
            id,
            member_id: MemberId(member),
            date: day,
        }
    }

    #[test]
    fn test_counts_only_the_given_day() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let events = vec![
            check_in(1, 1, today),
            check_in(2, 2, today),
            check_in(3, 1, yesterday),
        ];

        assert_eq!(count_for_day(&events, today), 2);
        assert_eq!(count_for_day(&events, yesterday), 1);
        assert_eq!(members_present(&events, today).len(), 2);
    }

    #[test]
    fn test_local_today_follows_offset() {
        // 02:00 UTC on the 16th is still the evening of the 15th at UTC-6
        let now = Utc.with_ymd_and_hms(2024, 3, 16, 2, 0, 0).unwrap();
        let offset = FixedOffset::west_opt(6 * 3600).unwrap();

        assert_eq!(
            local_today(now, offset),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
    }
}
