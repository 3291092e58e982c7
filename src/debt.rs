// 🧾 Debt Calculator - who still owes this month, and how much in total
//
// Outstanding = Σ monthly_due over active members with no payment in the
// current calendar month. Inactive members never owe.

use crate::models::{Member, MemberId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberStatus {
    #[serde(flatten)]
    pub member: Member,
    pub is_paid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtReport {
    pub members: Vec<MemberStatus>,
    pub total_outstanding: Decimal,
    /// Active members considered
    pub headcount: usize,
}

impl DebtReport {
    pub fn unpaid(&self) -> impl Iterator<Item = &MemberStatus> {
        self.members.iter().filter(|status| !status.is_paid)
    }

    pub fn paid_count(&self) -> usize {
        self.members.iter().filter(|status| status.is_paid).count()
    }
}

pub struct DebtCalculator;

impl DebtCalculator {
    /// Classify the roster against the paid set.
    ///
    /// Inactive members in `roster` are skipped; the order of the roster is kept.
    pub fn assess(roster: &[Member], paid_member_ids: &BTreeSet<MemberId>) -> DebtReport {
        let members: Vec<MemberStatus> = roster
            .iter()
            .filter(|member| member.active)
            .map(|member| MemberStatus {
                member: member.clone(),
                is_paid: paid_member_ids.contains(&member.id),
            })
            .collect();

        let total_outstanding = members
            .iter()
            .filter(|status| !status.is_paid)
            .map(|status| status.member.monthly_due)
            .sum();

        DebtReport {
            headcount: members.len(),
            members,
            total_outstanding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn member(id: i64, due: i64, active: bool) -> Member {
        Member {
            id: MemberId(id),
            name: format!("Alumno {}", id),
            monthly_due: Decimal::from(due),
            belt: "Blanca".to_string(),
            phone: None,
            age: None,
            guardian: None,
            emergency_contact: None,
            active,
            photo_url: None,
            enrolled_at: Utc::now(),
        }
    }

    #[test]
    fn test_two_paid_three_unpaid() {
        let roster = vec![
            member(1, 600, true),
            member(2, 500, true),
            member(3, 450, true),
            member(4, 700, true),
            member(5, 350, true),
        ];
        let paid: BTreeSet<MemberId> = [MemberId(1), MemberId(4)].into_iter().collect();

        let report = DebtCalculator::assess(&roster, &paid);

        assert_eq!(report.total_outstanding, Decimal::from(500 + 450 + 350));
        assert_eq!(report.headcount, 5);
        assert_eq!(report.paid_count(), 2);
        let unpaid: Vec<MemberId> = report.unpaid().map(|s| s.member.id).collect();
        assert_eq!(unpaid, vec![MemberId(2), MemberId(3), MemberId(5)]);
    }

    #[test]
    fn test_scenario_one_of_two_paid() {
        let roster = vec![member(1, 600, true), member(2, 500, true)];
        let paid: BTreeSet<MemberId> = [MemberId(1)].into_iter().collect();

        let report = DebtCalculator::assess(&roster, &paid);

        assert_eq!(report.total_outstanding, Decimal::from(500));
        assert_eq!(report.headcount, 2);

        let report = DebtCalculator::assess(&roster, &BTreeSet::new());
        assert_eq!(report.total_outstanding, Decimal::from(1100));
    }

    #[test]
    fn test_inactive_members_never_owe() {
        let roster = vec![member(1, 600, true), member(2, 500, false)];
        let report = DebtCalculator::assess(&roster, &BTreeSet::new());

        assert_eq!(report.total_outstanding, Decimal::from(600));
        assert_eq!(report.headcount, 1);
    }

    #[test]
    fn test_payment_from_unknown_member_is_ignored() {
        let roster = vec![member(1, 600, true)];
        let paid: BTreeSet<MemberId> = [MemberId(99)].into_iter().collect();

        let report = DebtCalculator::assess(&roster, &paid);
        assert_eq!(report.total_outstanding, Decimal::from(600));
    }

    proptest! {
        #[test]
        fn prop_outstanding_is_sum_of_unpaid_dues(
            dues in prop::collection::vec(0i64..5000, 0..20),
            paid_mask in prop::collection::vec(any::<bool>(), 20),
        ) {
            let roster: Vec<Member> = dues
                .iter()
                .enumerate()
                .map(|(i, due)| member(i as i64, *due, true))
                .collect();
            let paid: BTreeSet<MemberId> = roster
                .iter()
                .zip(&paid_mask)
                .filter(|(_, paid)| **paid)
                .map(|(m, _)| m.id)
                .collect();

            let expected: Decimal = roster
                .iter()
                .filter(|m| !paid.contains(&m.id))
                .map(|m| m.monthly_due)
                .sum();

            let report = DebtCalculator::assess(&roster, &paid);
            prop_assert_eq!(report.total_outstanding, expected);
        }
    }
}
