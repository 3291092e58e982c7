// 📜 History Projector - recent payments for the activity feed
//
// Payer names are looked up by id and the lookup tolerates misses: a payment
// whose member row is gone still shows, under a placeholder name.

use crate::models::{Member, MemberId, PaymentEvent, PaymentId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const FORMER_MEMBER_LABEL: &str = "former member";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayerStatus {
    Active,
    /// Soft-deleted: name still known
    Inactive,
    /// No member row for this id
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub payment_id: PaymentId,
    pub member_id: MemberId,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub member_name: String,
    pub payer_status: PayerStatus,
    pub recorded_by: String,
}

pub struct HistoryProjector {
    pub limit: usize,
    pub placeholder: String,
}

impl HistoryProjector {
    pub fn new(limit: usize, placeholder: impl Into<String>) -> Self {
        HistoryProjector {
            limit,
            placeholder: placeholder.into(),
        }
    }

    /// Most recent `limit` payments, newest first.
    ///
    /// Ties on `paid_at` go to the higher (later inserted) payment id.
    /// `roster` may hold inactive members; their names are still used.
    pub fn project(&self, events: &[PaymentEvent], roster: &[Member]) -> Vec<HistoryEntry> {
        let names: HashMap<MemberId, &Member> =
            roster.iter().map(|member| (member.id, member)).collect();

        let mut recent: Vec<&PaymentEvent> = events.iter().collect();
        recent.sort_by_key(|event| Reverse((event.paid_at, event.id)));
        recent.truncate(self.limit);

        recent
            .into_iter()
            .map(|event| {
                let (member_name, payer_status) = match names.get(&event.member_id) {
                    Some(member) if member.active => (member.name.clone(), PayerStatus::Active),
                    Some(member) => (member.name.clone(), PayerStatus::Inactive),
                    None => (self.placeholder.clone(), PayerStatus::Missing),
                };

                HistoryEntry {
                    payment_id: event.id,
                    member_id: event.member_id,
                    amount: event.amount,
                    paid_at: event.paid_at,
                    member_name,
                    payer_status,
                    recorded_by: event.recorded_by.clone(),
                }
            })
            .collect()
    }
}

impl Default for HistoryProjector {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT, FORMER_MEMBER_LABEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn member(id: i64, name: &str, active: bool) -> Member {
        Member {
            id: MemberId(id),
            name: name.to_string(),
            monthly_due: Decimal::from(600),
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

    fn payment(id: i64, member: i64, day: u32, hour: u32) -> PaymentEvent {
        PaymentEvent {
            id: PaymentId(id),
            member_id: MemberId(member),
            amount: Decimal::from(600),
            paid_at: Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap(),
            recorded_by: "sensei@dojo.com".to_string(),
        }
    }

    #[test]
    fn test_newest_first_and_limited() {
        let roster = vec![member(1, "Ana", true)];
        let events: Vec<PaymentEvent> = (1..=15).map(|i| payment(i, 1, i as u32, 10)).collect();

        let history = HistoryProjector::default().project(&events, &roster);

        assert_eq!(history.len(), 10);
        assert_eq!(history[0].payment_id, PaymentId(15));
        assert_eq!(history[9].payment_id, PaymentId(6));
    }

    #[test]
    fn test_timestamp_ties_break_on_id_descending() {
        let roster = vec![member(1, "Ana", true)];
        let events = vec![payment(7, 1, 5, 10), payment(9, 1, 5, 10), payment(8, 1, 5, 10)];

        let ids: Vec<PaymentId> = HistoryProjector::default()
            .project(&events, &roster)
            .iter()
            .map(|entry| entry.payment_id)
            .collect();

        assert_eq!(ids, vec![PaymentId(9), PaymentId(8), PaymentId(7)]);
    }

    #[test]
    fn test_missing_and_inactive_payers() {
        let roster = vec![member(1, "Ana", true), member(2, "Beto", false)];
        let events = vec![payment(1, 1, 1, 9), payment(2, 2, 2, 9), payment(3, 3, 3, 9)];

        let history = HistoryProjector::default().project(&events, &roster);

        assert_eq!(history[0].member_name, FORMER_MEMBER_LABEL);
        assert_eq!(history[0].payer_status, PayerStatus::Missing);
        assert_eq!(history[1].member_name, "Beto");
        assert_eq!(history[1].payer_status, PayerStatus::Inactive);
        assert_eq!(history[2].member_name, "Ana");
        assert_eq!(history[2].payer_status, PayerStatus::Active);
    }

    #[test]
    fn test_custom_placeholder() {
        let projector = HistoryProjector::new(3, "Alumno Eliminado");
        let history = projector.project(&[payment(1, 42, 1, 9)], &[]);
        assert_eq!(history[0].member_name, "Alumno Eliminado");
    }
}
