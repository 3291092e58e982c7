// 🥋 Domain Records - members, payments, check-ins and the audit trail
//
// Members are never hard-deleted: leaving the dojo clears `active`.
// Payments are immutable once recorded; a reversal deletes the row and
// every aggregate is recomputed from the store on the next read.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_BELT: &str = "Blanca";

/// Age under which guardian details are relevant
pub const ADULT_AGE: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub i64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment ids grow with insertion order, which the activity feed relies on
/// to break timestamp ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub i64);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// MEMBER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub monthly_due: Decimal,
    pub belt: String,
    pub phone: Option<String>,
    pub age: Option<u8>,
    pub guardian: Option<String>,
    pub emergency_contact: Option<String>,
    pub active: bool,
    pub photo_url: Option<String>,
    pub enrolled_at: DateTime<Utc>,
}

impl Member {
    pub fn is_minor(&self) -> bool {
        self.age.map_or(false, |age| age < ADULT_AGE)
    }

    /// Up to two uppercase initials, used as avatar placeholder
    pub fn initials(&self) -> String {
        self.name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect()
    }
}

/// Enrollment / edit form for a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub monthly_due: Decimal,
    #[serde(default = "default_belt")]
    pub belt: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub guardian: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

fn default_belt() -> String {
    DEFAULT_BELT.to_string()
}

impl NewMember {
    pub fn new(name: impl Into<String>, monthly_due: Decimal) -> Self {
        NewMember {
            name: name.into(),
            monthly_due,
            belt: default_belt(),
            phone: None,
            age: None,
            guardian: None,
            emergency_contact: None,
            photo_url: None,
        }
    }

    /// Trim text fields and turn blank optionals into `None`
    pub fn normalized(mut self) -> Self {
        fn blank_to_none(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        self.name = self.name.trim().to_string();
        self.belt = self.belt.trim().to_string();
        if self.belt.is_empty() {
            self.belt = default_belt();
        }
        self.phone = blank_to_none(self.phone);
        self.guardian = blank_to_none(self.guardian);
        self.emergency_contact = blank_to_none(self.emergency_contact);
        self.photo_url = blank_to_none(self.photo_url);
        self
    }
}

// ============================================================================
// PAYMENT EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: PaymentId,
    pub member_id: MemberId,
    pub amount: Decimal,
    /// Authoritative for period bucketing
    pub paid_at: DateTime<Utc>,
    /// Who collected the money
    pub recorded_by: String,
}

// ============================================================================
// ATTENDANCE EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub id: i64,
    pub member_id: MemberId,
    /// Local calendar day of the check-in
    pub date: NaiveDate,
}

// ============================================================================
// AUDIT EVENT
// ============================================================================

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, age: Option<u8>) -> Member {
        Member {
            id: MemberId(1),
            name: name.to_string(),
            monthly_due: Decimal::from(600),
            belt: DEFAULT_BELT.to_string(),
            phone: None,
            age,
            guardian: None,
            emergency_contact: None,
            active: true,
            photo_url: None,
            enrolled_at: Utc::now(),
        }
    }

    #[test]
    fn test_initials() {
        assert_eq!(member("ana lucía pérez", None).initials(), "AL");
        assert_eq!(member("Bruno", None).initials(), "B");
        assert_eq!(member("  ", None).initials(), "");
    }

    #[test]
    fn test_is_minor() {
        assert!(member("Kid", Some(9)).is_minor());
        assert!(!member("Adult", Some(18)).is_minor());
        assert!(!member("Unknown", None).is_minor());
    }

    #[test]
    fn test_normalized_blanks_become_none() {
        let mut form = NewMember::new("  Carla Ruiz ", Decimal::from(500));
        form.phone = Some("   ".to_string());
        form.guardian = Some(" Mamá ".to_string());
        form.belt = String::new();

        let form = form.normalized();

        assert_eq!(form.name, "Carla Ruiz");
        assert_eq!(form.phone, None);
        assert_eq!(form.guardian.as_deref(), Some("Mamá"));
        assert_eq!(form.belt, DEFAULT_BELT);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&MemberId(7)).unwrap();
        assert_eq!(json, "7");
    }
}
