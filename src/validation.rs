// 📐 Input Validation - data-entry boundary checks
// Every failing field is reported, not just the first one.

use crate::error::{DuesError, Result};
use crate::models::{MemberId, NewMember};
use rust_decimal::Decimal;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub context: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>, context: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
            context: context.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn finish(errors: Vec<ValidationError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DuesError::Validation(errors))
    }
}

// ============================================================================
// VALIDATORS
// ============================================================================

/// Validate an enrollment or edit form
pub fn validate_member(form: &NewMember) -> Result<()> {
    let mut errors = Vec::new();

    if form.name.trim().is_empty() {
        errors.push(ValidationError::new(
            "name",
            "Required field is empty",
            "Member",
        ));
    }

    if form.monthly_due < Decimal::ZERO {
        errors.push(ValidationError::new(
            "monthly_due",
            format!("Must not be negative, got {}", form.monthly_due),
            "Member",
        ));
    }

    if let Some(phone) = &form.phone {
        let digits_only = phone
            .chars()
            .all(|c| c.is_ascii_digit() || c == '+' || c == ' ' || c == '-');
        if !digits_only {
            errors.push(ValidationError::new(
                "phone",
                format!("Unexpected characters in '{}'", phone),
                "Member",
            ));
        }
    }

    finish(errors)
}

/// Validate a payment before it reaches the ledger
pub fn validate_payment(amount: Decimal, recorded_by: &str) -> Result<()> {
    let mut errors = Vec::new();

    if amount <= Decimal::ZERO {
        errors.push(ValidationError::new(
            "amount",
            format!("Must be positive, got {}", amount),
            "Payment",
        ));
    }

    if recorded_by.trim().is_empty() {
        errors.push(ValidationError::new(
            "recorded_by",
            "Required field is empty",
            "Payment",
        ));
    }

    finish(errors)
}

/// A check-in batch needs at least one member
pub fn validate_attendance_batch(member_ids: &[MemberId]) -> Result<()> {
    if member_ids.is_empty() {
        return Err(DuesError::invalid(
            "member_ids",
            "Select at least one member",
            "Attendance",
        ));
    }
    Ok(())
}
