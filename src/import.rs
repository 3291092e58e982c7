// 📂 Roster Import - enroll members from a CSV file
//
// Expected header: name,monthly_due,belt,phone,age,guardian,emergency_contact
// Only `name` is required. A blank due falls back to the configured default.
// Bad rows are reported with their line number; good rows are still enrolled.

use crate::db::DuesStore;
use crate::error::{DuesError, Result};
use crate::models::{Member, NewMember, DEFAULT_BELT};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
struct RosterRow {
    name: String,
    #[serde(default)]
    monthly_due: Option<String>,
    #[serde(default)]
    belt: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    age: Option<u8>,
    #[serde(default)]
    guardian: Option<String>,
    #[serde(default)]
    emergency_contact: Option<String>,
}

impl RosterRow {
    fn into_form(self, default_due: Decimal) -> Result<NewMember> {
        let monthly_due = match self.monthly_due.as_deref().map(str::trim) {
            None | Some("") => default_due,
            Some(raw) => Decimal::from_str(raw.trim_start_matches('$')).map_err(|_| {
                DuesError::invalid(
                    "monthly_due",
                    format!("Not a decimal amount: '{}'", raw),
                    "Import",
                )
            })?,
        };

        Ok(NewMember {
            name: self.name,
            monthly_due,
            belt: self.belt.unwrap_or_else(|| DEFAULT_BELT.to_string()),
            phone: self.phone,
            age: self.age,
            guardian: self.guardian,
            emergency_contact: self.emergency_contact,
            photo_url: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub enrolled: Vec<Member>,
    /// (CSV line number, reason)
    pub rejected: Vec<(u64, String)>,
}

pub fn import_roster<S: DuesStore + ?Sized>(
    store: &S,
    csv_path: &Path,
    default_due: Decimal,
    actor: &str,
) -> Result<ImportReport> {
    let reader = std::fs::File::open(csv_path).map_err(csv::Error::from)?;
    import_roster_from(store, reader, default_due, actor)
}

pub fn import_roster_from<S: DuesStore + ?Sized, R: Read>(
    store: &S,
    reader: R,
    default_due: Decimal,
    actor: &str,
) -> Result<ImportReport> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut record = csv::StringRecord::new();
    let mut report = ImportReport::default();

    while rdr.read_record(&mut record)? {
        let line = record.position().map_or(0, |pos| pos.line());

        let form = record
            .deserialize::<RosterRow>(Some(&headers))
            .map_err(|err| DuesError::invalid("row", err.to_string(), "Import"))
            .and_then(|row| row.into_form(default_due));

        match form.and_then(|form| store.enroll_member(form, actor)) {
            Ok(member) => report.enrolled.push(member),
            Err(err) if err.is_validation() => report.rejected.push((line, err.to_string())),
            Err(err) => return Err(err),
        }
    }

    tracing::info!(
        enrolled = report.enrolled.len(),
        rejected = report.rejected.len(),
        "Roster import finished"
    );
    Ok(report)
}
