// 🗄️ Dues Store - SQLite persistence for members, payments and check-ins
//
// The reporting engine never talks to SQLite directly: it receives plain
// records fetched through `DuesStore`. Timestamps are stored as fixed-width
// RFC 3339 UTC strings so that text order equals time order; money is stored
// as decimal text.

use crate::error::{DuesError, Result};
use crate::models::{AttendanceEvent, Event, Member, MemberId, NewMember, PaymentEvent, PaymentId};
use crate::validation::{validate_attendance_batch, validate_member, validate_payment};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Persistence collaborator consumed by the dashboard.
///
/// Mutations validate their input and append an audit event. Reads return
/// plain records; nothing is cached between calls.
pub trait DuesStore {
    fn list_active_members(&self) -> Result<Vec<Member>>;

    /// Every member, including soft-deleted ones
    fn list_members(&self) -> Result<Vec<Member>>;

    fn get_member(&self, id: MemberId) -> Result<Member>;

    fn enroll_member(&self, form: NewMember, actor: &str) -> Result<Member>;

    fn update_member(&self, id: MemberId, form: NewMember, actor: &str) -> Result<Member>;

    /// Soft delete: clears the active flag, keeps the row and its payments
    fn deactivate_member(&self, id: MemberId, actor: &str) -> Result<()>;

    /// Payments with `paid_at` in `[start, end]`, or all payments
    fn list_payments(&self, range: Option<(DateTime<Utc>, DateTime<Utc>)>)
        -> Result<Vec<PaymentEvent>>;

    fn list_payments_since(&self, since: DateTime<Utc>) -> Result<Vec<PaymentEvent>>;

    /// Fails with `Conflict` unless `member_id` is an active member
    fn insert_payment(
        &self,
        member_id: MemberId,
        amount: Decimal,
        recorded_by: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentEvent>;

    /// Reversal; `NotFound` if the id does not exist
    fn delete_payment(&self, id: PaymentId, actor: &str) -> Result<()>;

    fn list_attendance(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>>;

    /// All-or-nothing check-in of several members on `date`
    fn insert_attendance_batch(
        &self,
        member_ids: &[MemberId],
        date: NaiveDate,
        actor: &str,
    ) -> Result<usize>;

    /// Run several reads against one consistent state of the store.
    ///
    /// A mutation committed elsewhere while `reads` runs is either fully
    /// visible to every read or to none of them.
    fn read_consistent<T, F>(&self, reads: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T>,
    {
        reads(self)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            monthly_due TEXT NOT NULL,
            belt TEXT NOT NULL,
            phone TEXT,
            age INTEGER,
            guardian TEXT,
            emergency_contact TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            photo_url TEXT,
            enrolled_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL REFERENCES members(id),
            amount TEXT NOT NULL,
            paid_at TEXT NOT NULL,
            recorded_by TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL REFERENCES members(id),
            date TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_paid_at ON payments(paid_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_member ON payments(member_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ENCODING
// ============================================================================

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn date_at(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

const MEMBER_COLUMNS: &str = "id, name, monthly_due, belt, phone, age, guardian,
    emergency_contact, active, photo_url, enrolled_at";

fn member_from_row(row: &Row) -> rusqlite::Result<Member> {
    Ok(Member {
        id: MemberId(row.get(0)?),
        name: row.get(1)?,
        monthly_due: decimal_at(row, 2)?,
        belt: row.get(3)?,
        phone: row.get(4)?,
        age: row.get(5)?,
        guardian: row.get(6)?,
        emergency_contact: row.get(7)?,
        active: row.get(8)?,
        photo_url: row.get(9)?,
        enrolled_at: timestamp_at(row, 10)?,
    })
}

const PAYMENT_COLUMNS: &str = "id, member_id, amount, paid_at, recorded_by";

fn payment_from_row(row: &Row) -> rusqlite::Result<PaymentEvent> {
    Ok(PaymentEvent {
        id: PaymentId(row.get(0)?),
        member_id: MemberId(row.get(1)?),
        amount: decimal_at(row, 2)?,
        paid_at: timestamp_at(row, 3)?,
        recorded_by: row.get(4)?,
    })
}

fn query_members(conn: &Connection, filter: &str) -> Result<Vec<Member>> {
    let sql = format!(
        "SELECT {} FROM members {} ORDER BY name COLLATE NOCASE, id",
        MEMBER_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let members = stmt
        .query_map([], member_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(members)
}

fn query_payments(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<PaymentEvent>> {
    let sql = format!(
        "SELECT {} FROM payments {} ORDER BY paid_at, id",
        PAYMENT_COLUMNS, filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let payments = stmt
        .query_map(params, payment_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(payments)
}

/// Active flag of a member, `None` when the row does not exist
fn member_active(conn: &Connection, id: MemberId) -> Result<Option<bool>> {
    let active = conn
        .query_row(
            "SELECT active FROM members WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()?;
    Ok(active)
}

fn require_active_member(conn: &Connection, id: MemberId) -> Result<()> {
    match member_active(conn, id)? {
        Some(true) => Ok(()),
        Some(false) => Err(DuesError::Conflict(format!("member {} is inactive", id))),
        None => Err(DuesError::Conflict(format!("member {} does not exist", id))),
    }
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            encode_timestamp(event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_at(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

impl DuesStore for Connection {
    fn list_active_members(&self) -> Result<Vec<Member>> {
        query_members(self, "WHERE active = 1")
    }

    fn list_members(&self) -> Result<Vec<Member>> {
        query_members(self, "")
    }

    fn get_member(&self, id: MemberId) -> Result<Member> {
        let sql = format!("SELECT {} FROM members WHERE id = ?1", MEMBER_COLUMNS);
        self.query_row(&sql, params![id.0], member_from_row)
            .optional()?
            .ok_or_else(|| DuesError::not_found("member", id))
    }

    fn enroll_member(&self, form: NewMember, actor: &str) -> Result<Member> {
        let form = form.normalized();
        validate_member(&form)?;

        let tx = self.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO members (
                name, monthly_due, belt, phone, age, guardian,
                emergency_contact, active, photo_url, enrolled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)",
            params![
                form.name,
                form.monthly_due.to_string(),
                form.belt,
                form.phone,
                form.age,
                form.guardian,
                form.emergency_contact,
                form.photo_url,
                encode_timestamp(Utc::now()),
            ],
        )?;
        let id = MemberId(tx.last_insert_rowid());

        insert_event(
            &tx,
            &Event::new(
                "member_enrolled",
                "member",
                &id.to_string(),
                serde_json::json!({
                    "name": form.name,
                    "monthly_due": form.monthly_due,
                }),
                actor,
            ),
        )?;
        tx.commit()?;

        tracing::info!(member_id = %id, name = %form.name, "Member enrolled");
        self.get_member(id)
    }

    fn update_member(&self, id: MemberId, form: NewMember, actor: &str) -> Result<Member> {
        let form = form.normalized();
        validate_member(&form)?;

        let tx = self.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE members
             SET name = ?1, monthly_due = ?2, belt = ?3, phone = ?4, age = ?5,
                 guardian = ?6, emergency_contact = ?7, photo_url = ?8
             WHERE id = ?9",
            params![
                form.name,
                form.monthly_due.to_string(),
                form.belt,
                form.phone,
                form.age,
                form.guardian,
                form.emergency_contact,
                form.photo_url,
                id.0,
            ],
        )?;
        if changed == 0 {
            return Err(DuesError::not_found("member", id));
        }

        insert_event(
            &tx,
            &Event::new(
                "member_updated",
                "member",
                &id.to_string(),
                serde_json::to_value(&form)?,
                actor,
            ),
        )?;
        tx.commit()?;

        tracing::info!(member_id = %id, "Member updated");
        self.get_member(id)
    }

    fn deactivate_member(&self, id: MemberId, actor: &str) -> Result<()> {
        let tx = self.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE members SET active = 0 WHERE id = ?1",
            params![id.0],
        )?;
        if changed == 0 {
            return Err(DuesError::not_found("member", id));
        }

        insert_event(
            &tx,
            &Event::new(
                "member_deactivated",
                "member",
                &id.to_string(),
                serde_json::json!({}),
                actor,
            ),
        )?;
        tx.commit()?;

        tracing::info!(member_id = %id, "Member deactivated");
        Ok(())
    }

    fn list_payments(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<PaymentEvent>> {
        match range {
            Some((start, end)) => query_payments(
                self,
                "WHERE paid_at >= ?1 AND paid_at <= ?2",
                &[&encode_timestamp(start), &encode_timestamp(end)],
            ),
            None => query_payments(self, "", &[]),
        }
    }

    fn list_payments_since(&self, since: DateTime<Utc>) -> Result<Vec<PaymentEvent>> {
        query_payments(self, "WHERE paid_at >= ?1", &[&encode_timestamp(since)])
    }

    fn insert_payment(
        &self,
        member_id: MemberId,
        amount: Decimal,
        recorded_by: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentEvent> {
        validate_payment(amount, recorded_by)?;

        let tx = self.unchecked_transaction()?;
        require_active_member(&tx, member_id)?;

        tx.execute(
            "INSERT INTO payments (member_id, amount, paid_at, recorded_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                member_id.0,
                amount.to_string(),
                encode_timestamp(paid_at),
                recorded_by
            ],
        )?;
        let payment = PaymentEvent {
            id: PaymentId(tx.last_insert_rowid()),
            member_id,
            amount,
            paid_at,
            recorded_by: recorded_by.to_string(),
        };

        insert_event(
            &tx,
            &Event::new(
                "payment_recorded",
                "payment",
                &payment.id.to_string(),
                serde_json::to_value(&payment)?,
                recorded_by,
            ),
        )?;
        tx.commit()?;

        tracing::info!(
            payment_id = %payment.id,
            member_id = %member_id,
            amount = %amount,
            "Payment recorded"
        );
        Ok(payment)
    }

    fn delete_payment(&self, id: PaymentId, actor: &str) -> Result<()> {
        let tx = self.unchecked_transaction()?;

        let sql = format!("SELECT {} FROM payments WHERE id = ?1", PAYMENT_COLUMNS);
        let payment = tx
            .query_row(&sql, params![id.0], payment_from_row)
            .optional()?
            .ok_or_else(|| DuesError::not_found("payment", id))?;

        tx.execute("DELETE FROM payments WHERE id = ?1", params![id.0])?;

        insert_event(
            &tx,
            &Event::new(
                "payment_reversed",
                "payment",
                &id.to_string(),
                serde_json::to_value(&payment)?,
                actor,
            ),
        )?;
        tx.commit()?;

        tracing::info!(payment_id = %id, amount = %payment.amount, "Payment reversed");
        Ok(())
    }

    fn list_attendance(&self, date: NaiveDate) -> Result<Vec<AttendanceEvent>> {
        let mut stmt = self.prepare(
            "SELECT id, member_id, date FROM attendance WHERE date = ?1 ORDER BY id",
        )?;
        let events = stmt
            .query_map(params![encode_date(date)], |row| {
                Ok(AttendanceEvent {
                    id: row.get(0)?,
                    member_id: MemberId(row.get(1)?),
                    date: date_at(row, 2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn insert_attendance_batch(
        &self,
        member_ids: &[MemberId],
        date: NaiveDate,
        actor: &str,
    ) -> Result<usize> {
        validate_attendance_batch(member_ids)?;

        let tx = self.unchecked_transaction()?;
        for member_id in member_ids {
            require_active_member(&tx, *member_id)?;
            tx.execute(
                "INSERT INTO attendance (member_id, date) VALUES (?1, ?2)",
                params![member_id.0, encode_date(date)],
            )?;
        }

        insert_event(
            &tx,
            &Event::new(
                "attendance_recorded",
                "attendance",
                &encode_date(date),
                serde_json::json!({ "member_ids": member_ids }),
                actor,
            ),
        )?;
        tx.commit()?;

        tracing::info!(count = member_ids.len(), date = %date, "Attendance recorded");
        Ok(member_ids.len())
    }

    // Deferred transaction: the WAL snapshot is pinned by the first read and
    // held until commit, so writers on other connections stay invisible.
    fn read_consistent<T, F>(&self, reads: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let tx = self.unchecked_transaction()?;
        let value = reads(&*tx)?;
        tx.commit()?;
        Ok(value)
    }
}

// ============================================================================
// TESTS
// ============================================================================
