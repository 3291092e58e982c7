// End-to-end flows against an on-disk SQLite store

use chrono::{Duration, Offset, Utc};
use dojo_dues::attendance::local_today;
use dojo_dues::{
    load_dashboard, setup_database, Config, DuesError, DuesStore, NewMember, PayerStatus,
    ReportPeriod, RetryPolicy, YearMonth,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tempfile::TempDir;

fn open_store() -> (TempDir, Connection, Config) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dojo.db");

    let conn = Connection::open(&path).unwrap();
    setup_database(&conn).unwrap();

    let mut config = Config::default();
    config.database_path = path;
    config.utc_offset = Utc.fix();
    config.retry = RetryPolicy::immediate(1);

    (dir, conn, config)
}

#[test]
fn test_payment_then_reversal_restores_debt() {
    let (_dir, conn, config) = open_store();
    let ana = conn
        .enroll_member(NewMember::new("Ana", Decimal::from(600)), "admin")
        .unwrap();
    conn.enroll_member(NewMember::new("Beto", Decimal::from(500)), "admin")
        .unwrap();

    let before = load_dashboard(&conn, ReportPeriod::Rolling, Utc::now(), &config).unwrap();
    assert_eq!(before.metrics.total_outstanding, Decimal::from(1100));
    assert_eq!(before.unpaid().len(), 2);

    let payment = conn
        .insert_payment(ana.id, Decimal::from(600), "sensei@dojo.com", Utc::now())
        .unwrap();

    let paid = load_dashboard(&conn, ReportPeriod::Rolling, Utc::now(), &config).unwrap();
    assert_eq!(paid.metrics.total_outstanding, Decimal::from(500));
    assert_eq!(paid.metrics.collected_in_range, Decimal::from(600));
    assert!(paid.members.iter().any(|s| s.member.id == ana.id && s.is_paid));
    assert_eq!(paid.history.len(), 1);
    assert_eq!(paid.history[0].recorded_by, "sensei@dojo.com");

    conn.delete_payment(payment.id, "admin").unwrap();

    let reversed = load_dashboard(&conn, ReportPeriod::Rolling, Utc::now(), &config).unwrap();
    assert_eq!(reversed.metrics.total_outstanding, Decimal::from(1100));
    assert_eq!(reversed.metrics.collected_in_range, Decimal::ZERO);
    assert!(reversed.history.is_empty());
    assert!(reversed.series.iter().all(|point| point.total == Decimal::ZERO));

    let err = conn.delete_payment(payment.id, "admin").unwrap_err();
    assert!(matches!(err, DuesError::NotFound { .. }));
}

#[test]
fn test_deactivated_payer_stays_in_history() {
    let (_dir, conn, config) = open_store();
    let ana = conn
        .enroll_member(NewMember::new("Ana López", Decimal::from(600)), "admin")
        .unwrap();
    conn.enroll_member(NewMember::new("Beto", Decimal::from(500)), "admin")
        .unwrap();

    conn.insert_payment(ana.id, Decimal::from(600), "sensei", Utc::now())
        .unwrap();
    conn.deactivate_member(ana.id, "admin").unwrap();

    let view = load_dashboard(&conn, ReportPeriod::Rolling, Utc::now(), &config).unwrap();
    assert_eq!(view.metrics.headcount, 1);
    assert_eq!(view.metrics.total_outstanding, Decimal::from(500));
    assert_eq!(view.metrics.collected_in_range, Decimal::from(600));
    assert_eq!(view.history[0].member_name, "Ana López");
    assert_eq!(view.history[0].payer_status, PayerStatus::Inactive);

    let err = conn
        .insert_payment(ana.id, Decimal::from(600), "sensei", Utc::now())
        .unwrap_err();
    assert!(matches!(err, DuesError::Conflict(_)));
}

#[test]
fn test_explicit_month_uses_daily_buckets() {
    let (_dir, conn, config) = open_store();
    let ana = conn
        .enroll_member(NewMember::new("Ana", Decimal::from(600)), "admin")
        .unwrap();

    let now = Utc::now();
    conn.insert_payment(ana.id, Decimal::from(300), "sensei", now)
        .unwrap();
    // Previous month: outside the explicit range, still counts for nothing here
    conn.insert_payment(ana.id, Decimal::from(300), "sensei", now - Duration::days(40))
        .unwrap();

    let today = local_today(now, config.utc_offset);
    let month = YearMonth::of(today);
    let period = ReportPeriod::from_selection(Some(&month.to_string())).unwrap();

    let view = load_dashboard(&conn, period, now, &config).unwrap();
    assert_eq!(view.series.len() as u32, month.days_in_month());
    assert_eq!(view.title, format!("INGRESOS DIARIOS: {}", month));
    assert_eq!(view.metrics.collected_in_range, Decimal::from(300));

    let series_total: Decimal = view.series.iter().map(|point| point.total).sum();
    assert_eq!(series_total, view.metrics.collected_in_range);
}

#[test]
fn test_store_survives_reopen() {
    let (_dir, conn, config) = open_store();
    let ana = conn
        .enroll_member(NewMember::new("Ana", Decimal::from(600)), "admin")
        .unwrap();
    let today = local_today(Utc::now(), config.utc_offset);
    conn.insert_attendance_batch(&[ana.id], today, "sensei")
        .unwrap();
    drop(conn);

    let reopened = Connection::open(&config.database_path).unwrap();
    setup_database(&reopened).unwrap();

    let view = load_dashboard(&reopened, ReportPeriod::Rolling, Utc::now(), &config).unwrap();
    assert_eq!(view.metrics.headcount, 1);
    assert_eq!(view.metrics.attendance_today, 1);
}
