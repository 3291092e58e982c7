// Dojo Dues - Core Library
// Reporting engine + SQLite store, shared by the CLI, the API server and tests

pub mod error;
pub mod validation;
pub mod models;
pub mod period;     // Report period resolution and bucketing
pub mod ledger;     // Payment aggregation
pub mod debt;       // Outstanding dues
pub mod history;    // Recent payments feed
pub mod attendance;
pub mod dashboard;  // View state assembly
pub mod db;
pub mod retry;
pub mod config;
pub mod reminder;
pub mod import;

// Re-export commonly used types
pub use error::{DuesError, Result};
pub use validation::ValidationError;
pub use models::{
    AttendanceEvent, Event, Member, MemberId, NewMember, PaymentEvent, PaymentId,
    DEFAULT_BELT,
};
pub use period::{BucketKey, Bucketing, ReportPeriod, ResolvedRange, YearMonth};
pub use ledger::{LedgerAggregator, LedgerSummary, SeriesPoint};
pub use debt::{DebtCalculator, DebtReport, MemberStatus};
pub use history::{HistoryEntry, HistoryProjector, PayerStatus};
pub use dashboard::{
    fetch_snapshot, load_dashboard, DashboardMetrics, DashboardSettings, DashboardView,
    LedgerSnapshot,
};
pub use db::{get_events_for_entity, insert_event, setup_database, DuesStore};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use config::{Config, ConfigError};
pub use reminder::{reminders_for, whatsapp_link, Reminder};
pub use import::{import_roster, import_roster_from, ImportReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
