// Dojo Dues - command line front end
//
// Every command opens the store, does one thing and prints the outcome.
// Reports are always rebuilt from the store; nothing is kept between runs.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dojo_dues::attendance::local_today;
use dojo_dues::{
    import_roster, load_dashboard, reminders_for, setup_database, Config, DashboardView,
    DuesStore, MemberId, NewMember, PayerStatus, PaymentId, ReportPeriod,
};

#[derive(Parser)]
#[command(name = "dojo-dues", version, about = "Monthly dues reconciliation for the dojo")]
struct Cli {
    /// SQLite file (overrides DUES_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Who is operating the desk, recorded on every change
    #[arg(long, global = true, default_value = "admin")]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Enroll a new member
    Enroll {
        name: String,
        /// Monthly due (defaults to DUES_DEFAULT_DUE)
        #[arg(long)]
        due: Option<Decimal>,
        #[arg(long)]
        belt: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        age: Option<u8>,
        #[arg(long)]
        guardian: Option<String>,
        #[arg(long)]
        emergency_contact: Option<String>,
    },
    /// List members
    Members {
        /// Include deactivated members
        #[arg(long)]
        all: bool,
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,
    },
    /// Soft-delete a member (payments are kept)
    Deactivate { member_id: i64 },
    /// Record a payment for a member
    Pay {
        member_id: i64,
        /// Defaults to the member's monthly due
        amount: Option<Decimal>,
    },
    /// Reverse a payment by id
    Reverse { payment_id: i64 },
    /// Check in members for today
    Checkin {
        #[arg(required = true)]
        member_ids: Vec<i64>,
    },
    /// Show the dashboard
    Dashboard {
        /// Explicit month as YYYY-MM (default: rolling six months)
        #[arg(long)]
        month: Option<String>,
        /// Print the view as JSON
        #[arg(long)]
        json: bool,
    },
    /// WhatsApp reminder links for unpaid members
    Remind,
    /// Enroll members from a roster CSV
    Import { csv: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to read configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open {:?}", config.database_path))?;
    setup_database(&conn).context("Failed to set up database schema")?;

    match cli.command {
        Command::Init => {
            println!("✓ Database ready at {:?}", config.database_path);
        }
        Command::Enroll {
            name,
            due,
            belt,
            phone,
            age,
            guardian,
            emergency_contact,
        } => {
            let mut form = NewMember::new(name, due.unwrap_or(config.default_due));
            if let Some(belt) = belt {
                form.belt = belt;
            }
            form.phone = phone;
            form.age = age;
            form.guardian = guardian;
            form.emergency_contact = emergency_contact;

            let member = conn.enroll_member(form, &cli.actor)?;
            println!(
                "✓ Enrolled #{} {} ({}, ${}/month)",
                member.id, member.name, member.belt, member.monthly_due
            );
            if member.is_minor() && member.guardian.is_none() {
                println!("⚠️  Minor without a guardian on file");
            }
        }
        Command::Members { all, search } => {
            let members = if all {
                conn.list_members()?
            } else {
                conn.list_active_members()?
            };
            let needle = search.unwrap_or_default().to_lowercase();

            for member in members
                .iter()
                .filter(|m| m.name.to_lowercase().contains(&needle))
            {
                println!(
                    "{:>5}  {:<3} {:<30} {:<10} ${:>9}{}",
                    member.id.to_string(),
                    member.initials(),
                    member.name,
                    member.belt,
                    member.monthly_due,
                    if member.active { "" } else { "  (inactive)" }
                );
            }
        }
        Command::Deactivate { member_id } => {
            conn.deactivate_member(MemberId(member_id), &cli.actor)?;
            println!("✓ Member #{} deactivated", member_id);
        }
        Command::Pay { member_id, amount } => {
            let member_id = MemberId(member_id);
            let amount = match amount {
                Some(amount) => amount,
                None => conn.get_member(member_id)?.monthly_due,
            };
            let payment = conn.insert_payment(member_id, amount, &cli.actor, Utc::now())?;
            println!(
                "✓ Payment #{} recorded: ${} for member #{}",
                payment.id, payment.amount, payment.member_id
            );
        }
        Command::Reverse { payment_id } => {
            conn.delete_payment(PaymentId(payment_id), &cli.actor)?;
            println!("✓ Payment #{} reversed", payment_id);
        }
        Command::Checkin { member_ids } => {
            let ids: Vec<MemberId> = member_ids.into_iter().map(MemberId).collect();
            let today = local_today(Utc::now(), config.utc_offset);
            let count = conn.insert_attendance_batch(&ids, today, &cli.actor)?;
            println!("✓ {} check-ins saved for {}", count, today);
        }
        Command::Dashboard { month, json } => {
            let period = ReportPeriod::from_selection(month.as_deref())?;
            let view = load_dashboard(&conn, period, Utc::now(), &config)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_dashboard(&view);
            }
        }
        Command::Remind => {
            let view = load_dashboard(&conn, ReportPeriod::Rolling, Utc::now(), &config)?;
            let reminders = reminders_for(view.unpaid());

            if reminders.is_empty() {
                println!("✓ Nobody to remind");
            }
            for reminder in reminders {
                println!("{} (${}): {}", reminder.name, reminder.amount, reminder.link);
            }
        }
        Command::Import { csv } => {
            println!("📂 Importing roster from {:?}...", csv);
            let report = import_roster(&conn, &csv, config.default_due, &cli.actor)?;

            println!("✓ Enrolled {} members", report.enrolled.len());
            for (line, reason) in &report.rejected {
                println!("  ✗ line {}: {}", line, reason);
            }
        }
    }

    Ok(())
}

fn print_dashboard(view: &DashboardView) {
    let rule = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

    println!("🥋 Dojo Dues - {}", view.today);
    println!("{}", rule);
    println!("💰 Outstanding:     ${}", view.metrics.total_outstanding);
    println!("👥 Active members:  {}", view.metrics.headcount);
    println!("📈 Collected:       ${}", view.metrics.collected_in_range);
    println!("🗓️  Check-ins today: {}", view.metrics.attendance_today);

    println!("\n{}", view.title);
    for point in &view.series {
        println!("  {:>4}  ${}", point.label, point.total);
    }
    if view.excluded_payments > 0 {
        println!("  ({} payments outside the range ignored)", view.excluded_payments);
    }

    println!("\n⏳ Unpaid this month");
    let unpaid = view.unpaid();
    if unpaid.is_empty() {
        println!("  Everyone is up to date");
    }
    for status in unpaid {
        println!(
            "  #{:<5} {:<30} ${}",
            status.member.id.to_string(),
            status.member.name,
            status.member.monthly_due
        );
    }

    println!("\n📜 Recent payments");
    for entry in &view.history {
        let marker = match entry.payer_status {
            PayerStatus::Active => "",
            PayerStatus::Inactive => " (inactive)",
            PayerStatus::Missing => " (?)",
        };
        println!(
            "  {}  {:<30} ${:>9}  by {}{}",
            entry.paid_at.format("%Y-%m-%d %H:%M"),
            entry.member_name,
            entry.amount,
            entry.recorded_by,
            marker
        );
    }
    println!("{}", rule);
}
