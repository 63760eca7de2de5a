use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use birthdays_lib::backup::{self, ImportStrategy};
use birthdays_lib::config::AppConfig;
use birthdays_lib::dao::BirthdayQuery;
use birthdays_lib::model::{Birthday, BirthdayPatch, NewBirthday, PLACEHOLDER_YEAR};
use birthdays_lib::notifications::{ConsoleNotifier, ScheduleOutcome, SqliteAlarmService};
use birthdays_lib::occurrence::current_age;
use birthdays_lib::time::{Clock, SystemClock};
use birthdays_lib::zodiac::ZodiacSign;
use birthdays_lib::{
    build_repository, migrate, settings, AppError, AppResult, BirthdayRepository, ErrorKind,
    UpcomingBirthday,
};
use chrono::{Datelike, NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "birthdays", about = "Track birthdays and get reminded before they come")]
struct Cli {
    /// Database file (defaults to $BIRTHDAYS_DB, then the platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Add a birthday
    Add(AddArgs),
    /// Change fields of a birthday
    Edit(EditArgs),
    /// Delete a birthday and its reminders
    Delete { id: i64 },
    /// Show one birthday with its derived details
    Show { id: i64 },
    /// List birthdays by name
    List {
        /// Case- and accent-insensitive text search
        #[arg(long)]
        search: Option<String>,
        /// Birth month, 1-12
        #[arg(long)]
        month: Option<u32>,
        /// Only pinned birthdays
        #[arg(long)]
        pinned: bool,
    },
    /// Birthdays ordered by how soon they come
    Upcoming {
        /// Only birthdays at most this many days away
        #[arg(long)]
        days: Option<i64>,
    },
    /// Pin a birthday to the top of the upcoming list
    Pin { id: i64 },
    /// Unpin a birthday
    Unpin { id: i64 },
    /// Write every birthday to a JSON backup
    Export { path: PathBuf },
    /// Restore birthdays from a JSON backup
    Import {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "skip")]
        strategy: ImportStrategy,
    },
    /// Rebuild every reminder from the stored birthdays
    Reschedule,
    /// Post reminders that are due now
    Notify,
    /// Show or change reminder settings
    Settings {
        /// Turn all reminders on or off
        #[arg(long, value_name = "on|off")]
        notifications: Option<Toggle>,
        /// Reminder time for birthdays without their own (HH:MM)
        #[arg(long, value_name = "HH:MM")]
        default_time: Option<String>,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Schema version and record count
    Status,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Args)]
struct AddArgs {
    name: String,
    /// YYYY-MM-DD, or MM-DD when the year is unknown
    date: String,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    relationship: Option<String>,
    /// Days before the birthday to be reminded; repeatable
    #[arg(long = "offset", value_name = "DAYS")]
    offsets: Vec<u32>,
    /// Reminder time (HH:MM)
    #[arg(long, value_name = "HH:MM")]
    time: Option<String>,
    /// Store without reminders
    #[arg(long)]
    no_notify: bool,
    #[arg(long)]
    pinned: bool,
}

#[derive(Args)]
struct EditArgs {
    id: i64,
    #[arg(long)]
    name: Option<String>,
    /// YYYY-MM-DD, or MM-DD when the year is unknown
    #[arg(long)]
    date: Option<String>,
    #[arg(long, conflicts_with = "clear_notes")]
    notes: Option<String>,
    #[arg(long)]
    clear_notes: bool,
    #[arg(long)]
    relationship: Option<String>,
    /// Replace the reminder offsets; repeatable
    #[arg(long = "offset", value_name = "DAYS")]
    offsets: Vec<u32>,
    #[arg(long, value_name = "HH:MM", conflicts_with = "clear_time")]
    time: Option<String>,
    /// Fall back to the default reminder time
    #[arg(long)]
    clear_time: bool,
    #[arg(long, value_name = "on|off")]
    notify: Option<Toggle>,
}

fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{PLACEHOLDER_YEAR}-{raw}"), "%Y-%m-%d"))
        .map_err(|_| {
            AppError::validation(vec![birthdays_lib::FieldError::new(
                "birth_date",
                format!("'{raw}' is not a date (YYYY-MM-DD or MM-DD)"),
            )])
        })
}

fn parse_time(raw: Option<&str>) -> AppResult<Option<NaiveTime>> {
    raw.map(settings::parse_time).transpose()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match AppConfig::resolve(cli.db.clone()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = match birthdays_lib::logging::init_with_file(&config.log_dir, &config.log_filter)
    {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("warning: file logging unavailable: {err:#}");
            None
        }
    };

    match run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn report(err: &AppError) -> ExitCode {
    let ui = err.user_facing();
    eprintln!("error: {}", ui.message);
    for (field, message) in err.field_errors() {
        eprintln!("  {field}: {message}");
    }
    if ui.recoverable {
        eprintln!("  (try again)");
    }
    if err.kind() == ErrorKind::Validation {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

async fn run(cli: Cli, config: &AppConfig) -> AppResult<()> {
    let pool = birthdays_lib::open_database(&config.db_path).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repo = build_repository(
        pool.clone(),
        Arc::new(SqliteAlarmService::new(pool.clone())),
        Arc::new(ConsoleNotifier),
        clock.clone(),
    );
    let result = dispatch(cli.cmd, cli.json, &repo, clock.as_ref()).await;
    pool.close().await;
    result
}

async fn dispatch(cmd: Cmd, json: bool, repo: &BirthdayRepository, clock: &dyn Clock) -> AppResult<()> {
    match cmd {
        Cmd::Add(args) => {
            let input = NewBirthday {
                name: args.name,
                birth_date: Some(parse_date(&args.date)?),
                notes: args.notes,
                notifications_enabled: !args.no_notify,
                notification_offsets: args.offsets,
                notification_time: parse_time(args.time.as_deref())?,
                image_uri: None,
                relationship: args.relationship,
                is_pinned: args.pinned,
            };
            let saved = repo.add(input).await?;
            if json {
                print_json(&saved)?;
            } else {
                println!("Added #{} {}", saved.record.id, saved.record.name);
                print_schedule(&saved.schedule);
            }
        }
        Cmd::Edit(args) => {
            let patch = BirthdayPatch {
                name: args.name,
                birth_date: args.date.as_deref().map(parse_date).transpose()?,
                notes: if args.clear_notes {
                    Some(None)
                } else {
                    args.notes.map(Some)
                },
                notifications_enabled: args.notify.map(Toggle::enabled),
                notification_offsets: (!args.offsets.is_empty()).then_some(args.offsets),
                notification_time: if args.clear_time {
                    Some(None)
                } else {
                    parse_time(args.time.as_deref())?.map(Some)
                },
                image_uri: None,
                relationship: args.relationship.map(Some),
                is_pinned: None,
            };
            if patch.is_empty() {
                return Err(AppError::validation(vec![birthdays_lib::FieldError::new(
                    "edit",
                    "Nothing to change",
                )]));
            }
            let saved = repo.update(args.id, patch).await?;
            if json {
                print_json(&saved)?;
            } else {
                println!("Updated #{} {}", saved.record.id, saved.record.name);
                print_schedule(&saved.schedule);
            }
        }
        Cmd::Delete { id } => {
            repo.delete(id).await?;
            println!("Deleted #{id}");
        }
        Cmd::Show { id } => {
            let record = repo.get(id).await?;
            let detail = UpcomingBirthday::derive(record, clock.today());
            if json {
                print_json(&detail)?;
            } else {
                print_detail(&detail, clock.today());
            }
        }
        Cmd::List {
            search,
            month,
            pinned,
        } => {
            let records = match (search, month, pinned) {
                (Some(term), _, _) => repo.search(&term).await?,
                (None, Some(month), _) => repo.in_month(month).await?,
                (None, None, true) => repo.list(&BirthdayQuery::Pinned).await?,
                (None, None, false) => repo.all().await?,
            };
            if json {
                print_json(&records)?;
            } else if records.is_empty() {
                println!("No birthdays.");
            } else {
                for r in &records {
                    println!("{:>4}  {:<30}  {}", r.id, r.name, format_date(r));
                }
            }
        }
        Cmd::Upcoming { days } => {
            let upcoming = repo.upcoming(days).await?;
            if json {
                print_json(&upcoming)?;
            } else if upcoming.is_empty() {
                println!("No upcoming birthdays.");
            } else {
                for u in &upcoming {
                    let when = match u.days_until {
                        Some(0) => "today".to_string(),
                        Some(1) => "tomorrow".to_string(),
                        Some(n) => format!("in {n} days"),
                        None => "-".to_string(),
                    };
                    let turning = u
                        .turning
                        .map(|age| format!("turns {age}"))
                        .unwrap_or_default();
                    let pin = if u.record.is_pinned { "*" } else { " " };
                    println!(
                        "{pin}{:>4}  {:<30}  {:<12}  {}",
                        u.record.id, u.record.name, when, turning
                    );
                }
            }
        }
        Cmd::Pin { id } => {
            repo.set_pinned(id, true).await?;
            println!("Pinned #{id}");
        }
        Cmd::Unpin { id } => {
            repo.set_pinned(id, false).await?;
            println!("Unpinned #{id}");
        }
        Cmd::Export { path } => {
            let count = backup::export_to_file(repo, &path).await?;
            println!("Exported {count} birthday(s) to {}", path.display());
        }
        Cmd::Import { path, strategy } => {
            let report = backup::import_from_file(repo, &path, strategy).await?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "Imported {} birthday(s) ({} new, {} replaced, {} merged, {} skipped)",
                    report.imported(),
                    report.inserted,
                    report.replaced,
                    report.merged,
                    report.skipped
                );
            }
        }
        Cmd::Reschedule => {
            let summary = repo.reschedule_all().await?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "Rescheduled {} reminder(s) for {} birthday(s)",
                    summary.alarms, summary.records
                );
                if summary.blocked > 0 {
                    println!("{} birthday(s) not scheduled: reminders are off", summary.blocked);
                }
                if summary.failed > 0 {
                    println!("{} birthday(s) failed to schedule", summary.failed);
                }
            }
        }
        Cmd::Notify => {
            let posted = repo.deliver_due().await?;
            if !json && posted == 0 {
                println!("No reminders due.");
            } else if json {
                print_json(&serde_json::json!({ "posted": posted }))?;
            }
        }
        Cmd::Settings {
            notifications,
            default_time,
        } => {
            let pool = repo.store().pool();
            let changed = notifications.is_some() || default_time.is_some();
            if let Some(toggle) = notifications {
                settings::set_notifications_enabled(pool, toggle.enabled()).await?;
            }
            if let Some(raw) = default_time.as_deref() {
                settings::set_default_time(pool, settings::parse_time(raw)?).await?;
            }
            if changed {
                repo.reschedule_all().await?;
            }
            let current = repo.settings().await?;
            if json {
                print_json(&current)?;
            } else {
                println!(
                    "notifications: {}",
                    if current.notifications_enabled { "on" } else { "off" }
                );
                println!("default time:  {}", current.default_time.format("%H:%M"));
            }
        }
        Cmd::Db { cmd: DbCmd::Status } => {
            let pool = repo.store().pool();
            let migrations = migrate::status(pool).await?;
            let count = birthdays_lib::dao::count(pool).await?;
            let applied = migrations.iter().filter(|m| m.applied_at.is_some()).count();
            let head = migrations
                .iter()
                .rev()
                .find(|m| m.applied_at.is_some())
                .map(|m| m.version.trim_end_matches(".sql"))
                .unwrap_or("<none>");
            if json {
                print_json(&serde_json::json!({
                    "applied": applied,
                    "total": migrations.len(),
                    "head": head,
                    "birthdays": count,
                }))?;
            } else {
                println!("Schema: {applied}/{} ({head})", migrations.len());
                println!("Birthdays: {count}");
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_date(record: &Birthday) -> String {
    if record.year_known() {
        record.birth_date.format("%Y-%m-%d").to_string()
    } else {
        record.birth_date.format("--%m-%d").to_string()
    }
}

fn print_schedule(outcome: &ScheduleOutcome) {
    match outcome {
        ScheduleOutcome::Scheduled { alarms } => {
            for alarm in alarms {
                println!("  reminder {}", alarm.trigger_at.format("%Y-%m-%d %H:%M"));
            }
        }
        ScheduleOutcome::Cancelled => println!("  reminders off"),
        other => {
            if let Some(err) = other.as_error() {
                println!("  warning: {}", err.message());
            }
        }
    }
}

fn print_detail(detail: &UpcomingBirthday, today: NaiveDate) {
    let r = &detail.record;
    let sign: ZodiacSign = detail.zodiac;
    println!("#{} {}{}", r.id, r.name, if r.is_pinned { " (pinned)" } else { "" });
    println!("  born:     {}", format_date(r));
    if r.year_known() && r.birth_date.year() <= today.year() {
        println!("  age:      {}", current_age(r.birth_date, today));
    }
    if let (Some(next), Some(days)) = (detail.next_occurrence, detail.days_until) {
        println!("  next:     {} ({} days)", next.format("%Y-%m-%d"), days);
    }
    if let Some(age) = detail.turning {
        println!("  turning:  {age}");
    }
    println!("  zodiac:   {} {}", sign.symbol(), sign);
    if let Some(rel) = &r.relationship {
        println!("  relation: {rel}");
    }
    if let Some(notes) = &r.notes {
        println!("  notes:    {notes}");
    }
    println!(
        "  remind:   {}",
        if r.notifications_enabled {
            format!("{:?} days before", r.effective_offsets())
        } else {
            "off".to_string()
        }
    );
}
