mod classifier;
mod colors;
mod composer;
mod config;
mod dispatcher;
mod mail_auth;
mod mailer;
mod notion_client;
mod notion_types;
mod query;
mod unit_config;
mod workbook;

use chrono::{NaiveDate, Utc};
use chrono_english::{Dialect, parse_date_string};
use clap::Parser;
use std::env;
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::OnceLock;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::colors::ColorTable;
use crate::composer::ReminderMode;
use crate::config::AppConfig;
use crate::dispatcher::{DispatchOutcome, ReminderDispatcher};
use crate::mail_auth::MailAuth;
use crate::mailer::SmtpMailer;
use crate::notion_client::NotionClient;
use crate::unit_config::{ReminderUnit, UnitKind};
use crate::workbook::Workbook;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const LOG_LEVEL_ENV: &str = "NOTION_REMINDER_LOG";

// Global state for working directory
static WORKING_DIR: OnceLock<PathBuf> = OnceLock::new();

fn set_working_dir(path: Option<&str>) -> CliResult<()> {
    let work_dir = if let Some(p) = path {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            fs::create_dir_all(&pb)?;
            println!("📁 Created directory: {}", pb.display());
        }
        if !pb.is_dir() {
            return Err(format!("Path {} is not a directory", pb.display()).into());
        }
        pb.canonicalize()?
    } else {
        env::current_dir()?
    };

    let _ = WORKING_DIR.set(work_dir);
    Ok(())
}

fn get_working_dir() -> PathBuf {
    WORKING_DIR
        .get()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."))
}

fn get_workbook_path() -> PathBuf {
    get_working_dir().join("workbook.toml")
}

fn get_config_path() -> PathBuf {
    get_working_dir().join("reminder_config.toml")
}

#[derive(Parser)]
#[command(name = "notion-reminder")]
#[command(author, version, about = "email digests of overdue Notion tasks", long_about = None)]
struct Cli {
    /// reminder unit to send a live reminder for
    unit: Option<String>,

    /// send a test reminder for the unit (or the active unit if none given)
    #[arg(short, long)]
    test: bool,

    /// list reminder units
    #[arg(short, long)]
    list: bool,

    /// list the theme colors
    #[arg(long)]
    colors: bool,

    /// create a new reminder unit from the template
    #[arg(long, value_name = "NAME")]
    create: Option<String>,

    /// kind of unit to create
    #[arg(long, value_enum, default_value_t = UnitKind::Tracked)]
    kind: UnitKind,

    /// theme color for the new unit
    #[arg(long, value_name = "COLOR", default_value = "Light Gray")]
    color: String,

    /// rebuild the index sheet
    #[arg(long)]
    update_index: bool,

    /// write default config and a starter workbook
    #[arg(long)]
    setup: bool,

    /// read the SMTP password from stdin into the OS keyring
    #[arg(long)]
    store_smtp_password: bool,

    /// remove the SMTP password from the OS keyring
    #[arg(long)]
    forget_smtp_password: bool,

    /// run as daemon, sending live reminders on the configured schedules
    #[arg(long)]
    daemon: bool,

    /// treat this date as today (YYYY-MM-DD or e.g. "yesterday")
    #[arg(long, value_name = "DATE")]
    as_of: Option<String>,

    /// path to directory containing workbook.toml (creates if doesn't exist)
    #[arg(short, long, value_name = "DIR")]
    path: Option<String>,
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    // Set up working directory first
    if let Err(e) = set_working_dir(cli.path.as_deref()) {
        eprintln!("Error setting up working directory: {}", e);
        return ExitCode::FAILURE;
    }

    if cli.path.is_some() {
        println!("📂 Working directory: {}", get_working_dir().display());
    }

    let result = if cli.setup {
        setup()
    } else if cli.store_smtp_password {
        store_smtp_password()
    } else if cli.forget_smtp_password {
        forget_smtp_password()
    } else if cli.daemon {
        run_daemon().await
    } else if let Some(name) = cli.create.as_deref() {
        create_unit(name, cli.kind, &cli.color)
    } else if cli.update_index {
        update_index()
    } else if cli.list {
        list_units()
    } else if cli.colors {
        list_colors()
    } else if cli.test {
        send_test_reminder(cli.unit.as_deref(), cli.as_of.as_deref()).await
    } else if let Some(unit) = cli.unit.as_deref() {
        send_live_reminder(unit, cli.as_of.as_deref()).await
    } else {
        println!("Nothing to do. Try --help.");
        Ok(())
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup() -> CliResult<()> {
    println!("Setting up notion-reminder...");

    let config_file = get_config_path();
    if config_file.exists() {
        println!("• {} already exists, leaving it alone", config_file.display());
    } else {
        AppConfig::default().save(&config_file)?;
        println!("✓ Created {}", config_file.display());
        println!("Please edit reminder_config.toml with your settings:");
        println!("  - For Gmail: Use app password, not regular password");
        println!("  - smtp_server / smtp_port: your SMTP server, usually port 587 for STARTTLS");
        println!("  - password: leave empty to use --store-smtp-password instead");
        println!("  - timezone: the zone remind dates are compared in");
        println!("  - [[schedules]]: which units the daemon reminds, and when");
    }

    let workbook_file = get_workbook_path();
    if workbook_file.exists() {
        println!("• {} already exists, leaving it alone", workbook_file.display());
    } else {
        let url = format!("file://{}", workbook_file.display());
        Workbook::starter(&url).save(&workbook_file)?;
        println!("✓ Created {}", workbook_file.display());
        println!("Create a reminder unit with --create NAME --kind tracked --color Blue");
    }

    Ok(())
}

fn store_smtp_password() -> CliResult<()> {
    let config = AppConfig::load(&get_config_path())?;
    println!("Enter the SMTP password for {}:", config.username);

    let mut password = String::new();
    io::stdin().lock().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err("No password given".into());
    }

    MailAuth::store_password(&config.username, password)?;
    println!("✓ Stored SMTP password in the OS keyring");
    Ok(())
}

fn forget_smtp_password() -> CliResult<()> {
    let config = AppConfig::load(&get_config_path())?;
    MailAuth::delete_password(&config.username)?;
    println!("✓ Removed SMTP password for {} from the OS keyring", config.username);
    Ok(())
}

fn create_unit(name: &str, kind: UnitKind, color: &str) -> CliResult<()> {
    let path = get_workbook_path();
    let mut workbook = Workbook::load(&path)?;

    let colors = ColorTable::from_workbook(&workbook)?;
    let hex = colors.resolve(color)?.to_string();

    workbook.create_unit(name, kind, color, &hex)?;
    workbook.save(&path)?;

    println!("✓ New sheet \"{}\" was successfully created ({})", name, kind);
    println!("  Fill in its rows in {}, then run with --test", path.display());
    Ok(())
}

fn update_index() -> CliResult<()> {
    let path = get_workbook_path();
    let mut workbook = Workbook::load(&path)?;
    let listed = workbook.update_index();
    workbook.save(&path)?;

    println!("✓ Index updated with {} unit(s)", listed);
    Ok(())
}

fn list_units() -> CliResult<()> {
    let workbook = Workbook::load(&get_workbook_path())?;

    println!("reminder units:");
    for sheet in workbook.unit_sheets() {
        let marker = if workbook.active_sheet.as_deref() == Some(sheet.name.as_str()) {
            "▶"
        } else {
            " "
        };
        match unit_config::load(&workbook, &sheet.name) {
            Ok(config) => {
                let state = if config.is_inert() { " (no API key)" } else { "" };
                println!(
                    "{} {} [{}] → {}{}",
                    marker, sheet.name, config.kind, config.table_name, state
                );
                if !config.description.is_empty() {
                    println!("    {}", config.description);
                }
            }
            Err(e) => println!("{} {} ⚠️ {}", marker, sheet.name, e),
        }
    }
    Ok(())
}

fn list_colors() -> CliResult<()> {
    let workbook = Workbook::load(&get_workbook_path())?;
    let colors = ColorTable::from_workbook(&workbook)?;
    for entry in colors.entries() {
        println!("  {:<12} {}", entry.name, entry.hex);
    }
    Ok(())
}

/// "Today" for a run: the override if given, otherwise the current date in
/// the configured timezone.
fn resolve_today(as_of: Option<&str>, config: &AppConfig) -> CliResult<NaiveDate> {
    let now = Utc::now().with_timezone(&config.timezone()?);
    let Some(raw) = as_of else {
        return Ok(now.date_naive());
    };

    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    parse_date_string(raw, now, Dialect::Us)
        .map(|parsed| parsed.date_naive())
        .map_err(|e| format!("Could not understand date \"{}\": {}", raw, e).into())
}

async fn send_test_reminder(unit: Option<&str>, as_of: Option<&str>) -> CliResult<()> {
    let unit = match unit {
        Some(unit) => unit.to_string(),
        None => Workbook::load(&get_workbook_path())?
            .active_sheet
            .ok_or("No active unit. Name one: --test UNIT")?,
    };
    println!("🧪 FOR TEST REMINDER: \"{}\" is the target sheet", unit);

    let outcome = run_dispatch(&unit, ReminderMode::Test, as_of).await?;
    report(&unit, &outcome);
    if !matches!(outcome, DispatchOutcome::SchemaErrorReported(_)) {
        println!("Check the reminder email. If the contents are fine, add a schedule for it.");
    }
    Ok(())
}

async fn send_live_reminder(unit: &str, as_of: Option<&str>) -> CliResult<()> {
    let outcome = run_dispatch(unit, ReminderMode::Live, as_of).await?;
    report(unit, &outcome);
    Ok(())
}

fn report(unit: &str, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::PlaceholderSent { subject } => {
            println!("✓ Sent \"{}\" (placeholder, {} has no API key)", subject, unit);
        }
        DispatchOutcome::Sent {
            subject,
            overdue,
            undated,
        } => {
            println!("✓ Sent \"{}\"", subject);
            println!("  {} overdue, {} without remind date", overdue, undated);
        }
        DispatchOutcome::SchemaErrorReported(inconsistency) => {
            println!("⚠️ {}; error email sent instead of the reminder", inconsistency);
            for issue in &inconsistency.issues {
                println!("  - {}: {}", issue.record_url, issue);
            }
        }
        DispatchOutcome::Suppressed => {
            println!("Nothing overdue for {}, no reminder sent.", unit);
        }
    }
}

/// One complete dispatch: open the unit (colouring its tab), then query,
/// classify, compose and send.
async fn run_dispatch(
    unit_name: &str,
    mode: ReminderMode,
    as_of: Option<&str>,
) -> CliResult<DispatchOutcome> {
    let config = AppConfig::load(&get_config_path())?;
    let today = resolve_today(as_of, &config)?;

    let unit = open_unit(&get_workbook_path(), unit_name)?;

    tracing::info!(unit = unit_name, ?mode, %today, "dispatching reminder");

    let source = NotionClient::new(&config.notion_api_base)?;
    let mailer = SmtpMailer::from_config(&config)?;
    let dispatcher = ReminderDispatcher::new(&source, &mailer, config.timezone()?);

    Ok(dispatcher.dispatch(&unit, mode, today).await?)
}

/// Loads a unit, writing the workbook back only when its tab colour changed.
fn open_unit(workbook_path: &Path, unit_name: &str) -> CliResult<ReminderUnit> {
    let mut workbook = Workbook::load(workbook_path)?;
    let unit = ReminderUnit::open(&workbook, unit_name)?;
    if unit.apply_tab_color(&mut workbook) {
        workbook.save(workbook_path)?;
        tracing::debug!(unit = unit_name, "updated tab colour");
    }
    Ok(unit)
}

async fn run_daemon() -> CliResult<()> {
    let config = AppConfig::load(&get_config_path())?;
    if config.schedules.is_empty() {
        return Err("No [[schedules]] in reminder_config.toml".into());
    }

    println!("🔄 Starting notion-reminder daemon...");

    let sched = JobScheduler::new().await?;

    for schedule in &config.schedules {
        let unit = schedule.unit.clone();
        let job = Job::new_async(schedule.cron.as_str(), move |_uuid, _l| {
            let unit = unit.clone();
            Box::pin(async move {
                tracing::info!(unit = %unit, "running scheduled reminder");
                match run_dispatch(&unit, ReminderMode::Live, None).await {
                    Ok(outcome) => report(&unit, &outcome),
                    Err(e) => tracing::error!(unit = %unit, "scheduled reminder failed: {}", e),
                }
            })
        })?;

        sched.add(job).await?;
        println!("📧 {} → \"{}\"", schedule.unit, schedule.cron);
    }

    sched.start().await?;
    println!("💡 Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!("Stopping daemon");
    Ok(())
}
