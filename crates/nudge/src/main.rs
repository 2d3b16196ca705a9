//! Nudge: context-aware task reminders
//!
//! Main binary with subcommands:
//! - `add`: Create a time, location, activity or context reminder
//! - `list`, `remove`, `enable`, `disable`: Manage stored reminders
//! - `run`: Scheduler daemon that evaluates reminders and sends notifications

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use nudge_scheduler::{
    DEFAULT_COOLDOWN_SECS, DEFAULT_TICK_SECS, DEFAULT_TIME_MATCH_WINDOW_SECS, SchedulerConfig,
};
use nudge_store::{DeviceActivity, TimeRange};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

mod commands;
mod daemon;
mod location;
mod sinks;
mod tasks;

#[derive(Parser)]
#[command(name = "nudge")]
#[command(about = "Context-aware task reminders", long_about = None)]
struct Cli {
    /// Reminder store file (default: <data dir>/nudge/reminders.json)
    #[arg(long, global = true, env = "NUDGE_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a reminder for a task
    Add {
        #[command(subcommand)]
        trigger: AddTrigger,
    },

    /// List reminders
    List {
        /// Only active reminders for this task
        #[arg(long)]
        task: Option<String>,

        /// Print the stored JSON records
        #[arg(long)]
        json: bool,
    },

    /// Delete a reminder
    Remove {
        /// Reminder id
        id: String,
    },

    /// Re-enable a disabled reminder
    Enable {
        /// Reminder id
        id: String,
    },

    /// Keep a reminder but stop evaluating it
    Disable {
        /// Reminder id
        id: String,
    },

    /// Run the scheduler daemon
    Run {
        /// Seconds between evaluation passes
        #[arg(long, env = "NUDGE_TICK_SECS", default_value_t = DEFAULT_TICK_SECS)]
        tick_secs: u64,

        /// Minimum seconds between two firings of one reminder
        #[arg(long, env = "NUDGE_COOLDOWN_SECS", default_value_t = DEFAULT_COOLDOWN_SECS)]
        cooldown_secs: i64,

        /// Tolerance in seconds around an absolute trigger time
        #[arg(long, env = "NUDGE_WINDOW_SECS", default_value_t = DEFAULT_TIME_MATCH_WINDOW_SECS)]
        window_secs: i64,

        /// Task snapshot file exported by the task manager, reloaded every tick
        #[arg(long, env = "NUDGE_TASKS")]
        tasks: Option<PathBuf>,

        /// POST notifications to this URL instead of logging them
        #[arg(long, env = "NUDGE_WEBHOOK_URL")]
        webhook_url: Option<String>,

        /// Current latitude, for location reminders
        #[arg(long, env = "NUDGE_LATITUDE", requires = "longitude", allow_negative_numbers = true)]
        latitude: Option<f64>,

        /// Current longitude, for location reminders
        #[arg(long, env = "NUDGE_LONGITUDE", requires = "latitude", allow_negative_numbers = true)]
        longitude: Option<f64>,

        /// Name of the current location
        #[arg(long)]
        location_label: Option<String>,

        /// Report the application as foregrounded.
        /// Accepts "1", "true", "yes" or "on".
        #[arg(
            long,
            env = "NUDGE_FOREGROUND",
            value_parser = parse_bool_env,
            default_value = "false"
        )]
        foreground: bool,

        /// Report the device as idle or active
        #[arg(long, env = "NUDGE_DEVICE_ACTIVITY", value_parser = commands::parse_device_activity)]
        device_activity: Option<DeviceActivity>,
    },
}

#[derive(Subcommand)]
enum AddTrigger {
    /// Fire at an instant, or on weekdays within a time window
    Time {
        /// Task the reminder belongs to
        #[arg(long)]
        task: String,

        /// Reminder id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// One-shot instant, RFC 3339
        #[arg(long, value_parser = commands::parse_instant)]
        at: Option<DateTime<Utc>>,

        /// Weekdays, e.g. "mon,tue" or "1,2" (0 = Sunday)
        #[arg(long, value_parser = commands::parse_days)]
        days: Option<BTreeSet<u8>>,

        /// Daily window, e.g. "09:00-17:00"
        #[arg(long, value_parser = commands::parse_time_range)]
        between: Option<TimeRange>,

        /// Store the reminder disabled
        #[arg(long)]
        inactive: bool,
    },

    /// Fire when the device is within a radius of a point
    Location {
        #[arg(long)]
        task: String,

        #[arg(long)]
        id: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        latitude: f64,

        #[arg(long, allow_negative_numbers = true)]
        longitude: f64,

        /// Geofence radius in meters
        #[arg(long, default_value_t = 100.0)]
        radius: f64,

        /// Place name shown in the notification
        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        inactive: bool,
    },

    /// Fire after another task completes or after time spent on this one
    Activity {
        #[arg(long)]
        task: String,

        #[arg(long)]
        id: Option<String>,

        /// Fire once this task is completed
        #[arg(long)]
        after_task: Option<String>,

        /// Fire once this many minutes are tracked on the task
        #[arg(long)]
        after_minutes: Option<u32>,

        #[arg(long)]
        inactive: bool,
    },

    /// Fire while the app is foregrounded or the device is idle/active
    Context {
        #[arg(long)]
        task: String,

        #[arg(long)]
        id: Option<String>,

        /// Fire while the application is in the foreground
        #[arg(long)]
        foreground: bool,

        /// Fire while the device is idle or active
        #[arg(long, value_parser = commands::parse_device_activity)]
        device: Option<DeviceActivity>,

        #[arg(long)]
        inactive: bool,
    },
}

/// Default store location under the platform data directory.
fn default_store_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| miette!("could not determine data directory"))?;
    Ok(data_dir.join("nudge").join("reminders.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "nudge=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let store = match cli.store {
        Some(path) => path,
        None => default_store_path()?,
    };

    match cli.command {
        Commands::Add { trigger } => add(&store, trigger).await,

        Commands::List { task, json } => commands::list(&store, task.as_deref(), json).await,

        Commands::Remove { id } => commands::remove(&store, &id).await,

        Commands::Enable { id } => commands::set_active(&store, &id, true).await,

        Commands::Disable { id } => commands::set_active(&store, &id, false).await,

        Commands::Run {
            tick_secs,
            cooldown_secs,
            window_secs,
            tasks,
            webhook_url,
            latitude,
            longitude,
            location_label,
            foreground,
            device_activity,
        } => {
            let scheduler = SchedulerConfig::from_secs(tick_secs, cooldown_secs, window_secs)
                .into_diagnostic()?;
            daemon::run(daemon::DaemonConfig {
                store_path: store,
                scheduler,
                tasks_path: tasks,
                webhook_url,
                latitude,
                longitude,
                location_label,
                foreground,
                device_activity,
            })
            .await
        }
    }
}

async fn add(store: &Path, trigger: AddTrigger) -> Result<()> {
    match trigger {
        AddTrigger::Time {
            task,
            id,
            at,
            days,
            between,
            inactive,
        } => {
            let conditions = commands::time_conditions(at, days, between)?;
            commands::add(store, task, id, conditions, inactive).await
        }

        AddTrigger::Location {
            task,
            id,
            latitude,
            longitude,
            radius,
            label,
            inactive,
        } => {
            let conditions = commands::location_conditions(latitude, longitude, radius, label)?;
            commands::add(store, task, id, conditions, inactive).await
        }

        AddTrigger::Activity {
            task,
            id,
            after_task,
            after_minutes,
            inactive,
        } => {
            let conditions = commands::activity_conditions(after_task, after_minutes)?;
            commands::add(store, task, id, conditions, inactive).await
        }

        AddTrigger::Context {
            task,
            id,
            foreground,
            device,
            inactive,
        } => {
            let conditions = commands::context_conditions(foreground, device)?;
            commands::add(store, task, id, conditions, inactive).await
        }
    }
}
