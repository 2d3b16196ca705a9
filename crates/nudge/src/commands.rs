//! Owner-side reminder management: add, list, remove, enable, disable.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use miette::{IntoDiagnostic, Result, miette};
use nudge_store::{
    ActivityCondition, Conditions, ContextCondition, DeviceActivity, JsonFileRepository,
    LocationCondition, NewReminder, Position, Reminder, ReminderRepository, TimeCondition,
    TimeRange,
};

/// Parse a comma-separated weekday list.
///
/// Accepts names (`sun`, `Monday`) and numbers (0 = Sunday .. 6 = Saturday).
pub fn parse_days(s: &str) -> Result<BTreeSet<u8>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(parse_day)
        .collect()
}

fn parse_day(s: &str) -> Result<u8, String> {
    if let Ok(n) = s.parse::<u8>() {
        return if n <= 6 {
            Ok(n)
        } else {
            Err(format!("day number {n} out of range 0-6"))
        };
    }

    const NAMES: [&str; 7] = [
        "sunday",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
    ];

    let lower = s.to_lowercase();
    NAMES
        .iter()
        .position(|name| lower.len() >= 3 && name.starts_with(&lower))
        .map(|i| i as u8)
        .ok_or_else(|| format!("unknown weekday '{s}'"))
}

/// Parse `HH:MM-HH:MM` into a time range.
pub fn parse_time_range(s: &str) -> Result<TimeRange, String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected HH:MM-HH:MM, got '{s}'"))?;
    for part in [start, end] {
        if chrono::NaiveTime::parse_from_str(part.trim(), "%H:%M").is_err() {
            return Err(format!("invalid time '{part}', expected HH:MM"));
        }
    }
    Ok(TimeRange::new(start.trim(), end.trim()))
}

/// Parse an RFC 3339 instant.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{s}': {e}"))
}

/// Parse `idle` or `active`.
pub fn parse_device_activity(s: &str) -> Result<DeviceActivity, String> {
    match s.to_lowercase().as_str() {
        "idle" => Ok(DeviceActivity::Idle),
        "active" => Ok(DeviceActivity::Active),
        _ => Err(format!("invalid device activity '{s}', expected idle or active")),
    }
}

/// Conditions for a time reminder. At least one rule must be given.
pub fn time_conditions(
    at: Option<DateTime<Utc>>,
    days: Option<BTreeSet<u8>>,
    between: Option<TimeRange>,
) -> Result<Conditions> {
    if at.is_none() && days.is_none() {
        return Err(miette!("a time reminder needs --at or --days"));
    }
    Ok(Conditions::Time(TimeCondition {
        trigger_at: at,
        days_of_week: days.unwrap_or_default(),
        time_range: between,
    }))
}

/// Conditions for a geofence reminder.
pub fn location_conditions(
    latitude: f64,
    longitude: f64,
    radius: f64,
    label: Option<String>,
) -> Result<Conditions> {
    let mut target = Position::new(latitude, longitude);
    if let Some(label) = label {
        target = target.with_label(label);
    }
    if !target.is_valid() {
        return Err(miette!("coordinates {latitude},{longitude} are out of range"));
    }
    if !radius.is_finite() || radius < 0.0 {
        return Err(miette!("radius must be a non-negative number of meters"));
    }
    Ok(Conditions::Location(LocationCondition {
        target: Some(target),
        radius_meters: Some(radius),
    }))
}

/// Conditions for a task-progress reminder. At least one rule must be given.
pub fn activity_conditions(
    after_task: Option<String>,
    after_minutes: Option<u32>,
) -> Result<Conditions> {
    if after_task.is_none() && after_minutes.is_none() {
        return Err(miette!("an activity reminder needs --after-task or --after-minutes"));
    }
    Ok(Conditions::Activity(ActivityCondition {
        after_task_id: after_task,
        after_minutes_spent: after_minutes,
    }))
}

/// Conditions for a device-context reminder. At least one rule must be given.
pub fn context_conditions(
    foreground: bool,
    device: Option<DeviceActivity>,
) -> Result<Conditions> {
    if !foreground && device.is_none() {
        return Err(miette!("a context reminder needs --foreground or --device"));
    }
    Ok(Conditions::Context(ContextCondition {
        app_in_foreground: foreground.then_some(true),
        device_activity: device,
    }))
}

async fn open(store: &Path) -> Result<JsonFileRepository> {
    JsonFileRepository::open(store).await.into_diagnostic()
}

/// Store a new reminder and print its id.
pub async fn add(
    store: &Path,
    task_id: String,
    id: Option<String>,
    conditions: Conditions,
    inactive: bool,
) -> Result<()> {
    let repo = open(store).await?;

    let mut reminder = NewReminder::new(task_id, conditions);
    if let Some(id) = id {
        reminder = reminder.with_id(id);
    }
    if inactive {
        reminder = reminder.with_active(false);
    }

    let stored = repo.add(reminder).await.into_diagnostic()?;
    println!("{}", stored.id);
    Ok(())
}

/// Print reminders, optionally only the active ones for one task.
pub async fn list(store: &Path, task: Option<&str>, json: bool) -> Result<()> {
    let repo = open(store).await?;

    let reminders = match task {
        Some(task_id) => repo.list_active_for(task_id).await,
        None => repo.list_all().await,
    }
    .into_diagnostic()?;

    if json {
        let out = serde_json::to_string_pretty(&reminders).into_diagnostic()?;
        println!("{out}");
        return Ok(());
    }

    if reminders.is_empty() {
        println!("no reminders");
        return Ok(());
    }
    for reminder in &reminders {
        println!("{}", format_row(reminder));
    }
    Ok(())
}

fn format_row(reminder: &Reminder) -> String {
    let state = if reminder.active { "active" } else { "disabled" };
    let last = reminder
        .last_triggered_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{}  task={}  kind={}  {}  last={}",
        reminder.id,
        reminder.task_id,
        reminder.kind(),
        state,
        last
    )
}

/// Delete a reminder. Unknown ids are reported but not an error.
pub async fn remove(store: &Path, id: &str) -> Result<()> {
    let repo = open(store).await?;
    if repo.get(id).await.into_diagnostic()?.is_none() {
        println!("no reminder {id}");
        return Ok(());
    }
    repo.remove(id).await.into_diagnostic()?;
    println!("removed {id}");
    Ok(())
}

/// Enable or disable a reminder.
pub async fn set_active(store: &Path, id: &str, active: bool) -> Result<()> {
    let repo = open(store).await?;
    if repo.get(id).await.into_diagnostic()?.is_none() {
        println!("no reminder {id}");
        return Ok(());
    }
    repo.set_active(id, active).await.into_diagnostic()?;
    println!("{} {id}", if active { "enabled" } else { "disabled" });
    Ok(())
}
