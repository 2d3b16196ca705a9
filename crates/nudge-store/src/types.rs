//! Reminder types.
//!
//! The persisted shape of a reminder is
//! `{id, taskId, kind, conditions, active, createdAt, lastTriggeredAt}`,
//! where `kind` tags the `conditions` object.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// A persisted reminder rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Unique identifier.
    pub id: String,
    /// The task this reminder concerns. Not validated here.
    pub task_id: String,
    /// Trigger kind and its matching condition set.
    #[serde(flatten)]
    pub conditions: Conditions,
    /// Inactive reminders are retained but never evaluated.
    pub active: bool,
    /// When this reminder was created.
    pub created_at: DateTime<Utc>,
    /// When this reminder last fired. Written only by the scheduler.
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl Reminder {
    /// The trigger kind, derived from the condition variant.
    pub fn kind(&self) -> ReminderKind {
        self.conditions.kind()
    }

    /// Check whether this reminder fired less than `cooldown` before `now`.
    ///
    /// A trigger timestamp later than `now` (clock moved backwards) also
    /// counts as cooling down.
    pub fn in_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_triggered_at {
            Some(last) => now - last < cooldown,
            None => false,
        }
    }
}

/// The four mutually exclusive trigger kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Time,
    Location,
    Activity,
    Context,
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReminderKind::Time => "time",
            ReminderKind::Location => "location",
            ReminderKind::Activity => "activity",
            ReminderKind::Context => "context",
        };
        f.write_str(name)
    }
}

/// Condition set, tagged by kind.
///
/// Serialized adjacently as `"kind": "...", "conditions": {...}` so a
/// reminder can never carry conditions for a kind other than its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "conditions", rename_all = "snake_case")]
pub enum Conditions {
    Time(TimeCondition),
    Location(LocationCondition),
    Activity(ActivityCondition),
    Context(ContextCondition),
}

impl Conditions {
    /// The kind matching this variant.
    pub fn kind(&self) -> ReminderKind {
        match self {
            Conditions::Time(_) => ReminderKind::Time,
            Conditions::Location(_) => ReminderKind::Location,
            Conditions::Activity(_) => ReminderKind::Activity,
            Conditions::Context(_) => ReminderKind::Context,
        }
    }
}

/// Absolute or weekly recurring time trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeCondition {
    /// Fire once around this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_at: Option<DateTime<Utc>>,
    /// Weekdays to fire on, 0 = Sunday through 6 = Saturday.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub days_of_week: BTreeSet<u8>,
    /// Optional local time window on matching days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

/// Inclusive local time window, both ends formatted `HH:MM` (24h clock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Geofence trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationCondition {
    /// Center of the geofence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Position>,
    /// Geofence radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_meters: Option<f64>,
}

/// Task-progress trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCondition {
    /// Fire once this other task is completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_task_id: Option<String>,
    /// Fire once the reminder's own task has this many tracked minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_minutes_spent: Option<u32>,
}

/// Device/application context trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextCondition {
    /// Fire while the application is in the foreground.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_in_foreground: Option<bool>,
    /// Fire while the device is in this activity state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_activity: Option<DeviceActivity>,
}

/// Host-reported device activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceActivity {
    Idle,
    Active,
}

/// A geographic coordinate with an optional human-readable label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Check that both coordinates are finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A reminder as submitted by a caller, before the store assigns
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub task_id: String,
    #[serde(flatten)]
    pub conditions: Conditions,
    /// Defaults to active.
    #[serde(default)]
    pub active: Option<bool>,
}

impl NewReminder {
    pub fn new(task_id: impl Into<String>, conditions: Conditions) -> Self {
        Self {
            id: None,
            task_id: task_id.into(),
            conditions,
            active: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Parse an externally supplied record.
    ///
    /// Unknown `kind` values and conditions that don't match the declared
    /// kind are rejected here, so they never reach evaluation.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::InvalidReminder(e.to_string()))
    }

    /// Materialize into a stored reminder.
    pub(crate) fn into_reminder(self, now: DateTime<Utc>) -> Reminder {
        Reminder {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            task_id: self.task_id,
            conditions: self.conditions,
            active: self.active.unwrap_or(true),
            created_at: now,
            last_triggered_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn location_reminder() -> Reminder {
        Reminder {
            id: "r1".to_string(),
            task_id: "t1".to_string(),
            conditions: Conditions::Location(LocationCondition {
                target: Some(Position::new(37.0, -122.0).with_label("office")),
                radius_meters: Some(100.0),
            }),
            active: true,
            created_at: "2024-05-01T12:00:00Z".parse().unwrap(),
            last_triggered_at: None,
        }
    }

    #[test]
    fn test_reminder_persisted_shape() {
        let value = serde_json::to_value(location_reminder()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "r1",
                "taskId": "t1",
                "kind": "location",
                "conditions": {
                    "target": {"latitude": 37.0, "longitude": -122.0, "label": "office"},
                    "radiusMeters": 100.0
                },
                "active": true,
                "createdAt": "2024-05-01T12:00:00Z",
                "lastTriggeredAt": null
            })
        );
    }

    #[test]
    fn test_reminder_roundtrip_keeps_trigger_time() {
        let mut reminder = location_reminder();
        reminder.last_triggered_at = Some("2024-05-02T08:30:00Z".parse().unwrap());

        let json = serde_json::to_string(&reminder).unwrap();
        let decoded: Reminder = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, reminder);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = NewReminder::from_json(
            r#"{"taskId": "t1", "kind": "weather", "conditions": {}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReminder(_)));
    }

    #[test]
    fn test_empty_conditions_accepted() {
        let new = NewReminder::from_json(r#"{"taskId": "t1", "kind": "time", "conditions": {}}"#)
            .unwrap();
        assert_eq!(new.conditions, Conditions::Time(TimeCondition::default()));
        assert_eq!(new.active, None);
        assert_eq!(new.id, None);
    }

    #[test]
    fn test_time_condition_field_names() {
        let new = NewReminder::from_json(
            r#"{
                "id": "weekly",
                "taskId": "t1",
                "kind": "time",
                "conditions": {
                    "daysOfWeek": [1, 3, 5],
                    "timeRange": {"start": "09:00", "end": "17:00"}
                }
            }"#,
        )
        .unwrap();

        let Conditions::Time(time) = new.conditions else {
            panic!("expected time conditions");
        };
        assert_eq!(time.days_of_week, BTreeSet::from([1, 3, 5]));
        assert_eq!(time.time_range, Some(TimeRange::new("09:00", "17:00")));
        assert!(time.trigger_at.is_none());
    }

    #[test]
    fn test_context_device_activity_parses() {
        let new = NewReminder::from_json(
            r#"{"taskId": "t1", "kind": "context", "conditions": {"deviceActivity": "idle"}}"#,
        )
        .unwrap();
        assert_eq!(
            new.conditions,
            Conditions::Context(ContextCondition {
                app_in_foreground: None,
                device_activity: Some(DeviceActivity::Idle),
            })
        );
    }

    #[test]
    fn test_into_reminder_defaults() {
        let now = Utc::now();
        let reminder = NewReminder::new("t1", Conditions::Activity(ActivityCondition::default()))
            .into_reminder(now);

        assert!(!reminder.id.is_empty());
        assert!(reminder.active);
        assert_eq!(reminder.created_at, now);
        assert!(reminder.last_triggered_at.is_none());
        assert_eq!(reminder.kind(), ReminderKind::Activity);
    }

    #[test]
    fn test_in_cooldown() {
        let now: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        let mut reminder = location_reminder();
        let cooldown = Duration::minutes(5);

        assert!(!reminder.in_cooldown(now, cooldown));

        reminder.last_triggered_at = Some(now - Duration::seconds(30));
        assert!(reminder.in_cooldown(now, cooldown));

        reminder.last_triggered_at = Some(now - Duration::minutes(5));
        assert!(!reminder.in_cooldown(now, cooldown));

        // Clock moved backwards
        reminder.last_triggered_at = Some(now + Duration::minutes(1));
        assert!(reminder.in_cooldown(now, cooldown));
    }

    #[test]
    fn test_position_validity() {
        assert!(Position::new(0.0, 0.0).is_valid());
        assert!(Position::new(-90.0, 180.0).is_valid());
        assert!(!Position::new(90.5, 0.0).is_valid());
        assert!(!Position::new(0.0, -181.0).is_valid());
        assert!(!Position::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ReminderKind::Time.to_string(), "time");
        assert_eq!(ReminderKind::Context.to_string(), "context");
    }

    fn conditions_strategy() -> impl Strategy<Value = Conditions> {
        prop_oneof![
            (
                proptest::option::of(0i64..4_000_000_000),
                proptest::collection::btree_set(0u8..7, 0..7),
            )
                .prop_map(|(at, days)| Conditions::Time(TimeCondition {
                    trigger_at: at.and_then(|secs| DateTime::from_timestamp(secs, 0)),
                    days_of_week: days,
                    time_range: None,
                })),
            (-90.0f64..=90.0, -180.0f64..=180.0, 0.0f64..50_000.0).prop_map(|(lat, lon, r)| {
                Conditions::Location(LocationCondition {
                    target: Some(Position::new(lat, lon)),
                    radius_meters: Some(r),
                })
            }),
            (proptest::option::of("[a-z0-9]{1,8}"), proptest::option::of(0u32..1000)).prop_map(
                |(after, minutes)| Conditions::Activity(ActivityCondition {
                    after_task_id: after,
                    after_minutes_spent: minutes,
                })
            ),
            (proptest::option::of(any::<bool>()), any::<bool>()).prop_map(|(fg, idle)| {
                Conditions::Context(ContextCondition {
                    app_in_foreground: fg,
                    device_activity: Some(if idle {
                        DeviceActivity::Idle
                    } else {
                        DeviceActivity::Active
                    }),
                })
            }),
        ]
    }

    proptest! {
        #[test]
        fn test_stored_kind_always_matches_conditions(conditions in conditions_strategy()) {
            let reminder = Reminder {
                conditions,
                ..location_reminder()
            };
            let value = serde_json::to_value(&reminder).unwrap();
            let expected_kind = reminder.kind().to_string();
            prop_assert_eq!(value["kind"].as_str(), Some(expected_kind.as_str()));

            let parsed: Reminder = serde_json::from_value(value).unwrap();
            prop_assert_eq!(parsed, reminder);
        }

        #[test]
        fn test_cooldown_holds_exactly_until_it_elapses(
            elapsed in -600i64..3600,
            cooldown in 1i64..3600,
        ) {
            let last: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
            let reminder = Reminder {
                last_triggered_at: Some(last),
                ..location_reminder()
            };
            let now = last + Duration::seconds(elapsed);
            prop_assert_eq!(
                reminder.in_cooldown(now, Duration::seconds(cooldown)),
                elapsed < cooldown
            );
        }
    }
}
