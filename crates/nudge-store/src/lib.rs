//! Reminder records and their persistence for Nudge.
//!
//! This crate provides:
//! - The reminder data model, with conditions as a sum type keyed by kind
//! - The `ReminderRepository` trait used by the scheduler and callers
//! - An in-memory repository and a JSON-file repository

mod error;
mod file;
mod repository;
mod types;

pub use error::StoreError;
pub use file::JsonFileRepository;
pub use repository::{MemoryRepository, ReminderRepository};
pub use types::{
    ActivityCondition, Conditions, ContextCondition, DeviceActivity, LocationCondition,
    NewReminder, Position, Reminder, ReminderKind, TimeCondition, TimeRange,
};
