//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Reminder store error.
    #[error("store error: {0}")]
    Store(#[from] nudge_store::StoreError),

    /// Invalid scheduler configuration.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

/// Errors reported by a notification sink.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The sink accepted the request but could not deliver it.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Transport-level failure talking to the sink.
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Errors reported by a location provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The user or OS refused location access.
    #[error("location permission denied")]
    PermissionDenied,

    /// No fix arrived in time.
    #[error("location request timed out")]
    Timeout,

    /// No positioning hardware or service.
    #[error("location unavailable: {0}")]
    Unavailable(String),
}
