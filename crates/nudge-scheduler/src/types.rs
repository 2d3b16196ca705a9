//! Scheduler types.

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The pass overlapped one still in progress and did nothing.
    pub skipped: bool,
    /// Active reminders handed to the evaluator.
    pub evaluated: usize,
    /// Reminders whose notification was attempted and trigger recorded.
    pub fired: usize,
    /// Reminders whose condition held but were still cooling down.
    pub cooling_down: usize,
    /// Notification attempts the sink reported as failed.
    pub notify_failures: usize,
    /// Repository operations that failed during the pass.
    pub store_failures: usize,
}

impl TickReport {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}
