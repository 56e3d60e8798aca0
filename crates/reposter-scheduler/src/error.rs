//! Error types for the scheduler.

use chrono::{NaiveTime, Weekday};
use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Slot time could not be parsed.
    #[error("invalid slot time: {0}")]
    InvalidSlot(String),

    /// Weekday/time pair bound twice.
    #[error("slot already bound: {weekday} {at}")]
    DuplicateSlot { weekday: Weekday, at: NaiveTime },

    /// Action execution failed.
    #[error("action execution failed: {0}")]
    ExecutionFailed(String),
}
