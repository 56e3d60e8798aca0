//! Wall-clock slot scheduler for Reposter.
//!
//! This crate provides:
//! - A static table of (weekday, local time) slots bound to actions
//! - A trigger that fires each slot at most once, at minute granularity
//! - A polling loop that runs due actions one at a time
//!
//! Slots missed while the process was down are skipped, never replayed.

mod error;
mod scheduler;
mod types;

pub use error::SchedulerError;
pub use scheduler::{ActionHandler, Scheduler, Trigger};
pub use types::{
    Action, Due, EVERY_DAY, Slot, SlotTable, WEEKDAYS, WEEKEND, floor_minute, parse_time,
};
