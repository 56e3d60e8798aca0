//! Scheduler types.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::SchedulerError;

/// Monday through Friday.
pub const WEEKDAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Saturday and Sunday.
pub const WEEKEND: [Weekday; 2] = [Weekday::Sat, Weekday::Sun];

/// Every day of the week.
pub const EVERY_DAY: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// What a slot does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Select, fetch and stage the day's batch.
    Prepare,
    /// Publish the next entry of the day's batch.
    Publish,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepare => write!(f, "prepare"),
            Self::Publish => write!(f, "publish"),
        }
    }
}

/// A local wall-clock time on a given weekday bound to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub weekday: Weekday,
    pub at: NaiveTime,
    pub action: Action,
}

/// A slot occurrence that is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Due {
    /// The local date and time the slot is bound to.
    pub at: NaiveDateTime,
    pub action: Action,
}

/// Static table of slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The deployment table: five publish slots a day (different times on
    /// weekdays and weekends) and one prepare at 00:01 every day.
    pub fn standard() -> Result<Self, SchedulerError> {
        Self::new()
            .with_slots(
                &WEEKDAYS,
                &["07:30", "11:00", "13:30", "17:30", "21:00"],
                Action::Publish,
            )?
            .with_slots(
                &WEEKEND,
                &["09:00", "12:00", "15:00", "18:30", "21:30"],
                Action::Publish,
            )?
            .with_slots(&EVERY_DAY, &["00:01"], Action::Prepare)
    }

    /// Bind `action` at each `HH:MM` time on each of `days`.
    ///
    /// Fails on an unparseable time or on a weekday/time pair that is
    /// already bound.
    pub fn with_slots(
        mut self,
        days: &[Weekday],
        times: &[&str],
        action: Action,
    ) -> Result<Self, SchedulerError> {
        for time in times {
            let at = parse_time(time)?;
            for &weekday in days {
                if self
                    .slots
                    .iter()
                    .any(|s| s.weekday == weekday && s.at == at)
                {
                    return Err(SchedulerError::DuplicateSlot { weekday, at });
                }
                self.slots.push(Slot {
                    weekday,
                    at,
                    action,
                });
            }
        }
        Ok(self)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Slots bound on `weekday`, in time order.
    pub fn slots_on(&self, weekday: Weekday) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self
            .slots
            .iter()
            .filter(|s| s.weekday == weekday)
            .copied()
            .collect();
        slots.sort_by_key(|s| s.at);
        slots
    }

    /// Slots whose minute equals `now`'s minute.
    pub fn due_at(&self, now: NaiveDateTime) -> Vec<Due> {
        let minute = floor_minute(now);
        self.occurrences_on(minute.date())
            .filter(|d| d.at == minute)
            .collect()
    }

    /// Slots whose minute lies in `(after, until]`, both truncated to the
    /// minute, in chronological order.
    pub fn due_between(&self, after: NaiveDateTime, until: NaiveDateTime) -> Vec<Due> {
        let after = floor_minute(after);
        let until = floor_minute(until);
        if until <= after {
            return Vec::new();
        }

        let mut due: Vec<Due> = after
            .date()
            .iter_days()
            .take_while(|d| *d <= until.date())
            .flat_map(|date| self.occurrences_on(date))
            .filter(|d| d.at > after && d.at <= until)
            .collect();
        due.sort_by_key(|d| d.at);
        due
    }

    /// The first slot occurrence strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<Due> {
        if self.slots.is_empty() {
            return None;
        }
        // Every weekday recurs within eight days
        now.date()
            .iter_days()
            .take(8)
            .flat_map(|date| {
                let mut day: Vec<Due> = self.occurrences_on(date).collect();
                day.sort_by_key(|d| d.at);
                day
            })
            .find(|d| d.at > now)
    }

    fn occurrences_on(&self, date: NaiveDate) -> impl Iterator<Item = Due> + '_ {
        let weekday = date.weekday();
        self.slots
            .iter()
            .filter(move |s| s.weekday == weekday)
            .map(move |s| Due {
                at: date.and_time(s.at),
                action: s.action,
            })
    }
}

/// Parse an `HH:MM` slot time.
pub fn parse_time(time: &str) -> Result<NaiveTime, SchedulerError> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|e| SchedulerError::InvalidSlot(format!("{time:?}: {e}")))
}

/// Truncate to the start of the minute.
pub fn floor_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt - Duration::seconds(dt.second() as i64) - Duration::nanoseconds(dt.nanosecond() as i64)
}
