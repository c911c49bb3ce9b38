//! Five-field cron expressions for the monitoring interval.
//!
//! Fields are minute, hour, day-of-month, month, day-of-week, evaluated in
//! UTC. Day-of-week is 0-7 with both 0 and 7 meaning Sunday. When
//! day-of-month and day-of-week are both restricted, a day matches if either
//! one does. Parsing and matching are done by `croner`; this module pins the
//! accepted form to exactly five fields and maps errors into [`LeadError`].

use chrono::{DateTime, Utc};
use croner::Cron;

use leadwatch_core::{LeadError, Result};

/// A parsed cron schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    cron: Cron,
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self> {
        if expr.split_whitespace().count() != 5 {
            return Err(LeadError::invalid(format!(
                "schedule '{}' must have 5 fields (minute hour day month weekday)",
                expr
            )));
        }

        let cron = Cron::new(expr)
            .parse()
            .map_err(|e| LeadError::invalid(format!("invalid schedule '{}': {}", expr, e)))?;
        Ok(Self { cron })
    }

    /// First matching minute strictly after `after`.
    ///
    /// Returns `None` when nothing ever matches (e.g. `0 0 31 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.find_next_occurrence(&after, false).ok()
    }

    /// Time to wait from `now` until the next fire.
    pub fn until_next(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let next = self.next_after(now)?;
        (next - now).to_std().ok()
    }
}
