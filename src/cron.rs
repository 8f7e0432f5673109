//! Next-occurrence oracle over cron expressions.
//!
//! Schedules use the seconds-resolution cron grammar of the `cron` crate
//! (six fields, with an optional trailing year field). An empty expression
//! means "manual only" and is never valid here.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{KiwibesError, Result};

/// A parsed cron expression, ready to resolve occurrence instants.
#[derive(Debug, Clone)]
pub struct CronSpec {
    schedule: Schedule,
}

impl CronSpec {
    /// Parse an expression. Empty or malformed input is `JOB_SCHEDULE_INVALID`.
    pub fn parse(expression: &str) -> Result<Self> {
        if expression.is_empty() {
            return Err(KiwibesError::JobScheduleInvalid);
        }
        let schedule =
            Schedule::from_str(expression).map_err(|_| KiwibesError::JobScheduleInvalid)?;
        Ok(Self { schedule })
    }

    /// Whether the expression parses as a cron schedule.
    pub fn is_valid(expression: &str) -> bool {
        Self::parse(expression).is_ok()
    }

    /// The first occurrence strictly after `after`, if any remains.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// The first occurrence after the current instant, if any remains.
    pub fn next_from_now(&self) -> Option<DateTime<Utc>> {
        self.next_after(Utc::now())
    }
}
