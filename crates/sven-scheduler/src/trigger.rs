// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Trigger computation: turns a [`sven_store::model::CronSchedule`] plus a
//! reference instant into the next fire time.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use sven_store::model::{CronSchedule, ScheduleKind};
use tracing::warn;

/// Compute the next fire time strictly after `after`.
///
/// `interval` schedules parse `cron` as a `humantime` duration
/// (`"60s"`, `"5m"`). `cron` schedules parse `cron` as a standard five-field
/// cron expression. A `timezone` other than `"UTC"` is accepted but not
/// resolved against a timezone database (not a workspace dependency); the
/// schedule is evaluated in UTC and a warning is logged once per call.
pub fn next_fire(schedule: &CronSchedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if schedule.timezone != "UTC" {
        warn!(
            timezone = %schedule.timezone,
            "non-UTC cron timezone requested; evaluating schedule in UTC"
        );
    }

    match schedule.kind {
        ScheduleKind::Interval => {
            let dur = humantime::parse_duration(&schedule.cron).ok()?;
            let chrono_dur = chrono::Duration::from_std(dur).ok()?;
            Some(after + chrono_dur)
        }
        ScheduleKind::Cron => {
            let expr = Schedule::from_str(&schedule.cron).ok()?;
            expr.after(&after).next()
        }
    }
}

/// A fire time is within the misfire grace window if it is no older than
/// `grace_seconds`. Older misses are dropped silently (exactly one make-up
/// run happens for anything within grace, handled by the caller calling
/// this once per due check rather than once per missed tick).
pub fn within_misfire_grace(
    due_at: DateTime<Utc>,
    now: DateTime<Utc>,
    grace_seconds: u64,
) -> bool {
    let age = now.signed_duration_since(due_at);
    age.num_seconds() <= grace_seconds as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(kind: ScheduleKind, cron: &str) -> CronSchedule {
        CronSchedule {
            kind,
            cron: cron.to_string(),
            timezone: "UTC".to_string(),
        }
    }

    #[test]
    fn interval_schedule_adds_duration() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let s = schedule(ScheduleKind::Interval, "60s");
        let next = next_fire(&s, now).unwrap();
        assert_eq!(next, now + chrono::Duration::seconds(60));
    }

    #[test]
    fn cron_schedule_computes_next_minute() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let s = schedule(ScheduleKind::Cron, "0 * * * * *");
        let next = next_fire(&s, now).unwrap();
        assert!(next > now);
    }

    #[test]
    fn invalid_interval_string_returns_none() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let s = schedule(ScheduleKind::Interval, "not-a-duration");
        assert!(next_fire(&s, now).is_none());
    }

    #[test]
    fn misfire_within_grace_is_accepted() {
        let due = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = due + chrono::Duration::seconds(30);
        assert!(within_misfire_grace(due, now, 60));
    }

    #[test]
    fn misfire_past_grace_is_rejected() {
        let due = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = due + chrono::Duration::seconds(120);
        assert!(!within_misfire_grace(due, now, 60));
    }
}
