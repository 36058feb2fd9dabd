//! Next scout run time for a schedule in a publication's local timezone.
//!
//! Pure functions. Callers own every write of `next_scout_at`.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use scoutdesk_common::{Publication, ScoutSchedule};

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAY_CE: i32 = 719_163;

/// Longest DST gap we step over when a slot falls inside one.
const MAX_GAP_MINUTES: i64 = 3 * 60;

/// Earliest slot of `schedule` in `timezone` strictly after `now`, as epoch seconds.
///
/// Unknown timezones fall back to UTC. A slot inside a DST gap moves to the
/// first valid instant after it; an ambiguous slot takes the earlier instant.
pub fn compute_next_run(schedule: &ScoutSchedule, timezone: &str, now: DateTime<Utc>) -> i64 {
    let tz = parse_timezone(timezone);
    let local_today = now.with_timezone(&tz).date_naive();

    // The day before covers slots that land after `now` only once resolved
    // through a DST shift.
    let horizon = i64::from(cycle_days(schedule)) + 2;
    for offset in -1..=horizon {
        let date = local_today + Duration::days(offset);
        for hour in slot_hours(schedule, date) {
            if let Some(at) = resolve_local(&tz, date, hour) {
                if at > now {
                    return at.timestamp();
                }
            }
        }
    }

    // Unreachable for valid schedules; keep the invariant anyway.
    (now + Duration::days(1)).timestamp()
}

/// New `next_scout_at` after a configuration change, or `None` when neither
/// the schedule nor the timezone actually changed.
pub fn recompute_on_config_change(
    current: &Publication,
    schedule: &ScoutSchedule,
    timezone: &str,
    now: DateTime<Utc>,
) -> Option<i64> {
    if current.scout_schedule == *schedule && current.timezone == timezone {
        return None;
    }
    Some(compute_next_run(schedule, timezone, now))
}

fn parse_timezone(timezone: &str) -> Tz {
    timezone.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone, "Unknown timezone, scheduling in UTC");
        Tz::UTC
    })
}

fn cycle_days(schedule: &ScoutSchedule) -> u32 {
    match schedule {
        ScoutSchedule::EveryNDays { days, .. } => (*days).max(1),
        _ => 1,
    }
}

/// Local hours with a slot on `date`, ascending.
fn slot_hours(schedule: &ScoutSchedule, date: NaiveDate) -> Vec<u32> {
    match *schedule {
        ScoutSchedule::Daily { hour } => vec![hour.min(23)],
        ScoutSchedule::TimesPerDay { times } => {
            let times = times.clamp(1, 24);
            let step = 24 / times;
            (0..times).map(|k| k * step).collect()
        }
        ScoutSchedule::EveryNDays { days, hour } => {
            let days = i64::from(days.max(1));
            let day_number = i64::from(date.num_days_from_ce() - UNIX_EPOCH_DAY_CE);
            if day_number.rem_euclid(days) == 0 {
                vec![hour.min(23)]
            } else {
                Vec::new()
            }
        }
    }
}

fn resolve_local(tz: &Tz, date: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    let local = NaiveDateTime::new(date, time);

    for minutes in 0..=MAX_GAP_MINUTES {
        match tz.from_local_datetime(&(local + Duration::minutes(minutes))) {
            LocalResult::Single(at) => return Some(at.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => continue,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn next(schedule: ScoutSchedule, tz: &str, now: &str) -> DateTime<Utc> {
        DateTime::from_timestamp(compute_next_run(&schedule, tz, utc(now)), 0).unwrap()
    }

    #[test]
    fn daily_later_today_or_tomorrow() {
        let daily = ScoutSchedule::Daily { hour: 6 };
        assert_eq!(next(daily, "UTC", "2026-10-19T05:00:00Z"), utc("2026-10-19T06:00:00Z"));
        assert_eq!(next(daily, "UTC", "2026-10-19T06:00:00Z"), utc("2026-10-20T06:00:00Z"));
    }

    #[test]
    fn daily_respects_timezone() {
        // 20:00 on June 30 in New York (EDT, UTC-4).
        let daily = ScoutSchedule::Daily { hour: 6 };
        assert_eq!(
            next(daily, "America/New_York", "2026-07-01T00:00:00Z"),
            utc("2026-07-01T10:00:00Z")
        );
    }

    #[test]
    fn times_per_day_slots() {
        let four = ScoutSchedule::TimesPerDay { times: 4 };
        assert_eq!(next(four, "UTC", "2026-10-19T07:30:00Z"), utc("2026-10-19T12:00:00Z"));
        assert_eq!(next(four, "UTC", "2026-10-19T18:00:00Z"), utc("2026-10-20T00:00:00Z"));

        let clamped = ScoutSchedule::TimesPerDay { times: 0 };
        assert_eq!(next(clamped, "UTC", "2026-10-19T07:30:00Z"), utc("2026-10-20T00:00:00Z"));
    }

    #[test]
    fn every_n_days_anchors_on_epoch_day_number() {
        // 2026-10-19 is day 20745 since the epoch, a multiple of 3.
        let every_three = ScoutSchedule::EveryNDays { days: 3, hour: 9 };
        assert_eq!(next(every_three, "UTC", "2026-10-19T08:00:00Z"), utc("2026-10-19T09:00:00Z"));
        assert_eq!(next(every_three, "UTC", "2026-10-19T10:00:00Z"), utc("2026-10-22T09:00:00Z"));
    }

    #[test]
    fn dst_gap_moves_to_next_valid_instant() {
        // 02:00 does not exist in New York on 2026-03-08; clocks jump to 03:00 EDT.
        let daily = ScoutSchedule::Daily { hour: 2 };
        assert_eq!(
            next(daily, "America/New_York", "2026-03-08T05:00:00Z"),
            utc("2026-03-08T07:00:00Z")
        );
    }

    #[test]
    fn ambiguous_hour_takes_earliest() {
        // 01:00 happens twice in New York on 2026-11-01 (EDT then EST).
        let daily = ScoutSchedule::Daily { hour: 1 };
        assert_eq!(
            next(daily, "America/New_York", "2026-11-01T04:00:00Z"),
            utc("2026-11-01T05:00:00Z")
        );
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let daily = ScoutSchedule::Daily { hour: 6 };
        assert_eq!(next(daily, "Mars/Olympus", "2026-10-19T05:00:00Z"), utc("2026-10-19T06:00:00Z"));
    }

    #[test]
    fn result_is_always_in_the_future() {
        let now = utc("2026-10-19T23:59:59Z");
        for schedule in [
            ScoutSchedule::Daily { hour: 23 },
            ScoutSchedule::TimesPerDay { times: 24 },
            ScoutSchedule::EveryNDays { days: 7, hour: 0 },
        ] {
            assert!(compute_next_run(&schedule, "Australia/Adelaide", now) > now.timestamp());
        }
    }

    #[test]
    fn recompute_only_when_schedule_or_timezone_changed() {
        let now = utc("2026-10-19T05:00:00Z");
        let publication = crate::testing::publication(scoutdesk_common::AutoPublishMode::Draft);

        assert_eq!(
            recompute_on_config_change(&publication, &publication.scout_schedule, &publication.timezone, now),
            None
        );
        assert!(recompute_on_config_change(&publication, &ScoutSchedule::Daily { hour: 9 }, "UTC", now).is_some());
        assert!(recompute_on_config_change(&publication, &publication.scout_schedule, "Europe/Berlin", now).is_some());
    }
}
