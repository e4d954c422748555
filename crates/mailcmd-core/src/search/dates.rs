//! Relative date phrases ("today", "last week", "last 3 days") to concrete intervals

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

static LAST_N_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:last|past)\s+(\d{1,4})\s+days?$").expect("valid last-n-days regex")
});

/// Phrases `resolve_date_range` understands, for user-facing hints
pub const RECOGNIZED_PHRASES: [&str; 7] = [
    "today",
    "yesterday",
    "this week",
    "last week",
    "this month",
    "last month",
    "last N days",
];

/// Inclusive interval `[from, to]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at <= self.to
    }
}

/// Midnight of `date` in `tz`, as UTC
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&midnight)
        .earliest()
        // Zones that skip midnight on DST change start the day at 01:00
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Closed period ending one millisecond before `next_start`
fn closed(from: DateTime<Utc>, next_start: DateTime<Utc>) -> DateRange {
    DateRange {
        from,
        to: next_start - Duration::milliseconds(1),
    }
}

fn normalize(phrase: &str) -> String {
    let lowered = phrase.trim().to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut rest = collapsed.as_str();
    for prefix in ["from ", "since ", "during ", "in ", "the "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
        }
    }
    rest.to_string()
}

/// Resolve a relative date phrase against `now`.
///
/// Day, week and month boundaries are computed in `now`'s timezone; weeks
/// start on Monday. Returns `None` for phrases that are not recognized,
/// which callers treat as "no date constraint".
pub fn resolve_date_range<Tz: TimeZone>(phrase: &str, now: &DateTime<Tz>) -> Option<DateRange> {
    let tz = now.timezone();
    let now_utc = now.with_timezone(&Utc);
    let today = now.date_naive();
    let start_of_today = local_midnight(&tz, today)?;

    let phrase = normalize(phrase);
    match phrase.as_str() {
        "today" => Some(DateRange {
            from: start_of_today,
            to: now_utc,
        }),
        "yesterday" => {
            let start = local_midnight(&tz, today.pred_opt()?)?;
            Some(closed(start, start_of_today))
        }
        "this week" => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            Some(DateRange {
                from: local_midnight(&tz, monday)?,
                to: now_utc,
            })
        }
        "last week" => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            let previous_monday = monday - Duration::days(7);
            Some(closed(
                local_midnight(&tz, previous_monday)?,
                local_midnight(&tz, monday)?,
            ))
        }
        "this month" => Some(DateRange {
            from: local_midnight(&tz, first_of_month(today.year(), today.month())?)?,
            to: now_utc,
        }),
        "last month" => {
            let (year, month) = previous_month(today.year(), today.month());
            Some(closed(
                local_midnight(&tz, first_of_month(year, month)?)?,
                local_midnight(&tz, first_of_month(today.year(), today.month())?)?,
            ))
        }
        other => {
            let caps = LAST_N_DAYS.captures(other)?;
            let days: i64 = caps.get(1)?.as_str().parse().ok()?;
            Some(DateRange {
                from: now_utc - Duration::days(days),
                to: now_utc,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    // Thursday
    fn now() -> DateTime<Utc> {
        utc("2026-10-15T14:30:00Z")
    }

    #[test]
    fn test_today_and_yesterday() {
        let today = resolve_date_range("today", &now()).unwrap();
        assert_eq!(today.from, utc("2026-10-15T00:00:00Z"));
        assert_eq!(today.to, now());

        let yesterday = resolve_date_range("Yesterday", &now()).unwrap();
        assert_eq!(yesterday.from, utc("2026-10-14T00:00:00Z"));
        assert_eq!(yesterday.to, utc("2026-10-14T23:59:59.999Z"));
        assert!(!yesterday.contains(utc("2026-10-15T00:00:00Z")));
    }

    #[test]
    fn test_weeks_start_on_monday() {
        let this_week = resolve_date_range("this week", &now()).unwrap();
        assert_eq!(this_week.from, utc("2026-10-12T00:00:00Z"));
        assert_eq!(this_week.to, now());

        let last_week = resolve_date_range("last week", &now()).unwrap();
        assert_eq!(last_week.from, utc("2026-10-05T00:00:00Z"));
        assert_eq!(last_week.to, utc("2026-10-11T23:59:59.999Z"));
    }

    #[test]
    fn test_months() {
        let this_month = resolve_date_range("this month", &now()).unwrap();
        assert_eq!(this_month.from, utc("2026-10-01T00:00:00Z"));

        let last_month = resolve_date_range("last month", &now()).unwrap();
        assert_eq!(last_month.from, utc("2026-09-01T00:00:00Z"));
        assert_eq!(last_month.to, utc("2026-09-30T23:59:59.999Z"));

        let january = utc("2026-01-10T08:00:00Z");
        let december = resolve_date_range("last month", &january).unwrap();
        assert_eq!(december.from, utc("2025-12-01T00:00:00Z"));
        assert_eq!(december.to, utc("2025-12-31T23:59:59.999Z"));
    }

    #[test]
    fn test_last_n_days() {
        let range = resolve_date_range("last 3 days", &now()).unwrap();
        assert_eq!(range.from, now() - Duration::days(3));
        assert_eq!(range.to, now());

        let range = resolve_date_range("past 1 day", &now()).unwrap();
        assert_eq!(range.from, now() - Duration::days(1));
    }

    #[test]
    fn test_unrecognized_phrase() {
        assert_eq!(resolve_date_range("next fortnight", &now()), None);
        assert_eq!(resolve_date_range("", &now()), None);
        assert_eq!(resolve_date_range("last days", &now()), None);
    }

    #[test]
    fn test_deterministic_for_fixed_now() {
        for phrase in ["today", "yesterday", "this week", "last month", "last 10 days"] {
            assert_eq!(
                resolve_date_range(phrase, &now()),
                resolve_date_range(phrase, &now())
            );
        }
    }

    #[test]
    fn test_prefixes_are_ignored() {
        assert_eq!(
            resolve_date_range("from yesterday", &now()),
            resolve_date_range("yesterday", &now())
        );
    }

    #[test]
    fn test_boundaries_follow_timezone() {
        let new_york = chrono_tz::America::New_York;
        let local_now = now().with_timezone(&new_york);
        let today = resolve_date_range("today", &local_now).unwrap();
        // EDT is UTC-4 in October
        assert_eq!(today.from, utc("2026-10-15T04:00:00Z"));
        assert_eq!(today.to, now());
    }
}
