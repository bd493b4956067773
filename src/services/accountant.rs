// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Work time accounting.
//!
//! Pure functions: elapsed-time computation, the three-counter commit plan,
//! and daily log aggregation. No I/O.

use crate::models::{DailyLogEntry, DailyLogSummary};
use crate::time_utils::date_key;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;

const WEEK_DAYS: u32 = 7;
const MONTH_DAYS: u32 = 30;

/// Whole seconds from `start` to `now`. Clock skew (`start > now`) counts as zero.
pub fn elapsed_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    if start >= now {
        return 0;
    }
    // num_seconds truncates toward zero, which is floor for positive spans
    u64::try_from((now - start).num_seconds()).unwrap_or(0)
}

/// Time to add to the three counters when a session ends.
///
/// Dated by commit time, not session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCommit {
    pub delta_secs: u64,
    /// Daily log day ("YYYY-MM-DD")
    pub date: String,
}

impl SessionCommit {
    pub fn new(started_at: DateTime<Utc>, committed_at: DateTime<Utc>) -> Self {
        Self {
            delta_secs: elapsed_secs(started_at, committed_at),
            date: date_key(committed_at),
        }
    }
}

/// Summarize the last `days` calendar days ending at `today`, oldest first.
///
/// `week` covers the last 7 days of the window and `month` the last 30
/// (or fewer if the window is shorter). Missing days count as zero.
pub fn summarize_daily_logs(
    totals_by_date: &HashMap<String, u64>,
    today: NaiveDate,
    days: u32,
) -> DailyLogSummary {
    let mut summary = DailyLogSummary::default();

    for days_ago in (0..days).rev() {
        let day = today - Duration::days(i64::from(days_ago));
        let date = day.format("%Y-%m-%d").to_string();
        let total_time = totals_by_date.get(&date).copied().unwrap_or(0);

        summary.total += total_time;
        if days_ago < WEEK_DAYS {
            summary.week += total_time;
        }
        if days_ago < MONTH_DAYS {
            summary.month += total_time;
        }
        summary.logs.push(DailyLogEntry { date, total_time });
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_elapsed_whole_seconds() {
        assert_eq!(elapsed_secs(at(10, 0, 0), at(10, 2, 5)), 125);
        assert_eq!(elapsed_secs(at(10, 0, 0), at(10, 0, 0)), 0);
    }

    #[test]
    fn test_elapsed_floors_fractional_seconds() {
        let start = at(10, 0, 0);
        let now = start + Duration::milliseconds(2_999);
        assert_eq!(elapsed_secs(start, now), 2);
    }

    #[test]
    fn test_elapsed_clamps_clock_skew_to_zero() {
        assert_eq!(elapsed_secs(at(10, 0, 5), at(10, 0, 0)), 0);
    }

    #[test]
    fn test_session_commit_dated_by_commit_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 14, 23, 59, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 0, 1, 0).unwrap();
        let commit = SessionCommit::new(start, end);
        assert_eq!(commit.delta_secs, 120);
        assert_eq!(commit.date, "2024-01-15");
    }

    #[test]
    fn test_summary_window_oldest_first() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let mut totals = HashMap::new();
        totals.insert("2024-01-15".to_string(), 100);
        totals.insert("2024-01-09".to_string(), 50); // 6 days ago: in week
        totals.insert("2024-01-08".to_string(), 25); // 7 days ago: outside week
        totals.insert("2023-12-01".to_string(), 999); // outside window

        let summary = summarize_daily_logs(&totals, today, 14);

        assert_eq!(summary.logs.len(), 14);
        assert_eq!(summary.logs.first().unwrap().date, "2024-01-02");
        assert_eq!(summary.logs.last().unwrap().date, "2024-01-15");
        assert_eq!(summary.total, 175);
        assert_eq!(summary.week, 150);
        assert_eq!(summary.month, 175);
        assert_eq!(
            summary.logs.iter().map(|l| l.total_time).sum::<u64>(),
            summary.total
        );
    }

    #[test]
    fn test_summary_month_limited_to_thirty_days() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let mut totals = HashMap::new();
        totals.insert("2024-03-02".to_string(), 10); // 29 days ago
        totals.insert("2024-03-01".to_string(), 20); // 30 days ago

        let summary = summarize_daily_logs(&totals, today, 40);

        assert_eq!(summary.total, 30);
        assert_eq!(summary.month, 10);
        assert_eq!(summary.week, 0);
    }
}
