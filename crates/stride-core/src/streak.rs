//! Streak recomputation.
//!
//! Pure functions over a habit's completion history. Persistence happens at
//! the call site; nothing here touches the store or the clock.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::habit::SchedulePolicy;

/// Result of a streak recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakComputation {
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Recomputes the streak pair by walking backward day-by-day from `as_of`.
///
/// A day counts when the schedule requires it and a completion exists on it.
/// Days the schedule does not require are stepped over without breaking the
/// run, as are completions logged on unrequired days (they never count). The
/// walk stops at the first required day with no completion, with one
/// exception: `as_of` itself gets a grace pass, so an unfinished today leaves
/// yesterday's streak intact.
///
/// `Weekly` habits are evaluated per Monday-started calendar week instead:
/// every completed day counts, and the run breaks at the first fully elapsed
/// week containing no completion. The week of `as_of` gets the same grace
/// pass as a single day does.
///
/// The longest streak only ever ratchets up: the result is the maximum of
/// `previous_longest` and the freshly walked run.
pub fn recompute(
    schedule: &SchedulePolicy,
    completions: &BTreeSet<NaiveDate>,
    as_of: NaiveDate,
    previous_longest: u32,
) -> StreakComputation {
    let current_streak = match schedule {
        SchedulePolicy::Weekly => walk_weekly(completions, as_of),
        _ => walk_daily(schedule, completions, as_of),
    };
    StreakComputation {
        current_streak,
        longest_streak: previous_longest.max(current_streak),
    }
}

fn walk_daily(schedule: &SchedulePolicy, completions: &BTreeSet<NaiveDate>, as_of: NaiveDate) -> u32 {
    let Some(earliest) = completions.first().copied() else {
        return 0;
    };
    let mut streak = 0u32;
    let mut day = as_of;
    loop {
        let required = schedule.requires_weekday(day.weekday());
        if completions.contains(&day) {
            if required {
                streak += 1;
            }
        } else if required && day != as_of {
            break;
        }
        if day <= earliest {
            break;
        }
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

fn walk_weekly(completions: &BTreeSet<NaiveDate>, as_of: NaiveDate) -> u32 {
    let Some(earliest) = completions.first().copied() else {
        return 0;
    };
    let as_of_week = week_start(as_of);
    let mut streak = 0u32;
    let mut week_completed = false;
    let mut day = as_of;
    loop {
        if completions.contains(&day) {
            streak += 1;
            week_completed = true;
        }
        // Crossing a Monday closes out the week just walked.
        if day.weekday() == Weekday::Mon {
            if !week_completed && day != as_of_week {
                break;
            }
            week_completed = false;
        }
        if day <= earliest {
            break;
        }
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Monday of the week containing `day`.
fn week_start(day: NaiveDate) -> NaiveDate {
    let back = u64::from(day.weekday().num_days_from_monday());
    day.checked_sub_days(Days::new(back)).unwrap_or(day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Date by ISO week and weekday, so tests can pin weekdays exactly.
    fn iso(week: u32, day: Weekday) -> NaiveDate {
        NaiveDate::from_isoywd_opt(2024, week, day).unwrap()
    }

    fn days(dates: &[NaiveDate]) -> BTreeSet<NaiveDate> {
        dates.iter().copied().collect()
    }

    #[test]
    fn test_empty_history_is_zero() {
        let result = recompute(&SchedulePolicy::Daily, &BTreeSet::new(), date(2024, 3, 10), 4);
        assert_eq!(result.current_streak, 0);
        assert_eq!(result.longest_streak, 4);
    }

    #[test]
    fn test_daily_run_counts_back_from_today() {
        let completions = days(&[date(2024, 3, 8), date(2024, 3, 9), date(2024, 3, 10)]);
        let result = recompute(&SchedulePolicy::Daily, &completions, date(2024, 3, 10), 0);
        assert_eq!(result.current_streak, 3);
        assert_eq!(result.longest_streak, 3);
    }

    #[test]
    fn test_unfinished_today_keeps_streak() {
        let completions = days(&[date(2024, 3, 8), date(2024, 3, 9)]);
        let result = recompute(&SchedulePolicy::Daily, &completions, date(2024, 3, 10), 0);
        assert_eq!(result.current_streak, 2);
    }

    #[test]
    fn test_missed_required_day_breaks_run() {
        // 7th done, 8th missed, 9th-10th done.
        let completions = days(&[date(2024, 3, 7), date(2024, 3, 9), date(2024, 3, 10)]);
        let result = recompute(&SchedulePolicy::Daily, &completions, date(2024, 3, 10), 5);
        assert_eq!(result.current_streak, 2);
        assert_eq!(result.longest_streak, 5);
    }

    #[test]
    fn test_weekdays_skip_weekend_without_breaking() {
        // Mon-Fri of week 10 completed, weekend empty, evaluated the
        // following Sunday.
        let completions = days(&[
            iso(10, Weekday::Mon),
            iso(10, Weekday::Tue),
            iso(10, Weekday::Wed),
            iso(10, Weekday::Thu),
            iso(10, Weekday::Fri),
        ]);
        let result = recompute(&SchedulePolicy::Weekdays, &completions, iso(10, Weekday::Sun), 0);
        assert_eq!(result.current_streak, 5);
    }

    #[test]
    fn test_completion_on_unrequired_day_neither_counts_nor_breaks() {
        let completions = days(&[
            iso(10, Weekday::Fri),
            iso(10, Weekday::Sat),
            iso(11, Weekday::Mon),
        ]);
        let result = recompute(&SchedulePolicy::Weekdays, &completions, iso(11, Weekday::Mon), 0);
        assert_eq!(result.current_streak, 2);
    }

    #[test]
    fn test_weekend_schedule_spans_the_week() {
        let completions = days(&[
            iso(10, Weekday::Sat),
            iso(10, Weekday::Sun),
            iso(11, Weekday::Sat),
        ]);
        let result = recompute(&SchedulePolicy::Weekends, &completions, iso(11, Weekday::Sat), 0);
        assert_eq!(result.current_streak, 3);
    }

    #[test]
    fn test_custom_days_walk() {
        let policy = SchedulePolicy::Custom {
            days: vec![Weekday::Tue, Weekday::Thu],
        };
        let completions = days(&[
            iso(10, Weekday::Tue),
            iso(10, Weekday::Thu),
            iso(11, Weekday::Tue),
        ]);
        let result = recompute(&policy, &completions, iso(11, Weekday::Wed), 0);
        assert_eq!(result.current_streak, 3);

        // Missing the Thursday of week 10 cuts the run at two.
        let gappy = days(&[iso(10, Weekday::Tue), iso(11, Weekday::Tue)]);
        let result = recompute(&policy, &gappy, iso(11, Weekday::Wed), 0);
        assert_eq!(result.current_streak, 1);
    }

    #[test]
    fn test_weekly_counts_days_and_breaks_on_empty_week() {
        let completions = days(&[
            iso(10, Weekday::Wed),
            iso(11, Weekday::Tue),
            iso(11, Weekday::Fri),
            iso(12, Weekday::Wed),
        ]);
        let result = recompute(&SchedulePolicy::Weekly, &completions, iso(12, Weekday::Thu), 0);
        assert_eq!(result.current_streak, 4);

        // Week 11 empty: only week 12 survives.
        let gappy = days(&[iso(10, Weekday::Wed), iso(12, Weekday::Wed)]);
        let result = recompute(&SchedulePolicy::Weekly, &gappy, iso(12, Weekday::Thu), 0);
        assert_eq!(result.current_streak, 1);
    }

    #[test]
    fn test_weekly_grace_for_current_week() {
        // Nothing yet this week; last week's run still stands.
        let completions = days(&[iso(10, Weekday::Wed), iso(11, Weekday::Tue)]);
        let result = recompute(&SchedulePolicy::Weekly, &completions, iso(12, Weekday::Tue), 0);
        assert_eq!(result.current_streak, 2);
    }

    #[test]
    fn test_longest_ratchets_up_only() {
        let completions = days(&[date(2024, 3, 10)]);
        let result = recompute(&SchedulePolicy::Daily, &completions, date(2024, 3, 10), 9);
        assert_eq!(result.current_streak, 1);
        assert_eq!(result.longest_streak, 9);

        let result = recompute(&SchedulePolicy::Daily, &completions, date(2024, 3, 10), 0);
        assert_eq!(result.longest_streak, 1);
    }

    proptest! {
        #[test]
        fn prop_current_bounded_by_history(offsets in proptest::collection::btree_set(0u64..365, 0..40)) {
            let base = date(2024, 1, 1);
            let completions: BTreeSet<NaiveDate> = offsets
                .iter()
                .map(|d| base.checked_add_days(Days::new(*d)).unwrap())
                .collect();
            let as_of = base.checked_add_days(Days::new(365)).unwrap();
            let result = recompute(&SchedulePolicy::Daily, &completions, as_of, 0);
            prop_assert!(result.current_streak as usize <= completions.len());
            prop_assert!(result.longest_streak >= result.current_streak);
        }

        #[test]
        fn prop_longest_never_below_previous(
            offsets in proptest::collection::btree_set(0u64..60, 0..20),
            previous in 0u32..100,
        ) {
            let base = date(2024, 1, 1);
            let completions: BTreeSet<NaiveDate> = offsets
                .iter()
                .map(|d| base.checked_add_days(Days::new(*d)).unwrap())
                .collect();
            let as_of = base.checked_add_days(Days::new(60)).unwrap();
            let result = recompute(&SchedulePolicy::Daily, &completions, as_of, previous);
            prop_assert!(result.longest_streak >= previous);
        }
    }
}
