//! Habit domain model.
//!
//! A habit is either timer-backed (progress in minutes against a daily goal)
//! or count-backed (a tally of logged completions). The per-day timer fields
//! carry the local day they belong to so stale rows can be rolled over
//! lazily on read.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque habit identifier, stable for the habit's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(Uuid);

impl HabitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses the string form external callers carry around.
    pub fn parse(raw: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(raw).map(Self)
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier for a single logged completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionId(Uuid);

impl CompletionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CompletionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompletionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How progress on a habit is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HabitKind {
    /// Elapsed minutes against a daily minute goal.
    Timer,
    /// Discrete completions against a daily tally goal.
    Count,
}

impl HabitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HabitKind::Timer => "timer",
            HabitKind::Count => "count",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timer" => Some(HabitKind::Timer),
            "count" => Some(HabitKind::Count),
            _ => None,
        }
    }
}

/// Days on which a habit expects activity.
///
/// Serialized (and stored) as its canonical string form, e.g. `daily`,
/// `weekdays` or `custom:mon,wed,fri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// Every day.
    Daily,
    /// Monday through Friday.
    Weekdays,
    /// Saturday and Sunday.
    Weekends,
    /// At least one completion per calendar week (Monday-started).
    Weekly,
    /// An explicit set of weekdays.
    Custom { days: Vec<Weekday> },
}

impl SchedulePolicy {
    /// Whether the policy calls for activity on the given weekday.
    ///
    /// `Weekly` has no fixed day and always answers `false` here; the streak
    /// walk evaluates it per calendar week instead.
    pub fn requires_weekday(&self, day: Weekday) -> bool {
        match self {
            SchedulePolicy::Daily => true,
            SchedulePolicy::Weekdays => !matches!(day, Weekday::Sat | Weekday::Sun),
            SchedulePolicy::Weekends => matches!(day, Weekday::Sat | Weekday::Sun),
            SchedulePolicy::Weekly => false,
            SchedulePolicy::Custom { days } => days.contains(&day),
        }
    }
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulePolicy::Daily => f.write_str("daily"),
            SchedulePolicy::Weekdays => f.write_str("weekdays"),
            SchedulePolicy::Weekends => f.write_str("weekends"),
            SchedulePolicy::Weekly => f.write_str("weekly"),
            SchedulePolicy::Custom { days } => {
                f.write_str("custom:")?;
                for (i, day) in days.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(day_token(*day))?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("unrecognized schedule policy: {0:?}")]
pub struct ParsePolicyError(String);

impl FromStr for SchedulePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => return Ok(SchedulePolicy::Daily),
            "weekdays" => return Ok(SchedulePolicy::Weekdays),
            "weekends" => return Ok(SchedulePolicy::Weekends),
            "weekly" => return Ok(SchedulePolicy::Weekly),
            _ => {}
        }
        let day_list = s
            .strip_prefix("custom:")
            .ok_or_else(|| ParsePolicyError(s.to_string()))?;
        let mut days = Vec::new();
        for token in day_list.split(',') {
            let day = parse_day(token.trim()).ok_or_else(|| ParsePolicyError(s.to_string()))?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        if days.is_empty() {
            return Err(ParsePolicyError(s.to_string()));
        }
        Ok(SchedulePolicy::Custom { days })
    }
}

impl Serialize for SchedulePolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SchedulePolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn day_token(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn parse_day(token: &str) -> Option<Weekday> {
    match token {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// A user-defined recurring activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    pub kind: HabitKind,
    /// Daily target: minutes for timer habits, completions for count habits.
    pub goal_value: u32,
    pub schedule: SchedulePolicy,
    /// Minutes accumulated toward today's goal. Rolled to zero by the store
    /// when `timer_date` falls behind the current local day.
    pub timer_minutes_today: u32,
    /// The local day `timer_minutes_today` belongs to.
    pub timer_date: NaiveDate,
    pub timer_goal_met_today: bool,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_completions: u32,
    pub last_completed_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    pub fn new(
        name: impl Into<String>,
        kind: HabitKind,
        goal_value: u32,
        schedule: SchedulePolicy,
        today: NaiveDate,
    ) -> Self {
        Self {
            id: HabitId::new(),
            name: name.into(),
            kind,
            goal_value,
            schedule,
            timer_minutes_today: 0,
            timer_date: today,
            timer_goal_met_today: false,
            current_streak: 0,
            longest_streak: 0,
            total_completions: 0,
            last_completed_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_timer(&self) -> bool {
        self.kind == HabitKind::Timer
    }

    /// Overrun gate for the next timer start. The cached flag can lag the raw
    /// minutes-vs-goal comparison after an external goal edit, so both count.
    pub fn allow_overrun(&self) -> bool {
        self.timer_goal_met_today || self.timer_minutes_today >= self.goal_value
    }
}

/// One logged completion. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub id: CompletionId,
    pub habit_id: HabitId,
    pub completed_on: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn policy_string_roundtrip() {
        let policies = [
            SchedulePolicy::Daily,
            SchedulePolicy::Weekdays,
            SchedulePolicy::Weekends,
            SchedulePolicy::Weekly,
            SchedulePolicy::Custom {
                days: vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
            },
        ];
        for policy in policies {
            let rendered = policy.to_string();
            let parsed: SchedulePolicy = rendered.parse().unwrap();
            assert_eq!(parsed, policy, "roundtrip of {rendered}");
        }
    }

    #[test]
    fn policy_rejects_garbage() {
        assert!("sometimes".parse::<SchedulePolicy>().is_err());
        assert!("custom:".parse::<SchedulePolicy>().is_err());
        assert!("custom:mon,funday".parse::<SchedulePolicy>().is_err());
    }

    #[test]
    fn custom_parse_dedupes_days() {
        let policy: SchedulePolicy = "custom:mon,mon,tue".parse().unwrap();
        assert_eq!(
            policy,
            SchedulePolicy::Custom {
                days: vec![Weekday::Mon, Weekday::Tue]
            }
        );
    }

    #[test]
    fn weekday_requirements() {
        assert!(SchedulePolicy::Daily.requires_weekday(Weekday::Sun));
        assert!(SchedulePolicy::Weekdays.requires_weekday(Weekday::Fri));
        assert!(!SchedulePolicy::Weekdays.requires_weekday(Weekday::Sat));
        assert!(SchedulePolicy::Weekends.requires_weekday(Weekday::Sat));
        assert!(!SchedulePolicy::Weekends.requires_weekday(Weekday::Wed));
        assert!(!SchedulePolicy::Weekly.requires_weekday(Weekday::Mon));
        let custom = SchedulePolicy::Custom {
            days: vec![Weekday::Tue, Weekday::Thu],
        };
        assert!(custom.requires_weekday(Weekday::Thu));
        assert!(!custom.requires_weekday(Weekday::Wed));
    }

    #[test]
    fn overrun_gate_checks_flag_and_minutes() {
        let mut habit = Habit::new(
            "Reading",
            HabitKind::Timer,
            10,
            SchedulePolicy::Daily,
            date(2025, 3, 3),
        );
        assert!(!habit.allow_overrun());

        habit.timer_goal_met_today = true;
        assert!(habit.allow_overrun());

        habit.timer_goal_met_today = false;
        habit.timer_minutes_today = 10;
        assert!(habit.allow_overrun());
    }

    #[test]
    fn policy_serializes_as_plain_string() {
        let json = serde_json::to_string(&SchedulePolicy::Custom {
            days: vec![Weekday::Sat, Weekday::Sun],
        })
        .unwrap();
        assert_eq!(json, "\"custom:sat,sun\"");
    }
}
