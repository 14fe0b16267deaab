//! Wait-time estimation
//!
//! The estimate is a heuristic: `base × cases_ahead`, scaled by time-of-day and
//! day-of-week factors and an uncertainty multiplier that grows with queue
//! depth. Every number involved lives in [`WaitTimePolicy`] so deployments can
//! replace the table without touching the scheduler.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::case::Priority;

/// Handling times for one priority level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationTimes {
    /// Minutes per case when the situation type has no entry
    pub default_minutes: u32,
    /// Minutes per case keyed by lower-case situation type
    pub by_situation: BTreeMap<String, u32>,
}

impl SituationTimes {
    fn new(default_minutes: u32, entries: &[(&str, u32)]) -> Self {
        Self {
            default_minutes,
            by_situation: entries
                .iter()
                .map(|(name, minutes)| (name.to_string(), *minutes))
                .collect(),
        }
    }
}

/// Pluggable wait-time table and factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitTimePolicy {
    pub base_minutes: BTreeMap<Priority, SituationTimes>,

    /// First business hour (inclusive)
    pub business_start_hour: u32,
    /// Last business hour (inclusive)
    pub business_end_hour: u32,
    /// Last evening hour (inclusive); later hours count as overnight
    pub evening_end_hour: u32,

    pub business_factor: f64,
    pub evening_factor: f64,
    pub overnight_factor: f64,
    pub weekday_factor: f64,
    pub weekend_factor: f64,

    pub uncertainty_base: f64,
    pub uncertainty_step: f64,
    pub uncertainty_cap: f64,

    /// Offset from UTC used to evaluate hour of day and weekday
    pub utc_offset_minutes: i32,
}

impl Default for WaitTimePolicy {
    fn default() -> Self {
        let mut base_minutes = BTreeMap::new();
        base_minutes.insert(
            Priority::Urgent,
            SituationTimes::new(25, &[("police", 15), ("rights", 20)]),
        );
        base_minutes.insert(
            Priority::High,
            SituationTimes::new(40, &[("eviction", 30), ("housing", 35), ("rights", 30)]),
        );
        base_minutes.insert(
            Priority::Medium,
            SituationTimes::new(50, &[("immigration", 45), ("court", 40)]),
        );
        base_minutes.insert(
            Priority::Low,
            SituationTimes::new(60, &[("legal_document", 30)]),
        );

        Self {
            base_minutes,
            business_start_hour: 9,
            business_end_hour: 17,
            evening_end_hour: 22,
            business_factor: 1.0,
            evening_factor: 1.5,
            overnight_factor: 2.0,
            weekday_factor: 1.0,
            weekend_factor: 1.5,
            uncertainty_base: 1.1,
            uncertainty_step: 0.05,
            uncertainty_cap: 2.0,
            utc_offset_minutes: 0,
        }
    }
}

impl WaitTimePolicy {
    /// Minutes per case for a priority level and situation type
    pub fn base_minutes(&self, priority: Priority, situation_type: &str) -> f64 {
        let Some(times) = self.base_minutes.get(&priority) else {
            return 0.0;
        };
        let key = situation_type.trim().to_ascii_lowercase();
        times
            .by_situation
            .get(&key)
            .copied()
            .unwrap_or(times.default_minutes) as f64
    }

    fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        now.with_timezone(&offset)
    }

    pub fn time_of_day_factor(&self, now: DateTime<Utc>) -> f64 {
        let hour = self.local(now).hour();
        if (self.business_start_hour..=self.business_end_hour).contains(&hour) {
            self.business_factor
        } else if hour > self.business_end_hour && hour <= self.evening_end_hour {
            self.evening_factor
        } else {
            self.overnight_factor
        }
    }

    pub fn day_of_week_factor(&self, now: DateTime<Utc>) -> f64 {
        match self.local(now).weekday() {
            Weekday::Sat | Weekday::Sun => self.weekend_factor,
            _ => self.weekday_factor,
        }
    }

    pub fn uncertainty_factor(&self, cases_ahead: usize) -> f64 {
        (self.uncertainty_base + self.uncertainty_step * cases_ahead as f64).min(self.uncertainty_cap)
    }

    /// Estimated wait for a case with `cases_ahead` cases in front of it
    pub fn estimate(
        &self,
        priority: Priority,
        situation_type: &str,
        cases_ahead: usize,
        now: DateTime<Utc>,
    ) -> Duration {
        let minutes = self.base_minutes(priority, situation_type)
            * cases_ahead as f64
            * self.time_of_day_factor(now)
            * self.day_of_week_factor(now)
            * self.uncertainty_factor(cases_ahead);

        Duration::minutes(minutes.round() as i64)
    }
}
