//! Case records and priority levels
//!
//! A [`CaseRecord`] is one queued legal-assistance request. Cases are ordered
//! by [`Priority`] (highest first) and then by their ranking timestamp, so
//! equal-priority cases are served strictly first-in-first-out.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Urgency level of a case
///
/// Variants are declared lowest first so the derived `Ord` matches the rank:
/// `Urgent > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// All levels, highest first
    pub const ALL: [Priority; 4] = [Priority::Urgent, Priority::High, Priority::Medium, Priority::Low];

    /// Numeric rank, higher is served first
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Urgent => 4,
        }
    }

    /// Canonical upper-case name, also the stored representation
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }
}

impl FromStr for Priority {
    type Err = QueueError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            "URGENT" => Ok(Priority::Urgent),
            _ => Err(QueueError::invalid_priority(s)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub priority: Priority,
    /// When the case was created
    pub enqueued_at: DateTime<Utc>,
    /// FIFO tie-breaker within a priority level. Starts equal to `enqueued_at`
    /// and moves to the reprioritization time when the level changes.
    pub ranked_at: DateTime<Utc>,
    pub requester_id: String,
    pub situation_type: String,
    /// Opaque payload, carried through unmodified
    pub metadata: serde_json::Value,
    pub assigned_responder_id: Option<String>,
    pub active: bool,
}

/// Ordering key; smaller keys are dequeued first
pub type RankKey<'a> = (Reverse<Priority>, DateTime<Utc>, &'a str);

impl CaseRecord {
    pub fn rank_key(&self) -> RankKey<'_> {
        (Reverse(self.priority), self.ranked_at, self.case_id.as_str())
    }

    /// Whether this case is dequeued before `other`
    pub fn precedes(&self, other: &CaseRecord) -> bool {
        self.rank_key() < other.rank_key()
    }
}

/// Case counts per priority level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub urgent: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl PriorityCounts {
    pub fn get(&self, priority: Priority) -> u64 {
        match priority {
            Priority::Urgent => self.urgent,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn increment(&mut self, priority: Priority) {
        match priority {
            Priority::Urgent => self.urgent += 1,
            Priority::High => self.high += 1,
            Priority::Medium => self.medium += 1,
            Priority::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.urgent + self.high + self.medium + self.low
    }
}

impl<'a> FromIterator<&'a CaseRecord> for PriorityCounts {
    fn from_iter<I: IntoIterator<Item = &'a CaseRecord>>(iter: I) -> Self {
        let mut counts = PriorityCounts::default();
        for case in iter {
            counts.increment(case.priority);
        }
        counts
    }
}

/// Intake request accepted by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCase {
    /// Caller-supplied id; a UUID is generated when absent
    pub case_id: Option<String>,
    /// Priority name, validated case-insensitively
    pub priority: String,
    pub requester_id: String,
    pub situation_type: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewCase {
    pub fn new(
        case_id: impl Into<String>,
        priority: impl Into<String>,
        requester_id: impl Into<String>,
        situation_type: impl Into<String>,
    ) -> Self {
        Self {
            case_id: Some(case_id.into()),
            priority: priority.into(),
            requester_id: requester_id.into(),
            situation_type: situation_type.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
