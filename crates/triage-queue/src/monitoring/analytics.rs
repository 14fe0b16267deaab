//! Queue analytics
//!
//! Live figures come from the scheduler's index, history and responder
//! figures from the case store. Empty inputs produce `None` averages rather
//! than a division by zero.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::case::{CaseRecord, PriorityCounts};
use crate::database::{self, CaseStore, QueueSnapshot, ResponderPerformance};
use crate::error::Result;
use crate::queue::QueueScheduler;

/// Number of situation types reported as bottlenecks
pub const BOTTLENECK_COUNT: usize = 3;

/// Wait figures over the active cases, in minutes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitSummary {
    pub average_minutes: Option<f64>,
    pub min_minutes: Option<f64>,
    pub max_minutes: Option<f64>,
}

/// A situation type whose cases wait longest on average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub situation_type: String,
    pub average_wait_minutes: f64,
    pub case_count: usize,
}

/// Figures derived from the active cases alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveBreakdown {
    pub total_active: usize,
    pub by_priority: PriorityCounts,
    pub situation_distribution: BTreeMap<String, usize>,
    pub wait: WaitSummary,
    pub bottlenecks: Vec<Bottleneck>,
}

impl LiveBreakdown {
    pub fn from_cases(cases: &[CaseRecord], now: DateTime<Utc>) -> Self {
        let mut per_situation: BTreeMap<String, (usize, f64)> = BTreeMap::new();
        let mut waits = Vec::with_capacity(cases.len());

        for case in cases {
            let waited = (now - case.enqueued_at).num_milliseconds().max(0) as f64 / 60_000.0;
            waits.push(waited);
            let entry = per_situation.entry(case.situation_type.clone()).or_default();
            entry.0 += 1;
            entry.1 += waited;
        }

        let wait = if waits.is_empty() {
            WaitSummary::default()
        } else {
            WaitSummary {
                average_minutes: Some(waits.iter().sum::<f64>() / waits.len() as f64),
                min_minutes: waits.iter().copied().reduce(f64::min),
                max_minutes: waits.iter().copied().reduce(f64::max),
            }
        };

        let mut bottlenecks: Vec<Bottleneck> = per_situation
            .iter()
            .map(|(situation_type, (count, total))| Bottleneck {
                situation_type: situation_type.clone(),
                average_wait_minutes: total / *count as f64,
                case_count: *count,
            })
            .collect();
        bottlenecks.sort_by(|a, b| {
            b.average_wait_minutes
                .total_cmp(&a.average_wait_minutes)
                .then_with(|| a.situation_type.cmp(&b.situation_type))
        });
        bottlenecks.truncate(BOTTLENECK_COUNT);

        Self {
            total_active: cases.len(),
            by_priority: cases.iter().collect(),
            situation_distribution: per_situation
                .into_iter()
                .map(|(situation_type, (count, _))| (situation_type, count))
                .collect(),
            wait,
            bottlenecks,
        }
    }
}

/// Full analytics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueAnalytics {
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub live: LiveBreakdown,
    /// Most recent first
    pub snapshot_history: Vec<QueueSnapshot>,
    pub responder_performance: Vec<ResponderPerformance>,
}

pub struct AnalyticsEngine {
    scheduler: Arc<QueueScheduler>,
    store: Arc<dyn CaseStore>,
    history_limit: u32,
}

impl AnalyticsEngine {
    pub fn new(scheduler: Arc<QueueScheduler>, history_limit: u32) -> Self {
        let store = scheduler.store().clone();
        Self {
            scheduler,
            store,
            history_limit,
        }
    }

    pub async fn live_breakdown(&self) -> LiveBreakdown {
        let cases = self.scheduler.active_cases().await;
        LiveBreakdown::from_cases(&cases, self.scheduler.clock().now())
    }

    pub async fn snapshot_history(&self) -> Result<Vec<QueueSnapshot>> {
        database::with_timeout(
            self.scheduler.query_timeout(),
            "load snapshot history",
            self.store.get_snapshot_history(self.history_limit),
        )
        .await
    }

    pub async fn responder_performance(&self, responder_id: Option<&str>) -> Result<Vec<ResponderPerformance>> {
        database::with_timeout(
            self.scheduler.query_timeout(),
            "load responder performance",
            self.store.get_responder_performance(responder_id),
        )
        .await
    }

    pub async fn report(&self) -> Result<QueueAnalytics> {
        let live = self.live_breakdown().await;
        let snapshot_history = self.snapshot_history().await?;
        let responder_performance = self.responder_performance(None).await?;

        debug!(
            "📊 Analytics: {} active, {} snapshots, {} responders",
            live.total_active,
            snapshot_history.len(),
            responder_performance.len()
        );

        Ok(QueueAnalytics {
            generated_at: self.scheduler.clock().now(),
            live,
            snapshot_history,
            responder_performance,
        })
    }
}
