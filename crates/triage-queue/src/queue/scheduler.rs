//! Queue scheduler
//!
//! [`QueueScheduler`] is the public face of the queue. It owns the in-memory
//! [`PriorityIndex`] behind a single async lock and delegates durability to a
//! [`CaseStore`]. Every mutation is persisted first, while the lock is held,
//! and only reflected in the index once storage confirmed it; a failed write
//! leaves the index untouched.
//!
//! Read queries rebuild the index from storage when the cached view is older
//! than the configured TTL. If that rebuild fails the last known view is
//! served and flagged as stale.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::index::PriorityIndex;
use super::wait_time::WaitTimePolicy;
use crate::case::{CaseRecord, NewCase, Priority, PriorityCounts};
use crate::clock::{Clock, SystemClock};
use crate::config::QueueEngineConfig;
use crate::database::{self, CaseStore};
use crate::error::{QueueError, Result};
use crate::monitoring::events::{QueueEvent, EVENT_CHANNEL_CAPACITY};

/// Current queue overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total_active: usize,
    pub by_priority: PriorityCounts,
    /// Mean estimated wait over cases with a non-zero estimate; `None` when
    /// no case has one
    pub average_wait_minutes: Option<f64>,
    pub longest_waiting: Option<LongestWaiting>,
    /// Set when the view could not be refreshed from storage
    pub stale: bool,
    pub as_of: DateTime<Utc>,
}

/// The active case that has been waiting the longest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongestWaiting {
    pub case_id: String,
    pub priority: Priority,
    pub waited_minutes: i64,
    pub estimated_remaining_minutes: i64,
    pub position: usize,
}

struct IndexState {
    index: PriorityIndex,
    last_refresh: DateTime<Utc>,
    /// Last ranking stamp handed out; new stamps are strictly later
    last_stamp: Option<DateTime<Utc>>,
    stale: bool,
}

impl IndexState {
    fn next_stamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = truncate_millis(now);
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// Storage keeps millisecond precision; stamps must survive a reload unchanged
fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(Duration::milliseconds(1)).unwrap_or(at)
}

pub struct QueueScheduler {
    store: Arc<dyn CaseStore>,
    state: Mutex<IndexState>,
    cache_ttl: StdDuration,
    query_timeout: StdDuration,
    policy: WaitTimePolicy,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueScheduler {
    /// Create a scheduler on the system clock and load the active cases
    pub async fn new(store: Arc<dyn CaseStore>, config: &QueueEngineConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        store: Arc<dyn CaseStore>,
        config: &QueueEngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let scheduler = Self {
            store,
            state: Mutex::new(IndexState {
                index: PriorityIndex::new(),
                last_refresh: clock.now(),
                last_stamp: None,
                stale: false,
            }),
            cache_ttl: config.cache.ttl,
            query_timeout: config.database.query_timeout,
            policy: config.wait_time.clone(),
            clock,
            events,
        };

        // Cold start has no last-known view to fall back on
        let loaded = {
            let mut state = scheduler.state.lock().await;
            let now = scheduler.clock.now();
            scheduler.reload(&mut state, now).await?
        };
        info!(
            "🚀 Queue scheduler started with {} active cases ({} backend)",
            loaded,
            scheduler.store.backend_name()
        );

        Ok(scheduler)
    }

    /// Receive queue events; lagging receivers drop the oldest events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn CaseStore> {
        &self.store
    }

    pub fn policy(&self) -> &WaitTimePolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Upper bound applied to every storage call
    pub fn query_timeout(&self) -> StdDuration {
        self.query_timeout
    }

    /// Queue a new case
    pub async fn add_case(&self, new_case: NewCase) -> Result<CaseRecord> {
        let priority: Priority = new_case.priority.parse()?;
        let case_id = match new_case.case_id {
            Some(id) if id.trim().is_empty() => {
                return Err(QueueError::invalid_input("case_id cannot be empty"));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let mut state = self.state.lock().await;
        let stamp = state.next_stamp(self.clock.now());
        let case = CaseRecord {
            case_id,
            priority,
            enqueued_at: stamp,
            ranked_at: stamp,
            requester_id: new_case.requester_id,
            situation_type: new_case.situation_type,
            metadata: new_case.metadata,
            assigned_responder_id: None,
            active: true,
        };

        self.persist("add case", self.store.add_case(&case)).await?;

        state.index.insert(case.clone());
        let position = state.index.position_of(&case.case_id).unwrap_or(state.index.len());
        drop(state);

        info!(
            "📥 Queued case {} ({}, {}) at position {}",
            case.case_id, case.priority, case.situation_type, position
        );
        self.publish(QueueEvent::CaseQueued {
            case_id: case.case_id.clone(),
            priority: case.priority,
            situation_type: case.situation_type.clone(),
            position,
            at: stamp,
        });

        Ok(case)
    }

    /// Hand a case to a responder. Storage decides whether the assignment
    /// happened, so two schedulers sharing a store still assign at most once.
    pub async fn assign_case(&self, case_id: &str, responder_id: &str) -> Result<CaseRecord> {
        if responder_id.trim().is_empty() {
            return Err(QueueError::invalid_input("responder_id cannot be empty"));
        }

        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let assigned = self
            .persist("assign case", self.store.assign_case(case_id, responder_id, now))
            .await?;

        if !assigned {
            if state.index.remove(case_id).is_some() {
                debug!("Dropped case {} from index, it is no longer active in storage", case_id);
            }
            return Err(QueueError::not_found(format!("no active case {case_id}")));
        }

        let case = match state.index.remove(case_id) {
            Some(mut case) => {
                case.active = false;
                case.assigned_responder_id = Some(responder_id.to_string());
                case
            }
            // Queued by another instance since our last refresh
            None => self
                .persist("load case", self.store.get_case(case_id))
                .await?
                .ok_or_else(|| QueueError::storage(format!("assigned case {case_id} vanished")))?,
        };
        drop(state);

        info!("✅ Assigned case {} to responder {}", case_id, responder_id);
        self.publish(QueueEvent::CaseAssigned {
            case_id: case_id.to_string(),
            responder_id: responder_id.to_string(),
            at: now,
        });

        Ok(case)
    }

    /// Change the priority of an active case. Setting the current level again
    /// is a no-op that keeps the case's place in line.
    pub async fn update_priority(&self, case_id: &str, priority: &str) -> Result<CaseRecord> {
        let priority: Priority = priority.parse()?;

        let mut state = self.state.lock().await;
        let stamp = state.next_stamp(self.clock.now());

        let stored = self
            .persist(
                "update priority",
                self.store.update_case_priority(case_id, priority, stamp),
            )
            .await?;

        let Some(stored) = stored else {
            state.index.remove(case_id);
            return Err(QueueError::not_found(format!("no active case {case_id}")));
        };

        // Another instance may have changed the level first; storage decides
        // whether this call moved the case, so the index takes its record.
        let previous = state.index.insert(stored.clone()).map(|case| case.priority);
        drop(state);

        let moved = stored.ranked_at == stamp;
        match previous {
            Some(from) if moved && from != priority => {
                info!("🔀 Case {} priority {} -> {}", case_id, from, priority);
                self.publish(QueueEvent::PriorityChanged {
                    case_id: case_id.to_string(),
                    from,
                    to: priority,
                    at: stamp,
                });
            }
            _ => debug!("Case {} priority unchanged ({})", case_id, priority),
        }

        Ok(stored)
    }

    /// Close the open assignment of a case
    pub async fn complete_case(&self, case_id: &str) -> Result<()> {
        let now = self.clock.now();
        let completed = self
            .persist("complete case", self.store.complete_assignment(case_id, now))
            .await?;

        if !completed {
            return Err(QueueError::not_found(format!("no open assignment for case {case_id}")));
        }

        info!("🏁 Resolved case {}", case_id);
        self.publish(QueueEvent::CaseResolved {
            case_id: case_id.to_string(),
            at: now,
        });
        Ok(())
    }

    /// 1-based place in line
    pub async fn get_queue_position(&self, case_id: &str) -> Result<Option<usize>> {
        let state = self.fresh_state().await;
        Ok(state.index.position_of(case_id))
    }

    pub async fn get_estimated_wait_time(&self, case_id: &str) -> Result<Option<Duration>> {
        let state = self.fresh_state().await;
        let Some(case) = state.index.get(case_id) else {
            return Ok(None);
        };
        let ahead = state.index.cases_ahead(case_id).unwrap_or(0);

        Ok(Some(self.policy.estimate(
            case.priority,
            &case.situation_type,
            ahead,
            self.clock.now(),
        )))
    }

    pub async fn get_queue_status(&self) -> Result<QueueStatus> {
        let state = self.fresh_state().await;
        let now = self.clock.now();
        let index = &state.index;

        let by_priority: PriorityCounts = index.iter().collect();
        // Mean of the non-zero estimates; the head of the line has nothing to wait for
        let estimates: Vec<f64> = index
            .iter()
            .filter_map(|case| {
                let ahead = index.cases_ahead(&case.case_id)?;
                let estimate = self.policy.estimate(case.priority, &case.situation_type, ahead, now);
                (estimate > Duration::zero()).then(|| estimate.num_seconds() as f64 / 60.0)
            })
            .collect();
        let average_wait_minutes = if estimates.is_empty() {
            None
        } else {
            Some(estimates.iter().sum::<f64>() / estimates.len() as f64)
        };

        let longest_waiting = index
            .iter()
            .min_by(|a, b| (a.enqueued_at, &a.case_id).cmp(&(b.enqueued_at, &b.case_id)))
            .map(|case| {
                let ahead = index.cases_ahead(&case.case_id).unwrap_or(0);
                LongestWaiting {
                    case_id: case.case_id.clone(),
                    priority: case.priority,
                    waited_minutes: (now - case.enqueued_at).num_minutes().max(0),
                    estimated_remaining_minutes: self
                        .policy
                        .estimate(case.priority, &case.situation_type, ahead, now)
                        .num_minutes(),
                    position: ahead + 1,
                }
            });

        Ok(QueueStatus {
            total_active: index.len(),
            by_priority,
            average_wait_minutes,
            longest_waiting,
            stale: state.stale,
            as_of: now,
        })
    }

    /// Case that would be assigned next, without removing it
    pub async fn get_next_case(&self) -> Result<Option<CaseRecord>> {
        let state = self.fresh_state().await;
        Ok(state.index.peek().cloned())
    }

    /// Stored record of any case, including assigned ones
    pub async fn get_case(&self, case_id: &str) -> Result<Option<CaseRecord>> {
        self.persist("load case", self.store.get_case(case_id)).await
    }

    /// Active cases in dequeue order
    pub async fn active_cases(&self) -> Vec<CaseRecord> {
        let state = self.fresh_state().await;
        state.index.ordered().into_iter().cloned().collect()
    }

    /// Rebuild the index from storage now, regardless of the TTL
    pub async fn refresh(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        match self.reload(&mut state, now).await {
            Ok(count) => Ok(count),
            Err(e) => {
                state.stale = true;
                Err(e)
            }
        }
    }

    pub async fn is_stale(&self) -> bool {
        self.state.lock().await.stale
    }

    async fn fresh_state(&self) -> MutexGuard<'_, IndexState> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let expired = (now - state.last_refresh)
            .to_std()
            .map(|age| age > self.cache_ttl)
            .unwrap_or(false);

        if expired {
            if let Err(e) = self.reload(&mut state, now).await {
                warn!("⚠️ Queue refresh failed, serving last known view: {}", e);
                state.stale = true;
            }
        }

        state
    }

    async fn reload(&self, state: &mut IndexState, now: DateTime<Utc>) -> Result<usize> {
        let cases = self
            .persist("load active cases", self.store.get_active_cases())
            .await?;

        let newest = cases.iter().map(|case| case.ranked_at).max();
        state.index.rebuild(cases);
        state.last_refresh = now;
        state.stale = false;
        if newest > state.last_stamp {
            state.last_stamp = newest;
        }

        let count = state.index.len();
        debug!("🔄 Rebuilt queue index with {} active cases", count);
        self.publish(QueueEvent::IndexRefreshed {
            active_cases: count,
            at: now,
        });
        Ok(count)
    }

    /// Bound a storage call by the query timeout
    async fn persist<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        database::with_timeout(self.query_timeout, operation, call).await
    }

    fn publish(&self, event: QueueEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::SqliteCaseStore;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap()
    }

    async fn scheduler() -> (QueueScheduler, ManualClock) {
        let clock = ManualClock::new(start());
        let store: Arc<dyn CaseStore> = Arc::new(SqliteCaseStore::in_memory().await.unwrap());
        let scheduler = QueueScheduler::with_clock(
            store,
            &QueueEngineConfig::in_memory(),
            Arc::new(clock.clone()),
        )
        .await
        .unwrap();
        (scheduler, clock)
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let mut state = IndexState {
            index: PriorityIndex::new(),
            last_refresh: start(),
            last_stamp: None,
            stale: false,
        };
        let first = state.next_stamp(start());
        let second = state.next_stamp(start());
        let earlier = state.next_stamp(start() - Duration::seconds(5));
        assert!(first < second && second < earlier);
        assert_eq!(second - first, Duration::milliseconds(1));

        let later = start() + Duration::seconds(1);
        assert_eq!(state.next_stamp(later), later);
    }

    #[tokio::test]
    async fn test_same_tick_cases_keep_insertion_order() {
        let (scheduler, _clock) = scheduler().await;
        for id in ["z", "y", "x"] {
            scheduler.add_case(NewCase::new(id, "HIGH", "u", "other")).await.unwrap();
        }

        let ids: Vec<String> = scheduler.active_cases().await.into_iter().map(|c| c.case_id).collect();
        assert_eq!(ids, vec!["z", "y", "x"]);

        // Reloading from storage yields the same order
        scheduler.refresh().await.unwrap();
        let ids: Vec<String> = scheduler.active_cases().await.into_iter().map(|c| c.case_id).collect();
        assert_eq!(ids, vec!["z", "y", "x"]);
    }

    #[tokio::test]
    async fn test_generated_ids_and_input_validation() {
        let (scheduler, _clock) = scheduler().await;
        let mut new_case = NewCase::new("ignored", "low", "u", "other");
        new_case.case_id = None;
        let case = scheduler.add_case(new_case).await.unwrap();
        assert!(Uuid::parse_str(&case.case_id).is_ok());

        let err = scheduler.add_case(NewCase::new(" ", "LOW", "u", "other")).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidInput(_)));

        let err = scheduler.assign_case(&case.case_id, "").await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidInput(_)));
        assert_eq!(scheduler.get_queue_position(&case.case_id).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let (scheduler, _clock) = scheduler().await;
        let mut events = scheduler.subscribe();

        scheduler.add_case(NewCase::new("a", "MEDIUM", "u", "court")).await.unwrap();
        scheduler.update_priority("a", "MEDIUM").await.unwrap();
        scheduler.update_priority("a", "HIGH").await.unwrap();
        scheduler.assign_case("a", "r1").await.unwrap();
        scheduler.complete_case("a").await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), QueueEvent::CaseQueued { position: 1, .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            QueueEvent::PriorityChanged { from: Priority::Medium, to: Priority::High, .. }
        ));
        assert!(matches!(events.recv().await.unwrap(), QueueEvent::CaseAssigned { .. }));
        assert!(matches!(events.recv().await.unwrap(), QueueEvent::CaseResolved { .. }));
    }
}
