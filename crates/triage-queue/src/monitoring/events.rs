//! Queue state transitions published to subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::case::Priority;

/// Capacity of the broadcast channel; slow subscribers lag beyond this
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    CaseQueued {
        case_id: String,
        priority: Priority,
        situation_type: String,
        position: usize,
        at: DateTime<Utc>,
    },
    CaseAssigned {
        case_id: String,
        responder_id: String,
        at: DateTime<Utc>,
    },
    PriorityChanged {
        case_id: String,
        from: Priority,
        to: Priority,
        at: DateTime<Utc>,
    },
    CaseResolved {
        case_id: String,
        at: DateTime<Utc>,
    },
    /// The index was rebuilt from storage
    IndexRefreshed {
        active_cases: usize,
        at: DateTime<Utc>,
    },
}
