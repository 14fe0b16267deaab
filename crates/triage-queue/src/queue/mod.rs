//! Case queue: ordering, scheduling and wait-time estimation

pub mod index;
pub mod scheduler;
pub mod wait_time;

pub use index::PriorityIndex;
pub use scheduler::{LongestWaiting, QueueScheduler, QueueStatus};
pub use wait_time::{SituationTimes, WaitTimePolicy};
