//! Shared helpers with no kernel dependencies.

pub mod env;

use uuid::Uuid;

/// Time-ordered job id. V7 UUIDs sort by creation time, which the queue's
/// FIFO tie-break relies on.
pub fn new_job_id() -> Uuid {
    Uuid::now_v7()
}
