use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{ClaimedBatch, HumanResult, TrafficResult};

/// Wire form of one sync batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub batch_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub batch_num: u64,
    pub record_count: usize,
    pub human_data: Vec<HumanResult>,
    pub traffic_data: Vec<TrafficResult>,
}

impl SyncMessage {
    pub fn from_batch(batch: &ClaimedBatch, batch_num: u64, now: DateTime<Utc>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            timestamp: now,
            batch_num,
            record_count: batch.len(),
            human_data: batch.human.clone(),
            traffic_data: batch.traffic.clone(),
        }
    }
}
