//! Persisted count rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::counter::CountEvent;
use crate::detection::CountLabel;
use crate::error::StoreResult;

/// One finalized person count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanResult {
    pub id: Uuid,
    pub from_zone: String,
    pub to_zone: String,
    pub gender: String,
    pub age: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub is_synced: bool,
    #[serde(skip)]
    pub is_processing: bool,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub last_updated: DateTime<Utc>,
}

/// One finalized vehicle count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficResult {
    pub id: Uuid,
    pub from_zone: String,
    pub to_zone: String,
    pub vehicle_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub is_synced: bool,
    #[serde(skip)]
    pub is_processing: bool,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultRow {
    Human(HumanResult),
    Traffic(TrafficResult),
}

impl ResultRow {
    /// Build a fresh, unsynced row for a finalized count.
    pub fn from_event(event: &CountEvent, now: DateTime<Utc>) -> StoreResult<Self> {
        let from_zone = event.from_zone.to_string();
        let to_zone = event.to_zone.to_string();
        let row = match event.class_label.parse::<CountLabel>()? {
            CountLabel::Human { gender, age } => ResultRow::Human(HumanResult {
                id: Uuid::new_v4(),
                from_zone,
                to_zone,
                gender,
                age,
                timestamp: now,
                is_synced: false,
                is_processing: false,
                created_at: now,
                last_updated: now,
            }),
            CountLabel::Traffic { vehicle_type } => ResultRow::Traffic(TrafficResult {
                id: Uuid::new_v4(),
                from_zone,
                to_zone,
                vehicle_type,
                timestamp: now,
                is_synced: false,
                is_processing: false,
                created_at: now,
                last_updated: now,
            }),
        };
        Ok(row)
    }

    pub fn id(&self) -> Uuid {
        match self {
            ResultRow::Human(r) => r.id,
            ResultRow::Traffic(r) => r.id,
        }
    }
}

/// Rows claimed for one sync batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimedBatch {
    pub human: Vec<HumanResult>,
    pub traffic: Vec<TrafficResult>,
}

impl ClaimedBatch {
    pub fn len(&self) -> usize {
        self.human.len() + self.traffic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.human.is_empty() && self.traffic.is_empty()
    }

    pub fn human_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.human.iter().map(|r| r.id)
    }

    pub fn traffic_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.traffic.iter().map(|r| r.id)
    }
}
