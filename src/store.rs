//! Local durable store for finalized counts.

mod local;
mod models;
mod schema;

pub use local::LocalStore;
pub use models::{ClaimedBatch, HumanResult, ResultRow, TrafficResult};
pub use schema::SCHEMA_VERSION;
