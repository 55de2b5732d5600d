//! Background upload of stored counts to the cloud channel.

mod backoff;
mod handler;
mod janitor;
mod message;

pub use backoff::Backoff;
pub use handler::{BatchSyncHandler, SyncConfig, SyncReport, SyncWorker};
pub use janitor::Janitor;
pub use message::SyncMessage;
