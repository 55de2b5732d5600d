//! Cloud-facing collaborators: outbound channel, object store, inbound commands.

mod cloud;
mod command;
mod inbox;
mod spool;
mod status;
mod topics;

pub use cloud::{CloudChannel, ObjectStore, publish_json};
pub use command::{Command, CommandRouter, Routed};
pub use inbox::InboxWatcher;
pub use spool::{DirObjectStore, SpoolChannel, SpooledMessage};
pub(crate) use spool::write_atomic;
pub use status::{AppStatus, CaptureResponse, Outcome, Presence, ZoneUpdateStatus};
pub use topics::Topics;
