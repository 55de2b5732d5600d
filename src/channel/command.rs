//! Inbound commands and the network-callback side of the command queue.

use crossbeam_channel::{Sender, TrySendError};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::lifecycle::DropCounter;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// New zone list (JSON text) from a shadow delta.
    UpdateZones {
        content: String,
        message_id: Option<String>,
        version: Option<u64>,
    },
    CaptureImage {
        message_id: String,
    },
}

impl Command {
    /// Parse a broker payload.
    ///
    /// Accepted shapes:
    /// `{"command": "capture_image", "messageId": ".."}` and shadow deltas
    /// carrying `xlines_cfg_content`, either at the top level or under
    /// `state`. The zone content may be a JSON string or an inline array.
    pub fn parse(payload: &[u8]) -> ChannelResult<Self> {
        let root: Value = serde_json::from_slice(payload)?;
        if !root.is_object() {
            return Err(ChannelError::Malformed("payload is not an object".into()));
        }

        if let Some(command) = root.get("command").and_then(Value::as_str) {
            return match command {
                "capture_image" => {
                    let message_id = string_field(&root, &["messageId", "message_id"])
                        .ok_or_else(|| ChannelError::Malformed("capture_image without messageId".into()))?;
                    Ok(Command::CaptureImage { message_id })
                }
                other => Err(ChannelError::Malformed(format!("unknown command {:?}", other))),
            };
        }

        let state = root.get("state").filter(|s| s.is_object()).unwrap_or(&root);
        let content = match state.get("xlines_cfg_content") {
            Some(Value::String(text)) => text.clone(),
            Some(inline @ (Value::Array(_) | Value::Object(_))) => inline.to_string(),
            Some(_) => return Err(ChannelError::Malformed("xlines_cfg_content has wrong type".into())),
            None => return Err(ChannelError::Malformed("no recognized command".into())),
        };
        let message_id = string_field(state, &["message_id", "messageId"])
            .or_else(|| string_field(&root, &["message_id", "messageId"]));
        let version = root
            .get("version")
            .or_else(|| state.get("version"))
            .and_then(Value::as_u64);

        Ok(Command::UpdateZones {
            content,
            message_id,
            version,
        })
    }
}

fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| value.get(*name).and_then(Value::as_str))
        .map(str::to_string)
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Queued,
    /// Not a command; retrying will not help.
    Malformed,
    /// Command queue full; the same payload may be offered again later.
    Busy,
    /// Worker gone.
    Closed,
}

impl Routed {
    pub fn is_queued(self) -> bool {
        self == Routed::Queued
    }
}

/// Entry point for broker callbacks. Never blocks: commands are handed to
/// the worker thread through a bounded queue and dropped when it is full.
pub struct CommandRouter {
    tx: Sender<Command>,
    dropped: DropCounter,
}

impl CommandRouter {
    pub fn new(tx: Sender<Command>) -> Self {
        Self {
            tx,
            dropped: DropCounter::default(),
        }
    }

    pub fn on_message(&self, topic: &str, payload: &[u8]) -> Routed {
        let command = match Command::parse(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(topic, "Ignoring malformed command: {}", e);
                return Routed::Malformed;
            }
        };
        debug!(topic, ?command, "Command received");
        match self.tx.try_send(command) {
            Ok(()) => Routed::Queued,
            Err(TrySendError::Full(_)) => {
                if let Some(total) = self.dropped.record() {
                    warn!(topic, total, "Command queue full, command dropped");
                }
                Routed::Busy
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(topic, "Command queue closed, command dropped");
                Routed::Closed
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.total()
    }
}
