use serde::Serialize;

use crate::error::ChannelResult;

/// Outbound message channel to the cloud broker.
///
/// Implementations must be callable from any thread and must not block
/// for longer than one network round trip.
pub trait CloudChannel: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> ChannelResult<()>;

    fn is_connected(&self) -> bool;
}

/// Blob storage for captured images.
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key` and return the resulting location.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> ChannelResult<String>;
}

/// Serialize `value` as JSON and publish it.
pub fn publish_json<T: Serialize + ?Sized>(
    channel: &dyn CloudChannel,
    topic: &str,
    value: &T,
) -> ChannelResult<()> {
    let payload = serde_json::to_vec(value)?;
    channel.publish(topic, &payload)
}
