/// Lifecycle of a per-class track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Started from an unmatched detection, not yet confirmed
    #[default]
    Tentative,
    /// Matched on enough frames to be reported
    Confirmed,
    /// Scheduled for removal
    Deleted,
}
