/// Construction-time configuration failures. These are the only errors the
/// library surfaces as `Result`; runtime protocol violations are dropped
/// silently and counted instead (see [`crate::metrics::ServerMetrics`]).
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("tick_rate must be positive, got {0}")]
    TickRate(u32),
    #[error("snapshot_history_size must be a positive integer, got {0}")]
    SnapshotHistorySize(usize),
    #[error("max_rewind_ms must be non-negative, got {0}")]
    MaxRewind(i64),
    #[error("interpolation_delay_ms must be non-negative, got {0}")]
    InterpolationDelay(f64),
    #[error("owner_interpolation must be at least 1, got {0}")]
    OwnerInterpolation(u32),
    #[error("spectator_interpolation must be in [2, 255], got {0}")]
    SpectatorInterpolation(u32),
}

/// Why an inbound message was discarded. Carried by the drop counters and
/// debug logs; never propagated to the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NegativeSeq,
    NegativeTimestamp,
    StaleTimestamp,
    DuplicateSeq,
    UnknownClient,
    AckedSeq,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NegativeSeq => "negative sequence number",
            DropReason::NegativeTimestamp => "negative timestamp",
            DropReason::StaleTimestamp => "timestamp older than last processed input",
            DropReason::DuplicateSeq => "duplicate sequence number",
            DropReason::UnknownClient => "message from unregistered client",
            DropReason::AckedSeq => "sequence number already acknowledged",
        }
    }
}
