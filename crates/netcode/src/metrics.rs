use crate::error::DropReason;

/// Counters for traffic the server discarded without surfacing an error.
/// Protocol violations must never reach the simulation; they land here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerMetrics {
    pub invalid_inputs: u64,
    pub invalid_actions: u64,
    pub stale_inputs: u64,
    pub duplicate_inputs: u64,
    pub unknown_client_messages: u64,
    pub ticks: u64,
    pub snapshots_broadcast: u64,
    pub actions_validated: u64,
}

impl ServerMetrics {
    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::NegativeSeq | DropReason::NegativeTimestamp => self.invalid_inputs += 1,
            DropReason::StaleTimestamp | DropReason::AckedSeq => self.stale_inputs += 1,
            DropReason::DuplicateSeq => self.duplicate_inputs += 1,
            DropReason::UnknownClient => self.unknown_client_messages += 1,
        }
    }

    pub fn total_dropped(&self) -> u64 {
        self.invalid_inputs
            + self.invalid_actions
            + self.stale_inputs
            + self.duplicate_inputs
            + self.unknown_client_messages
    }
}

/// Client-side bookkeeping, exposed for debug overlays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub snapshots_received: u64,
    pub stale_snapshots: u64,
    pub replays_run: u64,
    pub misaligned_acks: u64,
    pub last_acked_seq: Option<u64>,
    pub last_server_tick: u64,
}
