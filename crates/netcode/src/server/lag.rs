use std::collections::{HashMap, VecDeque};

use crate::game::{ClientId, GameDefinition};
use crate::server::snapshot::SnapshotRing;

/// EWMA factor for the smoothed RTT diagnostic.
const RTT_ALPHA: f64 = 0.125;

/// Per-client clock relationship, maintained by the ping/pong sync
/// protocol. `clock_offset_ms` estimates `serverTime − clientTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSyncState {
    pub clock_offset_ms: i64,
    pub rtt_ms: i64,
    /// EWMA-smoothed RTT, diagnostic only.
    pub smoothed_rtt_ms: f64,
    pub samples: u64,
}

impl ClockSyncState {
    fn record(&mut self, rtt_ms: i64, clock_offset_ms: i64) {
        self.rtt_ms = rtt_ms;
        self.clock_offset_ms = clock_offset_ms;
        if self.samples == 0 {
            self.smoothed_rtt_ms = rtt_ms as f64;
        } else {
            self.smoothed_rtt_ms =
                (1.0 - RTT_ALPHA) * self.smoothed_rtt_ms + RTT_ALPHA * rtt_ms as f64;
        }
        self.samples += 1;
    }
}

/// A discrete action waiting for the post-simulation validation pass.
#[derive(Debug, Clone)]
pub struct PendingAction<A> {
    pub seq: u64,
    pub action: A,
    pub client_timestamp: i64,
}

#[derive(Debug)]
struct CompensatorRecord<A> {
    sync: ClockSyncState,
    pending: VecDeque<PendingAction<A>>,
}

impl<A> Default for CompensatorRecord<A> {
    fn default() -> Self {
        Self {
            sync: ClockSyncState::default(),
            pending: VecDeque::new(),
        }
    }
}

/// Validates discrete actions against historical state.
///
/// Rewinding is read-only: the compensator reconstructs the world a client
/// was aiming at and hands it to the game's validator. Effects of a
/// successful action are applied to the live world by the caller, never to
/// history.
#[derive(Debug)]
pub struct LagCompensator<A> {
    max_rewind_ms: i64,
    interpolation_delay_ms: f64,
    clients: HashMap<ClientId, CompensatorRecord<A>>,
}

impl<A> LagCompensator<A> {
    pub fn new(max_rewind_ms: i64, interpolation_delay_ms: f64) -> Self {
        Self {
            max_rewind_ms,
            interpolation_delay_ms,
            clients: HashMap::new(),
        }
    }

    pub fn add_client(&mut self, id: ClientId) {
        self.clients.entry(id).or_default();
    }

    pub fn remove_client(&mut self, id: ClientId) {
        self.clients.remove(&id);
    }

    pub fn sync_state(&self, id: ClientId) -> Option<&ClockSyncState> {
        self.clients.get(&id).map(|record| &record.sync)
    }

    /// Record one completed clock-sync round trip.
    pub fn record_sync(&mut self, id: ClientId, rtt_ms: i64, clock_offset_ms: i64) {
        if let Some(record) = self.clients.get_mut(&id) {
            record.sync.record(rtt_ms, clock_offset_ms);
            log::debug!("{id} clock sync: offset={clock_offset_ms}ms rtt={rtt_ms}ms");
        }
    }

    /// Queue an action for the next validation pass. Unknown clients are
    /// ignored (their traffic is dropped at the server boundary).
    pub fn enqueue(&mut self, id: ClientId, action: PendingAction<A>) -> bool {
        match self.clients.get_mut(&id) {
            Some(record) => {
                record.pending.push_back(action);
                true
            }
            None => false,
        }
    }

    /// All queued actions in per-client FIFO order.
    pub fn drain_all(&mut self) -> Vec<(ClientId, PendingAction<A>)> {
        let mut drained = Vec::new();
        let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(record) = self.clients.get_mut(&id) {
                drained.extend(record.pending.drain(..).map(|action| (id, action)));
            }
        }
        drained
    }

    /// The server-time moment the client acted at, clamped to the rewind
    /// window. The interpolation delay is subtracted because the client
    /// aimed at a rendered (delayed) view of the world.
    pub fn intent_timestamp(&self, id: ClientId, client_timestamp: i64, now_ms: i64) -> i64 {
        let offset = self
            .clients
            .get(&id)
            .map_or(0, |record| record.sync.clock_offset_ms);
        let intent = client_timestamp + offset - self.interpolation_delay_ms as i64;
        intent.clamp(now_ms - self.max_rewind_ms, now_ms)
    }

    /// Reconstruct the world at `timestamp_ms` from the snapshot ring.
    /// Falls back to the live world when the ring is empty or the moment is
    /// newer than the newest snapshot.
    pub fn world_at<G>(
        &self,
        game: &G,
        ring: &SnapshotRing<G::World>,
        live: &G::World,
        timestamp_ms: i64,
    ) -> G::World
    where
        G: GameDefinition,
    {
        match ring.latest() {
            Some(newest) if timestamp_ms < newest.timestamp_ms => {
                match ring.bracketing(timestamp_ms) {
                    Some((from, to, t)) if t > 0.0 => {
                        game.interpolate_states(&from.state, &to.state, t)
                    }
                    Some((from, _, _)) => from.state.clone(),
                    None => live.clone(),
                }
            }
            _ => live.clone(),
        }
    }
}
