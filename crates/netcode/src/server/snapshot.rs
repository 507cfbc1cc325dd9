use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::game::ClientId;

/// Authoritative world state at one tick, as broadcast to every client.
///
/// `input_acks` carries, per client, the highest input seq incorporated
/// into `state`. Snapshots cross the server/client boundary by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<W> {
    pub tick: u64,
    /// Server wall clock at snapshot creation, milliseconds.
    pub timestamp_ms: i64,
    pub state: W,
    pub input_acks: HashMap<ClientId, u64>,
}

/// Bounded history of the most recent snapshots, strictly increasing in
/// tick. Broadcast source and lag-compensation lookup structure.
#[derive(Debug)]
pub struct SnapshotRing<W> {
    snapshots: VecDeque<Snapshot<W>>,
    capacity: usize,
}

impl<W> SnapshotRing<W> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "snapshot ring capacity must be positive");
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append the newest snapshot, evicting the oldest beyond capacity.
    /// Out-of-order pushes are rejected; the ring is append-only in tick.
    pub fn push(&mut self, snapshot: Snapshot<W>) {
        if let Some(last) = self.snapshots.back() {
            if snapshot.tick <= last.tick {
                log::warn!(
                    "snapshot ring rejected tick {} (latest is {})",
                    snapshot.tick,
                    last.tick
                );
                return;
            }
        }
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<&Snapshot<W>> {
        self.snapshots.back()
    }

    pub fn oldest(&self) -> Option<&Snapshot<W>> {
        self.snapshots.front()
    }

    pub fn get_by_tick(&self, tick: u64) -> Option<&Snapshot<W>> {
        // Ticks are contiguous, so the offset from the front is direct.
        let front = self.snapshots.front()?.tick;
        if tick < front {
            return None;
        }
        self.snapshots.get((tick - front) as usize)
    }

    /// The two stored snapshots bracketing `timestamp_ms`, with the blend
    /// factor between them. Clamps to the oldest or newest when the
    /// timestamp falls outside the retained window.
    pub fn bracketing(&self, timestamp_ms: i64) -> Option<(&Snapshot<W>, &Snapshot<W>, f64)> {
        let oldest = self.snapshots.front()?;
        let newest = self.snapshots.back()?;

        if timestamp_ms <= oldest.timestamp_ms {
            return Some((oldest, oldest, 0.0));
        }
        if timestamp_ms >= newest.timestamp_ms {
            return Some((newest, newest, 0.0));
        }

        let idx = self
            .snapshots
            .partition_point(|s| s.timestamp_ms <= timestamp_ms);
        let from = &self.snapshots[idx - 1];
        let to = &self.snapshots[idx];
        let span = (to.timestamp_ms - from.timestamp_ms) as f64;
        let t = if span > 0.0 {
            (timestamp_ms - from.timestamp_ms) as f64 / span
        } else {
            0.0
        };
        Some((from, to, t))
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
