use std::collections::VecDeque;

use crate::error::DropReason;

/// One sequenced input waiting for the next tick.
#[derive(Debug, Clone)]
pub struct QueuedInput<I> {
    pub seq: u64,
    pub input: I,
    /// Server wall clock at receipt; diagnostic only.
    pub receive_time_ms: i64,
}

/// Per-client FIFO of sequenced inputs. Kept sorted by seq on insert so a
/// drain hands the simulator inputs in capture order regardless of arrival
/// order; equal seqs deduplicate silently.
#[derive(Debug)]
pub struct InputQueue<I> {
    entries: VecDeque<QueuedInput<I>>,
    /// Highest seq ever drained; anything at or below is a straggler.
    acked_seq: Option<u64>,
}

impl<I> Default for InputQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> InputQueue<I> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            acked_seq: None,
        }
    }

    /// Insert keeping seq order. Returns the reason when the entry was
    /// discarded instead.
    pub fn enqueue(&mut self, seq: u64, input: I, receive_time_ms: i64) -> Option<DropReason> {
        if self.acked_seq.is_some_and(|acked| seq <= acked) {
            return Some(DropReason::AckedSeq);
        }

        let idx = self.entries.partition_point(|e| e.seq < seq);
        if self.entries.get(idx).is_some_and(|e| e.seq == seq) {
            return Some(DropReason::DuplicateSeq);
        }

        self.entries.insert(
            idx,
            QueuedInput {
                seq,
                input,
                receive_time_ms,
            },
        );
        None
    }

    /// Remove and return every pending input in seq order, recording the
    /// highest seq as acknowledged.
    pub fn drain_sorted(&mut self) -> Vec<QueuedInput<I>> {
        let drained: Vec<_> = self.entries.drain(..).collect();
        if let Some(last) = drained.last() {
            self.acked_seq = Some(last.seq);
        }
        drained
    }

    /// Discard stragglers at or below `through_seq` and raise the ack
    /// floor.
    pub fn acknowledge(&mut self, through_seq: u64) {
        while self.entries.front().is_some_and(|e| e.seq <= through_seq) {
            self.entries.pop_front();
        }
        if self.acked_seq.is_none_or(|acked| through_seq > acked) {
            self.acked_seq = Some(through_seq);
        }
    }

    /// Highest seq incorporated so far, if any input was ever drained.
    pub fn acked_seq(&self) -> Option<u64> {
        self.acked_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
