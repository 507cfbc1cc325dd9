use std::collections::VecDeque;

use glam::Vec2;

/// One authoritative sample of a remote entity, keyed by server wall time.
#[derive(Debug, Clone, Copy)]
struct Sample {
    timestamp_ms: f64,
    position: Vec2,
}

/// Render-time smoothing for remote entities, for games that keep the
/// classic delayed-interpolation model instead of a tick smoother.
///
/// Samples are indexed by server wall timestamp; the render clock runs
/// `delay_ms` in the past and lerps between the two samples bracketing it.
/// Slightly ahead of the newest sample it extrapolates from the last
/// observed velocity, up to a budget; beyond that it holds.
#[derive(Debug)]
pub struct InterpolationBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    delay_ms: f64,
    extrapolation_budget_ms: f64,
}

impl InterpolationBuffer {
    pub fn new(capacity: usize, delay_ms: f64, extrapolation_budget_ms: f64) -> Self {
        assert!(capacity >= 2, "need at least two samples to interpolate");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            delay_ms,
            extrapolation_budget_ms,
        }
    }

    /// Record a sample. Out-of-order timestamps are inserted in place;
    /// duplicates overwrite.
    pub fn push(&mut self, timestamp_ms: f64, position: Vec2) {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp_ms < timestamp_ms);
        if let Some(existing) = self
            .samples
            .get_mut(idx)
            .filter(|s| s.timestamp_ms == timestamp_ms)
        {
            existing.position = position;
            return;
        }
        self.samples.insert(
            idx,
            Sample {
                timestamp_ms,
                position,
            },
        );
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Position at render time `now_ms − delay_ms`, or `None` before any
    /// sample arrived.
    pub fn sample(&self, now_ms: f64) -> Option<Vec2> {
        let render_time = now_ms - self.delay_ms;
        let newest = self.samples.back()?;
        let oldest = self.samples.front()?;

        if render_time <= oldest.timestamp_ms {
            return Some(oldest.position);
        }

        if render_time < newest.timestamp_ms {
            let idx = self
                .samples
                .partition_point(|s| s.timestamp_ms <= render_time);
            let from = &self.samples[idx - 1];
            let to = &self.samples[idx];
            let span = to.timestamp_ms - from.timestamp_ms;
            let t = if span > 0.0 {
                ((render_time - from.timestamp_ms) / span) as f32
            } else {
                0.0
            };
            return Some(from.position.lerp(to.position, t));
        }

        // Past the newest sample: extrapolate from the last velocity while
        // the budget lasts, then hold.
        let overshoot = render_time - newest.timestamp_ms;
        if overshoot > self.extrapolation_budget_ms || self.samples.len() < 2 {
            return Some(newest.position);
        }
        let prev = &self.samples[self.samples.len() - 2];
        let span = newest.timestamp_ms - prev.timestamp_ms;
        if span <= 0.0 {
            return Some(newest.position);
        }
        let velocity = (newest.position - prev.position) / span as f32;
        Some(newest.position + velocity * overshoot as f32)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
