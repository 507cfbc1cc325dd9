use std::collections::VecDeque;

use glam::Vec2;

/// What the renderer draws: decoupled from physics state so corrections
/// and snaps never reach the screen directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    pub position: Vec2,
    pub rotation: Option<f32>,
    pub scale: Option<Vec2>,
}

impl RenderTransform {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            rotation: None,
            scale: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherMode {
    /// Local player: minimal buffering for responsiveness.
    Owner,
    /// Remote player: deeper adaptive buffer to absorb jitter, with
    /// extrapolation when the buffer runs dry.
    Spectator,
}

/// Tuning shared by every smoother a client creates.
#[derive(Debug, Clone, Copy)]
pub struct SmootherParams {
    pub tick_interval_ms: f32,
    /// Target queue length.
    pub interpolation: u32,
    pub teleport_threshold: f32,
    pub max_over_buffer: usize,
    /// Spectators only; owners never extrapolate.
    pub extrapolation_budget_ms: f32,
    /// Scales measured tick lag into the spectator buffer target;
    /// `None` disables adaptation.
    pub adaptive_multiplier: Option<f32>,
}

const MULTIPLIER_MIN: f32 = 0.95;
const MULTIPLIER_MAX: f32 = 1.05;
const MULTIPLIER_STEP: f32 = 0.015;
const ADAPTIVE_MIN: u32 = 2;
const ADAPTIVE_MAX: u32 = 255;

/// Per-entity render smoothing over a bounded tick-keyed queue of targets.
///
/// Physics state snaps (reconciliation installs corrected positions
/// outright); the smoother walks the rendered transform toward each queued
/// target at a calculated per-millisecond rate, stretching or compressing
/// playback with a small movement multiplier to keep the queue near its
/// target depth.
///
/// Queue keys are *input seqs* for owners and *server ticks* for
/// spectators. Mixing the two spaces makes corrections silently miss.
#[derive(Debug)]
pub struct TickSmoother {
    mode: SmootherMode,
    params: SmootherParams,
    interpolation: u32,
    current: RenderTransform,
    queue: VecDeque<(u64, RenderTransform)>,
    /// Tick of the entry currently being moved toward.
    moving_toward: Option<u64>,
    move_rate: Vec2,
    rotation_rate: f32,
    scale_rate: Vec2,
    time_remaining_ms: f32,
    multiplier: f32,
    last_processed_tick: Option<u64>,
    teleported_tick: Option<u64>,
    extrapolation_used_ms: f32,
}

impl TickSmoother {
    pub fn new(mode: SmootherMode, initial: RenderTransform, params: SmootherParams) -> Self {
        Self {
            mode,
            interpolation: params.interpolation.max(1),
            params,
            current: initial,
            queue: VecDeque::new(),
            moving_toward: None,
            move_rate: Vec2::ZERO,
            rotation_rate: 0.0,
            scale_rate: Vec2::ZERO,
            time_remaining_ms: 0.0,
            multiplier: 1.0,
            last_processed_tick: None,
            teleported_tick: None,
            extrapolation_used_ms: 0.0,
        }
    }

    pub fn owner(initial: RenderTransform, params: SmootherParams) -> Self {
        Self::new(SmootherMode::Owner, initial, params)
    }

    pub fn spectator(initial: RenderTransform, params: SmootherParams) -> Self {
        Self::new(SmootherMode::Spectator, initial, params)
    }

    /// Queue the post-tick transform for `tick`. Duplicates, ticks at or
    /// below the last consumed entry, and ticks from before a teleport are
    /// ignored.
    pub fn on_post_tick(&mut self, tick: u64, transform: RenderTransform) {
        if self.teleported_tick.is_some_and(|t| tick <= t) {
            return;
        }
        if self.last_processed_tick.is_some_and(|t| tick <= t) {
            return;
        }

        let idx = self.queue.partition_point(|(t, _)| *t < tick);
        if self.queue.get(idx).is_some_and(|(t, _)| *t == tick) {
            return;
        }
        self.queue.insert(idx, (tick, transform));
        self.extrapolation_used_ms = 0.0;

        self.adjust_multiplier();

        let limit = self.interpolation as usize + self.params.max_over_buffer;
        while self.queue.len() > limit {
            self.queue.pop_front();
        }

        if self.moving_toward != self.queue.front().map(|(t, _)| *t) {
            self.recalculate();
        }
    }

    /// Advance the rendered transform. Overshoot past a reached target
    /// carries into the next queue entry within the same call.
    pub fn smoothed_transform(&mut self, delta_ms: f32) -> RenderTransform {
        let mut budget = delta_ms.max(0.0) * self.multiplier;

        loop {
            if self.moving_toward.is_none() {
                self.extrapolate(budget);
                break;
            }

            if budget < self.time_remaining_ms {
                self.advance(budget);
                self.time_remaining_ms -= budget;
                break;
            }

            // Reached: snap exactly onto the target, consume it, keep the
            // leftover time for the next entry.
            budget -= self.time_remaining_ms;
            let (tick, target) = self.queue.pop_front().expect("target present while moving");
            self.current = target;
            self.last_processed_tick = Some(tick);
            self.recalculate();
        }

        self.current
    }

    /// Rewrite queued targets after a reconciliation correction.
    ///
    /// The correction delta measured at `tick`'s entry is distributed over
    /// the queue with weight `(i / (len − 2))^(len − i)`: near-term entries
    /// barely move, the tail takes the full correction. Returns `false`
    /// when `tick` is not queued; the visual smooth for that correction is
    /// lost but nothing else is affected.
    pub fn ease_correction(&mut self, tick: u64, corrected: RenderTransform) -> bool {
        let Some(found) = self.queue.iter().position(|(t, _)| *t == tick) else {
            return false;
        };
        let delta = corrected.position - self.queue[found].1.position;

        let len = self.queue.len();
        for (i, (_, entry)) in self.queue.iter_mut().enumerate() {
            let weight = if len <= 2 {
                1.0
            } else {
                let base = i as f32 / (len - 2) as f32;
                base.powi((len - i) as i32).clamp(0.0, 1.0)
            };
            entry.position += delta * weight;
        }

        // Keep flight timing, re-aim at the (possibly moved) head.
        if self.time_remaining_ms > 0.0 {
            if let Some((_, head)) = self.queue.front() {
                self.move_rate = (head.position - self.current.position) / self.time_remaining_ms;
            }
        }
        true
    }

    /// Snap instantly and drop everything queued. In-flight entries with
    /// ticks at or below `tick` that arrive later are ignored.
    pub fn teleport(&mut self, tick: u64, transform: RenderTransform) {
        log::debug!("smoother teleport at tick {tick}");
        self.current = transform;
        self.queue.clear();
        self.moving_toward = None;
        self.move_rate = Vec2::ZERO;
        self.rotation_rate = 0.0;
        self.scale_rate = Vec2::ZERO;
        self.time_remaining_ms = 0.0;
        self.multiplier = 1.0;
        self.extrapolation_used_ms = 0.0;
        self.teleported_tick = Some(tick);
        self.last_processed_tick = Some(
            self.last_processed_tick
                .map_or(tick, |last| last.max(tick)),
        );
    }

    /// Feed the measured tick lag (how far this entity's updates trail the
    /// newest server tick) into the spectator buffer target.
    pub fn update_tick_lag(&mut self, lag_ticks: f32) {
        if self.mode != SmootherMode::Spectator {
            return;
        }
        let Some(multiplier) = self.params.adaptive_multiplier else {
            return;
        };
        let target = (lag_ticks * multiplier).round() as i64;
        self.interpolation = target.clamp(ADAPTIVE_MIN as i64, ADAPTIVE_MAX as i64) as u32;
    }

    fn adjust_multiplier(&mut self) {
        let error = self.queue.len() as f32 - self.interpolation as f32;
        if error == 0.0 {
            self.multiplier = 1.0;
        } else {
            self.multiplier =
                (self.multiplier + MULTIPLIER_STEP * error).clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
        }
    }

    /// Aim at the head of the queue, snapping outright past the teleport
    /// threshold.
    fn recalculate(&mut self) {
        loop {
            let Some(&(tick, target)) = self.queue.front() else {
                self.moving_toward = None;
                self.time_remaining_ms = 0.0;
                return;
            };

            let offset = target.position - self.current.position;
            if offset.length() > self.params.teleport_threshold {
                self.queue.pop_front();
                self.current = target;
                self.last_processed_tick = Some(tick);
                continue;
            }

            let duration = self.params.tick_interval_ms.max(f32::EPSILON);
            self.moving_toward = Some(tick);
            self.time_remaining_ms = duration;
            self.move_rate = offset / duration;
            self.rotation_rate = match (self.current.rotation, target.rotation) {
                (Some(a), Some(b)) => (b - a) / duration,
                _ => 0.0,
            };
            self.scale_rate = match (self.current.scale, target.scale) {
                (Some(a), Some(b)) => (b - a) / duration,
                _ => Vec2::ZERO,
            };
            return;
        }
    }

    fn advance(&mut self, step_ms: f32) {
        self.current.position += self.move_rate * step_ms;
        if let Some(rotation) = self.current.rotation.as_mut() {
            *rotation += self.rotation_rate * step_ms;
        }
        if let Some(scale) = self.current.scale.as_mut() {
            *scale += self.scale_rate * step_ms;
        }
    }

    /// Queue ran dry: spectators coast on the last rate for a bounded
    /// time, then hold. Owners hold immediately.
    fn extrapolate(&mut self, step_ms: f32) {
        if self.mode != SmootherMode::Spectator {
            return;
        }
        let left = self.params.extrapolation_budget_ms - self.extrapolation_used_ms;
        if left <= 0.0 {
            return;
        }
        let step = step_ms.min(left);
        self.current.position += self.move_rate * step;
        self.extrapolation_used_ms += step;
    }

    pub fn mode(&self) -> SmootherMode {
        self.mode
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn interpolation(&self) -> u32 {
        self.interpolation
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn current(&self) -> RenderTransform {
        self.current
    }
}
