//! Deterministic network-condition harness for tests.
//!
//! Wraps one direction of a message channel with configurable latency,
//! jitter, loss (with bursts), reordering and duplication, all driven by a
//! seeded PRNG and a simulated clock: identical seeds and tick schedules
//! reproduce identical traces.

/// Linear-congruential generator. Small, portable, and deterministic
/// across platforms, which is all the harness needs.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    const MUL: u64 = 6364136223846793005;
    const INC: u64 = 1442695040888963407;

    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_mul(Self::MUL).wrapping_add(Self::INC),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(Self::MUL)
            .wrapping_add(Self::INC);
        self.state
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.next_f64() < probability
    }
}

/// Conditions applied to one direction of traffic.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub latency_ms: f64,
    /// Uniform jitter in `±jitter_ms` around the mean latency.
    pub jitter_ms: f64,
    /// Per-message drop probability in `[0, 1]`.
    pub loss: f64,
    /// When a drop fires, how many consecutive messages it takes down.
    pub burst_len: u32,
    pub reorder: f64,
    pub duplicate: f64,
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0.0,
            jitter_ms: 0.0,
            loss: 0.0,
            burst_len: 1,
            reorder: 0.0,
            duplicate: 0.0,
            seed: 1,
        }
    }
}

/// Delivery counters for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

#[derive(Debug)]
struct InFlight<M> {
    deliver_at_ms: f64,
    send_order: u64,
    message: M,
}

/// One direction of a lossy channel over simulated time. Call
/// [`send`](LossyLink::send) as messages leave the sender and
/// [`tick`](LossyLink::tick) to advance time and collect what arrives.
#[derive(Debug)]
pub struct LossyLink<M> {
    config: LinkConfig,
    rng: Lcg,
    now_ms: f64,
    in_flight: Vec<InFlight<M>>,
    next_send_order: u64,
    last_delivered_order: Option<u64>,
    burst_remaining: u32,
    stats: LinkStats,
}

impl<M: Clone> LossyLink<M> {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            rng: Lcg::new(config.seed),
            config,
            now_ms: 0.0,
            in_flight: Vec::new(),
            next_send_order: 0,
            last_delivered_order: None,
            burst_remaining: 0,
            stats: LinkStats::default(),
        }
    }

    pub fn send(&mut self, message: M) {
        self.stats.sent += 1;

        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            self.stats.dropped += 1;
            return;
        }
        if self.rng.chance(self.config.loss) {
            self.stats.dropped += 1;
            self.burst_remaining = self.config.burst_len.saturating_sub(1);
            return;
        }

        let jitter = self.config.jitter_ms * (2.0 * self.rng.next_f64() - 1.0);
        let mut delay = (self.config.latency_ms + jitter).max(0.0);
        if self.rng.chance(self.config.reorder) {
            // Push it behind traffic sent shortly after.
            delay += self.config.latency_ms * 0.5 + self.config.jitter_ms + 1.0;
        }

        let deliver_at_ms = self.now_ms + delay;
        self.enqueue(deliver_at_ms, message.clone());

        if self.rng.chance(self.config.duplicate) {
            self.stats.duplicated += 1;
            self.enqueue(deliver_at_ms + 1.0 + self.config.jitter_ms, message);
        }
    }

    fn enqueue(&mut self, deliver_at_ms: f64, message: M) {
        let send_order = self.next_send_order;
        self.next_send_order += 1;
        self.in_flight.push(InFlight {
            deliver_at_ms,
            send_order,
            message,
        });
    }

    /// Advance simulated time and return everything now due, in delivery
    /// order (arrival time, then send order for ties).
    pub fn tick(&mut self, delta_ms: f64) -> Vec<M> {
        self.now_ms += delta_ms.max(0.0);

        let mut due: Vec<InFlight<M>> = Vec::new();
        let mut still_flying = Vec::with_capacity(self.in_flight.len());
        for entry in self.in_flight.drain(..) {
            if entry.deliver_at_ms <= self.now_ms {
                due.push(entry);
            } else {
                still_flying.push(entry);
            }
        }
        self.in_flight = still_flying;

        due.sort_by(|a, b| {
            a.deliver_at_ms
                .total_cmp(&b.deliver_at_ms)
                .then(a.send_order.cmp(&b.send_order))
        });

        let mut delivered = Vec::with_capacity(due.len());
        for entry in due {
            if self
                .last_delivered_order
                .is_some_and(|last| entry.send_order < last)
            {
                self.stats.reordered += 1;
            } else {
                self.last_delivered_order = Some(entry.send_order);
            }
            self.stats.delivered += 1;
            delivered.push(entry.message);
        }
        delivered
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}

/// Both directions of a client/server pair under simulated conditions.
#[derive(Debug)]
pub struct DuplexLink<C, S> {
    pub to_server: LossyLink<C>,
    pub to_client: LossyLink<S>,
}

impl<C: Clone, S: Clone> DuplexLink<C, S> {
    pub fn new(config: LinkConfig) -> Self {
        let mut reverse = config.clone();
        // Decorrelate the directions while keeping both seeded.
        reverse.seed = config.seed.wrapping_add(0x9e3779b97f4a7c15);
        Self {
            to_server: LossyLink::new(config),
            to_client: LossyLink::new(reverse),
        }
    }

    /// Advance both directions, returning (client→server, server→client)
    /// deliveries.
    pub fn tick(&mut self, delta_ms: f64) -> (Vec<C>, Vec<S>) {
        (
            self.to_server.tick(delta_ms),
            self.to_client.tick(delta_ms),
        )
    }
}
