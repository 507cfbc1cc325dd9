use crate::error::ConfigError;

/// Server-side tuning. All durations in milliseconds.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation steps per second.
    pub tick_rate: u32,
    /// How many snapshots the ring retains for lag compensation.
    pub snapshot_history_size: usize,
    /// Upper bound on how far back action validation may rewind.
    pub max_rewind_ms: i64,
    /// Interval between clock-sync requests; 0 disables the protocol.
    pub clock_sync_interval_ms: i64,
    /// Ticks of interpolation delay the server assumes clients apply,
    /// used when a client has not reported otherwise.
    pub interpolation_ticks: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            snapshot_history_size: 180,
            max_rewind_ms: 200,
            clock_sync_interval_ms: 5000,
            interpolation_ticks: 2,
        }
    }
}

impl ServerConfig {
    /// Fixed simulation delta. Server and client must agree on this value;
    /// it is the determinism linchpin.
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.tick_rate as f64
    }

    /// Interpolation delay assumed for clients that have not configured one.
    pub fn default_interpolation_delay_ms(&self) -> f64 {
        self.tick_interval_ms() * self.interpolation_ticks as f64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if self.snapshot_history_size == 0 {
            return Err(ConfigError::SnapshotHistorySize(self.snapshot_history_size));
        }
        if self.max_rewind_ms < 0 {
            return Err(ConfigError::MaxRewind(self.max_rewind_ms));
        }
        Ok(())
    }
}

/// Adaptive spectator-buffer sizing. The multiplier scales measured tick lag
/// into a target queue length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdaptiveSmoothing {
    Off,
    VeryLow,
    Low,
    #[default]
    Moderate,
    High,
    VeryHigh,
}

impl AdaptiveSmoothing {
    pub fn multiplier(&self) -> Option<f32> {
        match self {
            AdaptiveSmoothing::Off => None,
            AdaptiveSmoothing::VeryLow => Some(0.45),
            AdaptiveSmoothing::Low => Some(0.8),
            AdaptiveSmoothing::Moderate => Some(1.05),
            AdaptiveSmoothing::High => Some(1.25),
            AdaptiveSmoothing::VeryHigh => Some(1.5),
        }
    }
}

/// Client-side tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Must match the server's rate; drives the fixed prediction delta.
    pub tick_rate: u32,
    /// How far in the past remote entities are rendered. `None` derives
    /// two tick intervals.
    pub interpolation_delay_ms: Option<f64>,
    /// Target queue length for the local player's smoother.
    pub owner_interpolation: u32,
    /// Baseline target queue length for remote-player smoothers.
    pub spectator_interpolation: u32,
    /// Adaptive sizing of spectator buffers from measured tick lag.
    pub adaptive_smoothing: AdaptiveSmoothing,
    /// Euclidean distance beyond which the smoother snaps instead of
    /// interpolating.
    pub teleport_threshold: f32,
    /// Entries a smoother queue may hold beyond its interpolation target.
    pub max_over_buffer: usize,
    pub enable_extrapolation: bool,
    /// `None` derives two tick intervals.
    pub max_extrapolation_ms: Option<f64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            interpolation_delay_ms: None,
            owner_interpolation: 1,
            spectator_interpolation: 2,
            adaptive_smoothing: AdaptiveSmoothing::Moderate,
            teleport_threshold: 100.0,
            max_over_buffer: 3,
            enable_extrapolation: true,
            max_extrapolation_ms: None,
        }
    }
}

impl ClientConfig {
    pub fn tick_interval_ms(&self) -> f64 {
        1000.0 / self.tick_rate as f64
    }

    pub fn interpolation_delay_ms(&self) -> f64 {
        self.interpolation_delay_ms
            .unwrap_or_else(|| self.tick_interval_ms() * 2.0)
    }

    pub fn max_extrapolation_ms(&self) -> f64 {
        if !self.enable_extrapolation {
            return 0.0;
        }
        self.max_extrapolation_ms
            .unwrap_or_else(|| self.tick_interval_ms() * 2.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if let Some(delay) = self.interpolation_delay_ms {
            if delay < 0.0 {
                return Err(ConfigError::InterpolationDelay(delay));
            }
        }
        if self.owner_interpolation == 0 {
            return Err(ConfigError::OwnerInterpolation(self.owner_interpolation));
        }
        if self.spectator_interpolation < 2 || self.spectator_interpolation > 255 {
            return Err(ConfigError::SpectatorInterpolation(
                self.spectator_interpolation,
            ));
        }
        Ok(())
    }
}
