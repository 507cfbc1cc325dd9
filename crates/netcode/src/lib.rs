//! Server-authoritative netcode for deterministic tick-based games:
//! fixed-timestep simulation with per-client input queueing, client-side
//! prediction and reconciliation, tick-queue render smoothing, and
//! lag-compensated action validation.
//!
//! The game itself is a collaborator: supply a [`GameDefinition`] (the
//! simulation step, input merging, action validation) and a
//! [`PredictionScope`] (how much of the world the client re-simulates),
//! and the library keeps client prediction bit-identical to server
//! authority while absorbing jitter, loss and reordering.

pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod metrics;
pub mod protocol;
pub mod sim;

pub mod client;
pub mod server;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AdaptiveSmoothing, ClientConfig, ServerConfig};
pub use error::{ConfigError, DropReason};
pub use game::{ActionOutcome, ClientId, GameDefinition, PredictionScope, Timestamped};
pub use metrics::{ClientStats, ServerMetrics};
pub use protocol::{Address, ClientMessage, Outgoing, ServerMessage};
pub use sim::{DuplexLink, Lcg, LinkConfig, LinkStats, LossyLink};

pub use client::Client;
pub use client::input_buffer::{BufferedInput, InputBuffer};
pub use client::interpolation::InterpolationBuffer;
pub use client::prediction::Predictor;
pub use client::smoothing::{RenderTransform, SmootherMode, SmootherParams, TickSmoother};
pub use server::Server;
pub use server::input_queue::{InputQueue, QueuedInput};
pub use server::lag::{ClockSyncState, LagCompensator, PendingAction};
pub use server::runtime::{DriverCommand, DriverHandle};
pub use server::snapshot::{Snapshot, SnapshotRing};
