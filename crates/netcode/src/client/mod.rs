pub mod input_buffer;
pub mod interpolation;
pub mod prediction;
pub mod smoothing;

use std::collections::HashMap;

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::game::{ClientId, GameDefinition, PredictionScope, Timestamped};
use crate::metrics::ClientStats;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::server::snapshot::Snapshot;

use input_buffer::{BufferedInput, InputBuffer};
use prediction::Predictor;
use smoothing::{RenderTransform, SmootherParams, TickSmoother};

type WorldObserver<G> = Box<dyn FnMut(&<G as GameDefinition>::World) + Send>;
type ReplayObserver<G> = Box<dyn FnMut(u64, &<G as GameDefinition>::World) + Send>;
type PeerObserver = Box<dyn FnMut(ClientId) + Send>;
type ActionResultObserver<G> =
    Box<dyn FnMut(u64, bool, Option<&<G as GameDefinition>::ActionResult>, i64) + Send>;

/// The client-side endpoint: captures inputs into the predictor, rebases
/// on every snapshot, replays what the server has not yet seen, and keeps
/// per-entity render smoothers.
///
/// Single-threaded by design; a network receive thread should deposit
/// decoded messages into a queue and feed them to [`handle_message`] at
/// frame boundaries.
///
/// [`handle_message`]: Client::handle_message
pub struct Client<G: GameDefinition, S: PredictionScope<G>> {
    config: ClientConfig,
    clock: Box<dyn Clock>,
    local_id: ClientId,
    input_buffer: InputBuffer<G::Input>,
    predictor: Predictor<G, S>,
    smoothers: HashMap<u64, TickSmoother>,
    installed_tick: u64,
    latest_server_tick: u64,
    action_seq: u64,
    outbox: Vec<ClientMessage<G::Input, G::Action>>,
    stats: ClientStats,
    on_world_update: Option<WorldObserver<G>>,
    on_replay: Option<ReplayObserver<G>>,
    on_player_join: Option<PeerObserver>,
    on_player_leave: Option<PeerObserver>,
    on_action_result: Option<ActionResultObserver<G>>,
}

impl<G: GameDefinition, S: PredictionScope<G>> Client<G, S> {
    pub fn new(scope: S, local_id: ClientId, config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_clock(scope, local_id, config, Box::new(SystemClock))
    }

    pub fn with_clock(
        scope: S,
        local_id: ClientId,
        config: ClientConfig,
        clock: Box<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let predictor = Predictor::new(scope, local_id, config.tick_interval_ms());
        Ok(Self {
            config,
            clock,
            local_id,
            input_buffer: InputBuffer::new(),
            predictor,
            smoothers: HashMap::new(),
            installed_tick: 0,
            latest_server_tick: 0,
            action_seq: 0,
            outbox: Vec::new(),
            stats: ClientStats::default(),
            on_world_update: None,
            on_replay: None,
            on_player_join: None,
            on_player_leave: None,
            on_action_result: None,
        })
    }

    pub fn on_world_update(&mut self, f: impl FnMut(&G::World) + Send + 'static) {
        self.on_world_update = Some(Box::new(f));
    }

    /// Fired once per replayed input during reconciliation. The first
    /// argument is the replayed *input seq*, never a server tick.
    pub fn on_replay(&mut self, f: impl FnMut(u64, &G::World) + Send + 'static) {
        self.on_replay = Some(Box::new(f));
    }

    pub fn on_player_join(&mut self, f: impl FnMut(ClientId) + Send + 'static) {
        self.on_player_join = Some(Box::new(f));
    }

    pub fn on_player_leave(&mut self, f: impl FnMut(ClientId) + Send + 'static) {
        self.on_player_leave = Some(Box::new(f));
    }

    pub fn on_action_result(
        &mut self,
        f: impl FnMut(u64, bool, Option<&G::ActionResult>, i64) + Send + 'static,
    ) {
        self.on_action_result = Some(Box::new(f));
    }

    /// Register a locally captured input: assign its seq, predict it
    /// immediately, queue it for the server. Returns the assigned seq.
    pub fn capture_input(&mut self, input: G::Input) -> u64 {
        let timestamp = input.timestamp_ms();
        let seq = self.input_buffer.add(input.clone());
        self.predictor.apply_input(&input);
        self.outbox.push(ClientMessage::Input {
            seq: seq as i64,
            input,
            timestamp,
        });
        seq
    }

    /// Queue a discrete action stamped with the local wall clock, so the
    /// server can rewind to the moment of intent.
    pub fn send_action(&mut self, action: G::Action) -> u64 {
        let seq = self.action_seq;
        self.action_seq += 1;
        self.outbox.push(ClientMessage::Action {
            seq: seq as i64,
            action,
            client_timestamp: self.clock.now_ms(),
        });
        seq
    }

    /// Inbound message dispatch, one call per decoded message.
    pub fn handle_message(&mut self, message: ServerMessage<G::World, G::ActionResult>) {
        match message {
            ServerMessage::Snapshot(snapshot) => self.handle_snapshot(snapshot),
            ServerMessage::ClockSyncRequest { server_timestamp } => {
                self.outbox.push(ClientMessage::ClockSyncResponse {
                    server_timestamp,
                    client_timestamp: self.clock.now_ms(),
                });
            }
            ServerMessage::ActionResult {
                seq,
                success,
                result,
                server_timestamp,
            } => {
                if let Some(observer) = self.on_action_result.as_mut() {
                    observer(seq, success, result.as_ref(), server_timestamp);
                }
            }
            ServerMessage::Join { player_id } => {
                if let Some(observer) = self.on_player_join.as_mut() {
                    observer(player_id);
                }
            }
            ServerMessage::Leave { player_id } => {
                if let Some(observer) = self.on_player_leave.as_mut() {
                    observer(player_id);
                }
            }
        }
    }

    fn handle_snapshot(&mut self, snapshot: Snapshot<G::World>) {
        self.stats.snapshots_received += 1;
        if snapshot.tick < self.installed_tick {
            // Old snapshots still rebase us; with its acks behind ours the
            // replay below is a no-op differential.
            self.stats.stale_snapshots += 1;
        }
        self.latest_server_tick = self.latest_server_tick.max(snapshot.tick);
        self.stats.last_server_tick = self.latest_server_tick;

        if let Some(observer) = self.on_world_update.as_mut() {
            observer(&snapshot.state);
        }

        let acked = snapshot.input_acks.get(&self.local_id).copied();
        if let Some(acked) = acked {
            if acked >= self.input_buffer.next_seq() {
                // The server acked something we never sent. Skip the
                // replay; prediction continues from the fresh base.
                log::warn!(
                    "{} acked seq {acked} but next unsent seq is {}",
                    self.local_id,
                    self.input_buffer.next_seq()
                );
                self.stats.misaligned_acks += 1;
                self.predictor.set_base_state(snapshot.state);
                self.installed_tick = self.installed_tick.max(snapshot.tick);
                return;
            }
            self.input_buffer.remove_through(acked);
            // Reordered stale snapshots carry older acks; the stat tracks
            // the high-water mark.
            self.stats.last_acked_seq =
                Some(self.stats.last_acked_seq.map_or(acked, |prev| prev.max(acked)));
        }

        self.predictor.set_base_state(snapshot.state);
        self.installed_tick = self.installed_tick.max(snapshot.tick);

        let pending: Vec<BufferedInput<G::Input>> = self.input_buffer.iter().cloned().collect();
        for entry in pending {
            self.predictor.apply_input(&entry.input);
            self.stats.replays_run += 1;
            if let Some(state) = self.predictor.state() {
                if let Some(observer) = self.on_replay.as_mut() {
                    observer(entry.seq, &state);
                }
            }
        }
    }

    /// Current predicted world, or `None` before the first snapshot.
    pub fn predicted_state(&self) -> Option<G::World> {
        self.predictor.state()
    }

    /// Owner-mode smoother for an entity, created on first use. Owner
    /// queues are keyed by *input seq*.
    pub fn owner_smoother(&mut self, entity: u64, initial: RenderTransform) -> &mut TickSmoother {
        let params = self.owner_params();
        self.smoothers
            .entry(entity)
            .or_insert_with(|| TickSmoother::owner(initial, params))
    }

    /// Spectator-mode smoother for an entity, created on first use.
    /// Spectator queues are keyed by *server tick*.
    pub fn spectator_smoother(
        &mut self,
        entity: u64,
        initial: RenderTransform,
    ) -> &mut TickSmoother {
        let params = self.spectator_params();
        self.smoothers
            .entry(entity)
            .or_insert_with(|| TickSmoother::spectator(initial, params))
    }

    /// Queue a remote entity's post-tick transform, feeding measured tick
    /// lag into the adaptive buffer target.
    pub fn spectator_post_tick(&mut self, entity: u64, server_tick: u64, transform: RenderTransform) {
        let lag = self.latest_server_tick.saturating_sub(server_tick) as f32;
        let smoother = self.spectator_smoother(entity, transform);
        smoother.update_tick_lag(lag.max(1.0));
        smoother.on_post_tick(server_tick, transform);
    }

    pub fn smoother_mut(&mut self, entity: u64) -> Option<&mut TickSmoother> {
        self.smoothers.get_mut(&entity)
    }

    /// Drop smoothers for entities that disappeared from the world.
    pub fn retain_entities(&mut self, mut alive: impl FnMut(u64) -> bool) {
        self.smoothers.retain(|&entity, _| alive(entity));
    }

    pub fn drain_outbox(&mut self) -> Vec<ClientMessage<G::Input, G::Action>> {
        std::mem::take(&mut self.outbox)
    }

    fn owner_params(&self) -> SmootherParams {
        SmootherParams {
            tick_interval_ms: self.config.tick_interval_ms() as f32,
            interpolation: self.config.owner_interpolation,
            teleport_threshold: self.config.teleport_threshold,
            max_over_buffer: self.config.max_over_buffer,
            extrapolation_budget_ms: 0.0,
            adaptive_multiplier: None,
        }
    }

    fn spectator_params(&self) -> SmootherParams {
        SmootherParams {
            tick_interval_ms: self.config.tick_interval_ms() as f32,
            interpolation: self.config.spectator_interpolation,
            teleport_threshold: self.config.teleport_threshold,
            max_over_buffer: self.config.max_over_buffer,
            extrapolation_budget_ms: self.config.max_extrapolation_ms() as f32,
            adaptive_multiplier: self.config.adaptive_smoothing.multiplier(),
        }
    }

    pub fn local_id(&self) -> ClientId {
        self.local_id
    }

    pub fn latest_server_tick(&self) -> u64 {
        self.latest_server_tick
    }

    pub fn pending_input_count(&self) -> usize {
        self.input_buffer.len()
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
