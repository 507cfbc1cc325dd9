pub mod input_queue;
pub mod lag;
pub mod runtime;
pub mod snapshot;

use std::collections::HashMap;

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::error::{ConfigError, DropReason};
use crate::game::{ActionOutcome, ClientId, GameDefinition, Timestamped};
use crate::metrics::ServerMetrics;
use crate::protocol::{Address, ClientMessage, Outgoing, ServerMessage};

use input_queue::InputQueue;
use lag::{ClockSyncState, LagCompensator, PendingAction};
use snapshot::{Snapshot, SnapshotRing};

type JoinObserver = Box<dyn FnMut(ClientId) + Send>;
type ActionObserver<G> = Box<
    dyn FnMut(ClientId, &<G as GameDefinition>::Action, &ActionOutcome<<G as GameDefinition>::ActionResult>)
        + Send,
>;

struct ClientRecord<I> {
    queue: InputQueue<I>,
    /// Timestamp of the newest input drained into the simulation; older
    /// arrivals afterwards are stragglers.
    last_input_timestamp: i64,
}

impl<I> ClientRecord<I> {
    fn new() -> Self {
        Self {
            queue: InputQueue::new(),
            last_input_timestamp: -1,
        }
    }
}

/// The authoritative endpoint. Owns the world, the snapshot ring and every
/// per-client queue; advances the simulation exactly once per [`tick`].
///
/// All mutation happens on whichever thread calls `tick`; the tick must
/// never overlap with itself. The [`runtime`] driver guarantees that by
/// running it on a single task.
///
/// [`tick`]: Server::tick
pub struct Server<G: GameDefinition> {
    game: G,
    config: ServerConfig,
    clock: Box<dyn Clock>,
    // `None` only transiently while a tick is in flight.
    world: Option<G::World>,
    tick: u64,
    running: bool,
    clients: HashMap<ClientId, ClientRecord<G::Input>>,
    snapshots: SnapshotRing<G::World>,
    compensator: LagCompensator<G::Action>,
    outbox: Vec<Outgoing<G::World, G::ActionResult>>,
    metrics: ServerMetrics,
    last_clock_sync_ms: Option<i64>,
    on_player_join: Option<JoinObserver>,
    on_player_leave: Option<JoinObserver>,
    on_action_validated: Option<ActionObserver<G>>,
}

impl<G: GameDefinition> Server<G> {
    pub fn new(game: G, world: G::World, config: ServerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(game, world, config, Box::new(SystemClock))
    }

    pub fn with_clock(
        game: G,
        world: G::World,
        config: ServerConfig,
        clock: Box<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let compensator = LagCompensator::new(
            config.max_rewind_ms,
            config.default_interpolation_delay_ms(),
        );
        Ok(Self {
            snapshots: SnapshotRing::new(config.snapshot_history_size),
            compensator,
            game,
            config,
            clock,
            world: Some(world),
            tick: 0,
            running: true,
            clients: HashMap::new(),
            outbox: Vec::new(),
            metrics: ServerMetrics::default(),
            last_clock_sync_ms: None,
            on_player_join: None,
            on_player_leave: None,
            on_action_validated: None,
        })
    }

    pub fn on_player_join(&mut self, f: impl FnMut(ClientId) + Send + 'static) {
        self.on_player_join = Some(Box::new(f));
    }

    pub fn on_player_leave(&mut self, f: impl FnMut(ClientId) + Send + 'static) {
        self.on_player_leave = Some(Box::new(f));
    }

    pub fn on_action_validated(
        &mut self,
        f: impl FnMut(ClientId, &G::Action, &ActionOutcome<G::ActionResult>) + Send + 'static,
    ) {
        self.on_action_validated = Some(Box::new(f));
    }

    /// Register a client: spawns its player, opens its input queue and
    /// clock-sync state, announces the join.
    pub fn add_client(&mut self, id: ClientId) {
        if self.clients.contains_key(&id) {
            return;
        }
        if let Some(world) = self.world.as_mut() {
            self.game.add_player(world, id);
        }
        self.clients.insert(id, ClientRecord::new());
        self.compensator.add_client(id);
        self.outbox.push(Outgoing {
            to: Address::Broadcast,
            message: ServerMessage::Join { player_id: id },
        });
        log::info!("{id} joined");
        if let Some(observer) = self.on_player_join.as_mut() {
            observer(id);
        }
    }

    /// Drop everything the client owned. In-flight inputs and actions from
    /// it are discarded.
    pub fn remove_client(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_none() {
            return;
        }
        if let Some(world) = self.world.as_mut() {
            self.game.remove_player(world, id);
        }
        self.compensator.remove_client(id);
        self.outbox.push(Outgoing {
            to: Address::Broadcast,
            message: ServerMessage::Leave { player_id: id },
        });
        log::info!("{id} left");
        if let Some(observer) = self.on_player_leave.as_mut() {
            observer(id);
        }
    }

    /// Validated input intake. Malformed traffic is dropped without error:
    /// a hostile client must not be able to stall the loop.
    pub fn on_client_input(&mut self, id: ClientId, input: G::Input, seq: i64) {
        let Some(record) = self.clients.get_mut(&id) else {
            self.drop_message(id, DropReason::UnknownClient);
            return;
        };
        if seq < 0 {
            self.drop_message(id, DropReason::NegativeSeq);
            return;
        }
        let timestamp = input.timestamp_ms();
        if timestamp < 0 {
            self.drop_message(id, DropReason::NegativeTimestamp);
            return;
        }
        if timestamp < record.last_input_timestamp {
            self.drop_message(id, DropReason::StaleTimestamp);
            return;
        }
        let now = self.clock.now_ms();
        if let Some(reason) = record.queue.enqueue(seq as u64, input, now) {
            self.drop_message(id, reason);
        }
    }

    /// Inbound message dispatch, one call per decoded message.
    pub fn handle_message(&mut self, from: ClientId, message: ClientMessage<G::Input, G::Action>) {
        match message {
            ClientMessage::Input { seq, input, .. } => {
                self.on_client_input(from, input, seq);
            }
            ClientMessage::Action {
                seq,
                action,
                client_timestamp,
            } => {
                if !self.clients.contains_key(&from) {
                    self.drop_message(from, DropReason::UnknownClient);
                    return;
                }
                if seq < 0 || client_timestamp < 0 {
                    self.metrics.invalid_actions += 1;
                    log::warn!("dropping action from {from}: malformed header");
                    return;
                }
                self.compensator.enqueue(
                    from,
                    PendingAction {
                        seq: seq as u64,
                        action,
                        client_timestamp,
                    },
                );
            }
            ClientMessage::ClockSyncResponse {
                server_timestamp,
                client_timestamp,
            } => {
                if !self.clients.contains_key(&from) {
                    self.drop_message(from, DropReason::UnknownClient);
                    return;
                }
                let now = self.clock.now_ms();
                let rtt = now - server_timestamp;
                if rtt < 0 {
                    self.metrics.invalid_actions += 1;
                    return;
                }
                let offset = server_timestamp + rtt / 2 - client_timestamp;
                self.compensator.record_sync(from, rtt, offset);
            }
        }
    }

    /// Install a new world (level change, reset) and broadcast it at once.
    /// History from before the reset is meaningless, so the ring restarts.
    pub fn set_world(&mut self, world: G::World) {
        self.world = Some(world);
        self.snapshots.clear();
        let snapshot = self.build_snapshot();
        self.snapshots.push(snapshot.clone());
        self.broadcast_snapshot(snapshot);
    }

    /// Advance one fixed step and return the produced snapshot.
    ///
    /// The simulation delta is always `tick_interval_ms`, never derived
    /// from input timestamps or wall time. That constant is what keeps
    /// the client predictor bit-identical to the server.
    pub fn tick(&mut self) -> Snapshot<G::World> {
        let dt_ms = self.config.tick_interval_ms();

        let mut merged: HashMap<ClientId, G::Input> = HashMap::with_capacity(self.clients.len());
        for (&id, record) in self.clients.iter_mut() {
            let drained = record.queue.drain_sorted();
            if drained.is_empty() {
                merged.insert(id, self.game.create_idle_input());
                continue;
            }
            let inputs: Vec<G::Input> = drained.into_iter().map(|e| e.input).collect();
            if let Some(last) = inputs.last() {
                record.last_input_timestamp = record.last_input_timestamp.max(last.timestamp_ms());
            }
            merged.insert(id, self.game.merge_inputs(&inputs));
        }

        let world = self
            .world
            .take()
            .expect("world present outside of a tick");
        self.world = Some(self.game.simulate(world, &merged, dt_ms));
        self.tick += 1;
        self.metrics.ticks += 1;

        let snapshot = self.build_snapshot();
        self.snapshots.push(snapshot.clone());
        self.broadcast_snapshot(snapshot.clone());

        self.run_action_pass();
        self.maybe_request_clock_sync();

        snapshot
    }

    fn build_snapshot(&self) -> Snapshot<G::World> {
        let mut input_acks = HashMap::with_capacity(self.clients.len());
        for (&id, record) in &self.clients {
            if let Some(acked) = record.queue.acked_seq() {
                input_acks.insert(id, acked);
            }
        }
        Snapshot {
            tick: self.tick,
            timestamp_ms: self.clock.now_ms(),
            state: self.world.as_ref().expect("world present").clone(),
            input_acks,
        }
    }

    fn broadcast_snapshot(&mut self, snapshot: Snapshot<G::World>) {
        self.outbox.push(Outgoing {
            to: Address::Broadcast,
            message: ServerMessage::Snapshot(snapshot),
        });
        self.metrics.snapshots_broadcast += 1;
    }

    /// Validate queued actions against history, apply effects to the live
    /// world, answer each client. Runs after the simulation step so the
    /// freshest snapshot is available for rewind.
    fn run_action_pass(&mut self) {
        let now = self.clock.now_ms();
        for (id, pending) in self.compensator.drain_all() {
            let intent = self
                .compensator
                .intent_timestamp(id, pending.client_timestamp, now);
            let live = self.world.as_ref().expect("world present");
            let historical = self
                .compensator
                .world_at(&self.game, &self.snapshots, live, intent);
            let outcome = self.game.validate_action(&historical, id, &pending.action);
            if outcome.success {
                let world = self.world.as_mut().expect("world present");
                self.game.apply_action(world, id, &pending.action, &outcome);
            }
            self.metrics.actions_validated += 1;
            self.outbox.push(Outgoing {
                to: Address::To(id),
                message: ServerMessage::ActionResult {
                    seq: pending.seq,
                    success: outcome.success,
                    result: outcome.result.clone(),
                    server_timestamp: now,
                },
            });
            if let Some(observer) = self.on_action_validated.as_mut() {
                observer(id, &pending.action, &outcome);
            }
        }
    }

    fn maybe_request_clock_sync(&mut self) {
        if self.config.clock_sync_interval_ms <= 0 {
            return;
        }
        let now = self.clock.now_ms();
        let due = self
            .last_clock_sync_ms
            .is_none_or(|last| now - last >= self.config.clock_sync_interval_ms);
        if !due {
            return;
        }
        self.last_clock_sync_ms = Some(now);
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        for id in ids {
            self.outbox.push(Outgoing {
                to: Address::To(id),
                message: ServerMessage::ClockSyncRequest {
                    server_timestamp: now,
                },
            });
        }
    }

    /// Halt: pending outbound traffic and queued actions are discarded.
    /// The driver stops scheduling ticks once this flips.
    pub fn stop(&mut self) {
        self.running = false;
        self.outbox.clear();
        self.compensator.drain_all();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing<G::World, G::ActionResult>> {
        std::mem::take(&mut self.outbox)
    }

    fn drop_message(&mut self, from: ClientId, reason: DropReason) {
        self.metrics.record_drop(reason);
        log::warn!("dropping message from {from}: {}", reason.as_str());
    }

    pub fn world(&self) -> &G::World {
        self.world.as_ref().expect("world present")
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    pub fn snapshots(&self) -> &SnapshotRing<G::World> {
        &self.snapshots
    }

    pub fn sync_state(&self, id: ClientId) -> Option<&ClockSyncState> {
        self.compensator.sync_state(id)
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct World1 {
        positions: HashMap<ClientId, f64>,
    }

    #[derive(Clone, Debug)]
    struct Move {
        dx: f64,
        timestamp: i64,
    }

    impl Timestamped for Move {
        fn timestamp_ms(&self) -> i64 {
            self.timestamp
        }
    }

    struct LineGame;

    impl GameDefinition for LineGame {
        type World = World1;
        type Input = Move;
        type Action = ();
        type ActionResult = ();

        fn simulate(
            &self,
            mut world: World1,
            inputs: &HashMap<ClientId, Move>,
            _dt_ms: f64,
        ) -> World1 {
            for (id, input) in inputs {
                if let Some(pos) = world.positions.get_mut(id) {
                    *pos += input.dx;
                }
            }
            world
        }

        fn add_player(&self, world: &mut World1, id: ClientId) {
            world.positions.insert(id, 0.0);
        }

        fn remove_player(&self, world: &mut World1, id: ClientId) {
            world.positions.remove(&id);
        }

        fn create_idle_input(&self) -> Move {
            Move {
                dx: 0.0,
                timestamp: 0,
            }
        }

        // Sum, so every queued input contributes exactly once.
        fn merge_inputs(&self, inputs: &[Move]) -> Move {
            Move {
                dx: inputs.iter().map(|i| i.dx).sum(),
                timestamp: inputs.last().map_or(0, |i| i.timestamp),
            }
        }

        fn validate_action(
            &self,
            _world: &World1,
            _client: ClientId,
            _action: &(),
        ) -> ActionOutcome<()> {
            ActionOutcome::hit(())
        }
    }

    fn server_at(start_ms: i64) -> (Server<LineGame>, ManualClock) {
        let clock = ManualClock::new(start_ms);
        let server = Server::with_clock(
            LineGame,
            World1::default(),
            ServerConfig {
                tick_rate: 20,
                clock_sync_interval_ms: 0,
                ..Default::default()
            },
            Box::new(clock.clone()),
        )
        .unwrap();
        (server, clock)
    }

    #[test]
    fn construction_rejects_bad_config() {
        let result = Server::new(
            LineGame,
            World1::default(),
            ServerConfig {
                tick_rate: 0,
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn tick_applies_each_input_exactly_once() {
        let (mut server, _clock) = server_at(1000);
        let id = ClientId(1);
        server.add_client(id);

        for seq in 0..3 {
            server.on_client_input(
                id,
                Move {
                    dx: 1.0,
                    timestamp: 1000 + seq,
                },
                seq,
            );
        }

        let snapshot = server.tick();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.state.positions[&id], 3.0);
        assert_eq!(snapshot.input_acks[&id], 2);

        // Nothing left to apply.
        let snapshot = server.tick();
        assert_eq!(snapshot.state.positions[&id], 3.0);
        assert_eq!(snapshot.input_acks[&id], 2);
    }

    #[test]
    fn silent_clients_get_idle_input() {
        let (mut server, _clock) = server_at(1000);
        server.add_client(ClientId(1));
        server.add_client(ClientId(2));

        server.on_client_input(
            ClientId(1),
            Move {
                dx: 5.0,
                timestamp: 1000,
            },
            0,
        );

        let snapshot = server.tick();
        assert_eq!(snapshot.state.positions[&ClientId(1)], 5.0);
        assert_eq!(snapshot.state.positions[&ClientId(2)], 0.0);
        assert!(!snapshot.input_acks.contains_key(&ClientId(2)));
    }

    #[test]
    fn duplicate_seq_is_idempotent() {
        let (mut server, _clock) = server_at(1000);
        let id = ClientId(1);
        server.add_client(id);

        server.on_client_input(
            id,
            Move {
                dx: 2.0,
                timestamp: 1000,
            },
            0,
        );
        server.on_client_input(
            id,
            Move {
                dx: 2.0,
                timestamp: 1000,
            },
            0,
        );

        let snapshot = server.tick();
        assert_eq!(snapshot.state.positions[&id], 2.0);
        assert_eq!(server.metrics().duplicate_inputs, 1);
    }

    #[test]
    fn malformed_input_drops_silently() {
        let (mut server, _clock) = server_at(1000);
        let id = ClientId(1);
        server.add_client(id);

        server.on_client_input(
            id,
            Move {
                dx: 9.0,
                timestamp: 1000,
            },
            -1,
        );
        server.on_client_input(
            id,
            Move {
                dx: 9.0,
                timestamp: -5,
            },
            0,
        );
        server.on_client_input(
            ClientId(42),
            Move {
                dx: 9.0,
                timestamp: 1000,
            },
            0,
        );

        let snapshot = server.tick();
        assert_eq!(snapshot.state.positions[&id], 0.0);
        assert_eq!(server.metrics().invalid_inputs, 2);
        assert_eq!(server.metrics().unknown_client_messages, 1);
    }

    #[test]
    fn acks_are_monotone_across_snapshots() {
        let (mut server, _clock) = server_at(1000);
        let id = ClientId(1);
        server.add_client(id);

        let mut last_ack = 0;
        for round in 0..5u64 {
            server.on_client_input(
                id,
                Move {
                    dx: 1.0,
                    timestamp: 1000 + round as i64,
                },
                round as i64,
            );
            let snapshot = server.tick();
            let ack = snapshot.input_acks[&id];
            assert!(ack >= last_ack);
            last_ack = ack;
        }
        assert_eq!(last_ack, 4);
    }

    #[test]
    fn clock_sync_round_trip_computes_offset() {
        let clock = ManualClock::new(10_000);
        let mut server = Server::with_clock(
            LineGame,
            World1::default(),
            ServerConfig {
                clock_sync_interval_ms: 100,
                ..Default::default()
            },
            Box::new(clock.clone()),
        )
        .unwrap();
        let id = ClientId(1);
        server.add_client(id);

        server.tick();
        let requests: Vec<_> = server
            .drain_outbox()
            .into_iter()
            .filter(|o| matches!(o.message, ServerMessage::ClockSyncRequest { .. }))
            .collect();
        assert_eq!(requests.len(), 1);

        // Client clock runs 250ms behind; reply arrives 60ms later.
        clock.advance(60);
        server.handle_message(
            id,
            ClientMessage::ClockSyncResponse {
                server_timestamp: 10_000,
                client_timestamp: 10_000 + 30 - 250,
            },
        );

        let sync = server.sync_state(id).unwrap();
        assert_eq!(sync.rtt_ms, 60);
        assert_eq!(sync.clock_offset_ms, 250);
    }

    #[test]
    fn set_world_broadcasts_immediately() {
        let (mut server, _clock) = server_at(1000);
        server.add_client(ClientId(1));
        server.tick();
        server.drain_outbox();

        let mut world = World1::default();
        world.positions.insert(ClientId(1), 123.0);
        server.set_world(world);

        let outbox = server.drain_outbox();
        let snapshot = outbox
            .iter()
            .find_map(|o| match &o.message {
                ServerMessage::Snapshot(s) => Some(s),
                _ => None,
            })
            .expect("snapshot broadcast");
        assert_eq!(snapshot.state.positions[&ClientId(1)], 123.0);
    }

    #[test]
    fn stop_discards_pending_traffic() {
        let (mut server, _clock) = server_at(1000);
        server.add_client(ClientId(1));
        server.tick();

        server.stop();
        assert!(!server.is_running());
        assert!(server.drain_outbox().is_empty());
    }

    #[test]
    fn action_pass_answers_each_action() {
        let (mut server, _clock) = server_at(1000);
        let id = ClientId(1);
        server.add_client(id);

        server.handle_message(
            id,
            ClientMessage::Action {
                seq: 0,
                action: (),
                client_timestamp: 1000,
            },
        );
        server.tick();

        let results: Vec<_> = server
            .drain_outbox()
            .into_iter()
            .filter(|o| matches!(o.message, ServerMessage::ActionResult { .. }))
            .collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].to, Address::To(id));
        assert_eq!(server.metrics().actions_validated, 1);
    }
}
