//! Shared fixture: a tiny deterministic platformer used by the
//! integration suites. Horizontal movement eases toward a target speed,
//! vertical movement is semi-implicit Euler gravity, and the only action
//! is a hitscan shot validated against a small radius.

// Each integration binary uses a different slice of the fixture.
#![allow(dead_code)]

use std::collections::HashMap;

use concord::{ActionOutcome, ClientId, GameDefinition, PredictionScope, Timestamped};

pub const GRAVITY: f64 = 800.0;
pub const MAX_SPEED: f64 = 150.0;
pub const ACCEL: f64 = 8.0;
pub const JUMP_SPEED: f64 = 300.0;
pub const HIT_RADIUS: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub grounded: bool,
    pub hits_taken: u32,
}

impl PlayerState {
    pub fn grounded_at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            grounded: true,
            hits_taken: 0,
        }
    }

    pub fn airborne_at(x: f64, y: f64) -> Self {
        Self {
            grounded: false,
            ..Self::grounded_at(x, y)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct World {
    pub players: HashMap<ClientId, PlayerState>,
}

#[derive(Clone, Debug)]
pub struct Input {
    pub move_x: f64,
    pub jump: bool,
    pub timestamp: i64,
}

impl Input {
    pub fn idle(timestamp: i64) -> Self {
        Self {
            move_x: 0.0,
            jump: false,
            timestamp,
        }
    }

    pub fn right(timestamp: i64) -> Self {
        Self {
            move_x: 1.0,
            jump: false,
            timestamp,
        }
    }
}

impl Timestamped for Input {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }
}

#[derive(Clone, Debug)]
pub struct Shoot {
    pub aim_x: f64,
    pub aim_y: f64,
    pub target: ClientId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HitReport {
    pub seen_x: f64,
    pub seen_y: f64,
}

/// One player's tick. Shared verbatim between the server simulation and
/// the prediction scope so both sides step identically.
pub fn step_player(player: &mut PlayerState, input: &Input, dt_ms: f64) {
    let dt_s = dt_ms / 1000.0;

    player.vx += (input.move_x * MAX_SPEED - player.vx) * (ACCEL * dt_s).min(1.0);
    player.x += player.vx * dt_s;

    if input.jump && player.grounded {
        player.vy = JUMP_SPEED;
        player.grounded = false;
    }

    if !player.grounded {
        player.vy -= GRAVITY * dt_s;
        player.y += player.vy * dt_s;
        if player.y <= 0.0 {
            player.y = 0.0;
            player.vy = 0.0;
            player.grounded = true;
        }
    }
}

pub struct Platformer;

impl GameDefinition for Platformer {
    type World = World;
    type Input = Input;
    type Action = Shoot;
    type ActionResult = HitReport;

    fn simulate(
        &self,
        mut world: World,
        inputs: &HashMap<ClientId, Input>,
        dt_ms: f64,
    ) -> World {
        let idle = self.create_idle_input();
        for (id, player) in world.players.iter_mut() {
            let input = inputs.get(id).unwrap_or(&idle);
            step_player(player, input, dt_ms);
        }
        world
    }

    fn add_player(&self, world: &mut World, id: ClientId) {
        world.players.insert(id, PlayerState::grounded_at(0.0, 0.0));
    }

    fn remove_player(&self, world: &mut World, id: ClientId) {
        world.players.remove(&id);
    }

    fn create_idle_input(&self) -> Input {
        Input::idle(0)
    }

    // Last-wins for the stick, OR-accumulate for the jump edge.
    fn merge_inputs(&self, inputs: &[Input]) -> Input {
        let last = inputs.last().cloned().unwrap_or_else(|| Input::idle(0));
        Input {
            jump: inputs.iter().any(|i| i.jump),
            ..last
        }
    }

    fn validate_action(
        &self,
        world: &World,
        _client: ClientId,
        action: &Shoot,
    ) -> ActionOutcome<HitReport> {
        let Some(target) = world.players.get(&action.target) else {
            return ActionOutcome::miss();
        };
        let dx = target.x - action.aim_x;
        let dy = target.y - action.aim_y;
        if (dx * dx + dy * dy).sqrt() <= HIT_RADIUS {
            ActionOutcome::hit(HitReport {
                seen_x: target.x,
                seen_y: target.y,
            })
        } else {
            ActionOutcome::miss()
        }
    }

    fn apply_action(
        &self,
        world: &mut World,
        _client: ClientId,
        action: &Shoot,
        outcome: &ActionOutcome<HitReport>,
    ) {
        if outcome.success {
            if let Some(target) = world.players.get_mut(&action.target) {
                target.hits_taken += 1;
            }
        }
    }

    // Positional lerp so lag compensation lands between snapshots.
    fn interpolate_states(&self, from: &World, to: &World, t: f64) -> World {
        let mut blended = from.clone();
        for (id, player) in blended.players.iter_mut() {
            if let Some(later) = to.players.get(id) {
                player.x += (later.x - player.x) * t;
                player.y += (later.y - player.y) * t;
                player.vx += (later.vx - player.vx) * t;
                player.vy += (later.vy - player.vy) * t;
            }
        }
        blended
    }
}

/// Predicts every player: the local one from real inputs, the rest
/// idle-stepped, so player collisions would resolve identically to the
/// server.
pub struct AllPlayersScope;

impl PredictionScope<Platformer> for AllPlayersScope {
    type Predicted = World;

    fn extract(&self, world: &World, _local: ClientId) -> World {
        world.clone()
    }

    fn simulate_predicted(
        &self,
        mut predicted: World,
        input: &Input,
        dt_ms: f64,
        local: ClientId,
    ) -> World {
        let idle = Input::idle(input.timestamp);
        for (id, player) in predicted.players.iter_mut() {
            let applied = if *id == local { input } else { &idle };
            step_player(player, applied, dt_ms);
        }
        predicted
    }

    fn merge_prediction(&self, _server: World, predicted: &World, _local: ClientId) -> World {
        predicted.clone()
    }
}

/// Predicts only the local player; remote players render from snapshots.
pub struct LocalPlayerScope;

impl PredictionScope<Platformer> for LocalPlayerScope {
    type Predicted = PlayerState;

    fn extract(&self, world: &World, local: ClientId) -> PlayerState {
        world
            .players
            .get(&local)
            .cloned()
            .unwrap_or_else(|| PlayerState::grounded_at(0.0, 0.0))
    }

    fn simulate_predicted(
        &self,
        mut predicted: PlayerState,
        input: &Input,
        dt_ms: f64,
        _local: ClientId,
    ) -> PlayerState {
        step_player(&mut predicted, input, dt_ms);
        predicted
    }

    fn merge_prediction(&self, mut server: World, predicted: &PlayerState, local: ClientId) -> World {
        server.players.insert(local, predicted.clone());
        server
    }
}

/// Equality to five significant digits, the documented floating-point
/// tolerance for prediction equivalence.
pub fn assert_close(actual: f64, expected: f64) {
    let scale = expected.abs().max(1e-9);
    let relative = ((actual - expected) / scale).abs();
    assert!(
        relative < 1e-5,
        "expected {expected}, got {actual} (relative error {relative})"
    );
}
