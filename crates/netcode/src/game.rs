use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable numeric client identity. Assigned by the embedding transport;
/// the library never invents ids.
///
/// Maps keyed by `ClientId` make no iteration-order guarantee.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Inputs captured on the client must carry the capture moment
/// (client wall-clock milliseconds). Used for staleness checks and lag
/// compensation, never as a simulation delta.
pub trait Timestamped {
    fn timestamp_ms(&self) -> i64;
}

/// Outcome of validating an action against historical state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome<R> {
    pub success: bool,
    pub result: Option<R>,
}

impl<R> ActionOutcome<R> {
    pub fn hit(result: R) -> Self {
        Self {
            success: true,
            result: Some(result),
        }
    }

    pub fn miss() -> Self {
        Self {
            success: false,
            result: None,
        }
    }
}

/// The caller-supplied game. The netcode treats `World` as a black box
/// reachable only through these operations.
///
/// `simulate` must be a pure function of its arguments: identical world,
/// inputs and delta produce an identical world on every call and every
/// machine (within IEEE-754 determinism; avoid transcendental divergence).
/// The server and the prediction scope both step with the same fixed
/// `dt_ms`; that shared constant is what makes prediction and authority
/// agree bit-for-bit.
pub trait GameDefinition: Send + 'static {
    type World: Clone + Send;
    type Input: Clone + Timestamped + Send;
    type Action: Clone + Send;
    type ActionResult: Clone + Send;

    /// Advance one fixed tick. Consumes the world and returns the
    /// successor so the snapshot ring never aliases live state.
    fn simulate(
        &self,
        world: Self::World,
        inputs: &HashMap<ClientId, Self::Input>,
        dt_ms: f64,
    ) -> Self::World;

    fn add_player(&self, world: &mut Self::World, id: ClientId);

    fn remove_player(&self, world: &mut Self::World, id: ClientId);

    /// Input used for clients that produced nothing this tick.
    fn create_idle_input(&self) -> Self::Input;

    /// Collapse the inputs a client delivered within one tick (seq
    /// ascending) into the single input the simulator sees. The default is
    /// last-wins, which is idempotent on singletons; games with edge
    /// triggers (jump pressed) should OR those across the slice.
    fn merge_inputs(&self, inputs: &[Self::Input]) -> Self::Input {
        inputs
            .last()
            .cloned()
            .unwrap_or_else(|| self.create_idle_input())
    }

    /// Decide an action against a historical world. Must not mutate
    /// anything; the world it sees is a reconstruction, not live state.
    fn validate_action(
        &self,
        world: &Self::World,
        client: ClientId,
        action: &Self::Action,
    ) -> ActionOutcome<Self::ActionResult>;

    /// Apply the effect of a successfully validated action to the live
    /// world. Runs after the validation pass; the mutation becomes visible
    /// in the next tick's snapshot.
    fn apply_action(
        &self,
        world: &mut Self::World,
        client: ClientId,
        action: &Self::Action,
        result: &ActionOutcome<Self::ActionResult>,
    ) {
        let _ = (world, client, action, result);
    }

    /// Blend two snapshots for lag-compensation lookups. `t` is in
    /// `[0, 1]` from `from` to `to`. The default holds the earlier
    /// snapshot; games with fast-moving targets should lerp positional
    /// state for sub-tick accuracy.
    fn interpolate_states(&self, from: &Self::World, to: &Self::World, t: f64) -> Self::World {
        let _ = t;
        let _ = to;
        from.clone()
    }
}

/// What the client re-simulates locally. Implementations choose the slice
/// of the world that prediction owns: only the local player, every player
/// (when collisions between players matter), or nothing at all.
///
/// Both extremes appear in practice and the choice is per-game; this
/// library fixes neither.
pub trait PredictionScope<G: GameDefinition>: Send + 'static {
    /// The predicted slice of the world.
    type Predicted: Clone + Send;

    fn extract(&self, world: &G::World, local: ClientId) -> Self::Predicted;

    /// Step the predicted slice by one input at the fixed delta. Must agree
    /// with `GameDefinition::simulate` for the extracted slice: same input,
    /// same delta, same resulting local-player state.
    fn simulate_predicted(
        &self,
        predicted: Self::Predicted,
        input: &G::Input,
        dt_ms: f64,
        local: ClientId,
    ) -> Self::Predicted;

    /// Overlay the predicted slice onto an authoritative world.
    fn merge_prediction(
        &self,
        server: G::World,
        predicted: &Self::Predicted,
        local: ClientId,
    ) -> G::World;
}
