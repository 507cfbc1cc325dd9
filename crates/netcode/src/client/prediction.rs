use crate::game::{ClientId, GameDefinition, PredictionScope};

/// Local re-simulation of the player's own inputs against the last
/// authoritative snapshot.
///
/// The predictor steps with the same fixed delta the server uses; given the
/// same base state and inputs, its local-player state is bit-identical to
/// what the server will compute. The [`PredictionScope`] decides how much
/// of the world that covers.
pub struct Predictor<G: GameDefinition, S: PredictionScope<G>> {
    scope: S,
    local_id: ClientId,
    tick_interval_ms: f64,
    /// Last authoritative world, kept for merging the predicted slice back.
    server_world: Option<G::World>,
    predicted: Option<S::Predicted>,
}

impl<G: GameDefinition, S: PredictionScope<G>> Predictor<G, S> {
    pub fn new(scope: S, local_id: ClientId, tick_interval_ms: f64) -> Self {
        Self {
            scope,
            local_id,
            tick_interval_ms,
            server_world: None,
            predicted: None,
        }
    }

    /// Install an authoritative world as the new prediction base.
    pub fn set_base_state(&mut self, world: G::World) {
        self.predicted = Some(self.scope.extract(&world, self.local_id));
        self.server_world = Some(world);
    }

    /// Step the predicted slice by one captured input at the fixed delta.
    /// No-op until a base state exists.
    pub fn apply_input(&mut self, input: &G::Input) {
        if let Some(predicted) = self.predicted.take() {
            self.predicted = Some(self.scope.simulate_predicted(
                predicted,
                input,
                self.tick_interval_ms,
                self.local_id,
            ));
        }
    }

    /// Current predicted world: the last server state with the predicted
    /// slice overlaid.
    pub fn state(&self) -> Option<G::World> {
        let server = self.server_world.as_ref()?;
        let predicted = self.predicted.as_ref()?;
        Some(
            self.scope
                .merge_prediction(server.clone(), predicted, self.local_id),
        )
    }

    pub fn has_base(&self) -> bool {
        self.server_world.is_some()
    }

    pub fn local_id(&self) -> ClientId {
        self.local_id
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }
}
