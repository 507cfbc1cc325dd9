use glam::Vec2;

use crate::config::ControllerConfig;
use crate::raycast::{CollisionWorld, RayHit, SurfaceKind};

bitflags::bitflags! {
    /// Button state for one tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const JUMP = 1 << 2;
        /// Fall through one-way platforms.
        const DROP = 1 << 3;
    }
}

/// Kinematic state owned by the caller. `position` is the feet midpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
}

impl Body {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
        }
    }
}

/// Bookkeeping between ticks: grounding, grace timers, platform drops.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveState {
    pub grounded: bool,
    pub ground_normal: Vec2,
    pub coyote_timer: f32,
    pub jump_buffer_timer: f32,
    pub drop_timer: f32,
    pub jump_held_last: bool,
}

/// Deterministic move-and-slide. One [`step`](CharacterController::step)
/// per fixed tick; given identical inputs and state it produces identical
/// results, so it is safe to run under prediction.
pub struct CharacterController {
    config: ControllerConfig,
}

impl Default for CharacterController {
    fn default() -> Self {
        Self::new(ControllerConfig::default())
    }
}

impl CharacterController {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn step(
        &self,
        body: &mut Body,
        state: &mut MoveState,
        world: &CollisionWorld,
        buttons: Buttons,
        dt: f32,
    ) {
        let input_x = axis(buttons);

        self.tick_timers(state, buttons, dt);
        self.apply_horizontal(body, state, input_x, dt);
        self.try_jump(body, state);
        self.apply_gravity(body, state, buttons.contains(Buttons::JUMP), dt);

        self.move_horizontal(body, world, dt);
        self.move_vertical(body, state, world, dt);
    }

    fn tick_timers(&self, state: &mut MoveState, buttons: Buttons, dt: f32) {
        let jump_pressed = buttons.contains(Buttons::JUMP) && !state.jump_held_last;
        state.jump_held_last = buttons.contains(Buttons::JUMP);
        if jump_pressed {
            state.jump_buffer_timer = self.config.jump_buffer_time;
        } else {
            state.jump_buffer_timer = (state.jump_buffer_timer - dt).max(0.0);
        }

        if state.grounded {
            state.coyote_timer = self.config.coyote_time;
        } else {
            state.coyote_timer = (state.coyote_timer - dt).max(0.0);
        }

        if buttons.contains(Buttons::DROP) {
            state.drop_timer = self.config.drop_through_time;
            state.grounded = false;
        } else {
            state.drop_timer = (state.drop_timer - dt).max(0.0);
        }
    }

    fn apply_horizontal(&self, body: &mut Body, state: &MoveState, input_x: f32, dt: f32) {
        let (accelerate, decelerate) = if state.grounded {
            (self.config.accelerate_ground, self.config.decelerate_ground)
        } else {
            (self.config.accelerate_air, self.config.decelerate_air)
        };

        if input_x != 0.0 {
            let target = input_x * self.config.move_speed;
            let blend = (accelerate * dt).min(1.0);
            body.velocity.x += (target - body.velocity.x) * blend;
        } else {
            let drop = decelerate * dt;
            body.velocity.x -= body.velocity.x.clamp(-drop, drop);
        }
    }

    fn try_jump(&self, body: &mut Body, state: &mut MoveState) {
        if state.jump_buffer_timer <= 0.0 {
            return;
        }
        if !(state.grounded || state.coyote_timer > 0.0) {
            return;
        }
        body.velocity.y = self.config.jump_speed;
        state.grounded = false;
        state.jump_buffer_timer = 0.0;
        state.coyote_timer = 0.0;
    }

    fn apply_gravity(&self, body: &mut Body, state: &MoveState, jump_held: bool, dt: f32) {
        if state.grounded {
            return;
        }
        let gravity = if body.velocity.y < 0.0 {
            self.config.gravity_fall
        } else if jump_held && body.velocity.y > 0.0 {
            self.config.gravity_jump_hold
        } else {
            self.config.gravity
        };
        body.velocity.y = (body.velocity.y - gravity * dt).max(-self.config.max_fall_speed);
    }

    /// Sweep sideways. Walls stop the body; walkable slopes pass through
    /// and the vertical pass rides them. One-way platforms never block
    /// sideways.
    fn move_horizontal(&self, body: &mut Body, world: &CollisionWorld, dt: f32) {
        let dx = body.velocity.x * dt;
        if dx == 0.0 {
            return;
        }
        let dir = Vec2::new(dx.signum(), 0.0);
        let reach = dx.abs() + self.config.half_width + self.config.skin;

        let heights = [
            self.config.step_offset,
            self.config.height * 0.5,
            self.config.height - self.config.skin,
        ];
        let mut allowed = dx.abs();
        let mut blocked = false;
        for height in heights {
            let origin = body.position + Vec2::new(0.0, height);
            let Some(hit) = world.raycast(origin, dir, reach, false) else {
                continue;
            };
            if hit.normal.y >= self.config.min_ground_normal_y() {
                // Walkable slope face; the ground pass handles it.
                continue;
            }
            let free = hit.distance - self.config.half_width - self.config.skin;
            if free < allowed {
                allowed = free.max(0.0);
                blocked = true;
            }
        }

        body.position.x += allowed * dx.signum();
        if blocked {
            body.velocity.x = 0.0;
        }
    }

    /// Sweep vertically: land, snap to ground, slide on steep faces, bonk
    /// ceilings.
    fn move_vertical(&self, body: &mut Body, state: &mut MoveState, world: &CollisionWorld, dt: f32) {
        let dy = body.velocity.y * dt;

        if dy > 0.0 {
            self.move_up(body, state, world, dy);
            return;
        }

        let falling = -dy;
        // While grounded, probe a little further so slope descents stay
        // attached instead of oscillating.
        let snap = if state.grounded && state.drop_timer <= 0.0 {
            self.config.snap_distance
        } else {
            0.0
        };
        let include_one_way = state.drop_timer <= 0.0;

        match self.ground_probe(body, world, falling + snap, include_one_way) {
            Some(hit) => {
                if hit.normal.y >= self.config.min_ground_normal_y() {
                    body.position.y = hit.point.y;
                    body.velocity.y = 0.0;
                    state.grounded = true;
                    state.ground_normal = hit.normal;
                } else {
                    // Too steep: slide along the face instead of resting.
                    body.position.y -= falling;
                    body.velocity -= hit.normal * body.velocity.dot(hit.normal);
                    state.grounded = false;
                }
            }
            None => {
                body.position.y -= falling;
                state.grounded = false;
            }
        }
    }

    fn move_up(&self, body: &mut Body, state: &mut MoveState, world: &CollisionWorld, dy: f32) {
        state.grounded = false;
        let top = body.position + Vec2::new(0.0, self.config.height);
        let mut allowed = dy;
        for offset in [-self.config.half_width, self.config.half_width] {
            let origin = top + Vec2::new(offset, 0.0);
            if let Some(hit) = world.raycast(origin, Vec2::Y, dy + self.config.skin, false) {
                let free = (hit.distance - self.config.skin).max(0.0);
                if free < allowed {
                    allowed = free;
                    body.velocity.y = 0.0;
                }
            }
        }
        body.position.y += allowed;
    }

    /// Downward rays from both feet corners, starting `step_offset` above
    /// the feet so ascending geometry resolves upward.
    fn ground_probe(
        &self,
        body: &Body,
        world: &CollisionWorld,
        fall_distance: f32,
        include_one_way: bool,
    ) -> Option<RayHit> {
        let reach = self.config.step_offset + fall_distance + self.config.skin;
        let mut best: Option<RayHit> = None;
        for offset in [-self.config.half_width, self.config.half_width] {
            let origin = body.position + Vec2::new(offset, self.config.step_offset);
            let Some(hit) = world.raycast(origin, Vec2::NEG_Y, reach, include_one_way) else {
                continue;
            };
            if hit.kind == SurfaceKind::OneWay && hit.point.y > body.position.y + self.config.skin {
                // Platform edge above the feet: not ground yet.
                continue;
            }
            if best.as_ref().is_none_or(|b| hit.distance < b.distance) {
                best = Some(hit);
            }
        }
        best
    }
}

fn axis(buttons: Buttons) -> f32 {
    let mut x = 0.0;
    if buttons.contains(Buttons::LEFT) {
        x -= 1.0;
    }
    if buttons.contains(Buttons::RIGHT) {
        x += 1.0;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raycast::Segment;

    const DT: f32 = 1.0 / 60.0;

    fn flat_world() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add(Segment::solid(Vec2::new(-50.0, 0.0), Vec2::new(50.0, 0.0)));
        world
    }

    fn settle(body: &mut Body, state: &mut MoveState, world: &CollisionWorld) {
        let controller = CharacterController::default();
        for _ in 0..60 {
            controller.step(body, state, world, Buttons::empty(), DT);
        }
    }

    #[test]
    fn falls_and_lands_on_solid_ground() {
        let controller = CharacterController::default();
        let world = flat_world();
        let mut body = Body::at(Vec2::new(0.0, 3.0));
        let mut state = MoveState::default();

        for _ in 0..120 {
            controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
        }

        assert!(state.grounded);
        assert!((body.position.y - 0.0).abs() < 1e-3);
        assert_eq!(body.velocity.y, 0.0);
    }

    #[test]
    fn walks_right_on_flat_ground() {
        let controller = CharacterController::default();
        let world = flat_world();
        let mut body = Body::at(Vec2::new(0.0, 0.5));
        let mut state = MoveState::default();
        settle(&mut body, &mut state, &world);

        for _ in 0..60 {
            controller.step(&mut body, &mut state, &world, Buttons::RIGHT, DT);
        }

        assert!(state.grounded);
        assert!(body.position.x > 3.0);
        assert!(body.velocity.x > 0.0);
    }

    #[test]
    fn wall_stops_horizontal_motion() {
        let controller = CharacterController::default();
        let mut world = flat_world();
        world.add_box(Vec2::new(3.0, 0.0), Vec2::new(4.0, 3.0));

        let mut body = Body::at(Vec2::new(0.0, 0.5));
        let mut state = MoveState::default();
        settle(&mut body, &mut state, &world);

        for _ in 0..180 {
            controller.step(&mut body, &mut state, &world, Buttons::RIGHT, DT);
        }

        let gap = controller.config().half_width + controller.config().skin;
        assert!(body.position.x <= 3.0 - gap + 1e-3);
        assert!(body.position.x > 2.0);
        assert_eq!(body.velocity.x, 0.0);
    }

    #[test]
    fn climbs_a_gentle_slope() {
        let controller = CharacterController::default();
        let mut world = CollisionWorld::new();
        world.add(Segment::solid(Vec2::new(-50.0, 0.0), Vec2::new(0.0, 0.0)));
        // ~17 degrees.
        world.add(Segment::solid(Vec2::new(0.0, 0.0), Vec2::new(10.0, 3.0)));

        let mut body = Body::at(Vec2::new(-2.0, 0.5));
        let mut state = MoveState::default();
        settle(&mut body, &mut state, &world);

        for _ in 0..70 {
            controller.step(&mut body, &mut state, &world, Buttons::RIGHT, DT);
        }

        assert!(state.grounded);
        assert!(body.position.x > 3.0);
        assert!(body.position.x < 9.0, "ran off the test ramp");
        // Feet track the incline: y = 0.3 * x on the ramp, give or take
        // the leading-foot probe.
        let expected = 0.3 * body.position.x;
        assert!((body.position.y - expected).abs() < 0.15);
    }

    #[test]
    fn slides_down_a_steep_face() {
        let controller = CharacterController::default();
        let mut world = CollisionWorld::new();
        // ~68 degrees, steeper than the 50 degree limit.
        world.add(Segment::solid(Vec2::new(0.0, 0.0), Vec2::new(4.0, 10.0)));

        let mut body = Body::at(Vec2::new(2.0, 8.0));
        let mut state = MoveState::default();

        for _ in 0..30 {
            controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
        }

        assert!(!state.grounded);
        assert!(body.position.y < 8.0);
    }

    #[test]
    fn lands_on_one_way_platform_from_above() {
        let controller = CharacterController::default();
        let mut world = flat_world();
        world.add_platform(-2.0, 2.0, 2.0);

        let mut body = Body::at(Vec2::new(0.0, 5.0));
        let mut state = MoveState::default();

        for _ in 0..120 {
            controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
        }

        assert!(state.grounded);
        assert!((body.position.y - 2.0).abs() < 1e-3);
    }

    #[test]
    fn jumps_up_through_a_one_way_platform() {
        let controller = CharacterController::default();
        let mut world = flat_world();
        world.add_platform(-2.0, 2.0, 2.0);

        let mut body = Body::at(Vec2::new(0.0, 0.5));
        let mut state = MoveState::default();
        settle(&mut body, &mut state, &world);

        controller.step(&mut body, &mut state, &world, Buttons::JUMP, DT);
        assert!(body.velocity.y > 0.0);

        let mut peak = body.position.y;
        for _ in 0..120 {
            controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
            peak = peak.max(body.position.y);
        }

        // Rose through the platform unobstructed, then landed on top.
        assert!(peak > 2.0);
        assert!(state.grounded);
        assert!((body.position.y - 2.0).abs() < 1e-3);
    }

    #[test]
    fn drops_through_a_one_way_platform() {
        let controller = CharacterController::default();
        let mut world = flat_world();
        world.add_platform(-2.0, 2.0, 2.0);

        let mut body = Body::at(Vec2::new(0.0, 5.0));
        let mut state = MoveState::default();
        for _ in 0..120 {
            controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
        }
        assert!((body.position.y - 2.0).abs() < 1e-3);

        controller.step(&mut body, &mut state, &world, Buttons::DROP, DT);
        for _ in 0..120 {
            controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
        }

        // Fell through to the solid floor below.
        assert!(state.grounded);
        assert!((body.position.y - 0.0).abs() < 1e-3);
    }

    #[test]
    fn coyote_time_allows_a_late_jump() {
        let controller = CharacterController::default();
        let mut world = CollisionWorld::new();
        world.add(Segment::solid(Vec2::new(-50.0, 0.0), Vec2::new(0.0, 0.0)));

        let mut body = Body::at(Vec2::new(-1.0, 0.5));
        let mut state = MoveState::default();
        settle(&mut body, &mut state, &world);

        // Run off the ledge.
        while state.grounded {
            controller.step(&mut body, &mut state, &world, Buttons::RIGHT, DT);
        }

        // Two frames later, still inside the grace window.
        controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
        controller.step(&mut body, &mut state, &world, Buttons::JUMP, DT);
        assert!(body.velocity.y > 0.0);
    }

    #[test]
    fn no_jump_once_coyote_expires() {
        let controller = CharacterController::default();
        let world = CollisionWorld::new();

        let mut body = Body::at(Vec2::new(0.0, 10.0));
        let mut state = MoveState::default();

        // Long past any grace period.
        for _ in 0..30 {
            controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
        }
        let vy_before = body.velocity.y;
        controller.step(&mut body, &mut state, &world, Buttons::JUMP, DT);
        assert!(body.velocity.y < vy_before + 1e-3);
    }

    #[test]
    fn buffered_jump_fires_on_landing() {
        let controller = CharacterController::default();
        let world = flat_world();

        let mut body = Body::at(Vec2::new(0.0, 0.4));
        let mut state = MoveState::default();
        body.velocity.y = -5.0;

        // Press jump just before touching down, then release.
        controller.step(&mut body, &mut state, &world, Buttons::JUMP, DT);
        let mut jumped = false;
        for _ in 0..10 {
            controller.step(&mut body, &mut state, &world, Buttons::empty(), DT);
            if body.velocity.y > 1.0 {
                jumped = true;
                break;
            }
        }
        assert!(jumped, "buffered jump never fired");
    }

    #[test]
    fn identical_inputs_produce_identical_trajectories() {
        let run = || {
            let controller = CharacterController::default();
            let world = flat_world();
            let mut body = Body::at(Vec2::new(0.0, 2.0));
            let mut state = MoveState::default();
            let script = [
                Buttons::RIGHT,
                Buttons::RIGHT,
                Buttons::RIGHT | Buttons::JUMP,
                Buttons::RIGHT | Buttons::JUMP,
                Buttons::RIGHT,
                Buttons::empty(),
            ];
            for buttons in script.iter().cycle().take(240) {
                controller.step(&mut body, &mut state, &world, *buttons, DT);
            }
            (body, state)
        };

        assert_eq!(run(), run());
    }
}
