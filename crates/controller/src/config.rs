use serde::{Deserialize, Serialize};

/// Movement tuning. Distances in world units, times in seconds, speeds in
/// units per second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub move_speed: f32,
    pub accelerate_ground: f32,
    pub accelerate_air: f32,
    pub decelerate_ground: f32,
    pub decelerate_air: f32,

    pub jump_speed: f32,
    pub gravity: f32,
    /// Steeper gravity once falling, for a snappier arc.
    pub gravity_fall: f32,
    /// Lighter gravity while rising with jump held.
    pub gravity_jump_hold: f32,
    pub max_fall_speed: f32,

    /// Grace period after walking off a ledge during which a jump still
    /// fires.
    pub coyote_time: f32,
    /// How long a jump press is remembered while airborne.
    pub jump_buffer_time: f32,
    /// How long one-way platforms stay intangible after a drop input.
    pub drop_through_time: f32,

    /// Steepest ground normal still treated as walkable, in radians from
    /// vertical.
    pub max_slope_angle: f32,
    /// Collider half-width; vertical rays are cast at both edges.
    pub half_width: f32,
    /// Collider height; side and ceiling rays span it.
    pub height: f32,
    /// Gap kept between the collider and geometry.
    pub skin: f32,
    /// Downward rays start this far above the feet so ascending slopes
    /// and small steps resolve upward instead of clipping through.
    pub step_offset: f32,
    /// How far below the feet the controller sticks to ground while
    /// walking (keeps slope descents grounded).
    pub snap_distance: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            move_speed: 8.0,
            accelerate_ground: 12.0,
            accelerate_air: 6.0,
            decelerate_ground: 16.0,
            decelerate_air: 2.0,

            jump_speed: 14.0,
            gravity: 42.0,
            gravity_fall: 58.0,
            gravity_jump_hold: 30.0,
            max_fall_speed: 28.0,

            coyote_time: 0.1,
            jump_buffer_time: 0.12,
            drop_through_time: 0.25,

            max_slope_angle: 50f32.to_radians(),
            half_width: 0.35,
            height: 1.6,
            skin: 0.02,
            step_offset: 0.3,
            snap_distance: 0.25,
        }
    }
}

impl ControllerConfig {
    /// Minimum ground-normal y for a surface to count as walkable.
    pub fn min_ground_normal_y(&self) -> f32 {
        self.max_slope_angle.cos()
    }
}
