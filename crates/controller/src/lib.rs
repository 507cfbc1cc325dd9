//! 2D raycast character controller for tick-based games: move-and-slide
//! against segment geometry with slope walking, one-way platforms, coyote
//! time and jump buffering.
//!
//! The controller is a pure step function over caller-owned state, so the
//! same code runs inside a server simulation and a client predictor.

pub mod config;
pub mod controller;
pub mod raycast;

pub use config::ControllerConfig;
pub use controller::{Body, Buttons, CharacterController, MoveState};
pub use raycast::{CollisionWorld, RayHit, Segment, SurfaceKind};
