//! Built-in homeostasis grid world
//!
//! A small simulator producing the same raw sensor payloads
//! as an external embodied environment. It has no rendering or I/O and is
//! used for smoke training and tests.

pub mod config;
pub mod engine;
pub mod sense;
pub mod state;

pub use config::WorldConfig;
pub use engine::{HomeostasisWorld, WORLD_ACTIONS};
pub use state::{Heading, Physiology, Position, Resource, ResourceKind, WorldState};
