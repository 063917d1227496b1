//! Rigid-body physics for the entity runtime.
//!
//! The simulation itself sits behind [`PhysicsWorld`] and [`RigidBody`];
//! [`SimplePhysicsWorld`] is the built-in integrator. [`PhysicsSystem`]
//! classifies entities into dynamic and static bodies and synchronizes
//! transforms between bodies and scene nodes every tick.
//!
//! # Invariants
//! - Each classified entity owns exactly one body of the matching kind.
//! - The physics world does not exist until the first entity needs it.
//! - A tick with non-positive elapsed time is rejected before any state
//!   changes.

mod error;
mod system;
mod world;

pub use error::PhysicsError;
pub use system::PhysicsSystem;
pub use world::{
    BodyDesc, BodyHandle, BodyKind, PhysicsConfig, PhysicsWorld, RigidBody, SimpleBody,
    SimplePhysicsWorld,
};

pub fn crate_info() -> &'static str {
    "forge-physics v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("physics"));
    }
}
