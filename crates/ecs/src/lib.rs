//! Entity/component/system runtime.
//!
//! Entities hold tagged-variant components; each entity's set of component
//! kinds is summarized as a [`Signature`]. Systems declare a
//! [`SystemFilter`] and the [`World`] keeps their member sets in sync with
//! structural changes.
//!
//! # Invariants
//! - Membership is re-evaluated on structural change only, never per tick.
//! - Filters are immutable once a system is constructed.
//! - Iteration order over entities is deterministic (BTreeMap/BTreeSet).

mod component;
mod entity;
mod error;
mod signature;
mod system;
mod world;

pub use component::{
    Collision, CollisionShape, Component, ComponentData, ComponentKind, Name, Node, Physics,
    Physics2D,
};
pub use entity::{Entity, EntityStore};
pub use error::EcsError;
pub use signature::{Signature, SystemFilter};
pub use system::System;
pub use world::{World, WorldEvent};

pub fn crate_info() -> &'static str {
    "forge-ecs v0.1.0"
}
