//! Shared types used by the render, ECS and physics crates.
//!
//! # Invariants
//! - Identity types are plain values: copying one never duplicates the
//!   resource it names.

mod types;

pub use types::{Color, EntityId, Rect, Transform};
