//! Rigid-body simulation boundary and a built-in integrator.

use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u32);

/// Dynamic bodies are integrated by [`PhysicsWorld::step`]; static bodies
/// are moved externally and only carry velocities for collision response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyKind {
    Dynamic,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub position: Vec3,
    pub rotation: Quat,
    pub mass: f32,
    pub gravity_scale: f32,
}

impl BodyDesc {
    pub fn new(kind: BodyKind, position: Vec3, rotation: Quat) -> Self {
        Self {
            kind,
            position,
            rotation,
            mass: 1.0,
            gravity_scale: 1.0,
        }
    }
}

pub trait RigidBody {
    fn kind(&self) -> BodyKind;

    fn position(&self) -> Vec3;
    fn set_position(&mut self, position: Vec3);

    fn rotation(&self) -> Quat;
    fn set_rotation(&mut self, rotation: Quat);

    fn velocity(&self) -> Vec3;
    fn set_velocity(&mut self, velocity: Vec3);

    /// Radians per second around the x, y and z axes.
    fn angular_velocity(&self) -> Vec3;
    fn set_angular_velocity(&mut self, velocity: Vec3);
}

pub trait PhysicsWorld {
    type Body: RigidBody;

    fn new(config: &PhysicsConfig) -> Self
    where
        Self: Sized;

    /// Advance the simulation by `elapsed` seconds.
    fn step(&mut self, elapsed: f32);

    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle;
    fn remove_body(&mut self, handle: BodyHandle) -> bool;

    fn body(&self, handle: BodyHandle) -> Option<&Self::Body>;
    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Self::Body>;

    fn body_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleBody {
    kind: BodyKind,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    angular_velocity: Vec3,
    mass: f32,
    gravity_scale: f32,
}

impl SimpleBody {
    pub fn mass(&self) -> f32 {
        self.mass
    }
}

impl RigidBody for SimpleBody {
    fn kind(&self) -> BodyKind {
        self.kind
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.angular_velocity = velocity;
    }
}

/// Semi-implicit Euler integration under uniform gravity. No collision
/// detection.
#[derive(Debug, Clone, Default)]
pub struct SimplePhysicsWorld {
    config: PhysicsConfig,
    bodies: BTreeMap<BodyHandle, SimpleBody>,
    next_handle: u32,
}

impl PhysicsWorld for SimplePhysicsWorld {
    type Body = SimpleBody;

    fn new(config: &PhysicsConfig) -> Self {
        Self {
            config: *config,
            ..Self::default()
        }
    }

    fn step(&mut self, elapsed: f32) {
        let gravity = self.config.gravity;
        for body in self.bodies.values_mut() {
            if body.kind == BodyKind::Static {
                continue;
            }
            body.velocity += gravity * body.gravity_scale * elapsed;
            body.position += body.velocity * elapsed;

            let spin = body.angular_velocity * elapsed;
            if spin != Vec3::ZERO {
                body.rotation = (Quat::from_scaled_axis(spin) * body.rotation).normalize();
            }
        }
    }

    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;
        self.bodies.insert(
            handle,
            SimpleBody {
                kind: desc.kind,
                position: desc.position,
                rotation: desc.rotation,
                velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                mass: desc.mass,
                gravity_scale: desc.gravity_scale,
            },
        );
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        self.bodies.remove(&handle).is_some()
    }

    fn body(&self, handle: BodyHandle) -> Option<&SimpleBody> {
        self.bodies.get(&handle)
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut SimpleBody> {
        self.bodies.get_mut(&handle)
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}
