//! Component types.
//!
//! Components are a closed set of tagged variants. Each variant has a fixed
//! [`ComponentKind`] index used for per-entity slot storage and signatures.

use forge_common::Transform;
use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    Node,
    Collision,
    Physics,
    Physics2D,
    Name,
}

impl ComponentKind {
    pub const COUNT: usize = 5;

    pub const ALL: [ComponentKind; Self::COUNT] = [
        ComponentKind::Node,
        ComponentKind::Collision,
        ComponentKind::Physics,
        ComponentKind::Physics2D,
        ComponentKind::Name,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Scene-graph node: the entity's global transform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    pub transform: Transform,
}

impl Node {
    pub fn at(position: Vec3) -> Self {
        Self {
            transform: Transform::from_position(position),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollisionShape {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
}

impl Default for CollisionShape {
    fn default() -> Self {
        Self::Box {
            half_extents: Vec3::splat(0.5),
        }
    }
}

/// Collision geometry. Without a [`Physics`] component the entity is static.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Collision {
    pub shape: CollisionShape,
}

/// Marks the entity as a dynamic, simulated rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Physics {
    pub mass: f32,
    pub gravity_scale: f32,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            mass: 1.0,
            gravity_scale: 1.0,
        }
    }
}

/// Planar physics body, simulated elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Physics2D {
    pub mass: f32,
}

/// Human-readable name component.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Name(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Component {
    Node(Node),
    Collision(Collision),
    Physics(Physics),
    Physics2D(Physics2D),
    Name(Name),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Node(_) => ComponentKind::Node,
            Component::Collision(_) => ComponentKind::Collision,
            Component::Physics(_) => ComponentKind::Physics,
            Component::Physics2D(_) => ComponentKind::Physics2D,
            Component::Name(_) => ComponentKind::Name,
        }
    }
}

/// Typed view of one [`Component`] variant.
pub trait ComponentData: Into<Component> + 'static {
    const KIND: ComponentKind;

    fn from_component(component: &Component) -> Option<&Self>;
    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;
}

macro_rules! component_data {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Component {
                fn from(value: $ty) -> Self {
                    Component::$ty(value)
                }
            }

            impl ComponentData for $ty {
                const KIND: ComponentKind = ComponentKind::$ty;

                fn from_component(component: &Component) -> Option<&Self> {
                    match component {
                        Component::$ty(value) => Some(value),
                        _ => None,
                    }
                }

                fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
                    match component {
                        Component::$ty(value) => Some(value),
                        _ => None,
                    }
                }
            }
        )*
    };
}

component_data!(Node, Collision, Physics, Physics2D, Name);
