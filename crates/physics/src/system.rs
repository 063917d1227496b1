use std::any::Any;
use std::collections::BTreeMap;

use forge_common::EntityId;
use forge_ecs::{
    ComponentKind, EcsError, EntityStore, Node, Physics, System, SystemFilter,
};
use glam::{EulerRot, Vec3};

use crate::error::PhysicsError;
use crate::world::{
    BodyDesc, BodyHandle, BodyKind, PhysicsConfig, PhysicsWorld, RigidBody, SimplePhysicsWorld,
};

/// Keeps scene nodes and rigid bodies in sync.
///
/// Entities with a [`Physics`] component are dynamic: the simulation owns
/// their transform and it is copied onto the node after each step. The rest
/// are static: the node owns the transform and the body follows it, with a
/// velocity derived from the displacement so collisions against moving
/// static geometry still respond correctly.
pub struct PhysicsSystem<W: PhysicsWorld = SimplePhysicsWorld> {
    filter: SystemFilter,
    config: PhysicsConfig,
    world: Option<W>,
    dynamic_objects: BTreeMap<EntityId, BodyHandle>,
    static_objects: BTreeMap<EntityId, BodyHandle>,
}

impl<W: PhysicsWorld> PhysicsSystem<W> {
    pub fn new(config: PhysicsConfig) -> Self {
        Self {
            filter: SystemFilter::new()
                .requires(&[ComponentKind::Node])
                .requires_any(&[ComponentKind::Collision, ComponentKind::Physics])
                .excludes(&[ComponentKind::Physics2D]),
            config,
            world: None,
            dynamic_objects: BTreeMap::new(),
            static_objects: BTreeMap::new(),
        }
    }

    /// `None` until the first entity is classified.
    pub fn physics_world(&self) -> Option<&W> {
        self.world.as_ref()
    }

    pub fn physics_world_mut(&mut self) -> Option<&mut W> {
        self.world.as_mut()
    }

    pub fn body_handle(&self, entity: EntityId) -> Option<BodyHandle> {
        self.dynamic_objects
            .get(&entity)
            .or_else(|| self.static_objects.get(&entity))
            .copied()
    }

    pub fn body(&self, entity: EntityId) -> Option<&W::Body> {
        let handle = self.body_handle(entity)?;
        self.world.as_ref()?.body(handle)
    }

    pub fn body_mut(&mut self, entity: EntityId) -> Option<&mut W::Body> {
        let handle = self.body_handle(entity)?;
        self.world.as_mut()?.body_mut(handle)
    }

    pub fn dynamic_count(&self) -> usize {
        self.dynamic_objects.len()
    }

    pub fn static_count(&self) -> usize {
        self.static_objects.len()
    }

    fn sync_dynamic(
        world: &W,
        objects: &BTreeMap<EntityId, BodyHandle>,
        entities: &mut EntityStore,
    ) -> Result<(), PhysicsError> {
        for (&entity, &handle) in objects {
            let body = world.body(handle).ok_or(PhysicsError::UnknownBody(handle))?;
            let node = entities
                .get_mut::<Node>(entity)
                .ok_or(PhysicsError::MissingNode(entity))?;
            node.transform.rotation = body.rotation();
            node.transform.position = body.position();
        }
        Ok(())
    }

    fn sync_static(
        world: &mut W,
        objects: &BTreeMap<EntityId, BodyHandle>,
        entities: &EntityStore,
        elapsed: f32,
    ) -> Result<(), PhysicsError> {
        let inv_elapsed = 1.0 / elapsed;
        for (&entity, &handle) in objects {
            let node = entities
                .get::<Node>(entity)
                .ok_or(PhysicsError::MissingNode(entity))?;
            let body = world
                .body_mut(handle)
                .ok_or(PhysicsError::UnknownBody(handle))?;

            let old_position = body.position();
            let new_position = node.transform.position;
            if new_position != old_position {
                body.set_position(new_position);
                body.set_velocity((new_position - old_position) * inv_elapsed);
            } else {
                body.set_velocity(Vec3::ZERO);
            }

            let old_rotation = body.rotation();
            let new_rotation = node.transform.rotation;
            if new_rotation != old_rotation {
                let transition = new_rotation * old_rotation.conjugate();
                let (yaw, pitch, roll) = transition.to_euler(EulerRot::YXZ);
                // Static bodies are not re-integrated; the spin only feeds
                // collision response.
                body.set_rotation(old_rotation);
                body.set_angular_velocity(Vec3::new(pitch, yaw, roll) * inv_elapsed);
            } else {
                body.set_angular_velocity(Vec3::ZERO);
            }
        }
        Ok(())
    }
}

impl Default for PhysicsSystem<SimplePhysicsWorld> {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl<W: PhysicsWorld + 'static> System for PhysicsSystem<W> {
    fn name(&self) -> &'static str {
        "physics"
    }

    fn filter(&self) -> &SystemFilter {
        &self.filter
    }

    fn on_entity_validation(
        &mut self,
        entity: EntityId,
        entities: &EntityStore,
        just_added: bool,
    ) -> Result<(), EcsError> {
        let node = entities
            .get::<Node>(entity)
            .ok_or(PhysicsError::MissingNode(entity))?;
        let physics = entities.get::<Physics>(entity);
        let dynamic = physics.is_some();

        let world = self.world.get_or_insert_with(|| {
            tracing::info!(gravity = ?self.config.gravity, "created physics world");
            W::new(&self.config)
        });

        // A revalidated entity may have switched between static and dynamic.
        if !just_added {
            let stale = if dynamic {
                &mut self.static_objects
            } else {
                &mut self.dynamic_objects
            };
            if let Some(handle) = stale.remove(&entity) {
                world.remove_body(handle);
                tracing::debug!(%entity, dynamic, "body changed kind");
            }
        }

        let objects = if dynamic {
            &mut self.dynamic_objects
        } else {
            &mut self.static_objects
        };
        if objects.contains_key(&entity) {
            return Ok(());
        }

        let mut desc = BodyDesc::new(
            if dynamic {
                BodyKind::Dynamic
            } else {
                BodyKind::Static
            },
            node.transform.position,
            node.transform.rotation,
        );
        if let Some(physics) = physics {
            desc.mass = physics.mass;
            desc.gravity_scale = physics.gravity_scale;
        }
        objects.insert(entity, world.create_body(desc));
        Ok(())
    }

    fn on_entity_removed(&mut self, entity: EntityId) {
        let handle = self
            .dynamic_objects
            .remove(&entity)
            .or_else(|| self.static_objects.remove(&entity));
        if let (Some(handle), Some(world)) = (handle, self.world.as_mut()) {
            world.remove_body(handle);
        }
    }

    fn on_update(&mut self, entities: &mut EntityStore, elapsed: f32) -> Result<(), EcsError> {
        if !elapsed.is_finite() || elapsed <= 0.0 {
            tracing::error!(elapsed, "cannot step physics");
            return Err(PhysicsError::InvalidElapsedTime(elapsed).into());
        }
        let Some(world) = self.world.as_mut() else {
            return Ok(());
        };

        world.step(elapsed);
        Self::sync_dynamic(world, &self.dynamic_objects, entities)?;
        Self::sync_static(world, &self.static_objects, entities, elapsed)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
